// tests/runtime_fake_executor.rs

mod common;
use crate::common::{
    init_tracing, settle, unused_config_path, ConfigBuilder, FakeBehaviour, Harness, JobBuilder,
    TestResult, WatchBuilder, FIRST_PID,
};

use std::time::Duration;

use custodian::types::{EntryId, KillSignal};

fn exit_after(code: i32, ms: u64) -> FakeBehaviour {
    FakeBehaviour::Exit {
        code,
        after: Duration::from_millis(ms),
    }
}

#[tokio::test]
async fn first_tick_runs_every_job_once() -> TestResult {
    init_tracing();

    let cfg = ConfigBuilder::new()
        .with_job("a", JobBuilder::new("run_a", "every 1h").build())
        .with_job("b", JobBuilder::new("run_b", "every 1h").build())
        .check_interval_ms(20)
        .build();
    let harness = Harness::start(cfg, unused_config_path(), |e| {
        e.with_default_behaviour(exit_after(0, 1))
    });

    settle(120).await;
    assert_eq!(harness.launched_names(), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(harness.pids(), vec![FIRST_PID, FIRST_PID + 1]);

    harness.shutdown().await
}

#[tokio::test]
async fn due_job_is_skipped_while_still_running() -> TestResult {
    init_tracing();

    let cfg = ConfigBuilder::new()
        .with_job("slow", JobBuilder::new("sleep_forever", "every 0.01s").build())
        .check_interval_ms(10)
        .build();
    let harness = Harness::start(cfg, unused_config_path(), |e| e);

    settle(150).await;
    assert_eq!(harness.launched_names(), vec!["slow".to_string()]);

    harness.shutdown().await
}

#[tokio::test]
async fn exited_watch_comes_back_with_a_new_pid() -> TestResult {
    init_tracing();

    let cfg = ConfigBuilder::new()
        .with_watch("w", WatchBuilder::new("serve").build())
        .check_interval_ms(1000)
        .build();
    let harness = Harness::start(cfg, unused_config_path(), |e| {
        e.with_default_behaviour(exit_after(0, 5))
    });

    settle(100).await;
    let pids = harness.pids();
    assert!(pids.len() >= 2, "watch relaunched on exit, got {pids:?}");
    assert_eq!(pids[0], FIRST_PID);
    assert!(pids.windows(2).all(|w| w[1] > w[0]));

    harness.shutdown().await
}

#[tokio::test]
async fn rate_limit_spaces_out_restarts() -> TestResult {
    init_tracing();

    // Exits after 10ms; restarts are held back to one per 200ms window.
    let cfg = ConfigBuilder::new()
        .with_watch("flappy", WatchBuilder::new("crash").build())
        .rate_limit(0.2)
        .check_interval_ms(20)
        .build();
    let harness = Harness::start(cfg, unused_config_path(), |e| {
        e.with_default_behaviour(exit_after(1, 10))
    });

    settle(300).await;
    assert_eq!(harness.pids().len(), 2);

    harness.shutdown().await
}

#[tokio::test]
async fn nonzero_exit_is_mailed_with_code_in_subject() -> TestResult {
    init_tracing();

    let cfg = ConfigBuilder::new()
        .email("ops@example.com")
        .with_job("error_code_test", JobBuilder::new("fail", "every 1h").build())
        .check_interval_ms(20)
        .build();
    let harness = Harness::start(cfg, unused_config_path(), |e| {
        e.with_default_behaviour(exit_after(12, 1))
    });

    settle(100).await;
    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].subject,
        "Custodian | Process returned code 12 (error_code_test)"
    );
    assert_eq!(sent[0].to, "ops@example.com");
    assert!(sent[0].text.contains(&format!("PID: {FIRST_PID}")));

    harness.shutdown().await
}

#[tokio::test]
async fn maxtime_kills_the_run() -> TestResult {
    init_tracing();

    let cfg = ConfigBuilder::new()
        .email("ops@example.com")
        .with_job("hang", JobBuilder::new("hang", "every 1h").maxtime("0.05s").build())
        .check_interval_ms(20)
        .build();
    let harness = Harness::start(cfg, unused_config_path(), |e| e);

    settle(200).await;
    assert_eq!(harness.kills(), vec![(FIRST_PID, KillSignal::Kill)]);
    assert_eq!(
        harness.notifier.subjects(),
        vec!["Custodian | Process killed: maxtime exceeded (hang)".to_string()]
    );

    harness.shutdown().await
}

#[tokio::test]
async fn memory_hog_is_killed_once() -> TestResult {
    init_tracing();

    let cfg = ConfigBuilder::new()
        .email("ops@example.com")
        .with_watch("hog", WatchBuilder::new("eat").mem_limit("1m").build())
        .rate_limit(10.0)
        .check_interval_ms(20)
        .build();
    let harness = Harness::start(cfg, unused_config_path(), |e| {
        e.with_memory("hog", 64 * 1024 * 1024)
    });

    settle(200).await;
    assert_eq!(harness.kills(), vec![(FIRST_PID, KillSignal::Kill)]);
    assert_eq!(
        harness.notifier.subjects(),
        vec!["Custodian | Process killed: memory limit exceeded (hog)".to_string()]
    );

    harness.shutdown().await
}

#[tokio::test]
async fn dependents_run_after_upstream_completes() -> TestResult {
    init_tracing();

    let cfg = ConfigBuilder::new()
        .with_job("build", JobBuilder::new("make", "every 1h").build())
        .with_job("deploy", JobBuilder::new("ship", "after build").build())
        .with_job("notify", JobBuilder::new("tell", "after build").build())
        .check_interval_ms(1000)
        .build();
    let harness = Harness::start(cfg, unused_config_path(), |e| {
        e.with_default_behaviour(exit_after(0, 5))
    });

    settle(100).await;
    assert_eq!(
        harness.launched_names(),
        vec!["build".to_string(), "deploy".to_string(), "notify".to_string()]
    );

    harness.shutdown().await
}

#[tokio::test]
async fn failed_upstream_does_not_fire_dependents_when_disabled() -> TestResult {
    init_tracing();

    let cfg = ConfigBuilder::new()
        .after_on_failure(false)
        .with_job("build", JobBuilder::new("make", "every 1h").build())
        .with_job("deploy", JobBuilder::new("ship", "after build").build())
        .check_interval_ms(1000)
        .build();
    let harness = Harness::start(cfg, unused_config_path(), |e| {
        e.with_default_behaviour(exit_after(1, 5))
    });

    settle(100).await;
    assert_eq!(harness.launched_names(), vec!["build".to_string()]);

    harness.shutdown().await
}

#[tokio::test]
async fn missing_cmd_is_logged_not_mailed() -> TestResult {
    init_tracing();

    let cfg = ConfigBuilder::new()
        .email("ops@example.com")
        .with_job("broken", JobBuilder::without_cmd("every 0.01s").build())
        .check_interval_ms(10)
        .build();
    let harness = Harness::start(cfg, unused_config_path(), |e| e);

    settle(80).await;
    assert!(harness.launched_names().is_empty());
    assert!(harness.notifier.sent().is_empty());

    harness.shutdown().await
}

#[tokio::test]
async fn watch_that_cannot_start_is_retried_on_next_tick() -> TestResult {
    init_tracing();

    let cfg = ConfigBuilder::new()
        .email("ops@example.com")
        .with_watch("ghost", WatchBuilder::new("/missing/binary").build())
        .check_interval_ms(50)
        .build();
    let harness = Harness::start(cfg, unused_config_path(), |e| {
        e.with_behaviour(
            EntryId::watch("ghost"),
            FakeBehaviour::FailToStart("No such file or directory".to_string()),
        )
    });

    settle(120).await;
    let subjects = harness.notifier.subjects();
    assert!(
        (2..=3).contains(&subjects.len()),
        "one error per tick, got {subjects:?}"
    );
    assert!(subjects.iter().all(|s| s == "Custodian | Process Error (ghost)"));

    harness.shutdown().await
}

#[tokio::test]
async fn shutdown_terminates_live_children() -> TestResult {
    init_tracing();

    let cfg = ConfigBuilder::new()
        .with_job("long", JobBuilder::new("work", "every 1h").build())
        .with_watch("w", WatchBuilder::new("serve").build())
        .check_interval_ms(1000)
        .build();
    let harness = Harness::start(cfg, unused_config_path(), |e| e);
    settle(50).await;

    let record = std::sync::Arc::clone(&harness.record);
    harness.shutdown().await?;

    let kills = record.lock().unwrap().kills.clone();
    assert_eq!(
        kills,
        vec![
            (FIRST_PID, KillSignal::Terminate),
            (FIRST_PID + 1, KillSignal::Terminate),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn job_output_is_closed_between_runs() -> TestResult {
    init_tracing();

    let cfg = ConfigBuilder::new()
        .with_job("rotate", JobBuilder::new("log_something", "every 1h").build())
        .check_interval_ms(20)
        .build();
    let harness = Harness::start(cfg, unused_config_path(), |e| {
        e.with_default_behaviour(exit_after(0, 5))
    });

    settle(100).await;
    let released = harness.record.lock().unwrap().released.clone();
    assert_eq!(released, vec![EntryId::job("rotate")]);

    harness.shutdown().await
}
