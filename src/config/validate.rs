// src/config/validate.rs

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::warn;

use crate::config::model::{
    DEFAULT_CHECK_INTERVAL, DaemonSettings, DynamicArg, GlobalConfig, JobSpec,
    NotificationRouting, RawConfigFile, RawJobConfig, RawWatchConfig, WatchSpec,
};
use crate::errors::{CustodianError, Result};
use crate::schedule::trigger::{Trigger, parse_duration, parse_memory_size};

impl TryFrom<RawConfigFile> for GlobalConfig {
    type Error = CustodianError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let rate_limit = validate_rate_limit(raw.rate_limit)?;
        let check_interval = validate_check_interval(raw.check_interval)?;

        let mut schedule = BTreeMap::new();
        for (name, job) in raw.schedule {
            let spec = job_spec(&name, job)?;
            schedule.insert(name, spec);
        }

        let mut watch = BTreeMap::new();
        for (name, entry) in raw.watch {
            let spec = watch_spec(&name, entry)?;
            watch.insert(name, spec);
        }

        warn_unknown_upstreams(&schedule);

        let email = raw.email.or(raw.admin);
        let routing = NotificationRouting {
            to: raw.notify_email.or_else(|| email.clone()),
            from: raw.from_email.or(email),
        };

        Ok(GlobalConfig {
            daemon: DaemonSettings {
                enabled: raw.daemon,
                log: raw.log,
                pid: raw.pid,
            },
            routing,
            rate_limit,
            check_interval,
            after_on_failure: raw.after_on_failure.unwrap_or(true),
            env: raw.env,
            schedule,
            watch,
        })
    }
}

fn validate_rate_limit(secs: Option<f64>) -> Result<Option<Duration>> {
    match secs {
        None => Ok(None),
        Some(s) if s == 0.0 => Ok(None),
        Some(s) => Duration::try_from_secs_f64(s).map(Some).map_err(|_| {
            CustodianError::ConfigError(format!(
                "rate_limit must be a non-negative number of seconds (got {s})"
            ))
        }),
    }
}

fn validate_check_interval(ms: Option<f64>) -> Result<Duration> {
    let invalid = |ms: f64| {
        CustodianError::ConfigError(format!(
            "check_interval must be a positive number of milliseconds (got {ms})"
        ))
    };
    match ms {
        None => Ok(DEFAULT_CHECK_INTERVAL),
        Some(ms) if !ms.is_finite() || ms <= 0.0 => Err(invalid(ms)),
        Some(ms) => Duration::try_from_secs_f64(ms / 1000.0).map_err(|_| invalid(ms)),
    }
}

fn job_spec(name: &str, raw: RawJobConfig) -> Result<JobSpec> {
    let maxtime = match raw.maxtime.as_deref() {
        None => None,
        Some(s) => Some(parse_duration(s).ok_or_else(|| {
            CustodianError::ConfigError(format!(
                "schedule '{name}': invalid maxtime '{s}' (expected N[smhd])"
            ))
        })?),
    };

    let trigger = Trigger::parse(&raw.when);
    if let Trigger::Unrecognized(ref when) = trigger {
        warn!(job = %name, when = %when, "unrecognized trigger; job will not run on a timer");
    }

    Ok(JobSpec {
        name: name.to_string(),
        cmd: raw.cmd,
        trigger,
        args: raw.args.iter().map(|a| DynamicArg::parse(a)).collect(),
        env: raw.env,
        cwd: raw.cwd,
        output: raw.output,
        maxtime,
    })
}

fn watch_spec(name: &str, raw: RawWatchConfig) -> Result<WatchSpec> {
    let mem_limit = match raw.mem_limit.as_deref() {
        None => None,
        Some(s) => Some(parse_memory_size(s).ok_or_else(|| {
            CustodianError::ConfigError(format!(
                "watch '{name}': invalid mem_limit '{s}' (expected Nk, Nm or Ng)"
            ))
        })?),
    };

    Ok(WatchSpec {
        name: name.to_string(),
        cmd: raw.cmd,
        notify: raw.notify,
        env: raw.env,
        cwd: raw.cwd,
        output: raw.output,
        mem_limit,
    })
}

fn warn_unknown_upstreams(schedule: &BTreeMap<String, JobSpec>) {
    for job in schedule.values() {
        if let Some(upstream) = job.trigger.upstream() {
            if !schedule.contains_key(upstream) {
                warn!(job = %job.name, upstream = %upstream, "`after` names an unknown job");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_str;

    fn load(json: &str) -> Result<GlobalConfig> {
        GlobalConfig::try_from(parse_str(json)?)
    }

    #[test]
    fn full_document_maps_to_specs() -> Result<()> {
        let cfg = load(
            r#"{
                "admin": "ops@example.com",
                "from_email": "custodian@example.com",
                "rate_limit": 0.5,
                "check_interval": 250,
                "env": {"one": "one"},
                "schedule": {
                    "job1": {"cmd": "test/job1.sh", "args": ["last_run", "bogus"], "when": "every 2s", "maxtime": "1m"},
                    "job2": {"cmd": "test/job2.sh", "when": "after job1", "output": "/tmp/job2.log"}
                },
                "watch": {
                    "job1": {"cmd": "test/job1.sh", "notify": true, "mem_limit": "64m", "cwd": "/tmp"}
                }
            }"#,
        )?;

        assert_eq!(cfg.routing.to.as_deref(), Some("ops@example.com"));
        assert_eq!(cfg.routing.from.as_deref(), Some("custodian@example.com"));
        assert_eq!(cfg.rate_limit, Some(Duration::from_millis(500)));
        assert_eq!(cfg.check_interval, Duration::from_millis(250));
        assert!(cfg.after_on_failure);

        let job1 = &cfg.schedule["job1"];
        assert_eq!(job1.trigger.interval(), Some(Duration::from_secs(2)));
        assert_eq!(
            job1.args,
            vec![DynamicArg::LastRun, DynamicArg::Unrecognized("bogus".into())]
        );
        assert_eq!(job1.maxtime, Some(Duration::from_secs(60)));

        assert_eq!(cfg.dependents_of("job1"), vec!["job2".to_string()]);

        let watch = &cfg.watch["job1"];
        assert!(watch.notify);
        assert_eq!(watch.mem_limit, Some(64 * 1024 * 1024));
        Ok(())
    }

    #[test]
    fn defaults_apply_to_empty_document() -> Result<()> {
        let cfg = load("{}")?;
        assert_eq!(cfg.check_interval, DEFAULT_CHECK_INTERVAL);
        assert_eq!(cfg.rate_limit, None);
        assert!(cfg.schedule.is_empty() && cfg.watch.is_empty());
        assert_eq!(cfg.routing, NotificationRouting::default());
        Ok(())
    }

    #[test]
    fn notify_email_overrides_recipient_only() -> Result<()> {
        let cfg = load(r#"{"email": "a@x", "notify_email": "b@x"}"#)?;
        assert_eq!(cfg.routing.to.as_deref(), Some("b@x"));
        assert_eq!(cfg.routing.from.as_deref(), Some("a@x"));
        Ok(())
    }

    #[test]
    fn check_interval_accepts_any_json_number() -> Result<()> {
        assert_eq!(
            load(r#"{"check_interval": 5000.0}"#)?.check_interval,
            Duration::from_secs(5)
        );
        assert_eq!(
            load(r#"{"check_interval": 1e3}"#)?.check_interval,
            Duration::from_secs(1)
        );
        let fractional = load(r#"{"check_interval": 250.5}"#)?.check_interval;
        assert!((fractional.as_secs_f64() * 1000.0 - 250.5).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn email_and_admin_may_both_be_set() -> Result<()> {
        let cfg = load(r#"{"email": "a@x", "admin": "b@x"}"#)?;
        assert_eq!(cfg.routing.to.as_deref(), Some("a@x"));
        assert_eq!(cfg.routing.from.as_deref(), Some("a@x"));

        let cfg = load(r#"{"admin": "b@x"}"#)?;
        assert_eq!(cfg.routing.to.as_deref(), Some("b@x"));
        Ok(())
    }

    #[test]
    fn missing_cmd_and_odd_trigger_are_accepted() -> Result<()> {
        let cfg = load(r#"{"schedule": {"x": {"when": "whenever"}}}"#)?;
        assert_eq!(cfg.schedule["x"].cmd, None);
        assert!(matches!(cfg.schedule["x"].trigger, Trigger::Unrecognized(_)));
        Ok(())
    }

    #[test]
    fn rejects_bad_values() {
        for json in [
            r#"{"check_interval": 0}"#,
            r#"{"check_interval": -5.5}"#,
            r#"{"rate_limit": -1}"#,
            r#"{"schedule": {"x": {"cmd": "a", "when": "every 1s", "maxtime": "soon"}}}"#,
            r#"{"watch": {"x": {"cmd": "a", "mem_limit": "lots"}}}"#,
        ] {
            match load(json) {
                Err(CustodianError::ConfigError(_)) => {}
                other => panic!("expected ConfigError for {json}, got {other:?}"),
            }
        }
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        assert!(matches!(load("{ not json"), Err(CustodianError::JsonError(_))));
    }
}
