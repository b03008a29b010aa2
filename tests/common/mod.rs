#![allow(dead_code)]

pub use custodian_test_utils::*;

use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use custodian::config::GlobalConfig;
use custodian::engine::{CoreRuntime, Runtime, RuntimeEvent};
use custodian::schedule::env::ambient_environment;
use custodian::types::KillSignal;

pub type TestResult = Result<(), Box<dyn Error>>;

/// A runtime driven by a [`FakeExecutor`] and a [`RecordingNotifier`],
/// running on its own task.
pub struct Harness {
    pub tx: mpsc::Sender<RuntimeEvent>,
    pub record: Arc<Mutex<FakeRecord>>,
    pub notifier: RecordingNotifier,
    handle: JoinHandle<custodian::errors::Result<()>>,
}

impl Harness {
    /// `setup` customises the fake executor (behaviours, memory sizes).
    pub fn start(
        config: GlobalConfig,
        config_path: PathBuf,
        setup: impl FnOnce(FakeExecutor) -> FakeExecutor,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
        let record = Arc::new(Mutex::new(FakeRecord::default()));
        let executor = setup(FakeExecutor::new(tx.clone(), Arc::clone(&record)));
        let notifier = RecordingNotifier::new();

        let core = CoreRuntime::new(config, ambient_environment());
        let runtime = Runtime::new(
            core,
            config_path,
            tx.clone(),
            rx,
            executor,
            Arc::new(notifier.clone()),
        );
        let handle = tokio::spawn(runtime.run());

        Self {
            tx,
            record,
            notifier,
            handle,
        }
    }

    pub fn launched_names(&self) -> Vec<String> {
        self.record.lock().unwrap().launched_names()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.record
            .lock()
            .unwrap()
            .launches
            .iter()
            .map(|(_, pid)| *pid)
            .collect()
    }

    pub fn kills(&self) -> Vec<(u32, KillSignal)> {
        self.record.lock().unwrap().kills.clone()
    }

    /// Request shutdown and wait for the runtime task to finish.
    pub async fn shutdown(self) -> TestResult {
        self.tx.send(RuntimeEvent::ShutdownRequested).await?;
        let joined = tokio::time::timeout(Duration::from_secs(3), self.handle).await?;
        joined??;
        Ok(())
    }
}

/// Config path that is never read unless a test triggers a reload.
pub fn unused_config_path() -> PathBuf {
    PathBuf::from("/nonexistent/custodian-test.json")
}

pub async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
