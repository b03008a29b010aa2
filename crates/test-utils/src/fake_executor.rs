use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use custodian::engine::{Instance, LaunchRequest, RuntimeEvent};
use custodian::errors::{CustodianError, Result};
use custodian::exec::ExecutorBackend;
use custodian::types::{EntryId, ExitOutcome, KillSignal};

/// First pid handed out, like a freshly booted process table.
pub const FIRST_PID: u32 = 1000;

/// How a fake child behaves once launched.
#[derive(Debug, Clone)]
pub enum FakeBehaviour {
    /// Keep running until killed.
    Run,
    /// Exit with `code` after `after`.
    Exit { code: i32, after: Duration },
    /// Spawn fails with this message.
    FailToStart(String),
}

/// Everything the fake executor was asked to do.
#[derive(Debug, Default)]
pub struct FakeRecord {
    pub launches: Vec<(LaunchRequest, u32)>,
    pub kills: Vec<(u32, KillSignal)>,
    pub released: Vec<EntryId>,
}

impl FakeRecord {
    pub fn launched_names(&self) -> Vec<String> {
        self.launches
            .iter()
            .map(|(req, _)| req.entry.name.clone())
            .collect()
    }

    pub fn launch_count(&self, entry: &EntryId) -> usize {
        self.launches
            .iter()
            .filter(|(req, _)| &req.entry == entry)
            .count()
    }
}

type LiveTable = Arc<Mutex<HashMap<u32, (EntryId, Instance)>>>;

/// A fake executor that:
/// - records launches, kills and sink releases
/// - hands out pids counting up from [`FIRST_PID`]
/// - reports `ProcessExited` according to each entry's [`FakeBehaviour`]
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    record: Arc<Mutex<FakeRecord>>,
    behaviours: HashMap<EntryId, FakeBehaviour>,
    default_behaviour: FakeBehaviour,
    memory: HashMap<String, u64>,
    live: LiveTable,
    next_pid: u32,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, record: Arc<Mutex<FakeRecord>>) -> Self {
        Self {
            runtime_tx,
            record,
            behaviours: HashMap::new(),
            default_behaviour: FakeBehaviour::Run,
            memory: HashMap::new(),
            live: Arc::new(Mutex::new(HashMap::new())),
            next_pid: FIRST_PID,
        }
    }

    pub fn with_behaviour(mut self, entry: EntryId, behaviour: FakeBehaviour) -> Self {
        self.behaviours.insert(entry, behaviour);
        self
    }

    pub fn with_default_behaviour(mut self, behaviour: FakeBehaviour) -> Self {
        self.default_behaviour = behaviour;
        self
    }

    /// Resident size reported for every memory sample of this watch.
    pub fn with_memory(mut self, watch: &str, rss_bytes: u64) -> Self {
        self.memory.insert(watch.to_string(), rss_bytes);
        self
    }

    fn report_exit(&self, pid: u32, outcome: ExitOutcome, delay: Duration) {
        let tx = self.runtime_tx.clone();
        let live = Arc::clone(&self.live);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let entry = live.lock().unwrap().remove(&pid);
            if let Some((entry, instance)) = entry {
                let _ = tx
                    .send(RuntimeEvent::ProcessExited {
                        entry,
                        instance,
                        pid,
                        outcome,
                    })
                    .await;
            }
        });
    }
}

impl ExecutorBackend for FakeExecutor {
    fn launch(
        &mut self,
        request: LaunchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<u32>> + Send + '_>> {
        Box::pin(async move {
            let behaviour = self
                .behaviours
                .get(&request.entry)
                .unwrap_or(&self.default_behaviour)
                .clone();
            if let FakeBehaviour::FailToStart(reason) = behaviour {
                return Err(CustodianError::Launch(reason));
            }

            let pid = self.next_pid;
            self.next_pid += 1;
            self.live
                .lock()
                .unwrap()
                .insert(pid, (request.entry.clone(), request.instance));
            self.record.lock().unwrap().launches.push((request, pid));

            if let FakeBehaviour::Exit { code, after } = behaviour {
                self.report_exit(pid, ExitOutcome::Code(code), after);
            }
            Ok(pid)
        })
    }

    fn kill(&mut self, pid: u32, signal: KillSignal) {
        self.record.lock().unwrap().kills.push((pid, signal));
        let signo = match signal {
            KillSignal::Terminate => 15,
            KillSignal::Kill => 9,
        };
        self.report_exit(pid, ExitOutcome::Signaled(signo), Duration::ZERO);
    }

    fn sample_memory(&mut self, name: String, instance: Instance, pid: u32) {
        let Some(&rss_bytes) = self.memory.get(&name) else {
            return;
        };
        let tx = self.runtime_tx.clone();
        tokio::spawn(async move {
            let _ = tx
                .send(RuntimeEvent::MemorySampled {
                    name,
                    instance,
                    pid,
                    rss_bytes,
                })
                .await;
        });
    }

    fn release_output(&mut self, entry: &EntryId) {
        self.record.lock().unwrap().released.push(entry.clone());
    }
}
