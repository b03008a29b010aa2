use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use custodian::errors::Result;
use custodian::notify::{Email, Notifier};

/// Notifier that keeps every rendered e-mail for later assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Email>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent().into_iter().map(|e| e.subject).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, email: Email) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.sent.lock().unwrap().push(email);
            Ok(())
        })
    }
}
