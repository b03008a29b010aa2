// src/notify/sendmail.rs

//! Production notifier: hands an RFC 822 message to the local MTA.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::{Context, anyhow};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{Email, Notifier};
use crate::errors::Result;

#[derive(Debug, Clone)]
pub struct SendmailNotifier {
    program: PathBuf,
}

impl SendmailNotifier {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SendmailNotifier {
    fn default() -> Self {
        Self::new("/usr/sbin/sendmail")
    }
}

/// Headers + body in the format `sendmail -t` expects.
pub fn format_message(email: &Email) -> String {
    format!(
        "To: {}\nFrom: {}\nSubject: {}\nContent-Type: text/plain; charset=utf-8\n\n{}\n",
        email.to, email.from, email.subject, email.text
    )
}

impl Notifier for SendmailNotifier {
    fn send(&self, email: Email) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut child = Command::new(&self.program)
                .args(["-t", "-i"])
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .with_context(|| format!("spawning {}", self.program.display()))?;

            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(format_message(&email).as_bytes())
                    .await
                    .context("writing message to sendmail")?;
            }

            let status = child.wait().await.context("waiting for sendmail")?;
            if !status.success() {
                return Err(anyhow!("sendmail exited with {status}").into());
            }
            debug!(to = %email.to, subject = %email.subject, "notification sent");
            Ok(())
        })
    }
}
