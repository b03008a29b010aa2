// src/notify/mod.rs

//! Failure and restart notifications.
//!
//! The core only produces [`Notice`]s. The runtime renders them into an
//! [`Email`] using the configured routing and the host name, then hands them
//! to a [`Notifier`]. Delivery itself is external: production pipes the
//! message into `sendmail`, tests record it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::config::NotificationRouting;
use crate::errors::Result;

pub mod sendmail;

pub use sendmail::SendmailNotifier;

/// Why a kill was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
    MaxTime,
    MemoryLimit,
}

impl fmt::Display for KillReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KillReason::MaxTime => f.write_str("maxtime exceeded"),
            KillReason::MemoryLimit => f.write_str("memory limit exceeded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeKind {
    Restarted,
    ReturnedCode(i32),
    Error,
    Killed(KillReason),
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoticeKind::Restarted => f.write_str("Restarted"),
            NoticeKind::ReturnedCode(code) => write!(f, "returned code {code}"),
            NoticeKind::Error => f.write_str("Error"),
            NoticeKind::Killed(reason) => write!(f, "killed: {reason}"),
        }
    }
}

/// Structured event emitted by a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub name: String,
    pub pid: Option<u32>,
    pub body: Option<String>,
}

impl Notice {
    pub fn new(kind: NoticeKind, name: impl Into<String>, pid: Option<u32>) -> Self {
        Self {
            kind,
            name: name.into(),
            pid,
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn subject(&self) -> String {
        format!("Custodian | Process {} ({})", self.kind, self.name)
    }

    pub fn text(&self, hostname: &str) -> String {
        let pid = self
            .pid
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        let mut text = format!("Hostname: {hostname}\nProcess: {}\nPID: {pid}", self.name);
        if let Some(body) = &self.body {
            text.push_str("\n\n");
            text.push_str(body);
        }
        text
    }

    /// Render for delivery. Returns `None` when no recipient is configured.
    pub fn render(&self, routing: &NotificationRouting, hostname: &str) -> Option<Email> {
        let to = routing.to.clone()?;
        let from = routing.from.clone().unwrap_or_else(|| to.clone());
        Some(Email {
            to,
            from,
            subject: self.subject(),
            text: self.text(hostname),
        })
    }
}

/// Payload handed to the external mail channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub text: String,
}

/// External notification channel.
pub trait Notifier: Send + Sync {
    fn send(&self, email: Email) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Host name used in notification bodies.
pub fn hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}
