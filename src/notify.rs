//! User-facing notifications: fire-and-forget messages fanned out to sinks.
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
    Info,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotificationKind::Success => "success",
            NotificationKind::Error => "error",
            NotificationKind::Info => "info",
        })
    }
}

/// Presentation surface for one kind of output (terminal, log, test recorder).
pub trait NotificationSink: Send + Sync {
    fn notify(&self, kind: NotificationKind, message: &str);
}

/// Records every notification in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, kind: NotificationKind, message: &str) {
        match kind {
            NotificationKind::Error => warn!(%kind, "{}", message),
            _ => info!(%kind, "{}", message),
        }
    }
}

/// Prints notifications for a terminal user.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn notify(&self, kind: NotificationKind, message: &str) {
        match kind {
            NotificationKind::Success => println!("✔ {}", message),
            NotificationKind::Info => println!("ℹ {}", message),
            NotificationKind::Error => eprintln!("✘ {}", message),
        }
    }
}

/// Delivers every message to each registered sink, in registration order.
#[derive(Clone, Default)]
pub struct Notifier {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn notify(&self, kind: NotificationKind, message: impl AsRef<str>) {
        let message = message.as_ref();
        for sink in &self.sinks {
            sink.notify(kind, message);
        }
    }

    pub fn success(&self, message: impl AsRef<str>) {
        self.notify(NotificationKind::Success, message);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.notify(NotificationKind::Info, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.notify(NotificationKind::Error, message);
    }
}
