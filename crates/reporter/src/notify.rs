//! Desktop notification delivery for fatal problems.
//!
//! Delivery is best effort. The reporter falls back to the console whenever a
//! notifier is missing, unavailable, or fails, and terminates regardless.

use std::process::{Command, Stdio};
use std::sync::OnceLock;

use thiserror::Error;
use tracing::debug;

/// Title shown on every error notification.
pub const NOTIFICATION_SUMMARY: &str = "Leto Error Report";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to launch notification helper: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("notification helper not found (status 127)")]
    NotFound,
    #[error("notification helper exited with status {0}")]
    Status(i32),
    #[error("notification helper was terminated by a signal")]
    Signalled,
}

pub trait Notifier: Send + Sync {
    /// Whether the helper can be invoked at all.
    fn is_available(&self) -> bool;

    fn notify(&self, summary: &str, body: &str) -> Result<(), NotifyError>;
}

static NOTIFY_SEND_PRESENT: OnceLock<bool> = OnceLock::new();

/// `notify-send` based notifier (libnotify).
#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    fn probe() -> bool {
        let status = Command::new("sh")
            .args(["-c", "command -v notify-send"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        let present = matches!(status, Ok(status) if status.success());
        debug!(present, "probed for notify-send");
        present
    }
}

impl Notifier for DesktopNotifier {
    fn is_available(&self) -> bool {
        *NOTIFY_SEND_PRESENT.get_or_init(Self::probe)
    }

    fn notify(&self, summary: &str, body: &str) -> Result<(), NotifyError> {
        let status = Command::new("notify-send")
            .args(["-u", "critical", "-t", "-1", "-a", "Leto", summary, body])
            .stdin(Stdio::null())
            .status()?;
        exit_status_to_result(status.code())
    }
}

fn exit_status_to_result(code: Option<i32>) -> Result<(), NotifyError> {
    match code {
        Some(0) => Ok(()),
        Some(127) => Err(NotifyError::NotFound),
        Some(code) => Err(NotifyError::Status(code)),
        None => Err(NotifyError::Signalled),
    }
}

/// Notifier used when nothing was configured for the platform.
pub fn platform_notifier() -> Option<Box<dyn Notifier>> {
    if cfg!(target_os = "linux") {
        Some(Box::new(DesktopNotifier))
    } else {
        None
    }
}
