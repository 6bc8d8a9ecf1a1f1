use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadWaitError {
    #[error("download of '{package_id}' was interrupted before completion")]
    Interrupted { package_id: String },
    #[error("download of '{package_id}' did not complete within {timeout:?}")]
    TimedOut {
        package_id: String,
        timeout: Duration,
    },
    #[error("download of '{package_id}' failed: {source:#}")]
    Failed {
        package_id: String,
        #[source]
        source: anyhow::Error,
    },
}

type CancelCleanup = Box<dyn FnOnce() + Send>;

/// Receiving side of a download: resolves once the worker signals completion.
pub struct DownloadHandle {
    package_id: String,
    receiver: mpsc::Receiver<anyhow::Result<()>>,
    cancelled: Arc<AtomicBool>,
    on_cancel: Option<CancelCleanup>,
}

/// Sending side held by the download worker. Dropping it without calling
/// [`DownloadCompleter::complete`] interrupts the waiting handle.
#[derive(Debug)]
pub struct DownloadCompleter {
    sender: mpsc::SyncSender<anyhow::Result<()>>,
    cancelled: Arc<AtomicBool>,
}

pub fn download_channel(package_id: impl Into<String>) -> (DownloadCompleter, DownloadHandle) {
    let (sender, receiver) = mpsc::sync_channel(1);
    let cancelled = Arc::new(AtomicBool::new(false));
    (
        DownloadCompleter {
            sender,
            cancelled: Arc::clone(&cancelled),
        },
        DownloadHandle {
            package_id: package_id.into(),
            receiver,
            cancelled,
            on_cancel: None,
        },
    )
}

impl DownloadCompleter {
    pub fn complete(self, result: anyhow::Result<()>) {
        // The handle may already be gone if the waiter timed out.
        let _ = self.sender.send(result);
    }

    /// Set once the waiter gave up; the worker should stop and clean up.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl DownloadHandle {
    /// Runs `cleanup` on the waiting thread when [`DownloadHandle::wait`] times out.
    ///
    /// The worker may be blocked on I/O and never observe the cancellation, so
    /// anything it left half-written must be undone here.
    pub fn on_cancel(mut self, cleanup: impl FnOnce() + Send + 'static) -> Self {
        self.on_cancel = Some(Box::new(cleanup));
        self
    }

    pub fn package_id(&self) -> &str {
        &self.package_id
    }

    pub fn wait(mut self, timeout: Duration) -> Result<(), DownloadWaitError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(DownloadWaitError::Failed {
                package_id: self.package_id,
                source,
            }),
            Err(RecvTimeoutError::Timeout) => {
                self.cancel();
                Err(DownloadWaitError::TimedOut {
                    package_id: self.package_id,
                    timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(DownloadWaitError::Interrupted {
                package_id: self.package_id,
            }),
        }
    }

    fn cancel(&mut self) {
        // Flag first so a worker that wakes up after the cleanup still backs off.
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(cleanup) = self.on_cancel.take() {
            cleanup();
        }
    }
}

impl fmt::Debug for DownloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadHandle")
            .field("package_id", &self.package_id)
            .field("cancelled", &self.cancelled.load(Ordering::SeqCst))
            .field("on_cancel", &self.on_cancel.is_some())
            .finish()
    }
}
