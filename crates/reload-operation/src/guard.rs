use std::sync::atomic::{AtomicBool, Ordering};

use reload_core::InstallationLock;
use tracing::warn;

/// Admits one holder at a time; contenders are turned away instead of queued.
#[derive(Debug, Default)]
pub(crate) struct SingleFlight {
    busy: AtomicBool,
}

#[derive(Debug)]
pub(crate) struct SingleFlightGuard<'a> {
    busy: &'a AtomicBool,
}

impl SingleFlight {
    pub(crate) fn try_acquire(&self) -> Option<SingleFlightGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SingleFlightGuard { busy: &self.busy })
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for SingleFlightGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Releases an [`InstallationLock`] claim when dropped.
#[derive(Debug)]
pub(crate) struct InstallationClaim<'a> {
    lock: &'a dyn InstallationLock,
}

impl<'a> InstallationClaim<'a> {
    /// `Ok(None)` when another process holds the installation.
    pub(crate) fn try_claim(lock: &'a dyn InstallationLock) -> anyhow::Result<Option<Self>> {
        Ok(lock.try_lock()?.then_some(Self { lock }))
    }
}

impl Drop for InstallationClaim<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.lock.unlock() {
            warn!(error = %format!("{err:#}"), "failed to release installation lock");
        }
    }
}
