use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use reload_core::{
    download_channel, DownloadCompleter, DownloadHandle, InstallationLock, LocalPackage,
    LocalPackageRegistry, PackageKind, PackageState, RemotePackage, RemotePackageSource, RestartQueue, Task,
    ValidationStatus,
};

use crate::{
    PlatformInfo, Principal, ReloadCoordinator, ReloadError, ReloadOutcome, ReloadRequest,
};

const SNAPSHOT_ID: &str = "acme-studio-1.1.0-SNAPSHOT";

#[derive(Debug, Clone, Copy, Default)]
enum DownloadBehaviour {
    #[default]
    Complete,
    CompleteWithoutRegistering,
    Interrupt,
    Fail,
    Hang,
}

#[derive(Debug, Default)]
struct World {
    events: Mutex<Vec<String>>,
    remote: Mutex<Vec<RemotePackage>>,
    remote_after_flush: Mutex<Option<Vec<RemotePackage>>>,
    remote_unreachable: AtomicBool,
    local: Mutex<BTreeMap<String, LocalPackage>>,
    download: Mutex<DownloadBehaviour>,
    hanging_downloads: Mutex<Vec<DownloadCompleter>>,
    install_validation: Mutex<ValidationStatus>,
    uninstall_validation: Mutex<ValidationStatus>,
    fail_install_run: AtomicBool,
    listing_gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
    queued: Mutex<Vec<String>>,
    lock_held_elsewhere: AtomicBool,
    lock_broken: AtomicBool,
}

impl World {
    fn record(&self, event: impl Into<String>) {
        self.events.lock().expect("events lock").push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().expect("events lock").clone()
    }

    fn has_event(&self, prefix: &str) -> bool {
        self.events().iter().any(|event| event.starts_with(prefix))
    }

    fn set_local_state(&self, id: &str, state: PackageState) {
        let mut local = self.local.lock().expect("local lock");
        local.insert(
            id.to_string(),
            LocalPackage {
                id: id.to_string(),
                name: "acme-studio".to_string(),
                version: "1.1.0-SNAPSHOT".to_string(),
                state,
            },
        );
    }

    fn local_state(&self, id: &str) -> Option<PackageState> {
        self.local
            .lock()
            .expect("local lock")
            .get(id)
            .map(|package| package.state)
    }
}

struct FakeRemote(Arc<World>);
struct FakeLocal(Arc<World>);
struct FakeQueue(Arc<World>);

impl RemotePackageSource for FakeRemote {
    fn list_remote_studio_packages(&self) -> Result<Vec<RemotePackage>> {
        self.0.record("list");
        let gate = self.0.listing_gate.lock().expect("gate lock").take();
        if let Some((entered, release)) = gate {
            entered.send(()).expect("test must observe listing");
            release.recv().expect("test must release listing");
        }
        if self.0.remote_unreachable.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }
        Ok(self.0.remote.lock().expect("remote lock").clone())
    }

    fn find_remote_package(&self, id: &str) -> Result<Option<RemotePackage>> {
        self.0.record(format!("find:{id}"));
        Ok(self
            .0
            .remote
            .lock()
            .expect("remote lock")
            .iter()
            .find(|package| package.id == id)
            .cloned())
    }

    fn flush_cache(&self) -> Result<()> {
        self.0.record("flush");
        if let Some(packages) = self.0.remote_after_flush.lock().expect("flush lock").take() {
            *self.0.remote.lock().expect("remote lock") = packages;
        }
        Ok(())
    }

    fn download(&self, id: &str) -> Result<DownloadHandle> {
        self.0.record(format!("download:{id}"));
        let behaviour = *self.0.download.lock().expect("download lock");
        let (completer, handle) = download_channel(id);
        match behaviour {
            DownloadBehaviour::Complete => {
                self.0.set_local_state(id, PackageState::Downloaded);
                completer.complete(Ok(()));
            }
            DownloadBehaviour::CompleteWithoutRegistering => completer.complete(Ok(())),
            DownloadBehaviour::Interrupt => drop(completer),
            DownloadBehaviour::Fail => completer.complete(Err(anyhow!("connection reset"))),
            DownloadBehaviour::Hang => self
                .0
                .hanging_downloads
                .lock()
                .expect("hang lock")
                .push(completer),
        }
        Ok(handle)
    }
}

struct FakeTask {
    world: Arc<World>,
    kind: &'static str,
    package_id: String,
}

impl Task for FakeTask {
    fn package_id(&self) -> &str {
        &self.package_id
    }

    fn validate(&mut self) -> Result<ValidationStatus> {
        self.world
            .record(format!("validate:{}:{}", self.kind, self.package_id));
        let status = match self.kind {
            "install" => &self.world.install_validation,
            _ => &self.world.uninstall_validation,
        };
        Ok(status.lock().expect("validation lock").clone())
    }

    fn run(&mut self) -> Result<()> {
        self.world
            .record(format!("run:{}:{}", self.kind, self.package_id));
        if self.kind == "install" {
            if self.world.fail_install_run.load(Ordering::SeqCst) {
                return Err(anyhow!("disk full"));
            }
            self.world
                .set_local_state(&self.package_id, PackageState::Installed);
        } else {
            self.world
                .set_local_state(&self.package_id, PackageState::Downloaded);
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.world
            .record(format!("rollback:{}:{}", self.kind, self.package_id));
        Ok(())
    }
}

impl LocalPackageRegistry for FakeLocal {
    fn package(&self, id: &str) -> Result<Option<LocalPackage>> {
        self.0.record(format!("local:{id}"));
        Ok(self.0.local.lock().expect("local lock").get(id).cloned())
    }

    fn remove_package(&self, id: &str) -> Result<()> {
        self.0.record(format!("remove:{id}"));
        self.0.local.lock().expect("local lock").remove(id);
        Ok(())
    }

    fn install_task(&self, package: &LocalPackage) -> Result<Box<dyn Task>> {
        Ok(Box::new(FakeTask {
            world: Arc::clone(&self.0),
            kind: "install",
            package_id: package.id.clone(),
        }))
    }

    fn uninstall_task(&self, package: &LocalPackage) -> Result<Box<dyn Task>> {
        Ok(Box::new(FakeTask {
            world: Arc::clone(&self.0),
            kind: "uninstall",
            package_id: package.id.clone(),
        }))
    }
}

impl RestartQueue for FakeQueue {
    fn add_package_for_installation(&self, id: &str) -> Result<()> {
        self.0.record(format!("queue:{id}"));
        self.0.queued.lock().expect("queue lock").push(id.to_string());
        Ok(())
    }
}

type TestCoordinator = ReloadCoordinator<FakeRemote, FakeLocal, FakeQueue>;

/// Stands in for a claim shared with other processes.
#[derive(Debug)]
struct FakeLock(Arc<World>);

impl InstallationLock for FakeLock {
    fn try_lock(&self) -> Result<bool> {
        if self.0.lock_broken.load(Ordering::SeqCst) {
            return Err(anyhow!("permission denied"));
        }
        self.0.record("lock");
        Ok(!self.0.lock_held_elsewhere.load(Ordering::SeqCst))
    }

    fn unlock(&self) -> Result<()> {
        self.0.record("unlock");
        Ok(())
    }
}

fn remote_package(id: &str, version: &str) -> RemotePackage {
    RemotePackage {
        id: id.to_string(),
        name: "acme-studio".to_string(),
        version: semver::Version::parse(version).expect("version"),
        kind: PackageKind::Studio,
        snapshot: false,
        target_platforms: Vec::new(),
        target_platform_range: None,
        url: format!("https://example.test/{id}.zip"),
        sha256: "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855".to_string(),
        size: None,
    }
}

fn world_with_snapshot() -> Arc<World> {
    let world = Arc::new(World::default());
    *world.remote.lock().expect("remote lock") = vec![
        remote_package("acme-studio-1.0.0", "1.0.0"),
        remote_package(SNAPSHOT_ID, "1.1.0-SNAPSHOT"),
    ];
    world
}

fn coordinator(world: &Arc<World>, dev_mode: bool) -> TestCoordinator {
    ReloadCoordinator::new(
        FakeRemote(Arc::clone(world)),
        FakeLocal(Arc::clone(world)),
        FakeQueue(Arc::clone(world)),
        PlatformInfo {
            target_platform: Some("cap-10.10".to_string()),
            dev_mode,
        },
    )
    .with_download_timeout(Duration::from_secs(5))
}

fn locked_coordinator(world: &Arc<World>) -> TestCoordinator {
    coordinator(world, true).with_installation_lock(FakeLock(Arc::clone(world)))
}

fn admin() -> Principal {
    Principal::administrator("Administrator")
}

fn reload(coordinator: &TestCoordinator, validate: bool) -> Result<ReloadOutcome, ReloadError> {
    coordinator.reload(&admin(), &ReloadRequest::new(validate))
}

#[test]
fn non_admin_fails_before_any_remote_query() {
    let world = world_with_snapshot();
    let coordinator = coordinator(&world, true);

    let err = coordinator
        .reload(&Principal::user("jdoe"), &ReloadRequest::new(true))
        .expect_err("non-admin must be rejected");

    assert!(matches!(err, ReloadError::Unauthorized { ref user } if user == "jdoe"));
    assert!(world.events().is_empty(), "{:?}", world.events());
    assert!(!coordinator.is_reload_in_progress());
}

#[test]
fn missing_snapshot_fails_without_side_effects() {
    let world = Arc::new(World::default());
    *world.remote.lock().expect("remote lock") = vec![remote_package("acme-studio-1.0.0", "1.0.0")];
    let coordinator = coordinator(&world, true);

    let err = reload(&coordinator, false).expect_err("no snapshot");
    assert!(matches!(err, ReloadError::SnapshotNotFound));
    assert_eq!(world.events(), vec!["list"]);
}

#[test]
fn unreachable_remote_maps_to_remote_error() {
    let world = world_with_snapshot();
    world.remote_unreachable.store(true, Ordering::SeqCst);
    let coordinator = coordinator(&world, true);

    let err = reload(&coordinator, false).expect_err("remote down");
    assert!(matches!(err, ReloadError::Remote(_)));
    assert!(err.to_string().contains("connection refused"), "{err}");
}

#[test]
fn validation_fails_when_package_vanishes_after_cache_flush() {
    let world = world_with_snapshot();
    *world.remote_after_flush.lock().expect("flush lock") =
        Some(vec![remote_package("acme-studio-1.0.0", "1.0.0")]);
    let coordinator = coordinator(&world, true);

    let err = reload(&coordinator, true).expect_err("package vanished");
    assert!(
        matches!(err, ReloadError::RemotePackageNotFound { ref package_id } if package_id == SNAPSHOT_ID)
    );
    assert_eq!(
        world.events(),
        vec!["list".to_string(), "flush".to_string(), format!("find:{SNAPSHOT_ID}")]
    );
}

#[test]
fn validation_rejects_incompatible_platform() {
    let world = world_with_snapshot();
    world.remote.lock().expect("remote lock")[1].target_platforms = vec!["cap-9.10".to_string()];
    let coordinator = coordinator(&world, true);

    let err = reload(&coordinator, true).expect_err("incompatible");
    assert!(matches!(err, ReloadError::Incompatible { ref platform, .. } if platform == "cap-10.10"));
    assert!(err.to_string().contains("not validated for your current platform"));
    assert!(!world.has_event("download"));
    assert!(!world.has_event("local"));
}

#[test]
fn incompatible_package_is_installed_when_validation_not_requested() {
    let world = world_with_snapshot();
    world.remote.lock().expect("remote lock")[1].target_platforms = vec!["cap-9.10".to_string()];
    let coordinator = coordinator(&world, true);

    let outcome = reload(&coordinator, false).expect("reload must succeed");
    assert!(matches!(outcome, ReloadOutcome::Installed { .. }));
    assert!(!world.has_event("flush"));
}

#[test]
fn compatible_package_passes_validation_and_installs() {
    let world = world_with_snapshot();
    world.remote.lock().expect("remote lock")[1].target_platforms = vec!["cap-10.*".to_string()];
    let coordinator = coordinator(&world, true);

    let outcome = reload(&coordinator, true).expect("reload must succeed");
    assert_eq!(
        outcome,
        ReloadOutcome::Installed {
            package_id: SNAPSHOT_ID.to_string(),
            replaced_version: None,
        }
    );
    assert_eq!(world.local_state(SNAPSHOT_ID), Some(PackageState::Installed));
}

#[test]
fn dev_mode_uninstalls_installed_copy_before_download_and_install() {
    let world = world_with_snapshot();
    world.set_local_state(SNAPSHOT_ID, PackageState::Installed);
    let coordinator = coordinator(&world, true);

    let outcome = reload(&coordinator, false).expect("reload must succeed");

    assert_eq!(
        outcome,
        ReloadOutcome::Installed {
            package_id: SNAPSHOT_ID.to_string(),
            replaced_version: Some("1.1.0-SNAPSHOT".to_string()),
        }
    );
    let expected = [
        "list".to_string(),
        format!("local:{SNAPSHOT_ID}"),
        format!("validate:uninstall:{SNAPSHOT_ID}"),
        format!("run:uninstall:{SNAPSHOT_ID}"),
        format!("remove:{SNAPSHOT_ID}"),
        format!("download:{SNAPSHOT_ID}"),
        format!("local:{SNAPSHOT_ID}"),
        format!("validate:install:{SNAPSHOT_ID}"),
        format!("run:install:{SNAPSHOT_ID}"),
    ];
    assert_eq!(world.events(), expected);
    assert_eq!(world.local_state(SNAPSHOT_ID), Some(PackageState::Installed));
}

#[test]
fn dev_mode_removes_downloaded_copy_without_uninstall_task() {
    let world = world_with_snapshot();
    world.set_local_state(SNAPSHOT_ID, PackageState::Downloaded);
    let coordinator = coordinator(&world, true);

    reload(&coordinator, false).expect("reload must succeed");
    assert!(world.has_event(&format!("remove:{SNAPSHOT_ID}")));
    assert!(!world.has_event("validate:uninstall"));
    assert!(!world.has_event("run:uninstall"));
}

#[test]
fn production_mode_queues_for_restart_without_live_tasks() {
    let world = world_with_snapshot();
    world.set_local_state(SNAPSHOT_ID, PackageState::Installed);
    let coordinator = coordinator(&world, false);

    let outcome = reload(&coordinator, false).expect("reload must succeed");

    assert_eq!(
        outcome,
        ReloadOutcome::QueuedForRestart {
            package_id: SNAPSHOT_ID.to_string()
        }
    );
    assert_eq!(world.queued.lock().expect("queue lock").clone(), vec![SNAPSHOT_ID]);
    assert_eq!(
        world.events(),
        vec!["list".to_string(), format!("queue:{SNAPSHOT_ID}")]
    );
}

#[test]
fn concurrent_reload_is_a_silent_no_op() {
    let world = world_with_snapshot();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    *world.listing_gate.lock().expect("gate lock") = Some((entered_tx, release_rx));
    let coordinator = coordinator(&world, true);

    thread::scope(|scope| {
        let first = scope.spawn(|| reload(&coordinator, false));

        entered_rx.recv().expect("first reload must reach listing");
        assert!(coordinator.is_reload_in_progress());
        let events_before = world.events();

        let second = reload(&coordinator, false).expect("second reload must not fail");
        assert_eq!(second, ReloadOutcome::AlreadyInProgress);
        assert_eq!(world.events(), events_before);

        release_tx.send(()).expect("must release first reload");
        let first = first
            .join()
            .expect("first reload must not panic")
            .expect("first reload must succeed");
        assert!(matches!(first, ReloadOutcome::Installed { .. }));
    });

    assert!(!coordinator.is_reload_in_progress());
    assert_eq!(
        world
            .events()
            .iter()
            .filter(|event| event.starts_with("download"))
            .count(),
        1
    );
}

#[test]
fn guard_is_released_after_failure() {
    let world = Arc::new(World::default());
    let coordinator = coordinator(&world, true);

    assert!(matches!(
        reload(&coordinator, false),
        Err(ReloadError::SnapshotNotFound)
    ));
    assert!(!coordinator.is_reload_in_progress());

    *world.remote.lock().expect("remote lock") = vec![remote_package(SNAPSHOT_ID, "1.1.0-SNAPSHOT")];
    assert!(matches!(
        reload(&coordinator, false),
        Ok(ReloadOutcome::Installed { .. })
    ));
}

#[test]
fn reload_held_by_another_process_is_a_silent_no_op() {
    let world = world_with_snapshot();
    world.lock_held_elsewhere.store(true, Ordering::SeqCst);
    let coordinator = locked_coordinator(&world);

    let outcome = reload(&coordinator, true).expect("held lock is not an error");

    assert_eq!(outcome, ReloadOutcome::AlreadyInProgress);
    assert_eq!(world.events(), vec!["lock"]);
    assert!(!coordinator.is_reload_in_progress());
}

#[test]
fn installation_lock_is_checked_after_administrator() {
    let world = world_with_snapshot();
    world.lock_held_elsewhere.store(true, Ordering::SeqCst);
    let coordinator = locked_coordinator(&world);

    let err = coordinator
        .reload(&Principal::user("jdoe"), &ReloadRequest::new(false))
        .expect_err("non-admin must be rejected");

    assert!(matches!(err, ReloadError::Unauthorized { .. }));
    assert!(world.events().is_empty(), "{:?}", world.events());
}

#[test]
fn installation_lock_is_held_for_the_whole_reload() {
    let world = world_with_snapshot();
    let coordinator = locked_coordinator(&world);

    assert!(matches!(
        reload(&coordinator, false),
        Ok(ReloadOutcome::Installed { .. })
    ));

    let events = world.events();
    assert_eq!(events.first().map(String::as_str), Some("lock"));
    assert_eq!(events.last().map(String::as_str), Some("unlock"));
    assert_eq!(events.iter().filter(|event| *event == "unlock").count(), 1);
}

#[test]
fn installation_lock_is_released_after_failure() {
    let world = Arc::new(World::default());
    let coordinator = locked_coordinator(&world);

    assert!(matches!(
        reload(&coordinator, false),
        Err(ReloadError::SnapshotNotFound)
    ));
    assert_eq!(world.events(), vec!["lock", "list", "unlock"]);
}

#[test]
fn installation_lock_error_maps_to_package_error() {
    let world = world_with_snapshot();
    world.lock_broken.store(true, Ordering::SeqCst);
    let coordinator = locked_coordinator(&world);

    let err = reload(&coordinator, false).expect_err("broken lock");

    assert!(matches!(err, ReloadError::Package(_)));
    assert!(world.events().is_empty(), "{:?}", world.events());
    assert!(!coordinator.is_reload_in_progress());
}

#[test]
fn install_validation_errors_roll_back_and_fail() {
    let world = world_with_snapshot();
    world
        .install_validation
        .lock()
        .expect("validation lock")
        .add_error("archive checksum mismatch");
    let coordinator = coordinator(&world, true);

    let err = reload(&coordinator, false).expect_err("validation must block");
    match &err {
        ReloadError::ValidationFailed { package_id, errors } => {
            assert_eq!(package_id, SNAPSHOT_ID);
            assert_eq!(errors, &vec!["archive checksum mismatch".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("archive checksum mismatch"));
    assert!(world.has_event(&format!("rollback:install:{SNAPSHOT_ID}")));
    assert!(!world.has_event("run:install"));
}

#[test]
fn install_validation_warnings_do_not_block() {
    let world = world_with_snapshot();
    world
        .install_validation
        .lock()
        .expect("validation lock")
        .add_warning("stale deployment will be replaced");
    let coordinator = coordinator(&world, true);

    let outcome = reload(&coordinator, false).expect("warnings must not block");
    assert!(matches!(outcome, ReloadOutcome::Installed { .. }));
    assert!(world.has_event(&format!("run:install:{SNAPSHOT_ID}")));
    assert!(!world.has_event("rollback"));
}

#[test]
fn install_run_failure_rolls_back() {
    let world = world_with_snapshot();
    world.fail_install_run.store(true, Ordering::SeqCst);
    let coordinator = coordinator(&world, true);

    let err = reload(&coordinator, false).expect_err("run failure must surface");
    assert!(matches!(err, ReloadError::Package(_)));
    assert!(err.to_string().contains("disk full"), "{err}");
    assert!(world.has_event(&format!("rollback:install:{SNAPSHOT_ID}")));
}

#[test]
fn uninstall_validation_errors_abort_before_download() {
    let world = world_with_snapshot();
    world.set_local_state(SNAPSHOT_ID, PackageState::Installed);
    world
        .uninstall_validation
        .lock()
        .expect("validation lock")
        .add_error("bundle is locked");
    let coordinator = coordinator(&world, true);

    let err = reload(&coordinator, false).expect_err("uninstall must block");
    assert!(matches!(err, ReloadError::ValidationFailed { .. }));
    assert!(world.has_event(&format!("rollback:uninstall:{SNAPSHOT_ID}")));
    assert!(!world.has_event("remove"));
    assert!(!world.has_event("download"));
}

#[test]
fn interrupted_download_maps_to_interruption_error() {
    let world = world_with_snapshot();
    *world.download.lock().expect("download lock") = DownloadBehaviour::Interrupt;
    let coordinator = coordinator(&world, true);

    let err = reload(&coordinator, false).expect_err("interrupted");
    assert!(matches!(err, ReloadError::Interrupted { ref package_id } if package_id == SNAPSHOT_ID));
    assert!(!world.has_event("validate:install"));
}

#[test]
fn hanging_download_times_out() {
    let world = world_with_snapshot();
    *world.download.lock().expect("download lock") = DownloadBehaviour::Hang;
    let coordinator = coordinator(&world, true).with_download_timeout(Duration::from_millis(20));

    let err = reload(&coordinator, false).expect_err("timed out");
    assert!(matches!(err, ReloadError::DownloadTimedOut { .. }));
    assert!(err.to_string().contains("after 20ms"), "{err}");
    assert!(!coordinator.is_reload_in_progress());
}

#[test]
fn failed_download_maps_to_remote_error() {
    let world = world_with_snapshot();
    *world.download.lock().expect("download lock") = DownloadBehaviour::Fail;
    let coordinator = coordinator(&world, true);

    let err = reload(&coordinator, false).expect_err("failed download");
    assert!(matches!(err, ReloadError::Remote(_)));
    assert!(err.to_string().contains("connection reset"), "{err}");
}

#[test]
fn download_without_local_record_is_incomplete() {
    let world = world_with_snapshot();
    *world.download.lock().expect("download lock") = DownloadBehaviour::CompleteWithoutRegistering;
    let coordinator = coordinator(&world, true);

    let err = reload(&coordinator, false).expect_err("incomplete");
    assert!(matches!(err, ReloadError::DownloadIncomplete { ref state, .. } if state == "absent"));
}

#[test]
fn request_from_params_accepts_validate_only() {
    assert_eq!(
        ReloadRequest::from_params(Vec::<(&str, &str)>::new()).expect("empty params"),
        ReloadRequest::new(false)
    );
    assert_eq!(
        ReloadRequest::from_params([("validate", "TRUE")]).expect("validate"),
        ReloadRequest::new(true)
    );
    assert!(matches!(
        ReloadRequest::from_params([("force", "true")]),
        Err(ReloadError::InvalidParameter(_))
    ));
    assert!(matches!(
        ReloadRequest::from_params([("validate", "yes")]),
        Err(ReloadError::InvalidParameter(_))
    ));
    assert!(matches!(
        ReloadRequest::from_params([("validate", "true"), ("validate", "false")]),
        Err(ReloadError::InvalidParameter(_))
    ));
}
