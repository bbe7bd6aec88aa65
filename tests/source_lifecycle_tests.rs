//! Tests for installation sources and the payload lifecycle
//!
//! These tests verify:
//! - The source list can't change while a source is set up
//! - Teardown is idempotent and always leaves the sources unready
//! - A packages payload goes through set up, install and tear down
//! - Background setup tasks and waiting with a timeout

mod common;

use anaconda_payloads::{
    LifecycleStage, PackagesPayload, PackagesSelectionData, Payload, PayloadConfig, PayloadError,
    PayloadLifecycle, Source, SourceBackend, SourceState, SourceType, TaskRegistry, TaskRunner,
};
use common::{RecordingInstaller, fedora_resolver};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Backend whose setup blocks until the test opens the gate
struct GatedBackend {
    gate: Mutex<mpsc::Receiver<()>>,
}

impl GatedBackend {
    fn new() -> (Arc<Self>, mpsc::Sender<()>) {
        let (sender, receiver) = mpsc::channel();
        let backend = Arc::new(Self {
            gate: Mutex::new(receiver),
        });
        (backend, sender)
    }
}

impl SourceBackend for GatedBackend {
    fn set_up(&self, _source_type: SourceType) -> anyhow::Result<()> {
        self.gate
            .lock()
            .map_err(|_| anyhow::anyhow!("gate poisoned"))?
            .recv()
            .map_err(|_| anyhow::anyhow!("gate closed"))
    }

    fn tear_down(&self, _source_type: SourceType) -> anyhow::Result<()> {
        Ok(())
    }
}

fn packages_payload(
    selection: PackagesSelectionData,
) -> (Arc<PackagesPayload>, Arc<RecordingInstaller>) {
    let installer = Arc::new(RecordingInstaller::with_kernels(&["6.5.6-300.fc39.x86_64"]));
    let payload = Arc::new(PackagesPayload::new(
        Arc::new(fedora_resolver()),
        installer.clone(),
        PayloadConfig::default(),
    ));
    payload.set_packages_selection(selection);
    (payload, installer)
}

fn cdrom() -> Arc<Source> {
    Source::new(SourceType::Cdrom).into_shared()
}

// =============================================================================
// Source Set Tests
// =============================================================================

#[test]
fn test_sources_are_locked_while_set_up() {
    let (payload, _) = packages_payload(PackagesSelectionData::default());
    payload.sources().set_sources(vec![cdrom()]).unwrap();

    let mut lifecycle = PayloadLifecycle::new(payload.clone());
    lifecycle.set_up_sources().unwrap();

    let err = payload
        .sources()
        .set_sources(vec![Source::new(SourceType::Url).into_shared()])
        .unwrap_err();
    assert!(matches!(err, PayloadError::SourceSetup(_)));
    assert_eq!(
        payload.sources().sources()[0].source_type(),
        SourceType::Cdrom
    );

    lifecycle.tear_down().unwrap();
    payload
        .sources()
        .set_sources(vec![Source::new(SourceType::Url).into_shared()])
        .unwrap();
}

#[test]
fn test_incompatible_source_is_rejected() {
    let (payload, _) = packages_payload(PackagesSelectionData::default());
    payload.sources().set_sources(vec![cdrom()]).unwrap();

    let err = payload
        .sources()
        .set_sources(vec![Source::new(SourceType::LiveImage).into_shared()])
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Source type LIVE_IMAGE is not supported by this payload."
    );
    assert_eq!(payload.sources().len(), 1);
}

#[test]
fn test_new_sources_make_checks_stale() {
    let (payload, _) = packages_payload(PackagesSelectionData::default());
    let before = payload.tx_id();

    payload.sources().set_sources(vec![cdrom()]).unwrap();
    payload.sources().add_source(Source::new(SourceType::Url).into_shared()).unwrap();

    assert_eq!(payload.tx_id(), before + 2);
}

#[test]
fn test_setup_uses_the_sources_it_was_created_with() {
    let (payload, _) = packages_payload(PackagesSelectionData::default());
    let old = cdrom();
    payload.sources().set_sources(vec![old.clone()]).unwrap();

    let mut task = payload.set_up_sources_with_task();

    // Nothing is set up yet, so the list can still be replaced.
    let new = Source::new(SourceType::Nfs).into_shared();
    payload.sources().set_sources(vec![new.clone()]).unwrap();

    TaskRunner::new().run(task.as_mut()).unwrap();
    assert!(old.is_ready());
    assert_eq!(new.get_state(), SourceState::Unready);
}

#[test]
fn test_space_and_network_of_sources() {
    let (payload, _) = packages_payload(PackagesSelectionData::default());
    payload
        .sources()
        .set_sources(vec![
            Source::new(SourceType::HardDrive)
                .with_required_space(4096)
                .into_shared(),
            Source::new(SourceType::ClosestMirror).into_shared(),
        ])
        .unwrap();

    let lifecycle = PayloadLifecycle::new(payload);
    assert_eq!(lifecycle.required_space(), 4096);
    assert!(lifecycle.is_network_required());
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_packages_payload_lifecycle() {
    let (payload, installer) = packages_payload(PackagesSelectionData::new("minimal", &[]));
    let source = cdrom();
    payload.sources().set_sources(vec![source.clone()]).unwrap();
    assert!(!payload.is_ready());

    let mut lifecycle = PayloadLifecycle::new(payload.clone());
    assert!(matches!(
        lifecycle.kernel_version_list(),
        Err(PayloadError::UnavailableValue(_))
    ));

    lifecycle.set_up_sources().unwrap();
    assert!(source.is_ready());
    assert!(payload.is_ready());

    lifecycle.install().unwrap();
    assert_eq!(installer.transactions(), 1);
    assert_eq!(
        lifecycle.kernel_version_list().unwrap(),
        vec!["6.5.6-300.fc39.x86_64".to_string()]
    );

    lifecycle.post_install().unwrap();
    lifecycle.tear_down().unwrap();
    assert_eq!(source.get_state(), SourceState::Unready);

    assert_eq!(
        lifecycle.stage_history(),
        &[
            LifecycleStage::NotStarted,
            LifecycleStage::SourcesReady,
            LifecycleStage::Installed,
            LifecycleStage::PostInstalled,
            LifecycleStage::TornDown,
        ]
    );
}

#[test]
fn test_invalid_selection_fails_the_installation() {
    let (payload, installer) =
        packages_payload(PackagesSelectionData::new("workstation", &["office"]));
    payload.sources().set_sources(vec![cdrom()]).unwrap();

    let mut lifecycle = PayloadLifecycle::new(payload.clone());
    lifecycle.set_up_sources().unwrap();

    let err = lifecycle.install().unwrap_err();
    assert!(matches!(err, PayloadError::PayloadInstallation(_)));
    assert_eq!(installer.transactions(), 0);
    assert_eq!(lifecycle.current_stage(), LifecycleStage::Failed);
    assert_eq!(lifecycle.failed_at(), Some(LifecycleStage::Installed));

    // Only a teardown gets the payload out of a failure.
    assert!(matches!(
        lifecycle.install(),
        Err(PayloadError::LifecycleTransition(_))
    ));
    lifecycle.tear_down().unwrap();
    assert!(!payload.sources().sources()[0].is_ready());

    lifecycle.set_up_sources().unwrap();
    assert_eq!(lifecycle.current_stage(), LifecycleStage::SourcesReady);
}

#[test]
fn test_stages_cant_be_skipped() {
    let (payload, _) = packages_payload(PackagesSelectionData::new("minimal", &[]));
    let mut lifecycle = PayloadLifecycle::new(payload);

    let err = lifecycle.install().unwrap_err();
    assert_eq!(
        err.to_string(),
        "Lifecycle transition error: Cannot move from Not started to Payload installed"
    );
    assert_eq!(lifecycle.current_stage(), LifecycleStage::NotStarted);
}

#[test]
fn test_tear_down_is_idempotent() {
    let (payload, _) = packages_payload(PackagesSelectionData::default());
    let source = cdrom();
    payload.sources().set_sources(vec![source.clone()]).unwrap();

    let mut lifecycle = PayloadLifecycle::new(payload);
    lifecycle.set_up_sources().unwrap();

    lifecycle.tear_down().unwrap();
    lifecycle.tear_down().unwrap();
    assert_eq!(source.get_state(), SourceState::Unready);
    assert_eq!(lifecycle.current_stage(), LifecycleStage::TornDown);
}

// =============================================================================
// Background Setup Tests
// =============================================================================

#[test]
fn test_background_setup_with_timeout() {
    let (payload, _) = packages_payload(PackagesSelectionData::default());
    let (backend, gate) = GatedBackend::new();
    let source = Source::new(SourceType::Nfs)
        .with_backend(backend)
        .into_shared();
    payload.sources().set_sources(vec![source.clone()]).unwrap();

    let registry = TaskRegistry::new();
    let task = payload.sources().set_up_sources_with_task();
    let handle = registry.spawn(task, TaskRunner::new()).unwrap();

    // Waiting gives up, the setup goes on.
    assert!(!handle.wait(Some(Duration::from_millis(50))));
    assert!(registry.is_running("Set up installation sources"));

    let err = registry
        .spawn(payload.sources().set_up_sources_with_task(), TaskRunner::new())
        .err();
    assert!(matches!(err, Some(PayloadError::TaskAlreadyRunning(_))));

    gate.send(()).unwrap();
    assert!(handle.wait(None));
    handle.join().unwrap();

    assert!(registry.wait("Set up installation sources", Some(Duration::from_secs(5))));
    assert!(source.is_ready());
}

#[test]
fn test_background_setup_failure_is_returned() {
    let (payload, _) = packages_payload(PackagesSelectionData::default());
    let (backend, gate) = GatedBackend::new();
    let source = Source::new(SourceType::Nfs)
        .with_backend(backend)
        .into_shared();
    payload.sources().set_sources(vec![source.clone()]).unwrap();

    let registry = TaskRegistry::new();
    let handle = registry
        .spawn(payload.sources().set_up_sources_with_task(), TaskRunner::new())
        .unwrap();

    // Closing the gate makes the backend fail.
    drop(gate);

    let err = handle.join().unwrap_err();
    assert!(matches!(err, PayloadError::SourceSetup(_)));
    assert_eq!(source.get_state(), SourceState::Unready);
}
