//! Bridge lifecycle scenarios against a recording mock engine.
//!
//! The mock stands in for the external container engine so the create /
//! run / remove state machine, its atomicity, and its liveness guard can
//! be exercised without a daemon.

mod common;

use common::hello_deb;
use debridge::host::{DisplayServer, Host, TimezoneSource};
use debridge::{
    container_name, Bridge, BridgeEntry, ContainerEngine, CreateRequest, Error, IntegrationFlags,
    Registry, ResourceGrant, RunInvocation,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// =============================================================================
// Mock Engine
// =============================================================================

type BuildHook = Box<dyn FnMut() + Send>;

#[derive(Default)]
struct MockEngine {
    fail_build: bool,
    built_tags: Mutex<Vec<String>>,
    removed_images: Mutex<Vec<String>>,
    run_invocations: Mutex<Vec<RunInvocation>>,
    running: Mutex<HashSet<String>>,
    build_hook: Mutex<Option<BuildHook>>,
}

impl MockEngine {
    fn failing_build() -> Self {
        Self {
            fail_build: true,
            ..Default::default()
        }
    }

    fn mark_running(&self, container: &str) {
        self.running.lock().unwrap().insert(container.to_string());
    }

    fn mark_stopped(&self, container: &str) {
        self.running.lock().unwrap().remove(container);
    }
}

impl ContainerEngine for MockEngine {
    fn build_image(&self, _context: &Path, tag: &str) -> debridge::Result<String> {
        if let Some(hook) = self.build_hook.lock().unwrap().as_mut() {
            hook();
        }
        if self.fail_build {
            return Err(Error::EngineFailure {
                operation: "build".into(),
                message: "simulated build failure".into(),
            });
        }
        self.built_tags.lock().unwrap().push(tag.to_string());
        Ok(format!("sha256:mock-{}", tag.replace('/', "-")))
    }

    fn run(&self, invocation: &RunInvocation) -> debridge::Result<i32> {
        self.run_invocations.lock().unwrap().push(invocation.clone());
        Ok(0)
    }

    fn remove_image(&self, image: &str) -> debridge::Result<()> {
        self.removed_images.lock().unwrap().push(image.to_string());
        Ok(())
    }

    fn is_running(&self, container: &str) -> debridge::Result<bool> {
        Ok(self.running.lock().unwrap().contains(container))
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn registry_at(temp: &TempDir) -> Registry {
    Registry::open(temp.path().join("registry")).unwrap()
}

fn desktop_host() -> Host {
    Host {
        display: Some(DisplayServer::X11 {
            socket_dir: PathBuf::from("/tmp/.X11-unix"),
            display: ":0".into(),
        }),
        audio_devices: vec![PathBuf::from("/dev/snd/controlC0")],
        home_dir: Some(PathBuf::from("/home/user")),
        session_bus: Some(PathBuf::from("/run/user/1000/bus")),
        timezone: TimezoneSource::File(PathBuf::from("/etc/localtime")),
        extra_devices: Vec::new(),
    }
}

fn plain_request(archive: PathBuf) -> CreateRequest {
    CreateRequest {
        archive,
        ..Default::default()
    }
}

// =============================================================================
// Scenario B: full lifecycle
// =============================================================================

#[test]
fn full_lifecycle_create_list_run_remove() {
    let temp = TempDir::new().unwrap();
    let deb = hello_deb(temp.path());
    let engine = Arc::new(MockEngine::default());
    let bridge = Bridge::new(registry_at(&temp), Arc::clone(&engine), Host::empty());

    // create (no flags) succeeds and registers exactly one program
    let entry = bridge.create(&plain_request(deb)).unwrap();
    assert_eq!(entry.name, "hello");

    let names: Vec<_> = bridge.list().unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["hello"]);

    // run succeeds with the stored image and default command
    let exit = bridge.run("hello").unwrap();
    assert_eq!(exit, 0);
    let runs = engine.run_invocations.lock().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].image, entry.image);
    assert_eq!(runs[0].command, "hello");
    assert_eq!(runs[0].container_name, container_name("hello"));
    assert!(runs[0].grants.is_empty());
    drop(runs);

    // remove while running is rejected, and the entry survives
    engine.mark_running(&container_name("hello"));
    assert!(matches!(bridge.remove("hello"), Err(Error::InUse(_))));
    assert_eq!(bridge.list().unwrap().len(), 1);

    // once the process exits the same remove succeeds
    engine.mark_stopped(&container_name("hello"));
    bridge.remove("hello").unwrap();
    assert_eq!(
        *engine.removed_images.lock().unwrap(),
        vec![entry.image.clone()]
    );
    assert!(bridge.list().unwrap().is_empty());
}

// =============================================================================
// Atomicity
// =============================================================================

#[test]
fn failed_build_leaves_no_registry_entry() {
    let temp = TempDir::new().unwrap();
    let deb = hello_deb(temp.path());
    let engine = Arc::new(MockEngine::failing_build());
    let bridge = Bridge::new(registry_at(&temp), Arc::clone(&engine), Host::empty());

    let err = bridge.create(&plain_request(deb)).unwrap_err();
    assert!(matches!(err, Error::EngineFailure { .. }));

    assert!(bridge.list().unwrap().is_empty());
    // A second handle on the same backing file observes nothing either.
    assert!(registry_at(&temp).list().unwrap().is_empty());
}

#[test]
fn insert_race_after_build_releases_the_image() {
    let temp = TempDir::new().unwrap();
    let deb = hello_deb(temp.path());
    let engine = Arc::new(MockEngine::default());

    // A rival process inserts the same name between our build and our
    // insert; the hook simulates it through a second registry handle.
    let rival_registry = registry_at(&temp);
    *engine.build_hook.lock().unwrap() = Some(Box::new(move || {
        rival_registry
            .insert(BridgeEntry {
                name: "hello".into(),
                image: "sha256:rival".into(),
                flags: IntegrationFlags::default(),
                custom_command: None,
                desktop_icon: None,
                created_at: chrono::Utc::now(),
            })
            .unwrap();
    }));

    let bridge = Bridge::new(registry_at(&temp), Arc::clone(&engine), Host::empty());
    let err = bridge.create(&plain_request(deb)).unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));

    // Our freshly built image was rolled back; the rival entry stands.
    let removed = engine.removed_images.lock().unwrap();
    assert_eq!(removed.len(), 1);
    assert!(removed[0].starts_with("sha256:mock-"));
    drop(removed);
    assert_eq!(bridge.list().unwrap()[0].image, "sha256:rival");
}

// =============================================================================
// Uniqueness
// =============================================================================

#[test]
fn duplicate_create_fails_and_preserves_the_first_entry() {
    let temp = TempDir::new().unwrap();
    let deb = hello_deb(temp.path());
    let engine = Arc::new(MockEngine::default());
    let bridge = Bridge::new(registry_at(&temp), Arc::clone(&engine), Host::empty());

    let mut first = plain_request(deb.clone());
    first.custom_command = Some("hello --first".into());
    bridge.create(&first).unwrap();

    let mut second = plain_request(deb);
    second.custom_command = Some("hello --second".into());
    assert!(matches!(
        bridge.create(&second),
        Err(Error::AlreadyExists(_))
    ));

    // The collision is caught before a second build is attempted.
    assert_eq!(engine.built_tags.lock().unwrap().len(), 1);

    let entries = bridge.list().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].custom_command.as_deref(), Some("hello --first"));
}

// =============================================================================
// Scenario A: unavailable resource at create time
// =============================================================================

#[test]
fn create_with_unavailable_audio_fails_before_building() {
    let temp = TempDir::new().unwrap();
    let deb = hello_deb(temp.path());
    let engine = Arc::new(MockEngine::default());

    let mut host = desktop_host();
    host.audio_devices.clear();
    let bridge = Bridge::new(registry_at(&temp), Arc::clone(&engine), host);

    let mut request = plain_request(deb);
    request.flags = IntegrationFlags {
        display: true,
        sound: true,
        ..Default::default()
    };

    match bridge.create(&request).unwrap_err() {
        Error::ResourceUnavailable { category, .. } => assert_eq!(category, "sound"),
        other => panic!("unexpected error: {other}"),
    }

    assert!(bridge.list().unwrap().is_empty());
    assert!(
        engine.built_tags.lock().unwrap().is_empty(),
        "resolution must fail before the build is attempted"
    );
}

// =============================================================================
// Run semantics
// =============================================================================

#[test]
fn run_unknown_program_is_not_installed() {
    let temp = TempDir::new().unwrap();
    let bridge = Bridge::new(
        registry_at(&temp),
        Arc::new(MockEngine::default()),
        Host::empty(),
    );
    assert!(matches!(bridge.run("ghost"), Err(Error::NotInstalled(_))));
}

#[test]
fn run_resolves_grants_from_the_current_host_not_create_time() {
    let temp = TempDir::new().unwrap();
    let deb = hello_deb(temp.path());
    let engine = Arc::new(MockEngine::default());

    // Created on a host where /etc/localtime exists.
    let bridge = Bridge::new(registry_at(&temp), Arc::clone(&engine), desktop_host());
    let mut request = plain_request(deb);
    request.flags = IntegrationFlags {
        timezone: true,
        ..Default::default()
    };
    bridge.create(&request).unwrap();

    // Later invocation on a drifted host: only the TZ variable remains.
    let mut drifted = desktop_host();
    drifted.timezone = TimezoneSource::Env("UTC".into());
    let later = Bridge::new(registry_at(&temp), Arc::clone(&engine), drifted);
    later.run("hello").unwrap();

    let runs = engine.run_invocations.lock().unwrap();
    assert_eq!(
        runs[0].grants,
        vec![ResourceGrant::EnvVar {
            key: "TZ".into(),
            value: "UTC".into()
        }]
    );
}

#[test]
fn run_fails_when_a_recorded_flag_became_unsatisfiable() {
    let temp = TempDir::new().unwrap();
    let deb = hello_deb(temp.path());
    let engine = Arc::new(MockEngine::default());

    let bridge = Bridge::new(registry_at(&temp), Arc::clone(&engine), desktop_host());
    let mut request = plain_request(deb);
    request.flags = IntegrationFlags {
        display: true,
        ..Default::default()
    };
    bridge.create(&request).unwrap();

    // Headless later: the display grant can no longer be satisfied.
    let mut headless = desktop_host();
    headless.display = None;
    let later = Bridge::new(registry_at(&temp), Arc::clone(&engine), headless);
    assert!(matches!(
        later.run("hello"),
        Err(Error::ResourceUnavailable { .. })
    ));
}

// =============================================================================
// Remove semantics
// =============================================================================

#[test]
fn remove_unknown_program_is_not_installed() {
    let temp = TempDir::new().unwrap();
    let bridge = Bridge::new(
        registry_at(&temp),
        Arc::new(MockEngine::default()),
        Host::empty(),
    );
    assert!(matches!(
        bridge.remove("ghost"),
        Err(Error::NotInstalled(_))
    ));
}

// =============================================================================
// Probing
// =============================================================================

#[test]
fn probe_ignores_the_registry_entirely() {
    let temp = TempDir::new().unwrap();
    let deb = hello_deb(temp.path());
    let engine = Arc::new(MockEngine::default());
    let bridge = Bridge::new(registry_at(&temp), Arc::clone(&engine), Host::empty());

    let before = bridge.probe();
    bridge.create(&plain_request(deb)).unwrap();
    let after = bridge.probe();

    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(after.iter()) {
        assert_eq!(a.available, b.available);
    }
}
