// ABOUTME: Integration tests for ConnectionFactory.
// ABOUTME: Identity loading, trust store discovery, unique ids and session minting.

mod support;

use sshexec::diagnostics::WarningKind;
use sshexec::ssh::{
    ConnectionFactory, ErrorKind, FactoryConfig, KNOWN_HOSTS_FILENAME, Target,
};
use std::collections::HashSet;
use std::sync::Arc;
use support::fake_transport::FakeTransport;
use support::{CORRUPT_KEY, PLAIN_KEY, PROTECTED_KEY, PROTECTED_PASSPHRASE, fixtures_dir};

fn config() -> FactoryConfig {
    FactoryConfig::new("tester")
        .ssh_dir(fixtures_dir())
        .identity(PLAIN_KEY)
}

fn factory(config: FactoryConfig) -> ConnectionFactory {
    ConnectionFactory::with_transport(config, FakeTransport::new().into_arc())
        .expect("factory should build")
}

#[test]
fn loads_default_identity_from_ssh_dir() {
    let factory = factory(config());

    assert_eq!(factory.identities().len(), 1);
    let loaded: Vec<_> = factory.identities().paths().collect();
    assert_eq!(loaded[0], fixtures_dir().join(PLAIN_KEY));
    assert!(!factory.identities().iter().next().unwrap().is_locked());
}

#[test]
fn loads_protected_identity_with_passphrase() {
    let factory = factory(
        config()
            .identity(PROTECTED_KEY)
            .passphrase(PROTECTED_PASSPHRASE),
    );

    assert_eq!(factory.identities().len(), 1);
    assert!(!factory.identities().iter().next().unwrap().is_locked());
}

#[test]
fn wrong_passphrase_is_auth_setup_error() {
    let result = ConnectionFactory::with_transport(
        config().identity(PROTECTED_KEY).passphrase("wrong"),
        FakeTransport::new().into_arc(),
    );

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthSetup, "got: {err:?}");
}

#[test]
fn protected_identity_without_passphrase_stays_locked() {
    let factory = factory(config().identity(PROTECTED_KEY));

    assert_eq!(factory.identities().len(), 1);
    assert!(factory.identities().iter().next().unwrap().is_locked());
}

#[test]
fn corrupt_identity_is_auth_setup_error() {
    let result = ConnectionFactory::with_transport(
        config().identity(CORRUPT_KEY),
        FakeTransport::new().into_arc(),
    );

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthSetup, "got: {err:?}");
    assert!(err.to_string().contains(CORRUPT_KEY));
}

#[test]
fn missing_identity_warns_then_fails() {
    let mut factory = factory(config());

    let err = factory
        .load_identity("does_not_exist", None)
        .map(|_| ())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AuthSetup);
    let warnings = factory.diagnostics().warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, WarningKind::MissingIdentity);
    assert!(warnings[0].message.contains("does_not_exist"));
    // The failed load must not have touched the trial set.
    assert_eq!(factory.identities().len(), 1);
}

#[test]
fn load_identity_appends_and_chains() {
    let mut factory = factory(config());

    factory
        .load_identity(PROTECTED_KEY, Some(PROTECTED_PASSPHRASE))
        .unwrap()
        .load_identity(fixtures_dir().join(PLAIN_KEY), None)
        .unwrap();

    let paths: Vec<_> = factory.identities().paths().collect();
    assert_eq!(paths.len(), 3);
    assert_eq!(paths[0], fixtures_dir().join(PLAIN_KEY));
    assert_eq!(paths[1], fixtures_dir().join(PROTECTED_KEY));
    assert_eq!(paths[2], fixtures_dir().join(PLAIN_KEY));
}

#[test]
fn load_discovered_identity_skips_missing_id_rsa() {
    let mut factory = factory(config());

    factory.load_discovered_identity().unwrap();

    assert_eq!(factory.identities().len(), 1);
    assert!(!factory.diagnostics().has_warnings());
}

#[test]
fn no_identity_config_starts_empty() {
    let factory = factory(config().no_identity());
    assert!(factory.identities().is_empty());
}

#[test]
fn trust_store_loaded_only_when_present() {
    let dir = tempfile::tempdir().unwrap();

    let without = factory(config().no_identity().ssh_dir(dir.path()));
    assert!(without.trust_store().is_none());

    let known_hosts = dir.path().join(KNOWN_HOSTS_FILENAME);
    std::fs::write(&known_hosts, "").unwrap();

    let with = factory(config().no_identity().ssh_dir(dir.path()));
    assert_eq!(with.trust_store().unwrap().path(), known_hosts);
}

#[test]
fn ids_are_unique_under_concurrent_construction() {
    let handles: Vec<_> = (0..32)
        .map(|_| {
            std::thread::spawn(|| {
                ConnectionFactory::with_transport(
                    FactoryConfig::new("tester")
                        .ssh_dir(fixtures_dir())
                        .no_identity(),
                    FakeTransport::new().into_arc(),
                )
                .unwrap()
                .id()
            })
        })
        .collect();

    let ids: HashSet<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(ids.len(), 32);
}

#[test]
fn debug_toggle_is_visible_through_factory() {
    let factory = factory(config());
    assert!(!factory.is_debug());

    factory.debug_on();
    assert!(factory.is_debug());

    factory.debug_off();
    assert!(!factory.is_debug());
}

#[test]
fn open_session_never_connects() {
    let transport = FakeTransport::new().unreachable();
    let recorder = transport.recorder();
    let factory = ConnectionFactory::with_transport(config(), Arc::new(transport)).unwrap();

    let session = factory.open_session("web1");
    let other = factory.open_session_as("web2", "deploy");

    assert_eq!(session.user(), "tester");
    assert_eq!(session.host(), "web1");
    assert_eq!(session.port(), 22);
    assert_eq!(other.user(), "deploy");
    assert!(!session.is_connected());
    assert_eq!(recorder.lock().connects, 0);
}

#[test]
fn open_target_fills_gaps_from_defaults() {
    let factory = factory(config().port(2222));

    let session = factory.open_target(&Target::parse("web1").unwrap());
    assert_eq!(session.user(), "tester");
    assert_eq!(session.port(), 2222);

    let session = factory.open_target(&Target::parse("deploy@web2:2200").unwrap());
    assert_eq!(session.user(), "deploy");
    assert_eq!(session.host(), "web2");
    assert_eq!(session.port(), 2200);
}

#[test]
fn session_id_names_user_host_and_factory() {
    let factory = factory(config());
    let session = factory.open_session_as("web1", "deploy");

    assert_eq!(session.id(), format!("deploy@web1#{}", factory.id()));
}
