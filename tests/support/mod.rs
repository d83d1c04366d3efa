// ABOUTME: Test support utilities.
// ABOUTME: Provides fixture paths, tracing setup and a scripted fake transport.

use std::path::PathBuf;
use std::sync::Once;

// Each test binary only uses some of these modules, so allow dead_code.
#[allow(dead_code)]
pub mod fake_transport;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("sshexec=debug".parse().unwrap())
            .add_directive("russh=info".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Directory containing the test keys.
#[allow(dead_code)]
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Unencrypted ed25519 key, comment "sshexec-test".
#[allow(dead_code)]
pub const PLAIN_KEY: &str = "id_ed25519";

/// ed25519 key encrypted with [`PROTECTED_PASSPHRASE`], comment "sshexec-test-protected".
#[allow(dead_code)]
pub const PROTECTED_KEY: &str = "id_ed25519_protected";

#[allow(dead_code)]
pub const PROTECTED_PASSPHRASE: &str = "correct horse";

/// Not a parsable private key.
#[allow(dead_code)]
pub const CORRUPT_KEY: &str = "corrupt_key";
