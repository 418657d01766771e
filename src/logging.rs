//! Logging setup.
//!
//! The bridge logs through `tracing` under the `hostbridge::*` targets.
//! Applications that already install a subscriber need nothing from here.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt};

use crate::BridgeConfig;

/// Install a global fmt subscriber.
///
/// `filter` takes precedence, then `HOSTBRIDGE_LOG`, then `warn`. Only the
/// first call has an effect.
pub fn init_logging(filter: Option<&str>) {
    static INITIALISED: OnceLock<()> = OnceLock::new();

    INITIALISED.get_or_init(|| {
        let filter = match filter {
            Some(directives) => EnvFilter::new(directives),
            None => EnvFilter::try_from_env("HOSTBRIDGE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        };
        let _ = fmt().with_env_filter(filter).with_target(true).try_init();
    });
}

/// Install logging for the debug categories enabled in `config`.
pub fn init_from_config(config: &BridgeConfig) {
    let directives = config.filter_directives();
    if directives.is_empty() {
        init_logging(None);
    } else {
        init_logging(Some(&format!("warn,{directives}")));
    }
}

/// Route logs to the test harness's captured output.
pub fn setup_test_logging(filter: &str) {
    let _ = fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}
