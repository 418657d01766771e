//! Errors raised while setting up a bridge.
//!
//! Call-time failures are [`BridgeError`](hostbridge_core::BridgeError)s
//! and registration failures are
//! [`RegistrationError`](hostbridge_registry::RegistrationError)s.

use hostbridge_dispatch::DispatchError;
use thiserror::Error;

use crate::ConfigError;

/// Failure to create a [`Bridge`](crate::Bridge).
#[derive(Debug, Error)]
pub enum InitError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot start workers: {0}")]
    Dispatch(#[from] DispatchError),
}
