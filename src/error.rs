//! Error taxonomy for the adapter.
//!
//! Each variant maps to one of the recovery strategies in the error
//! handling design: local skip-and-continue (`XpathError`), backoff-and-retry
//! (`DialError`), or fatal-before-any-device-is-touched (`ConfigError`).

use thiserror::Error;

/// Raised by [`crate::path::xpath_to_gnmi`] on a malformed xpath component.
/// Callers log and skip the offending xpath; they never propagate this past
/// session startup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum XpathError {
    #[error("xpath is empty or bare '/'")]
    Empty,
    #[error("xpath component {0:?} did not match the path-component grammar")]
    MalformedComponent(String),
}

/// Raised during the DIALING/CAPS_CHECK/SUBSCRIBING transitions of a
/// session. Recovery is always "log, back off, retry" unless shutdown was
/// requested.
#[derive(Debug, Error)]
pub enum DialError {
    #[error("failed to connect to {device}:{port}: {source}")]
    Connect {
        device: String,
        port: u16,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("capabilities RPC failed: {0}")]
    Capabilities(#[source] tonic::Status),
    #[error("device does not support required data model {0:?}")]
    MissingDataModel(String),
    #[error("subscribe RPC failed: {0}")]
    Subscribe(#[source] tonic::Status),
}

/// Raised while loading and validating the YAML configuration file. Any
/// variant here is fatal: the process exits with code 1 before any device
/// is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file as YAML: {0}")]
    Parse(#[source] serde_yaml::Error),
    #[error("config file is missing required key 'global'")]
    MissingGlobal,
    #[error("config file is missing required key 'devices', or it is empty")]
    MissingDevices,
}
