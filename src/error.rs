// src/error.rs

//! Error types for catalog synchronization and resolution

use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the registry client, entity codec, cache and resolver
#[derive(Error, Debug)]
pub enum Error {
    /// Could not establish a connection to a catalog registry
    #[error("GRPC connection failed: {0}")]
    Connection(String),

    /// The registry connection did not become ready in time
    #[error("GRPC timeout: {address} timed out waiting for ready state, {timeout:?}")]
    Timeout {
        address: String,
        timeout: std::time::Duration,
    },

    /// A registry RPC failed
    #[error("{0}")]
    Rpc(String),

    /// Proxy configuration could not be used
    #[error("proxy error: {0}")]
    Proxy(String),

    /// A required property is missing from an entity
    #[error("error determining {context} for entity '{entity}': required property '{key}' not found")]
    PropertyNotFound {
        entity: String,
        key: String,
        context: &'static str,
    },

    /// A property value is not valid JSON for its type
    #[error(
        "error determining {context} for entity '{entity}': property '{key}' ('{value}') could not be parsed: {reason}"
    )]
    PropertyParse {
        entity: String,
        key: String,
        value: String,
        context: &'static str,
        reason: String,
    },

    /// A bundle version is not valid semantic version syntax
    #[error("could not parse semver ({version}) for entity '{entity}': {reason}")]
    InvalidVersion {
        entity: String,
        version: String,
        reason: String,
    },

    /// A version range could not be parsed
    #[error("invalid version range '{range}': {reason}")]
    InvalidVersionRange { range: String, reason: String },

    /// A bundle could not be converted into an entity
    #[error("failed to parse properties for bundle {bundle} in {source_id}: {reason}")]
    Conversion {
        bundle: String,
        source_id: String,
        reason: String,
    },

    /// Resolution failed (unknown package, duplicate requirement, unsatisfiable constraints)
    #[error("{0}")]
    Resolution(String),

    /// More than one bundle was selected for the same package
    #[error("package '{package}' resolved to multiple bundles: {}", .bundles.join(", "))]
    AmbiguousSelection {
        package: String,
        bundles: Vec<String>,
    },

    /// The cache was stopped and cannot be started again
    #[error("entity cache has been stopped")]
    CacheStopped,

    /// The cache is already running
    #[error("entity cache is already running")]
    CacheRunning,

    /// A registration or install-request store operation failed
    #[error("store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Several independent failures
    #[error("{}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", "))]
    Aggregate(Vec<Error>),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Collapse a list of errors into one, or `None` when the list is empty
    pub fn aggregate(mut errors: Vec<Error>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Aggregate(errors)),
        }
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        Self::Rpc(format!("rpc error: code = {:?} desc = {}", status.code(), status.message()))
    }
}
