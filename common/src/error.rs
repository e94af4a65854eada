//! Cluster-wide error taxonomy (spec §7) and the logging macro every
//! handler boundary funnels errors through.

use std::panic::Location;

use tracing::error;

/// One kind per row of the spec §7 error taxonomy table. Kept flat rather
/// than nested per-subsystem so that every HTTP handler can map a single
/// type to a status code without matching through several layers.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("bucket does not exist: {0}")]
    BucketDoesNotExist(String),

    #[error("remote bucket does not exist: {0}")]
    RemoteBucketDoesNotExist(String),

    /// Received metadata version <= current. Recoverable: log and keep
    /// the current snapshot.
    #[error("downgrade: received version {received} <= current version {current}")]
    Downgrade { current: u64, received: u64 },

    #[error("bad checksum: expected {expected}, got {actual}")]
    BadChecksum { expected: String, actual: String },

    #[error("aborted: {0}")]
    Aborted(String),

    /// Out of space. Triggers LRU kick-off in the caller.
    #[error("out of space on mountpath {0}")]
    Oos(String),

    /// Reached a non-primary proxy that cannot forward.
    #[error("not primary; forward to {primary_url}")]
    NotPrimary { primary_url: String },

    /// Soft EC-validation error; degrades unless `force=false`.
    #[error("not enough targets: need {needed}, have {have}")]
    NotEnoughTargets { needed: usize, have: usize },

    /// A `Range` header this target cannot serve (multi-range, or a
    /// start/end outside the object's bytes).
    #[error("range not satisfiable: {0}")]
    RangeNotSatisfiable(String),

    #[error("shutting down")]
    Shutdown,

    #[error("transaction {0} not found")]
    TxnNotFound(String),

    #[error("transaction {0} already has an outstanding begin")]
    TxnConflict(String),

    #[error("cluster-integrity-error cie#{code}: {message}")]
    ClusterIntegrity { code: u32, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ClusterError {
    /// HTTP status mapping per spec §7 "Propagation policy".
    pub fn status_code(&self) -> u16 {
        match self {
            ClusterError::NotFound(_) => 404,
            ClusterError::TxnNotFound(_) => 404,
            ClusterError::AlreadyExists(_) => 409,
            ClusterError::BucketDoesNotExist(_) => 404,
            ClusterError::RemoteBucketDoesNotExist(_) => 404,
            ClusterError::Downgrade { .. } => 200, // recovered, logged only
            ClusterError::BadChecksum { .. } => 500,
            ClusterError::Aborted(_) => 499,
            ClusterError::Oos(_) => 507,
            ClusterError::NotPrimary { .. } => 503,
            ClusterError::NotEnoughTargets { .. } => 507,
            ClusterError::RangeNotSatisfiable(_) => 416,
            ClusterError::Shutdown => 503,
            ClusterError::TxnConflict(_) => 409,
            ClusterError::ClusterIntegrity { .. } => 500,
            ClusterError::Io(_) => 500,
            ClusterError::Internal(_) => 500,
        }
    }

    /// Locally-recovered errors never bubble up as a failed response; the
    /// caller logs and continues. See spec §7 "Propagation policy".
    pub fn is_locally_recovered(&self) -> bool {
        matches!(self, ClusterError::Downgrade { .. } | ClusterError::Aborted(_))
    }
}

#[inline]
#[track_caller]
pub fn log(source: &dyn std::error::Error) {
    let location = Location::caller();
    let span_trace = tracing_error::SpanTrace::capture();

    error!(
        target: "store_core",
        %location,
        error = %source,
        "span trace:\n{span_trace}"
    );
}

/// Logs and converts any `Result<T, E: Into<ClusterError>>` at a handler
/// boundary, same shape as the teacher's `try_!`.
#[macro_export]
macro_rules! try_cluster {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(err) => {
                let cluster_err: $crate::error::ClusterError = err.into();
                $crate::error::log(&cluster_err);
                return Err(cluster_err);
            }
        }
    };
}

pub type ClusterResult<T> = std::result::Result<T, ClusterError>;
