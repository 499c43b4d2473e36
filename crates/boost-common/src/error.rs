use thiserror::Error;

/// Boost error types covering configuration, platform collaborators and worker setup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BoostError {
    /// A textual tunable update could not be parsed or was out of range.
    ///
    /// The configuration store is left unmodified when this is returned.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Cluster topology is missing or inconsistent. Fatal at startup.
    #[error("topology error: {0}")]
    Topology(String),

    /// The frequency policy of one CPU could not be read.
    #[error("cannot fetch policy for CPU{cpu}: {reason}")]
    PolicyFetch {
        /// CPU whose policy was requested.
        cpu: usize,
        /// Underlying failure.
        reason: String,
    },

    /// The scheduler boost collaborator rejected a request.
    #[error("scheduler boost request failed: {0}")]
    SchedulerBoost(String),

    /// A cluster worker thread could not be created.
    #[error("cannot create worker for cluster {cluster}: {reason}")]
    WorkerCreate {
        /// Cluster index.
        cluster: usize,
        /// Underlying failure.
        reason: String,
    },

    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O operation error.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Convenience type alias for boost operations.
pub type BoostResult<T> = Result<T, BoostError>;

impl BoostError {
    /// Build a [`BoostError::InvalidArgument`] from anything printable.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
