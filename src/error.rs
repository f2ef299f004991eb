use std::io;
use std::time::Duration;

use crate::schema::SweepOutcome;

/// Failures reported by a [`DatabaseClient`](crate::client::DatabaseClient).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("database `{0}` already exists")]
    AlreadyExists(String),

    #[error("database `{0}` does not exist")]
    NotFound(String),

    #[error("document `{id}` conflicts with an existing revision in `{database}`")]
    Conflict { database: String, id: String },

    #[error("bulk insert into `{database}` rejected {rejected} of {total} documents")]
    PartialFailure {
        database: String,
        rejected: usize,
        total: usize,
    },

    #[error("replication of `{database}` failed: {reason}")]
    Replication { database: String, reason: String },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("unexpected HTTP {status} during {operation}: {body}")]
    UnexpectedStatus {
        operation: &'static str,
        status: u16,
        body: String,
    },
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

/// Errors that end a trial (and, under the abort policy, the sweep).
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("failed to provision database `{name}`")]
    Provision {
        name: String,
        #[source]
        source: ClientError,
    },

    #[error("insert into `{database}` failed")]
    Insert {
        database: String,
        #[source]
        source: ClientError,
    },

    #[error("replication of `{database}` failed")]
    Sync {
        database: String,
        #[source]
        source: ClientError,
    },

    #[error("trial exceeded its deadline of {0:?}")]
    Timeout(Duration),

    #[error("invalid sweep configuration: {0}")]
    Config(String),
}

impl BenchError {
    /// Short, stable label recorded with failed grid points.
    pub fn kind(&self) -> &'static str {
        match self {
            BenchError::Provision { .. } => "provision",
            BenchError::Insert { .. } => "insert",
            BenchError::Sync { .. } => "sync",
            BenchError::Timeout(_) => "timeout",
            BenchError::Config(_) => "config",
        }
    }
}

/// Why a sweep stopped before covering its grid.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error(transparent)]
    Invalid(BenchError),

    #[error("sweep aborted at {docs} docs / {dbs} dbs (repetition {repetition})")]
    Aborted {
        docs: u64,
        dbs: u64,
        repetition: u32,
        #[source]
        source: BenchError,
        /// Everything recorded before the failure.
        outcome: Box<SweepOutcome>,
    },
}

impl SweepError {
    pub fn partial(&self) -> Option<&SweepOutcome> {
        match self {
            SweepError::Invalid(_) => None,
            SweepError::Aborted { outcome, .. } => Some(outcome.as_ref()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("i/o error while exporting results: {0}")]
    Io(#[from] io::Error),

    #[error("failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to move results into place: {0}")]
    Persist(#[from] tempfile::PersistError),
}
