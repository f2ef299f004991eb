//! Recording stand-in for a database node.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use couch_replication_bench::client::{
    DatabaseClient, DatabaseHandle, NodeEndpoint, ReplicateOptions,
};
use couch_replication_bench::error::ClientError;
use couch_replication_bench::progress::{Progress, RecordingProgress};
use couch_replication_bench::runner::{BenchmarkRunner, RunnerConfig};
use couch_replication_bench::workload::Document;

// =============================================================================
// Calls
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Create(String),
    /// `existed` is false when the destroy answered NotFound.
    Destroy { name: String, existed: bool },
    Insert { db: String, id: String },
    Bulk { db: String, count: usize },
    Replicate { db: String, target: String },
}

// =============================================================================
// Stub client
// =============================================================================

#[derive(Default)]
pub struct StubClient {
    pub calls: Mutex<Vec<Call>>,
    pub existing: Mutex<HashSet<String>>,
    pub inserts: AtomicUsize,
    /// 1-based insert call that fails with a connection error.
    pub fail_insert_on: Option<usize>,
    pub fail_create: Option<String>,
    pub unreachable: bool,
    pub replicate_delay: Option<Duration>,
}

impl StubClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_existing(names: &[&str]) -> Self {
        let stub = Self::new();
        stub.existing
            .lock()
            .unwrap()
            .extend(names.iter().map(|n| n.to_string()));
        stub
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn exists(&self, name: &str) -> bool {
        self.existing.lock().unwrap().contains(name)
    }

    pub fn creates(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Destroys that removed an existing database.
    pub fn teardowns(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Destroy {
                    name,
                    existed: true,
                } => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn inserts_into(&self, db: &str) -> usize {
        self.calls()
            .iter()
            .map(|c| match c {
                Call::Insert { db: d, .. } if d == db => 1,
                Call::Bulk { db: d, count } if d == db => *count,
                _ => 0,
            })
            .sum()
    }

    pub fn replications(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Replicate { .. }))
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_reachable(&self) -> Result<(), ClientError> {
        if self.unreachable {
            Err(ClientError::Connection("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DatabaseClient for StubClient {
    async fn create_database(&self, name: &str) -> Result<DatabaseHandle, ClientError> {
        self.check_reachable()?;
        self.record(Call::Create(name.to_string()));
        if self.fail_create.as_deref() == Some(name) {
            return Err(ClientError::UnexpectedStatus {
                operation: "create database",
                status: 500,
                body: "disk full".into(),
            });
        }
        if !self.existing.lock().unwrap().insert(name.to_string()) {
            return Err(ClientError::AlreadyExists(name.to_string()));
        }
        Ok(DatabaseHandle::new(name))
    }

    async fn destroy_database(&self, name: &str) -> Result<(), ClientError> {
        self.check_reachable()?;
        let existed = self.existing.lock().unwrap().remove(name);
        self.record(Call::Destroy {
            name: name.to_string(),
            existed,
        });
        if existed {
            Ok(())
        } else {
            Err(ClientError::NotFound(name.to_string()))
        }
    }

    async fn insert_document(
        &self,
        db: &DatabaseHandle,
        _document: &Document,
        id: &str,
    ) -> Result<(), ClientError> {
        let n = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_insert_on == Some(n) {
            return Err(ClientError::Connection("reset by peer".into()));
        }
        self.record(Call::Insert {
            db: db.name.clone(),
            id: id.to_string(),
        });
        Ok(())
    }

    async fn bulk_insert(
        &self,
        db: &DatabaseHandle,
        documents: &[(String, Document)],
    ) -> Result<(), ClientError> {
        self.record(Call::Bulk {
            db: db.name.clone(),
            count: documents.len(),
        });
        Ok(())
    }

    async fn replicate(
        &self,
        source: &DatabaseHandle,
        target_url: &str,
        options: ReplicateOptions,
    ) -> Result<(), ClientError> {
        assert!(options.create_target);
        if let Some(delay) = self.replicate_delay {
            tokio::time::sleep(delay).await;
        }
        self.record(Call::Replicate {
            db: source.name.clone(),
            target: target_url.to_string(),
        });
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn runner_config() -> RunnerConfig {
    RunnerConfig::new(NodeEndpoint::new("http://db2:5984"))
}

pub fn runner(
    source: Arc<StubClient>,
    progress: Arc<RecordingProgress>,
    config: RunnerConfig,
) -> BenchmarkRunner {
    let progress: Arc<dyn Progress> = progress;
    BenchmarkRunner::new(source, progress, config)
}
