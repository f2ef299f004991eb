//! One trial: provision, insert, replicate, tear down.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::client::{DatabaseClient, DatabaseHandle, NodeEndpoint, ReplicateOptions};
use crate::error::{BenchError, ClientError};
use crate::harness::{attempt, best_effort, measure};
use crate::progress::Progress;
use crate::schema::{PhaseTiming, TrialParameters, TrialResult};
use crate::workload::{build_document, insert_batch, Document};
use crate::InsertMode;

#[derive(Clone, Debug)]
pub struct RunnerConfig {
    pub insert_mode: InsertMode,
    /// Target databases are named `{database_prefix}{i}`.
    pub database_prefix: String,
    pub id_prefix: String,
    /// The peer node as reached from the source node.
    pub replication_target: NodeEndpoint,
    /// Also time a single database holding `docs * dbs` documents.
    pub baseline: bool,
    pub baseline_database: String,
}

impl RunnerConfig {
    pub fn new(replication_target: NodeEndpoint) -> Self {
        Self {
            insert_mode: InsertMode::Sequential,
            database_prefix: "db".to_string(),
            id_prefix: String::new(),
            replication_target,
            baseline: false,
            baseline_database: "single".to_string(),
        }
    }

    pub fn database_names(&self, dbs: u64) -> Vec<String> {
        (0..dbs)
            .map(|d| format!("{}{d}", self.database_prefix))
            .collect()
    }
}

pub struct BenchmarkRunner {
    source: Arc<dyn DatabaseClient>,
    peer: Option<Arc<dyn DatabaseClient>>,
    progress: Arc<dyn Progress>,
    config: RunnerConfig,
    template: Document,
}

impl BenchmarkRunner {
    pub fn new(
        source: Arc<dyn DatabaseClient>,
        progress: Arc<dyn Progress>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            source,
            peer: None,
            progress,
            config,
            template: build_document(),
        }
    }

    /// Administer replicas on the peer as well: they are cleared before a
    /// trial and dropped after it.
    pub fn with_peer(mut self, peer: Arc<dyn DatabaseClient>) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn progress(&self) -> &dyn Progress {
        self.progress.as_ref()
    }

    /// Runs one trial for `params`. Steps are strictly sequential.
    pub async fn run(
        &self,
        params: TrialParameters,
        repetition: u32,
    ) -> Result<TrialResult, BenchError> {
        self.run_with_deadline(params, repetition, None).await
    }

    /// Like [`run`](Self::run), but provisioning and the timed phases must
    /// finish within `limit` of the trial start. Teardown is outside the
    /// deadline: databases created before it expired are still destroyed.
    pub async fn run_with_deadline(
        &self,
        params: TrialParameters,
        repetition: u32,
        limit: Option<Duration>,
    ) -> Result<TrialResult, BenchError> {
        let deadline = limit.map(|limit| (Instant::now() + limit, limit));
        let progress = self.progress.as_ref();
        progress.info("----------------------------------------");
        progress.info(&format!(
            "Running benchmark with {} docs and {} dbs (repetition {repetition})",
            params.docs, params.dbs
        ));

        let single = if self.config.baseline {
            let names = vec![self.config.baseline_database.clone()];
            let total = params.docs.saturating_mul(params.dbs);
            Some(self.cycle(&names, total, deadline).await?)
        } else {
            None
        };

        let names = self.config.database_names(params.dbs);
        let timing = self.cycle(&names, params.docs, deadline).await?;

        progress.info(&format!(
            "Finished benchmark with {} docs and {} dbs",
            params.docs, params.dbs
        ));

        let mut result = TrialResult::new(params, repetition, timing);
        result.single = single;
        Ok(result)
    }

    async fn cycle(
        &self,
        names: &[String],
        docs: u64,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<PhaseTiming, BenchError> {
        let mut created = Vec::with_capacity(names.len());
        let work = async {
            self.provision(names, &mut created).await?;
            self.phases(&created, docs).await
        };
        let outcome = match deadline {
            Some((at, limit)) => tokio::time::timeout_at(at, work)
                .await
                .unwrap_or(Err(BenchError::Timeout(limit))),
            None => work.await,
        };
        self.teardown(&created).await;
        outcome
    }

    async fn provision(
        &self,
        names: &[String],
        created: &mut Vec<DatabaseHandle>,
    ) -> Result<(), BenchError> {
        let progress = self.progress.as_ref();
        for name in names {
            let provision_err = |source| BenchError::Provision {
                name: name.clone(),
                source,
            };

            attempt(
                progress,
                ClientError::is_not_found,
                Some(format!("{name} (source) not destroyed").as_str()),
                self.source.destroy_database(name),
            )
            .await
            .map_err(provision_err)?;

            if let Some(peer) = &self.peer {
                attempt(
                    progress,
                    ClientError::is_not_found,
                    Some(format!("{name} (peer) not destroyed").as_str()),
                    peer.destroy_database(name),
                )
                .await
                .map_err(provision_err)?;
            }

            let handle = self
                .source
                .create_database(name)
                .await
                .map_err(provision_err)?;
            created.push(handle);
        }
        Ok(())
    }

    async fn phases(&self, dbs: &[DatabaseHandle], docs: u64) -> Result<PhaseTiming, BenchError> {
        let progress = self.progress.as_ref();
        let count = dbs.len();

        let insert_start = format!("Insert {docs} docs into {count} DBs");
        let insert_end = "Finished inserts.";
        let insert = measure(progress, Some(insert_start.as_str()), Some(insert_end), async {
            for db in dbs {
                insert_batch(
                    self.source.as_ref(),
                    db,
                    &self.template,
                    docs,
                    &self.config.id_prefix,
                    self.config.insert_mode,
                )
                .await
                .map_err(|source| BenchError::Insert {
                    database: db.name.clone(),
                    source,
                })?;
            }
            Ok::<(), BenchError>(())
        })
        .await?;

        let sync_start = format!("Sync {docs} docs from {count} DBs");
        let sync_end = "Finished sync.";
        let sync = measure(progress, Some(sync_start.as_str()), Some(sync_end), async {
            for db in dbs {
                let sync_err = |source| BenchError::Sync {
                    database: db.name.clone(),
                    source,
                };
                let target = self
                    .config
                    .replication_target
                    .database_url(&db.name)
                    .map_err(sync_err)?;
                self.source
                    .replicate(db, &target, ReplicateOptions { create_target: true })
                    .await
                    .map_err(sync_err)?;
            }
            Ok::<(), BenchError>(())
        })
        .await?;

        Ok(PhaseTiming { insert, sync })
    }

    async fn teardown(&self, dbs: &[DatabaseHandle]) {
        let progress = self.progress.as_ref();
        for db in dbs {
            best_effort(
                progress,
                &format!("{} (source) not torn down", db.name),
                self.source.destroy_database(&db.name),
            )
            .await;

            if let Some(peer) = &self.peer {
                best_effort(
                    progress,
                    &format!("{} (peer) not torn down", db.name),
                    peer.destroy_database(&db.name),
                )
                .await;
            }
        }
    }
}
