use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use couch_replication_bench::client::{CouchClient, DatabaseClient, NodeEndpoint};
use couch_replication_bench::export::ResultExporter;
use couch_replication_bench::progress::{Progress, TracingProgress};
use couch_replication_bench::runner::{BenchmarkRunner, RunnerConfig};
use couch_replication_bench::schema::{RunMeta, SweepOutcome};
use couch_replication_bench::sweep::{
    Axis, DocsDerivation, FailurePolicy, SweepConfig, SweepController,
};
use couch_replication_bench::InsertMode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "couch-replication-bench")]
#[command(about = "Time bulk inserts and replication between two CouchDB nodes (JSON output)")]
struct Args {
    /// Node that receives the inserts and acts as replication source.
    #[arg(long, default_value = "http://localhost:5984")]
    source_url: String,

    /// Peer node as reached from this machine; used to clear replicas.
    #[arg(long, default_value = "http://localhost:5985")]
    peer_url: String,

    /// Peer node as reached from the source node, e.g. a container hostname.
    /// Defaults to --peer-url.
    #[arg(long)]
    peer_replication_url: Option<String>,

    /// Source node as reached from itself. Defaults to --source-url.
    #[arg(long)]
    source_replication_url: Option<String>,

    #[arg(long, env = "COUCHDB_USER")]
    username: Option<String>,

    #[arg(long, env = "COUCHDB_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[arg(long, default_value_t = 1)]
    dbs_start: u64,

    #[arg(long, default_value_t = 8)]
    dbs_bound: u64,

    #[arg(long, default_value_t = 2)]
    dbs_factor: u64,

    #[arg(long, default_value_t = 100)]
    docs_start: u64,

    #[arg(long, default_value_t = 10_000)]
    docs_bound: u64,

    #[arg(long, default_value_t = 10)]
    docs_factor: u64,

    /// How the document axis maps to documents per database.
    #[arg(long, value_enum, default_value_t = DocsDerivation::PerDatabase)]
    derivation: DocsDerivation,

    #[arg(long, default_value_t = 1)]
    repetitions: u32,

    #[arg(long, value_enum, default_value_t = InsertMode::Sequential)]
    insert_mode: InsertMode,

    /// Also time one database holding docs * dbs documents per trial.
    #[arg(long, default_value_t = false)]
    baseline: bool,

    #[arg(long, value_enum, default_value_t = FailurePolicy::Abort)]
    on_failure: FailurePolicy,

    /// Cancel a trial that runs longer than this many seconds.
    #[arg(long)]
    trial_timeout_secs: Option<u64>,

    /// Timeout for each HTTP request.
    #[arg(long, default_value_t = 300)]
    request_timeout_secs: u64,

    /// Directory receiving results.json, aggregates.json and run.json.
    #[arg(long, default_value = "bench-results")]
    out: PathBuf,
}

fn now_utc() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("unix:{secs}")
}

fn git_sha_short() -> Option<String> {
    std::env::var("GIT_SHA")
        .ok()
        .or_else(|| std::env::var("GITHUB_SHA").ok())
        .map(|s| s.chars().take(12).collect())
}

fn node(url: &str, args: &Args) -> NodeEndpoint {
    NodeEndpoint::new(url).with_credentials(args.username.clone(), args.password.clone())
}

/// Last resort when results cannot be written: put them on stdout.
fn dump(outcome: &SweepOutcome) {
    match serde_json::to_string_pretty(outcome) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("could not serialize results either: {err}; {outcome:?}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let request_timeout = Duration::from_secs(args.request_timeout_secs);

    let source_self = node(
        args.source_replication_url.as_deref().unwrap_or(&args.source_url),
        &args,
    );
    let source = CouchClient::new(node(&args.source_url, &args), request_timeout)?
        .with_replication_source(source_self);
    let peer = CouchClient::new(node(&args.peer_url, &args), request_timeout)?;

    let mut runner_cfg = RunnerConfig::new(node(
        args.peer_replication_url.as_deref().unwrap_or(&args.peer_url),
        &args,
    ));
    runner_cfg.insert_mode = args.insert_mode;
    runner_cfg.baseline = args.baseline;

    let sweep_cfg = SweepConfig {
        databases: Axis::new(args.dbs_start, args.dbs_bound, args.dbs_factor),
        documents: Axis::new(args.docs_start, args.docs_bound, args.docs_factor),
        derivation: args.derivation,
        repetitions: args.repetitions,
        failure_policy: args.on_failure,
        trial_timeout: args.trial_timeout_secs.map(Duration::from_secs),
    };
    sweep_cfg.validate()?;

    let meta = RunMeta {
        schema_version: 1,
        bench_version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp_utc: now_utc(),
        git_sha: git_sha_short(),
        insert_mode: args.insert_mode.as_str().to_string(),
        derivation: args.derivation.as_str().to_string(),
        repetitions: args.repetitions,
        baseline: args.baseline,
    };

    let progress: Arc<dyn Progress> = Arc::new(TracingProgress);
    let source: Arc<dyn DatabaseClient> = Arc::new(source);
    let peer: Arc<dyn DatabaseClient> = Arc::new(peer);
    let runner = BenchmarkRunner::new(source, progress.clone(), runner_cfg).with_peer(peer);
    let controller = SweepController::new(runner, sweep_cfg);

    let exporter = ResultExporter::new(&args.out);
    let outcome = match controller.run_sweep().await {
        Ok(outcome) => outcome,
        Err(err) => {
            if let Some(partial) = err.partial() {
                progress.warn(&format!(
                    "sweep aborted after {} trials; partial results follow",
                    partial.results.len()
                ));
                dump(partial);
            }
            return Err(err.into());
        }
    };

    match exporter.export(&outcome, &meta) {
        Ok(paths) => {
            progress.info(&format!(
                "Wrote {} trials to {} and {} aggregates to {}",
                outcome.results.len(),
                paths.results.display(),
                outcome.aggregates.len(),
                paths.aggregates.display()
            ));
            if let Some(failures) = paths.failures {
                progress.warn(&format!(
                    "{} trials failed, see {}",
                    outcome.failures.len(),
                    failures.display()
                ));
            }
            Ok(())
        }
        Err(err) => {
            dump(&outcome);
            Err(err).with_context(|| format!("exporting results to {}", exporter.dir().display()))
        }
    }
}
