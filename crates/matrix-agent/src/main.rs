//! Matrix agent - simulated developer population worker
//!
//! The `matrix-agent` command plays simulation rounds against a Matrix
//! controller on behalf of a slice of agents.
//!
//! ## Commands
//!
//! - `run`: play rounds until the controller ends the simulation
//! - `check`: verify store, agents, calibration and oracle without connecting
//!   to the controller
//! - `inspect`: print one agent's features and reputation at a point in time

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use matrix_core::metrics::METRICS;
use matrix_core::{
    compute_merge_fractions, epoch_to_utc, issue_comment_fractions, load_agent_ids, preflight,
    recent_activity_counts, Calibration, CommandOracle, DecisionOracle, EventSet,
    FeatureAssembler, FeatureVector, FeedForwardOracle, FixedScoreOracle, OracleHandle,
    RepoSampler, SimulationConfig, SimulationDriver, SimulationReport,
};
use matrix_store::{HistoryStore, StoreConfig, SurrealHistoryStore};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, Level};

#[derive(Parser)]
#[command(name = "matrix-agent")]
#[command(author = "Stevedores Org")]
#[command(version = matrix_core::VERSION)]
#[command(about = "Matrix simulation agent worker", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and reports
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play rounds against the controller until it ends the simulation
    Run(RunArgs),

    /// Run the startup checks without contacting the controller
    Check(CheckArgs),

    /// Show one agent's feature vector and reputation
    Inspect(InspectArgs),
}

#[derive(Args, Clone, Debug)]
struct StoreArgs {
    /// History store endpoint (mem://, surrealkv://path, ws://host:port)
    #[arg(long = "store", env = "MATRIX_STORE_URL")]
    url: String,

    #[arg(long, env = "MATRIX_STORE_NAMESPACE", default_value = "matrix")]
    store_namespace: String,

    #[arg(long, env = "MATRIX_STORE_DATABASE", default_value = "history")]
    store_database: String,

    #[arg(long, env = "MATRIX_STORE_USERNAME")]
    store_username: Option<String>,

    #[arg(long, env = "MATRIX_STORE_PASSWORD", hide_env_values = true)]
    store_password: Option<String>,

    /// Credentials belong to a root user
    #[arg(long, env = "MATRIX_STORE_ROOT")]
    store_root: bool,
}

impl StoreArgs {
    fn config(&self) -> StoreConfig {
        let mut config = StoreConfig::new(&self.url)
            .with_namespace(&self.store_namespace)
            .with_database(&self.store_database)
            .with_root(self.store_root);
        config.username = self.store_username.clone();
        config.password = self.store_password.clone();
        config
    }
}

#[derive(Args, Clone, Debug)]
struct AgentArgs {
    /// File of agent logins, one per line
    #[arg(long, env = "MATRIX_AGENT_IDS")]
    agent_ids: PathBuf,

    /// First line of the agent file used by worker 0
    #[arg(long, env = "MATRIX_AGENT_START", default_value_t = 0)]
    start: usize,

    /// Agents per worker
    #[arg(long, env = "MATRIX_AGENT_COUNT")]
    count: usize,
}

#[derive(Args, Clone, Debug)]
struct ModelArgs {
    /// Event vocabulary: core (7 types) or extended (10 types)
    #[arg(long, env = "MATRIX_EVENT_SET", default_value = "core")]
    event_set: EventSet,

    /// TOML file overriding normalization bounds and windows
    #[arg(long, env = "MATRIX_CALIBRATION")]
    calibration: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OracleKind {
    /// Fixed scores from --oracle-scores
    Fixed,
    /// In-process network, weights from --oracle-weights
    Feedforward,
    /// External process from --oracle-command
    Command,
}

#[derive(Args, Clone, Debug)]
struct OracleArgs {
    #[arg(long = "oracle", env = "MATRIX_ORACLE", value_enum, default_value_t = OracleKind::Feedforward)]
    kind: OracleKind,

    /// JSON weights file for the feedforward oracle
    #[arg(long, env = "MATRIX_ORACLE_WEIGHTS")]
    oracle_weights: Option<PathBuf>,

    /// Command line of an external oracle process
    #[arg(long, env = "MATRIX_ORACLE_COMMAND")]
    oracle_command: Option<String>,

    /// Comma-separated scores for the fixed oracle
    #[arg(long, env = "MATRIX_ORACLE_SCORES", value_delimiter = ',')]
    oracle_scores: Vec<f64>,
}

#[derive(Args, Clone, Debug)]
struct RunArgs {
    /// Controller address, host:port
    #[arg(long, env = "MATRIX_CONTROLLER")]
    controller: String,

    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    agents: AgentArgs,

    /// Repository ordinals are sampled from 1..=num_repos
    #[arg(long, env = "MATRIX_NUM_REPOS")]
    num_repos: u64,

    /// Independent workers, each with its own agent slice and connections
    #[arg(long, env = "MATRIX_WORKERS", default_value_t = 1)]
    workers: usize,

    /// Repository samples attempted before a round fails
    #[arg(long, env = "MATRIX_MAX_SAMPLE_ATTEMPTS", default_value_t = 10_000)]
    max_sample_attempts: u32,

    /// RNG seed; worker i uses seed + i
    #[arg(long, env = "MATRIX_SEED")]
    seed: Option<u64>,

    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    oracle: OracleArgs,
}

#[derive(Args, Clone, Debug)]
struct CheckArgs {
    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    agents: AgentArgs,

    #[arg(long, env = "MATRIX_NUM_REPOS")]
    num_repos: u64,

    #[arg(long, env = "MATRIX_WORKERS", default_value_t = 1)]
    workers: usize,

    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    oracle: OracleArgs,
}

#[derive(Args, Clone, Debug)]
struct InspectArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Agent login to inspect
    #[arg(long)]
    agent: String,

    /// Reference time, epoch seconds
    #[arg(long)]
    at: i64,

    /// Repository ordinal; sampled when omitted
    #[arg(long)]
    repo: Option<u64>,

    /// Sampling range when --repo is omitted (default: corpus size)
    #[arg(long, env = "MATRIX_NUM_REPOS")]
    num_repos: Option<u64>,

    #[arg(long)]
    seed: Option<u64>,

    #[command(flatten)]
    model: ModelArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    matrix_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run(args) => cmd_run(args, cli.json).await,
        Commands::Check(args) => cmd_check(args, cli.json).await,
        Commands::Inspect(args) => cmd_inspect(args, cli.json).await,
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

async fn open_store(args: &StoreArgs) -> Result<SurrealHistoryStore> {
    SurrealHistoryStore::connect(args.config())
        .await
        .with_context(|| format!("Failed to open history store at {}", args.url))
}

fn load_calibration(path: Option<&Path>) -> Result<Calibration> {
    match path {
        Some(path) => Calibration::from_toml_file(path)
            .with_context(|| format!("Failed to load calibration from {}", path.display())),
        None => Ok(Calibration::default()),
    }
}

fn build_oracle(args: &OracleArgs, event_set: EventSet) -> Result<OracleHandle> {
    let backend: Box<dyn DecisionOracle> = match args.kind {
        OracleKind::Fixed => {
            if args.oracle_scores.is_empty() {
                bail!("--oracle fixed requires --oracle-scores");
            }
            Box::new(FixedScoreOracle::new(args.oracle_scores.clone()))
        }
        OracleKind::Feedforward => {
            let path = args
                .oracle_weights
                .as_ref()
                .context("--oracle feedforward requires --oracle-weights")?;
            Box::new(FeedForwardOracle::from_path(path))
        }
        OracleKind::Command => {
            let line = args
                .oracle_command
                .as_deref()
                .context("--oracle command requires --oracle-command")?;
            Box::new(CommandOracle::from_command_line(line)?)
        }
    };
    Ok(OracleHandle::new(backend, event_set))
}

/// `(start, count)` of each worker's agent slice.
fn worker_slices(start: usize, count: usize, workers: usize) -> Vec<(usize, usize)> {
    (0..workers).map(|i| (start + i * count, count)).collect()
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(args: RunArgs, json: bool) -> Result<()> {
    if args.workers == 0 {
        bail!("--workers must be at least 1");
    }
    let calibration = load_calibration(args.model.calibration.as_deref())?;

    let mut handles = Vec::with_capacity(args.workers);
    for (index, (start, count)) in
        worker_slices(args.agents.start, args.agents.count, args.workers)
            .into_iter()
            .enumerate()
    {
        let args = args.clone();
        let calibration = calibration.clone();
        handles.push(tokio::spawn(async move {
            run_worker(index, start, count, &args, calibration).await
        }));
    }

    let mut reports = Vec::new();
    let mut failures = 0usize;
    for (index, joined) in futures::future::join_all(handles).await.into_iter().enumerate() {
        match joined.context("worker task panicked")? {
            Ok(report) => reports.push(report),
            Err(e) => {
                error!(worker = index, error = %format!("{e:#}"), "worker failed");
                failures += 1;
            }
        }
    }
    METRICS.flush();

    for report in &reports {
        print_report(report, json)?;
    }
    if failures > 0 {
        bail!("{failures} of {} workers failed", args.workers);
    }
    Ok(())
}

async fn run_worker(
    index: usize,
    start: usize,
    count: usize,
    args: &RunArgs,
    calibration: Calibration,
) -> Result<SimulationReport> {
    let worker = format!("worker-{index}");

    let agents = load_agent_ids(&args.agents.agent_ids, start, count)
        .await
        .with_context(|| format!("{worker}: failed to load agent ids"))?;
    info!(%worker, agents = agents.len(), start, "agent slice loaded");

    let store: Arc<dyn HistoryStore> = Arc::new(open_store(&args.store).await?);
    let oracle = build_oracle(&args.oracle, args.model.event_set)?;
    let session = matrix_core::connect(&args.controller)
        .await
        .with_context(|| format!("{worker}: failed to reach controller"))?;

    let mut config = SimulationConfig::new(args.num_repos)
        .with_event_set(args.model.event_set)
        .with_max_sample_attempts(args.max_sample_attempts)
        .with_calibration(calibration);
    if let Some(seed) = args.seed {
        config = config.with_seed(seed.wrapping_add(index as u64));
    }

    let driver = SimulationDriver::new(worker.clone(), store, agents, oracle, session, config)?;
    driver
        .run()
        .await
        .with_context(|| format!("{worker}: simulation aborted"))
}

fn print_report(report: &SimulationReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
    } else {
        println!(
            "{}: {} agents, {} rounds, {} events",
            report.worker, report.agents, report.rounds, report.events
        );
        println!("completion time: {:?}", report.elapsed());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CheckReport {
    repositories: u64,
    agents_listed: usize,
    agents_missing: Vec<String>,
    event_set: String,
    oracle: String,
}

async fn cmd_check(args: CheckArgs, json: bool) -> Result<()> {
    let calibration = load_calibration(args.model.calibration.as_deref())?;
    calibration.validate()?;

    let store = open_store(&args.store).await?;
    preflight(&store, args.num_repos)
        .await
        .context("Repository corpus check failed")?;
    let repositories = store.repo_count().await?;

    let mut agents = Vec::new();
    for (start, count) in worker_slices(args.agents.start, args.agents.count, args.workers.max(1)) {
        agents.extend(load_agent_ids(&args.agents.agent_ids, start, count).await?);
    }
    let mut agents_missing = Vec::new();
    for agent in &agents {
        if store.user_profile(agent).await?.is_none() {
            agents_missing.push(agent.clone());
        }
    }

    let mut oracle = build_oracle(&args.oracle, args.model.event_set)?;
    oracle.init().await.context("Oracle failed to initialize")?;

    let report = CheckReport {
        repositories,
        agents_listed: agents.len(),
        agents_missing,
        event_set: args.model.event_set.to_string(),
        oracle: format!("{:?}", args.oracle.kind).to_lowercase(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Repositories: {}", report.repositories);
        println!("Agents:       {}", report.agents_listed);
        println!("Event set:    {}", report.event_set);
        println!("Oracle:       {}", report.oracle);
        for agent in &report.agents_missing {
            println!("  missing profile: {agent}");
        }
    }

    if !report.agents_missing.is_empty() {
        bail!(
            "{} of {} agents have no profile",
            report.agents_missing.len(),
            report.agents_listed
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// inspect
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct InspectReport {
    agent: String,
    repo: String,
    at: String,
    features: BTreeMap<usize, (String, f64)>,
    recent_activity: BTreeMap<String, u64>,
    merge_fraction: f64,
    issue_comment_fraction: Option<f64>,
}

async fn cmd_inspect(args: InspectArgs, json: bool) -> Result<()> {
    let calibration = load_calibration(args.model.calibration.as_deref())?;
    let event_set = args.model.event_set;
    let store = open_store(&args.store).await?;
    let at = epoch_to_utc(args.at)?;

    let num_repos = match args.num_repos {
        Some(n) => n,
        None => store.repo_count().await?,
    };
    let merge = compute_merge_fractions(&store, calibration.merge_period()).await?;
    let assembler = FeatureAssembler::new(
        calibration.clone(),
        event_set,
        RepoSampler::new(num_repos, 10_000),
    );

    let agent = assembler.agent_profile(&store, &args.agent).await?;
    let repo = match args.repo {
        Some(ordinal) => store
            .repo_by_ordinal(ordinal)
            .await?
            .with_context(|| format!("No repository at ordinal {ordinal}"))?,
        None => {
            let mut rng = match args.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            RepoSampler::new(num_repos, 10_000)
                .sample(&store, &mut rng)
                .await?
        }
    };

    let features = assembler
        .features_for(&store, &agent, &repo, at, &merge)
        .await?;
    let activity = recent_activity_counts(
        &store,
        at,
        calibration.behavior_window(),
        &args.agent,
        event_set,
    )
    .await?;
    let comment_fractions = issue_comment_fractions(&store).await?;

    let report = InspectReport {
        agent: args.agent.clone(),
        repo: features.repo_id.clone(),
        at: at.format(matrix_core::WIRE_TIME_FORMAT).to_string(),
        features: FeatureVector::names(event_set)
            .into_iter()
            .zip(features.vector.as_slice().iter().copied())
            .enumerate()
            .collect(),
        recent_activity: activity
            .into_iter()
            .map(|(t, n)| (t.to_string(), n))
            .collect(),
        merge_fraction: merge.user(&args.agent),
        issue_comment_fraction: comment_fractions.get(&args.agent).copied(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Agent:  {}", report.agent);
        println!("Repo:   {}", report.repo);
        println!("At:     {}", report.at);
        println!();
        for (slot, (name, value)) in &report.features {
            println!("  [{slot:2}] {name:<40} {value:.6}");
        }
        println!();
        println!("Recent activity ({} days):", calibration.behavior_window_days);
        for (t, n) in &report.recent_activity {
            println!("  {t:<40} {n}");
        }
        println!();
        println!("Merge fraction:         {:.2}", report.merge_fraction);
        match report.issue_comment_fraction {
            Some(f) => println!("Issue comment fraction: {f:.2}"),
            None => println!("Issue comment fraction: n/a"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_slices_are_disjoint() {
        assert_eq!(
            worker_slices(100, 25, 3),
            vec![(100, 25), (125, 25), (150, 25)]
        );
        assert_eq!(worker_slices(0, 10, 1), vec![(0, 10)]);
    }

    #[test]
    fn test_run_args_parse() {
        let cli = Cli::try_parse_from([
            "matrix-agent",
            "run",
            "--controller",
            "127.0.0.1:8090",
            "--store",
            "mem://",
            "--agent-ids",
            "agents.txt",
            "--count",
            "50",
            "--num-repos",
            "1000",
            "--workers",
            "4",
            "--event-set",
            "extended",
            "--oracle",
            "fixed",
            "--oracle-scores",
            "5,1,1,1,1,1,1,1,1,1",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.workers, 4);
        assert_eq!(args.agents.start, 0);
        assert_eq!(args.model.event_set, EventSet::Extended);
        assert_eq!(args.oracle.kind, OracleKind::Fixed);
        assert_eq!(args.oracle.oracle_scores.len(), 10);
        assert_eq!(args.max_sample_attempts, 10_000);
    }

    #[test]
    fn test_build_oracle_requires_backend_input() {
        let args = OracleArgs {
            kind: OracleKind::Feedforward,
            oracle_weights: None,
            oracle_command: None,
            oracle_scores: vec![],
        };
        assert!(build_oracle(&args, EventSet::Core).is_err());

        let args = OracleArgs {
            kind: OracleKind::Fixed,
            oracle_scores: vec![1.0; 7],
            ..args
        };
        assert!(build_oracle(&args, EventSet::Core).is_ok());
    }

    #[test]
    fn test_store_args_map_to_config() {
        let args = StoreArgs {
            url: "ws://db:8000".to_string(),
            store_namespace: "ns".to_string(),
            store_database: "db".to_string(),
            store_username: Some("u".to_string()),
            store_password: Some("p".to_string()),
            store_root: true,
        };
        let config = args.config();
        assert_eq!(config.endpoint, "ws://db:8000");
        assert_eq!(config.namespace, "ns");
        assert!(config.is_root);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_calibration_file_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal.toml");
        std::fs::write(&path, "merge_period_days = -3\n").unwrap();
        assert!(load_calibration(Some(&path)).is_err());
        assert!(load_calibration(None).is_ok());
    }
}
