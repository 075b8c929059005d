//! Per-worker simulation loop.
//!
//! A [`SimulationDriver`] owns everything one worker needs (store handle,
//! agent slice, oracle, controller session, RNG) and plays rounds until the
//! controller sends the terminal round.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use matrix_store::HistoryStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn, Instrument};

use crate::config::{ConfigError, SimulationConfig};
use crate::domain::{epoch_to_utc, EventRecord, MatrixError, Result, RoundInfo};
use crate::features::{preflight, FeatureAssembler, RepoSampler};
use crate::metrics::METRICS;
use crate::obs;
use crate::oracle::{Decision, OracleHandle};
use crate::reputation::compute_merge_fractions;
use crate::rpc::SessionClient;

/// Read `count` agent ids starting at line `start` (0-based).
///
/// Line endings are stripped and blank lines dropped. A file shorter than
/// `start + count` yields fewer ids.
pub async fn load_agent_ids(path: &Path, start: usize, count: usize) -> Result<Vec<String>> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MatrixError::AgentIdsMissing(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };

    Ok(text
        .lines()
        .skip(start)
        .take(count)
        .map(|line| line.trim_end_matches(['\r', '\n']).to_string())
        .filter(|line| !line.is_empty())
        .collect())
}

/// Everything produced by one round.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub round: RoundInfo,
    /// One event per agent, agent-list order
    pub events: Vec<EventRecord>,
    /// Oracle output for each event, same order
    pub decisions: Vec<Decision>,
}

/// Summary of a finished worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub worker: String,
    pub agents: usize,
    pub rounds: u64,
    pub events: u64,
    pub elapsed_ms: u64,
}

impl SimulationReport {
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

/// One worker's simulation loop.
pub struct SimulationDriver<S> {
    worker: String,
    store: Arc<dyn HistoryStore>,
    agents: Vec<String>,
    oracle: OracleHandle,
    assembler: FeatureAssembler,
    session: SessionClient<S>,
    rng: StdRng,
    config: SimulationConfig,
}

impl<S> std::fmt::Debug for SimulationDriver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationDriver")
            .field("worker", &self.worker)
            .field("agents", &self.agents.len())
            .field("oracle", &self.oracle)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S> SimulationDriver<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    pub fn new(
        worker: impl Into<String>,
        store: Arc<dyn HistoryStore>,
        agents: Vec<String>,
        oracle: OracleHandle,
        session: SessionClient<S>,
        config: SimulationConfig,
    ) -> Result<Self> {
        config.validate()?;
        if oracle.event_set() != config.event_set {
            return Err(ConfigError::Invalid(format!(
                "oracle scores the {} event set but the run uses {}",
                oracle.event_set(),
                config.event_set
            ))
            .into());
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let assembler = FeatureAssembler::new(
            config.calibration.clone(),
            config.event_set,
            RepoSampler::new(config.num_repos, config.max_sample_attempts),
        );

        Ok(Self {
            worker: worker.into(),
            store,
            agents,
            oracle,
            assembler,
            session,
            rng,
            config,
        })
    }

    pub fn agents(&self) -> &[String] {
        &self.agents
    }

    /// Startup checks that need the store.
    pub async fn preflight(&self) -> Result<()> {
        startup_checks(
            self.store.as_ref(),
            self.config.num_repos,
            &self.worker,
            self.agents.len(),
        )
        .await
    }

    /// Play rounds until the controller ends the simulation.
    pub async fn run(mut self) -> Result<SimulationReport> {
        match self.run_loop().await {
            Ok(report) => Ok(report),
            Err(e) => {
                obs::emit_simulation_failed(&self.worker, &e);
                Err(e)
            }
        }
    }

    async fn run_loop(&mut self) -> Result<SimulationReport> {
        let started = Instant::now();
        obs::emit_simulation_started(&self.worker, self.agents.len(), self.config.num_repos);

        // Borrow fields, not `&self`: the oracle handle is not Sync.
        startup_checks(
            self.store.as_ref(),
            self.config.num_repos,
            &self.worker,
            self.agents.len(),
        )
        .await?;
        self.oracle.init().await?;

        let mut rounds = 0u64;
        let mut events = 0u64;
        loop {
            let round = self.session.can_we_start_yet().await?;
            if round.is_terminal() {
                break;
            }

            let span = obs::round_span(&self.worker, round.cur_round);
            let outcome = self.play_round(round).instrument(span.clone()).await?;
            self.session
                .register_events(&outcome.events)
                .instrument(span)
                .await?;

            rounds += 1;
            events += outcome.events.len() as u64;
            METRICS.inc_rounds();
            METRICS.add_events(outcome.events.len() as u64);
        }
        self.session.close().await?;

        let report = SimulationReport {
            worker: self.worker.clone(),
            agents: self.agents.len(),
            rounds,
            events,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        obs::emit_simulation_finished(&self.worker, rounds, events, report.elapsed_ms);
        info!(worker = %self.worker, elapsed = ?report.elapsed(), "completion time");
        Ok(report)
    }

    /// Generate one event per agent for a non-terminal round.
    ///
    /// All events share one timestamp drawn uniformly from the round
    /// window. Merge fractions are recomputed from the store every round.
    pub async fn play_round(&mut self, round: RoundInfo) -> Result<RoundOutcome> {
        let round_started = Instant::now();
        let (start, end) = round.window()?;
        obs::emit_round_started(round.cur_round, start, end);

        let created_at = epoch_to_utc(self.rng.gen_range(start..end))?;
        let merge = compute_merge_fractions(
            self.store.as_ref(),
            self.config.calibration.merge_period(),
        )
        .await?;

        let mut events = Vec::with_capacity(self.agents.len());
        let mut decisions = Vec::with_capacity(self.agents.len());
        for agent in &self.agents {
            let features = self
                .assembler
                .build_features(self.store.as_ref(), agent, created_at, &merge, &mut self.rng)
                .await?;
            let decision = self.oracle.decide(&features.vector).await?;
            obs::emit_agent_decided(
                agent,
                &features.repo_id,
                decision.event_type.as_str(),
                &decision.scores,
            );

            events.push(EventRecord::new(
                agent,
                &features.repo_id,
                decision.event_type,
                created_at,
                round.cur_round,
            ));
            decisions.push(decision);
        }

        obs::emit_round_finished(
            round.cur_round,
            events.len(),
            round_started.elapsed().as_millis() as u64,
        );
        Ok(RoundOutcome {
            round,
            events,
            decisions,
        })
    }
}

async fn startup_checks(
    store: &dyn HistoryStore,
    num_repos: u64,
    worker: &str,
    agents: usize,
) -> Result<()> {
    preflight(store, num_repos).await?;
    if agents == 0 {
        warn!(%worker, "no agents assigned, rounds will register empty batches");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_agent_ids_slices_and_strips() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "a0\r\na1\na2\r\na3\na4\n").unwrap();

        let ids = load_agent_ids(file.path(), 1, 3).await.unwrap();
        assert_eq!(ids, vec!["a1", "a2", "a3"]);

        let ids = load_agent_ids(file.path(), 4, 10).await.unwrap();
        assert_eq!(ids, vec!["a4"]);

        let ids = load_agent_ids(file.path(), 10, 10).await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_load_agent_ids_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_agent_ids(&dir.path().join("nope.txt"), 0, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, MatrixError::AgentIdsMissing(_)));
    }
}
