//! Decision oracle adapter.
//!
//! A [`DecisionOracle`] maps a feature vector to one score per event type.
//! [`OracleHandle`] owns exactly one oracle, enforces init-once, validates
//! the scores and turns them into a [`Decision`].
//!
//! Backends:
//! - [`FixedScoreOracle`]: returns the same scores every time
//! - [`FeedForwardOracle`]: one hidden layer, logistic units, JSON weights
//! - [`CommandOracle`]: line protocol over an external process

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::domain::{EventSet, EventType};
use crate::features::FeatureVector;

/// Decision oracle errors. All are fatal to a run.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle already initialized")]
    AlreadyInitialized,

    #[error("oracle used before initialization")]
    NotInitialized,

    #[error("oracle returned {got} scores, event set has {expected} types")]
    CardinalityMismatch { expected: usize, got: usize },

    #[error("oracle score {index} is not finite: {value}")]
    NonFiniteScore { index: usize, value: f64 },

    #[error("oracle expects {expected} inputs, got {got}")]
    InputMismatch { expected: usize, got: usize },

    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    #[error("invalid oracle command: {0:?}")]
    InvalidCommand(String),

    #[error("malformed oracle response: {0:?}")]
    MalformedResponse(String),

    #[error("oracle process exited")]
    ProcessExited,

    #[error("oracle io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse weights: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type OracleResult<T> = std::result::Result<T, OracleError>;

/// Scores a feature vector; one score per event type, canonical order.
#[async_trait]
pub trait DecisionOracle: Send {
    /// One-time setup (load weights, start a process).
    async fn init(&mut self) -> OracleResult<()> {
        Ok(())
    }

    async fn score(&mut self, features: &FeatureVector) -> OracleResult<Vec<f64>>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// The oracle's choice for one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub event_type: EventType,
    /// Raw scores, canonical type order
    pub scores: Vec<f64>,
}

/// Index of the highest score; the lowest index wins ties.
pub fn argmax(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, s) in scores.iter().copied().enumerate() {
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((i, s)),
        }
    }
    best.map(|(i, _)| i)
}

/// Single owner of a decision oracle.
pub struct OracleHandle {
    oracle: Box<dyn DecisionOracle>,
    event_set: EventSet,
    initialized: bool,
}

impl std::fmt::Debug for OracleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleHandle")
            .field("oracle", &self.oracle.name())
            .field("event_set", &self.event_set)
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl OracleHandle {
    pub fn new(oracle: Box<dyn DecisionOracle>, event_set: EventSet) -> Self {
        Self {
            oracle,
            event_set,
            initialized: false,
        }
    }

    pub fn event_set(&self) -> EventSet {
        self.event_set
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Initialize the oracle. Must be called exactly once.
    pub async fn init(&mut self) -> OracleResult<()> {
        if self.initialized {
            return Err(OracleError::AlreadyInitialized);
        }
        self.oracle.init().await?;
        self.initialized = true;
        debug!(oracle = self.oracle.name(), event_set = %self.event_set, "oracle initialized");
        Ok(())
    }

    pub async fn decide(&mut self, features: &FeatureVector) -> OracleResult<Decision> {
        if !self.initialized {
            return Err(OracleError::NotInitialized);
        }
        let scores = self.oracle.score(features).await?;

        let types = self.event_set.types();
        if scores.len() != types.len() {
            return Err(OracleError::CardinalityMismatch {
                expected: types.len(),
                got: scores.len(),
            });
        }
        if let Some((index, value)) = scores.iter().copied().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(OracleError::NonFiniteScore { index, value });
        }

        let best = argmax(&scores).ok_or(OracleError::CardinalityMismatch {
            expected: types.len(),
            got: 0,
        })?;
        Ok(Decision {
            event_type: types[best],
            scores,
        })
    }
}

// ---------------------------------------------------------------------------
// FixedScoreOracle
// ---------------------------------------------------------------------------

/// Returns the same scores for every input.
#[derive(Debug, Clone)]
pub struct FixedScoreOracle {
    scores: Vec<f64>,
}

impl FixedScoreOracle {
    pub fn new(scores: Vec<f64>) -> Self {
        Self { scores }
    }

    /// Always picks `event_type`.
    pub fn always(event_type: EventType, event_set: EventSet) -> Self {
        let scores = event_set
            .types()
            .iter()
            .map(|t| if *t == event_type { 1.0 } else { 0.0 })
            .collect();
        Self { scores }
    }
}

#[async_trait]
impl DecisionOracle for FixedScoreOracle {
    async fn score(&mut self, _features: &FeatureVector) -> OracleResult<Vec<f64>> {
        Ok(self.scores.clone())
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

// ---------------------------------------------------------------------------
// FeedForwardOracle
// ---------------------------------------------------------------------------

/// Weights of a one-hidden-layer network.
///
/// `hidden[j][i]` connects input `i` to hidden unit `j`; `output[k][j]`
/// connects hidden unit `j` to output `k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedForwardWeights {
    pub hidden: Vec<Vec<f64>>,
    pub hidden_bias: Vec<f64>,
    pub output: Vec<Vec<f64>>,
    pub output_bias: Vec<f64>,
}

impl FeedForwardWeights {
    pub fn inputs(&self) -> usize {
        self.hidden.first().map(Vec::len).unwrap_or(0)
    }

    pub fn outputs(&self) -> usize {
        self.output.len()
    }

    pub fn validate(&self) -> OracleResult<()> {
        let n_in = self.inputs();
        let n_hidden = self.hidden.len();
        if n_in == 0 || n_hidden == 0 || self.output.is_empty() {
            return Err(OracleError::InvalidWeights("empty layer".to_string()));
        }
        if self.hidden.iter().any(|row| row.len() != n_in) {
            return Err(OracleError::InvalidWeights("ragged hidden layer".to_string()));
        }
        if self.hidden_bias.len() != n_hidden {
            return Err(OracleError::InvalidWeights(format!(
                "hidden_bias has {} entries, expected {n_hidden}",
                self.hidden_bias.len()
            )));
        }
        if self.output.iter().any(|row| row.len() != n_hidden) {
            return Err(OracleError::InvalidWeights("ragged output layer".to_string()));
        }
        if self.output_bias.len() != self.output.len() {
            return Err(OracleError::InvalidWeights(format!(
                "output_bias has {} entries, expected {}",
                self.output_bias.len(),
                self.output.len()
            )));
        }
        Ok(())
    }

    fn forward(&self, x: &[f64]) -> Vec<f64> {
        let hidden: Vec<f64> = self
            .hidden
            .iter()
            .zip(&self.hidden_bias)
            .map(|(row, b)| logistic(dot(row, x) + b))
            .collect();
        self.output
            .iter()
            .zip(&self.output_bias)
            .map(|(row, b)| logistic(dot(row, &hidden) + b))
            .collect()
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// In-process network evaluated with weights loaded at init.
#[derive(Debug, Clone)]
pub struct FeedForwardOracle {
    path: Option<PathBuf>,
    weights: Option<FeedForwardWeights>,
}

impl FeedForwardOracle {
    /// Weights are read from `path` when the oracle is initialized.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            weights: None,
        }
    }

    pub fn from_weights(weights: FeedForwardWeights) -> Self {
        Self {
            path: None,
            weights: Some(weights),
        }
    }
}

#[async_trait]
impl DecisionOracle for FeedForwardOracle {
    async fn init(&mut self) -> OracleResult<()> {
        if let Some(path) = &self.path {
            let text = tokio::fs::read_to_string(path).await?;
            self.weights = Some(serde_json::from_str(&text)?);
        }
        match &self.weights {
            Some(w) => w.validate(),
            None => Err(OracleError::InvalidWeights("no weights".to_string())),
        }
    }

    async fn score(&mut self, features: &FeatureVector) -> OracleResult<Vec<f64>> {
        let weights = self.weights.as_ref().ok_or(OracleError::NotInitialized)?;
        if features.len() != weights.inputs() {
            return Err(OracleError::InputMismatch {
                expected: weights.inputs(),
                got: features.len(),
            });
        }
        Ok(weights.forward(features.as_slice()))
    }

    fn name(&self) -> &'static str {
        "feedforward"
    }
}

// ---------------------------------------------------------------------------
// CommandOracle
// ---------------------------------------------------------------------------

/// Oracle living in an external process.
///
/// Each request is one line of space-separated features on stdin; each
/// reply is one line `EventType:score score ...` on stdout.
#[derive(Debug)]
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
    process: Option<OracleProcess>,
}

#[derive(Debug)]
struct OracleProcess {
    _child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl CommandOracle {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            process: None,
        }
    }

    /// Split a whitespace-separated command line into program and arguments.
    pub fn from_command_line(line: &str) -> OracleResult<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| OracleError::InvalidCommand(line.to_string()))?;
        Ok(Self::new(program, parts.collect()))
    }
}

/// Parse `EventType:score score ...`.
pub fn parse_reply(line: &str) -> OracleResult<(EventType, Vec<f64>)> {
    let malformed = || OracleError::MalformedResponse(line.to_string());

    let (label, rest) = line.trim_end().split_once(':').ok_or_else(malformed)?;
    let label: EventType = label.trim().parse().map_err(|_| malformed())?;
    let scores = rest
        .split_whitespace()
        .map(|s| s.parse::<f64>().map_err(|_| malformed()))
        .collect::<OracleResult<Vec<f64>>>()?;
    if scores.is_empty() {
        return Err(malformed());
    }
    Ok((label, scores))
}

#[async_trait]
impl DecisionOracle for CommandOracle {
    async fn init(&mut self) -> OracleResult<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().ok_or(OracleError::ProcessExited)?;
        let stdout = child.stdout.take().ok_or(OracleError::ProcessExited)?;
        self.process = Some(OracleProcess {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout),
        });
        debug!(program = %self.program, "oracle process started");
        Ok(())
    }

    async fn score(&mut self, features: &FeatureVector) -> OracleResult<Vec<f64>> {
        let process = self.process.as_mut().ok_or(OracleError::NotInitialized)?;

        let mut request = features.to_line();
        request.push('\n');
        process.stdin.write_all(request.as_bytes()).await?;
        process.stdin.flush().await?;

        let mut reply = String::new();
        if process.stdout.read_line(&mut reply).await? == 0 {
            return Err(OracleError::ProcessExited);
        }

        let (label, scores) = parse_reply(&reply)?;
        let chosen = argmax(&scores).and_then(|i| EventType::ALL.get(i).copied());
        if chosen != Some(label) {
            warn!(%label, ?chosen, "oracle label disagrees with its scores, using scores");
        }
        Ok(scores)
    }

    fn name(&self) -> &'static str {
        "command"
    }
}
