//! Feature vector assembly.
//!
//! Layout, in oracle input order:
//!
//! | slot | feature |
//! |---|---|
//! | 3 | agent public repos, followers, following |
//! | 4 | repo watchers, forks, open issues, total issues |
//! | 7 or 10 | behavior delta per event type |
//! | 1 | agent merge fraction |
//! | 1 | repo merge fraction |
//! | 1 | repo quality |

use chrono::{DateTime, Utc};
use matrix_store::{HistoryStore, RepoProfile, UserProfile};
use rand::Rng;
use tracing::{debug, instrument};

use crate::behavior::past_behavior_delta;
use crate::config::Calibration;
use crate::domain::{EventSet, MatrixError, Result};
use crate::metrics::METRICS;
use crate::normalize::round2;
use crate::reputation::{repo_quality, MergeFractions};

const PROFILE_FEATURES: [&str; 3] = ["public_repos", "followers", "following"];
const REPO_FEATURES: [&str; 4] = ["watchers", "forks", "open_issues", "total_issues"];
const REPUTATION_FEATURES: [&str; 3] = ["user_acceptance", "repo_acceptance", "repo_quality"];

/// Ordered oracle input, every value in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    /// Number of features for an event set: 17 for core, 20 for extended.
    pub fn expected_len(event_set: EventSet) -> usize {
        PROFILE_FEATURES.len() + REPO_FEATURES.len() + event_set.len() + REPUTATION_FEATURES.len()
    }

    /// Feature names in slot order.
    pub fn names(event_set: EventSet) -> Vec<String> {
        PROFILE_FEATURES
            .iter()
            .chain(REPO_FEATURES.iter())
            .map(|s| s.to_string())
            .chain(event_set.types().iter().map(|t| format!("delta.{t}")))
            .chain(REPUTATION_FEATURES.iter().map(|s| s.to_string()))
            .collect()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Space-separated decimal rendering.
    pub fn to_line(&self) -> String {
        self.0
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One agent's features against the repository it was paired with.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentFeatures {
    pub vector: FeatureVector,
    pub repo_id: String,
}

/// Draws repositories by ordinal, resampling over gaps.
#[derive(Debug, Clone, Copy)]
pub struct RepoSampler {
    num_repos: u64,
    max_attempts: u32,
}

impl RepoSampler {
    pub fn new(num_repos: u64, max_attempts: u32) -> Self {
        Self {
            num_repos,
            max_attempts,
        }
    }

    /// Sample uniformly from `1..=num_repos` until an ordinal hits a row.
    pub async fn sample<R: Rng>(
        &self,
        store: &dyn HistoryStore,
        rng: &mut R,
    ) -> Result<RepoProfile> {
        if self.num_repos == 0 {
            return Err(MatrixError::EmptyCorpus);
        }
        for _ in 0..self.max_attempts {
            let ordinal = rng.gen_range(1..=self.num_repos);
            if let Some(repo) = store.repo_by_ordinal(ordinal).await? {
                return Ok(repo);
            }
            METRICS.inc_resamples();
            debug!(ordinal, "ordinal has no repository, resampling");
        }
        Err(MatrixError::SamplingExhausted {
            attempts: self.max_attempts,
            num_repos: self.num_repos,
        })
    }
}

/// Startup check: the ordinal range is non-empty and the corpus has rows.
pub async fn preflight(store: &dyn HistoryStore, num_repos: u64) -> Result<()> {
    if num_repos == 0 {
        return Err(crate::config::ConfigError::Invalid(
            "num_repos must be at least 1".to_string(),
        )
        .into());
    }
    let count = store.repo_count().await?;
    if count == 0 {
        return Err(MatrixError::EmptyCorpus);
    }
    if count < num_repos {
        debug!(count, num_repos, "ordinal range exceeds corpus size, expect resampling");
    }
    Ok(())
}

/// Builds feature vectors from the history store.
#[derive(Debug, Clone)]
pub struct FeatureAssembler {
    calibration: Calibration,
    event_set: EventSet,
    sampler: RepoSampler,
}

impl FeatureAssembler {
    pub fn new(calibration: Calibration, event_set: EventSet, sampler: RepoSampler) -> Self {
        Self {
            calibration,
            event_set,
            sampler,
        }
    }

    pub fn event_set(&self) -> EventSet {
        self.event_set
    }

    /// Fetch the agent's profile; a missing agent is fatal.
    pub async fn agent_profile(&self, store: &dyn HistoryStore, agent_id: &str) -> Result<UserProfile> {
        store
            .user_profile(agent_id)
            .await?
            .ok_or_else(|| MatrixError::AgentNotFound {
                agent: agent_id.to_string(),
            })
    }

    /// Pair the agent with a random repository and build its features.
    #[instrument(skip(self, store, merge, rng))]
    pub async fn build_features<R: Rng>(
        &self,
        store: &dyn HistoryStore,
        agent_id: &str,
        round_ts: DateTime<Utc>,
        merge: &MergeFractions,
        rng: &mut R,
    ) -> Result<AgentFeatures> {
        let agent = self.agent_profile(store, agent_id).await?;
        let repo = self.sampler.sample(store, rng).await?;
        self.features_for(store, &agent, &repo, round_ts, merge).await
    }

    /// Features for a fixed agent and repository.
    pub async fn features_for(
        &self,
        store: &dyn HistoryStore,
        agent: &UserProfile,
        repo: &RepoProfile,
        round_ts: DateTime<Utc>,
        merge: &MergeFractions,
    ) -> Result<AgentFeatures> {
        let cal = &self.calibration;
        let mut values = Vec::with_capacity(FeatureVector::expected_len(self.event_set));

        values.push(cal.profile.public_repos.count(agent.public_repos as f64));
        values.push(cal.profile.followers.count(agent.followers as f64));
        values.push(cal.profile.following.count(agent.following as f64));

        values.push(cal.repo.watchers.count(repo.watchers_count as f64));
        values.push(cal.repo.forks.count(repo.forks_count as f64));
        values.push(cal.repo.open_issues.count(repo.issue_open_count as f64));
        values.push(cal.repo.total_issues.count(repo.issue_total_or_open() as f64));

        let deltas = past_behavior_delta(
            store,
            round_ts,
            cal.behavior_window(),
            &agent.login_h,
            self.event_set,
        )
        .await?;
        for t in self.event_set.types() {
            let d = deltas.get(t).copied().unwrap_or(0.0);
            values.push(cal.behavior.for_type(*t).delta(d));
        }

        values.push(round2(merge.user(&agent.login_h)));
        values.push(round2(merge.repo(&repo.full_name_h)));
        let quality = repo_quality(store, &repo.full_name_h, &merge.by_user).await?;
        values.push(round2(quality));

        Ok(AgentFeatures {
            vector: FeatureVector::new(values),
            repo_id: repo.full_name_h.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_store::fakes::MemoryHistoryStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn assembler(event_set: EventSet, num_repos: u64) -> FeatureAssembler {
        FeatureAssembler::new(
            Calibration::default(),
            event_set,
            RepoSampler::new(num_repos, 100),
        )
    }

    fn ts() -> DateTime<Utc> {
        crate::domain::epoch_to_utc(1_497_484_800).unwrap()
    }

    #[test]
    fn test_expected_len() {
        assert_eq!(FeatureVector::expected_len(EventSet::Core), 17);
        assert_eq!(FeatureVector::expected_len(EventSet::Extended), 20);
        assert_eq!(FeatureVector::names(EventSet::Extended).len(), 20);
        assert_eq!(FeatureVector::names(EventSet::Core)[7], "delta.CreateEvent");
    }

    #[test]
    fn test_to_line() {
        let v = FeatureVector::new(vec![0.5, 0.0, 1.0]);
        assert_eq!(v.to_line(), "0.5 0 1");
    }

    #[tokio::test]
    async fn test_missing_agent_is_fatal() {
        let store = MemoryHistoryStore::new();
        store.push_repo(RepoProfile::new(0, "r", 1, 1, 1, Some(1)));
        let mut rng = StdRng::seed_from_u64(1);

        let err = assembler(EventSet::Core, 1)
            .build_features(&store, "ghost", ts(), &MergeFractions::default(), &mut rng)
            .await
            .unwrap_err();
        assert!(matches!(err, MatrixError::AgentNotFound { .. }));
    }

    #[tokio::test]
    async fn test_vector_shape_and_range() {
        let store = MemoryHistoryStore::new();
        store.insert_user(UserProfile::new("a", 10, 5, 2));
        store.push_repo(RepoProfile::new(0, "r", 100, 3, 1, None));

        let mut rng = StdRng::seed_from_u64(7);
        for set in [EventSet::Core, EventSet::Extended] {
            let f = assembler(set, 1)
                .build_features(&store, "a", ts(), &MergeFractions::default(), &mut rng)
                .await
                .unwrap();
            assert_eq!(f.vector.len(), FeatureVector::expected_len(set));
            assert!(f.vector.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
            assert_eq!(f.repo_id, "r");
        }
    }

    #[tokio::test]
    async fn test_sampler_skips_gaps() {
        let store = MemoryHistoryStore::new();
        store.insert_repo(RepoProfile::new(5, "only", 1, 1, 1, None));
        let mut rng = StdRng::seed_from_u64(42);

        let repo = RepoSampler::new(5, 10_000)
            .sample(&store, &mut rng)
            .await
            .unwrap();
        assert_eq!(repo.full_name_h, "only");
    }

    #[tokio::test]
    async fn test_sampler_gives_up() {
        let store = MemoryHistoryStore::new();
        store.insert_repo(RepoProfile::new(50, "unreachable", 1, 1, 1, None));
        let mut rng = StdRng::seed_from_u64(42);

        let err = RepoSampler::new(10, 25)
            .sample(&store, &mut rng)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MatrixError::SamplingExhausted {
                attempts: 25,
                num_repos: 10
            }
        ));
    }

    #[tokio::test]
    async fn test_preflight() {
        let store = MemoryHistoryStore::new();
        assert!(matches!(
            preflight(&store, 10).await.unwrap_err(),
            MatrixError::EmptyCorpus
        ));
        assert!(preflight(&store, 0).await.is_err());

        store.push_repo(RepoProfile::new(0, "r", 1, 1, 1, None));
        assert!(preflight(&store, 10).await.is_ok());
    }
}
