//! Wire records exchanged with the controller.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::error::ValidationError;
use super::event_type::EventType;

/// `cur_round` value the controller sends when the simulation is over.
pub const TERMINAL_ROUND: i64 = -1;

/// Format of `created_at` on the wire, e.g. `2017-03-04T05:06:07Z`.
pub const WIRE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Round descriptor returned by `can_we_start_yet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundInfo {
    pub cur_round: i64,
    /// Inclusive window start, epoch seconds
    #[serde(default)]
    pub start_time: i64,
    /// Exclusive window end, epoch seconds
    #[serde(default)]
    pub end_time: i64,
}

impl RoundInfo {
    pub fn new(cur_round: i64, start_time: i64, end_time: i64) -> Self {
        Self {
            cur_round,
            start_time,
            end_time,
        }
    }

    /// The sentinel round that ends the simulation.
    pub fn terminal() -> Self {
        Self::new(TERMINAL_ROUND, 0, 0)
    }

    pub fn is_terminal(&self) -> bool {
        self.cur_round == TERMINAL_ROUND
    }

    /// Check the window is non-empty and return it as `[start, end)`.
    pub fn window(&self) -> std::result::Result<(i64, i64), ValidationError> {
        if self.start_time >= self.end_time {
            return Err(ValidationError::EmptyRoundWindow {
                start: self.start_time,
                end: self.end_time,
            });
        }
        Ok((self.start_time, self.end_time))
    }
}

/// Convert epoch seconds to a UTC timestamp.
pub fn epoch_to_utc(secs: i64) -> std::result::Result<DateTime<Utc>, ValidationError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or(ValidationError::TimestampOutOfRange(secs))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub login_h: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub full_name_h: String,
}

/// One generated unit of agent activity, in the platform's event schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// `<agent>_<round>`
    pub id_h: String,
    pub actor: Actor,
    pub repo: RepoRef,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Wall-clock time inside the round window, [`WIRE_TIME_FORMAT`]
    pub created_at: String,
    /// Logical time: the round number
    #[serde(rename = "_l_created_at")]
    pub logical_round: i64,
}

impl EventRecord {
    pub fn new(
        agent_id: &str,
        repo_id: &str,
        event_type: EventType,
        created_at: DateTime<Utc>,
        round: i64,
    ) -> Self {
        Self {
            id_h: format!("{agent_id}_{round}"),
            actor: Actor {
                login_h: agent_id.to_string(),
            },
            repo: RepoRef {
                full_name_h: repo_id.to_string(),
            },
            event_type,
            created_at: created_at.format(WIRE_TIME_FORMAT).to_string(),
            logical_round: round,
        }
    }
}
