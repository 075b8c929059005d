//! Domain models for Matrix agents.
//!
//! Canonical definitions for the entities exchanged with the controller:
//! - `EventType` / `EventSet`: the event vocabulary, in oracle order
//! - `EventRecord`: one generated event, in platform wire schema
//! - `RoundInfo`: controller-issued round descriptor

pub mod error;
pub mod event;
pub mod event_type;

pub use error::{MatrixError, Result, ValidationError};
pub use event::{epoch_to_utc, Actor, EventRecord, RepoRef, RoundInfo, TERMINAL_ROUND, WIRE_TIME_FORMAT};
pub use event_type::{EventSet, EventType};
