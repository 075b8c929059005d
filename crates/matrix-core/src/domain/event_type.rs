//! Platform event types and the ordered sets the oracle is trained on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ValidationError;

/// Platform activity event type.
///
/// Declaration order is the canonical order: oracle output index `i` maps to
/// the `i`-th variant, and `Ord` follows the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    CreateEvent,
    DeleteEvent,
    ForkEvent,
    IssuesEvent,
    PullRequestEvent,
    PushEvent,
    WatchEvent,
    IssueCommentEvent,
    PullRequestReviewCommentEvent,
    CommitCommentEvent,
}

impl EventType {
    /// All ten types in canonical order.
    pub const ALL: [EventType; 10] = [
        EventType::CreateEvent,
        EventType::DeleteEvent,
        EventType::ForkEvent,
        EventType::IssuesEvent,
        EventType::PullRequestEvent,
        EventType::PushEvent,
        EventType::WatchEvent,
        EventType::IssueCommentEvent,
        EventType::PullRequestReviewCommentEvent,
        EventType::CommitCommentEvent,
    ];

    /// Wire name, identical to the platform's type string.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CreateEvent => "CreateEvent",
            EventType::DeleteEvent => "DeleteEvent",
            EventType::ForkEvent => "ForkEvent",
            EventType::IssuesEvent => "IssuesEvent",
            EventType::PullRequestEvent => "PullRequestEvent",
            EventType::PushEvent => "PushEvent",
            EventType::WatchEvent => "WatchEvent",
            EventType::IssueCommentEvent => "IssueCommentEvent",
            EventType::PullRequestReviewCommentEvent => "PullRequestReviewCommentEvent",
            EventType::CommitCommentEvent => "CommitCommentEvent",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownEventType {
                name: s.to_string(),
            })
    }
}

/// Which event-type vocabulary a run uses.
///
/// The oracle's output cardinality must equal `len()` of the set in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSet {
    /// The seven core types.
    #[default]
    Core,
    /// Core types plus the three comment types. Their delta bounds are
    /// unfitted defaults in `BehaviorBounds`, meant to be overridden.
    Extended,
}

impl EventSet {
    /// Types in this set, canonical order.
    pub fn types(&self) -> &'static [EventType] {
        match self {
            EventSet::Core => &EventType::ALL[..7],
            EventSet::Extended => &EventType::ALL[..],
        }
    }

    pub fn len(&self) -> usize {
        self.types().len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, event_type: EventType) -> bool {
        self.types().contains(&event_type)
    }

    /// Map a platform type string to a member of this set. Types outside the
    /// set (or unknown altogether) yield `None`.
    pub fn classify(&self, name: &str) -> Option<EventType> {
        name.parse::<EventType>()
            .ok()
            .filter(|t| self.contains(*t))
    }
}

impl FromStr for EventSet {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "core" | "7" => Ok(EventSet::Core),
            "extended" | "10" => Ok(EventSet::Extended),
            other => Err(ValidationError::UnknownEventSet {
                name: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for EventSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventSet::Core => f.write_str("core"),
            EventSet::Extended => f.write_str("extended"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order() {
        let core = EventSet::Core.types();
        assert_eq!(core.len(), 7);
        assert_eq!(core[0], EventType::CreateEvent);
        assert_eq!(core[6], EventType::WatchEvent);

        let extended = EventSet::Extended.types();
        assert_eq!(extended.len(), 10);
        assert_eq!(&extended[..7], core);
        assert_eq!(extended[9], EventType::CommitCommentEvent);

        assert!(EventType::CreateEvent < EventType::WatchEvent);
    }

    #[test]
    fn test_parse_round_trip() {
        for t in EventType::ALL {
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
        }
        assert!("GollumEvent".parse::<EventType>().is_err());
    }

    #[test]
    fn test_classify_respects_set() {
        assert_eq!(
            EventSet::Core.classify("PushEvent"),
            Some(EventType::PushEvent)
        );
        assert_eq!(EventSet::Core.classify("IssueCommentEvent"), None);
        assert_eq!(
            EventSet::Extended.classify("IssueCommentEvent"),
            Some(EventType::IssueCommentEvent)
        );
        assert_eq!(EventSet::Extended.classify("GollumEvent"), None);
    }

    #[test]
    fn test_event_set_from_str() {
        assert_eq!("core".parse::<EventSet>().unwrap(), EventSet::Core);
        assert_eq!("10".parse::<EventSet>().unwrap(), EventSet::Extended);
        assert!("huge".parse::<EventSet>().is_err());
    }

    #[test]
    fn test_event_type_serializes_as_wire_name() {
        let json = serde_json::to_string(&EventType::PullRequestEvent).unwrap();
        assert_eq!(json, "\"PullRequestEvent\"");
    }
}
