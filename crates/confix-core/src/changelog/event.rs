//! Change event types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use confix_content::StoreCommand;
use confix_fs::{FileAttributes, NormalizedPath};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::Error;

/// Largest sequence number a rule can issue in one run
pub const MAX_SEQUENCE: u32 = 999;

/// Identifier of a change event: the rule number plus a per-rule sequence.
///
/// Rendered as four digits of rule and three of sequence, so rule 57's
/// first event is `0057001`. Ids are unique across rules without any central
/// counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId {
    pub rule: u32,
    pub sequence: u32,
}

impl EventId {
    pub fn new(rule: u32, sequence: u32) -> Self {
        Self { rule, sequence }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:03}", self.rule, self.sequence)
    }
}

impl FromStr for EventId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::change_log(format!("invalid event id {s:?}"));
        if s.len() < 7 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let (rule, sequence) = s.split_at(s.len() - 3);
        Ok(Self {
            rule: rule.parse().map_err(|_| invalid())?,
            sequence: sequence.parse().map_err(|_| invalid())?,
        })
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Reference to a stored prior-content snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRef {
    /// File name inside the log's snapshot directory
    pub file: String,
    /// `sha256:<hex>` of the snapshot bytes
    pub checksum: String,
    pub size: u64,
}

/// What a change did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeKind {
    /// The target did not exist before the commit
    FileCreated,
    /// The target existed and was replaced
    FileRewritten {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        snapshot: Option<SnapshotRef>,
        /// Ownership and permissions before the rewrite
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attributes: Option<FileAttributes>,
    },
    PermissionChange {
        prior: FileAttributes,
        new: FileAttributes,
    },
    /// Host store commands; `undo` is already in the order to run it
    ReversibleCommand {
        commands: Vec<StoreCommand>,
        undo: Vec<StoreCommand>,
    },
}

impl ChangeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FileCreated => "file-created",
            Self::FileRewritten { .. } => "file-rewritten",
            Self::PermissionChange { .. } => "permission-change",
            Self::ReversibleCommand { .. } => "reversible-command",
        }
    }
}

/// A recorded, potentially undoable state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub id: EventId,
    pub target: NormalizedPath,
    pub timestamp: DateTime<Utc>,
    /// Rule run that produced the event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(id: EventId, target: NormalizedPath, kind: ChangeKind) -> Self {
        Self {
            id,
            target,
            timestamp: Utc::now(),
            run_id: None,
            kind,
        }
    }

    pub fn with_run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(EventId::new(57, 1), "0057001")]
    #[case(EventId::new(3, 42), "0003042")]
    #[case(EventId::new(12345, 7), "12345007")]
    fn event_id_display_and_parse(#[case] id: EventId, #[case] text: &str) {
        assert_eq!(id.to_string(), text);
        assert_eq!(text.parse::<EventId>().unwrap(), id);
    }

    #[rstest]
    #[case("57001")]
    #[case("00x7001")]
    #[case("")]
    fn malformed_event_ids(#[case] text: &str) {
        assert!(text.parse::<EventId>().is_err());
    }

    #[test]
    fn event_round_trips_through_toml() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            events: Vec<ChangeEvent>,
        }

        let wrapper = Wrapper {
            events: vec![
                ChangeEvent::new(
                    EventId::new(57, 1),
                    NormalizedPath::new("/etc/ssh/sshd_config"),
                    ChangeKind::FileRewritten {
                        snapshot: Some(SnapshotRef {
                            file: "0057001.snap".into(),
                            checksum: "sha256:00".into(),
                            size: 12,
                        }),
                        attributes: Some(FileAttributes::with_mode(0o600)),
                    },
                )
                .with_run(Uuid::new_v4()),
                ChangeEvent::new(
                    EventId::new(57, 2),
                    NormalizedPath::new("host-pref-store"),
                    ChangeKind::ReversibleCommand {
                        commands: vec![StoreCommand::DeletePreference {
                            domain: "d".into(),
                            key: "k".into(),
                        }],
                        undo: vec![StoreCommand::SetPreference {
                            domain: "d".into(),
                            key: "k".into(),
                            value: serde_json::json!(5),
                        }],
                    },
                ),
            ],
        };

        let text = toml::to_string_pretty(&wrapper).unwrap();
        assert!(text.contains("id = \"0057001\""));
        let back: Wrapper = toml::from_str(&text).unwrap();
        assert_eq!(back.events, wrapper.events);
    }
}
