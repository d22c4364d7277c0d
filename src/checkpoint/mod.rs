//! Checkpoint and restore for the in-memory store.
//!
//! A checkpoint captures every catalog entry, system and transition so that
//! transition history, including a long-running transition that is still
//! open, survives a process restart. Restoring validates the data first and
//! reports every broken invariant at once.

use crate::core::{get_duration, CatalogEntry, System, Transition, TRANSITION_STATE_NAME};
use crate::store::{MemoryStore, Tables};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use tracing::info;

pub mod error;

pub use error::CheckpointError;

/// Version identifier for checkpoint format
pub const CHECKPOINT_VERSION: u32 = 1;

/// Serializable copy of a [`MemoryStore`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreCheckpoint {
    /// Checkpoint format version
    pub version: u32,

    /// Unique checkpoint identifier
    pub id: String,

    /// When checkpoint was created
    pub timestamp: DateTime<Utc>,

    pub states: Vec<CatalogEntry>,
    pub events: Vec<CatalogEntry>,
    pub systems: Vec<System>,
    /// All transitions, per system in ascending start order
    pub transitions: Vec<Transition>,
}

type Check = Validation<(), NonEmptyVec<String>>;

impl StoreCheckpoint {
    pub fn to_json(&self) -> Result<String, CheckpointError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        serde_json::from_str(json).map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CheckpointError> {
        bincode::serialize(self).map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CheckpointError> {
        bincode::deserialize(bytes)
            .map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))
    }

    /// Check every store invariant, accumulating ALL problems.
    pub fn validate(&self) -> Result<(), CheckpointError> {
        self.validate_with(TRANSITION_STATE_NAME)
    }

    /// [`StoreCheckpoint::validate`] for a store whose reserved state is
    /// named `transition_state`.
    ///
    /// A transition is open exactly when it is in the reserved state, as the
    /// transition protocol leaves it.
    pub fn validate_with(&self, transition_state: &str) -> Result<(), CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: self.version,
                supported: CHECKPOINT_VERSION,
            });
        }

        let checks = vec![
            self.check_unique_ids(),
            self.check_unique_names("state", &self.states),
            self.check_unique_names("event", &self.events),
            self.check_unique_subjects(),
            self.check_owners(),
            self.check_catalog_references(),
            self.check_reserved_state(transition_state),
            self.check_open_transitions(),
            self.check_durations(),
        ];

        match Validation::all_vec(checks).map(|_| ()) {
            Validation::Success(_) => Ok(()),
            Validation::Failure(problems) => Err(CheckpointError::ValidationFailed {
                problems: problems.iter().cloned().collect(),
            }),
        }
    }

    fn check_unique_ids(&self) -> Check {
        let tables: [(&str, Vec<i64>); 4] = [
            ("state", self.states.iter().map(|e| e.id).collect()),
            ("event", self.events.iter().map(|e| e.id).collect()),
            ("system", self.systems.iter().map(|s| s.id).collect()),
            ("transition", self.transitions.iter().map(|t| t.id).collect()),
        ];
        let duplicates: Vec<String> = tables
            .into_iter()
            .flat_map(|(table, ids)| {
                let mut seen = BTreeSet::new();
                ids.into_iter()
                    .filter(move |id| !seen.insert(*id))
                    .map(move |id| format!("duplicate {table} id {id}"))
            })
            .collect();
        accumulate(duplicates)
    }

    fn check_unique_names(&self, catalog: &str, entries: &[CatalogEntry]) -> Check {
        let mut seen = BTreeSet::new();
        let duplicates: Vec<String> = entries
            .iter()
            .filter(|entry| !seen.insert(entry.name.as_str()))
            .map(|entry| format!("duplicate {catalog} name '{}'", entry.name))
            .collect();
        accumulate(duplicates)
    }

    fn check_unique_subjects(&self) -> Check {
        let mut seen = BTreeSet::new();
        let duplicates: Vec<String> = self
            .systems
            .iter()
            .filter_map(|system| system.subject.as_ref())
            .filter(|subject| !seen.insert((subject.kind.as_str(), subject.id)))
            .map(|subject| format!("subject {subject} has more than one system"))
            .collect();
        accumulate(duplicates)
    }

    fn check_owners(&self) -> Check {
        let systems: BTreeSet<i64> = self.systems.iter().map(|s| s.id).collect();
        let orphans: Vec<String> = self
            .transitions
            .iter()
            .filter(|t| !systems.contains(&t.system_id))
            .map(|t| format!("transition {} belongs to missing system {}", t.id, t.system_id))
            .collect();
        accumulate(orphans)
    }

    fn check_catalog_references(&self) -> Check {
        let states: BTreeMap<i64, &str> =
            self.states.iter().map(|e| (e.id, e.name.as_str())).collect();
        let events: BTreeMap<i64, &str> =
            self.events.iter().map(|e| (e.id, e.name.as_str())).collect();

        let mut problems = Vec::new();
        for t in &self.transitions {
            if states.get(&t.state.id).copied() != Some(t.state.name.as_str()) {
                problems.push(format!(
                    "transition {} refers to unknown state {} '{}'",
                    t.id, t.state.id, t.state.name
                ));
            }
            if let Some(event) = &t.event {
                if events.get(&event.id).copied() != Some(event.name.as_str()) {
                    problems.push(format!(
                        "transition {} refers to unknown event {} '{}'",
                        t.id, event.id, event.name
                    ));
                }
            }
        }
        accumulate(problems)
    }

    fn check_reserved_state(&self, transition_state: &str) -> Check {
        let reserved = self
            .states
            .iter()
            .find(|entry| entry.name == transition_state)
            .map(|entry| entry.id);

        let problems: Vec<String> = self
            .transitions
            .iter()
            .filter_map(|t| match (Some(t.state.id) == reserved, t.is_open()) {
                (true, false) => Some(format!(
                    "transition {} has ended but is still in the reserved state",
                    t.id
                )),
                (false, true) => Some(format!(
                    "transition {} is open in state '{}'",
                    t.id, t.state.name
                )),
                _ => None,
            })
            .collect();
        accumulate(problems)
    }

    fn check_open_transitions(&self) -> Check {
        let mut open: BTreeMap<i64, usize> = BTreeMap::new();
        for transition in self.transitions.iter().filter(|t| t.is_open()) {
            *open.entry(transition.system_id).or_default() += 1;
        }
        let problems: Vec<String> = open
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(system_id, count)| {
                format!("system {system_id} has {count} open transitions")
            })
            .collect();
        accumulate(problems)
    }

    fn check_durations(&self) -> Check {
        let problems: Vec<String> = self
            .transitions
            .iter()
            .filter_map(|t| match (t.end_time, t.duration) {
                (None, None) => None,
                (None, Some(_)) => Some(format!("open transition {} has a duration", t.id)),
                (Some(end), duration) => {
                    let expected = get_duration(t.start_time, Some(end));
                    (duration != Some(expected)).then(|| {
                        format!(
                            "transition {} duration {duration:?} does not match {expected} ms",
                            t.id
                        )
                    })
                }
            })
            .collect();
        accumulate(problems)
    }
}

fn accumulate(problems: Vec<String>) -> Check {
    let checks: Vec<Check> = problems
        .into_iter()
        .map(|problem| Validation::fail(problem))
        .collect();
    Validation::all_vec(checks).map(|_| ())
}

impl MemoryStore {
    /// Capture the current contents of the store.
    pub async fn checkpoint(&self) -> StoreCheckpoint {
        let tables = self.read_tables().await;
        StoreCheckpoint {
            version: CHECKPOINT_VERSION,
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            states: tables.states,
            events: tables.events,
            systems: tables.systems.into_values().collect(),
            transitions: tables.transitions.into_values().flatten().collect(),
        }
    }

    /// Build a store from a validated checkpoint.
    pub fn restore(checkpoint: StoreCheckpoint) -> Result<Self, CheckpointError> {
        Self::restore_with(checkpoint, TRANSITION_STATE_NAME)
    }

    /// [`MemoryStore::restore`] for a reserved state named `transition_state`.
    pub fn restore_with(
        checkpoint: StoreCheckpoint,
        transition_state: &str,
    ) -> Result<Self, CheckpointError> {
        checkpoint.validate_with(transition_state)?;
        info!(
            checkpoint_id = %checkpoint.id,
            systems = checkpoint.systems.len(),
            transitions = checkpoint.transitions.len(),
            "restoring store from checkpoint"
        );
        Ok(Self::from_tables(Tables::from_parts(
            checkpoint.states,
            checkpoint.events,
            checkpoint.systems,
            checkpoint.transitions,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Event, State, SubjectRef};
    use crate::machine::{EndTransition, Tracker};
    use chrono::TimeDelta;

    fn system(id: i64, subject: Option<SubjectRef>) -> System {
        let now = Utc::now();
        System {
            id,
            name: None,
            subject,
            created: now,
            modified: now,
        }
    }

    fn transition(id: i64, system_id: i64, open: bool) -> Transition {
        let start = Utc::now();
        let end = start + TimeDelta::milliseconds(250);
        Transition {
            id,
            system_id,
            event: None,
            state: State {
                id: if open { 1 } else { 2 },
                name: if open { "Transition" } else { "Done" }.to_string(),
            },
            message: None,
            failed: false,
            start_time: start,
            end_time: (!open).then_some(end),
            duration: (!open).then_some(250),
        }
    }

    fn checkpoint(systems: Vec<System>, transitions: Vec<Transition>) -> StoreCheckpoint {
        StoreCheckpoint {
            version: CHECKPOINT_VERSION,
            id: "test".to_string(),
            timestamp: Utc::now(),
            states: vec![
                CatalogEntry {
                    id: 1,
                    name: "Transition".to_string(),
                },
                CatalogEntry {
                    id: 2,
                    name: "Done".to_string(),
                },
            ],
            events: Vec::new(),
            systems,
            transitions,
        }
    }

    #[test]
    fn valid_checkpoint_passes() {
        let cp = checkpoint(
            vec![system(1, None)],
            vec![transition(1, 1, false), transition(2, 1, true)],
        );
        assert!(cp.validate().is_ok());
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut cp = checkpoint(Vec::new(), Vec::new());
        cp.version = 99;
        assert!(matches!(
            cp.validate(),
            Err(CheckpointError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn validation_reports_every_problem() {
        let mut bad_duration = transition(3, 1, false);
        bad_duration.duration = Some(1);
        let cp = checkpoint(
            vec![
                system(1, Some(SubjectRef::new("order", 1))),
                system(2, Some(SubjectRef::new("order", 1))),
            ],
            vec![
                transition(1, 1, true),
                transition(2, 1, true),
                bad_duration,
                transition(4, 9, false),
            ],
        );

        match cp.validate() {
            Err(CheckpointError::ValidationFailed { problems }) => {
                assert_eq!(problems.len(), 4);
                assert!(problems.iter().any(|p| p.contains("more than one system")));
                assert!(problems.iter().any(|p| p.contains("2 open transitions")));
                assert!(problems.iter().any(|p| p.contains("does not match")));
                assert!(problems.iter().any(|p| p.contains("missing system 9")));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn protocol_impossible_shapes_are_rejected() {
        let mut ended_in_reserved = transition(1, 1, false);
        ended_in_reserved.state = State {
            id: 1,
            name: "Transition".to_string(),
        };
        let mut open_in_done = transition(2, 1, true);
        open_in_done.state = State {
            id: 2,
            name: "Done".to_string(),
        };
        let mut unknown_refs = transition(2, 1, false);
        unknown_refs.state = State {
            id: 7,
            name: "Gone".to_string(),
        };
        unknown_refs.event = Some(Event {
            id: 3,
            name: "Ship".to_string(),
        });
        let cp = checkpoint(
            vec![system(1, None), system(1, None)],
            vec![ended_in_reserved, open_in_done, unknown_refs],
        );

        match cp.validate() {
            Err(CheckpointError::ValidationFailed { problems }) => {
                assert_eq!(problems.len(), 6, "{problems:?}");
                assert!(problems.iter().any(|p| p.contains("duplicate system id 1")));
                assert!(problems.iter().any(|p| p.contains("duplicate transition id 2")));
                assert!(problems.iter().any(|p| p.contains("still in the reserved state")));
                assert!(problems.iter().any(|p| p.contains("open in state 'Done'")));
                assert!(problems.iter().any(|p| p.contains("unknown state 7")));
                assert!(problems.iter().any(|p| p.contains("unknown event 3")));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn ended_reserved_row_cannot_be_restored() {
        let mut stuck = transition(1, 1, false);
        stuck.state = State {
            id: 1,
            name: "Transition".to_string(),
        };
        let cp = checkpoint(vec![system(1, None)], vec![stuck]);

        assert!(matches!(
            MemoryStore::restore(cp),
            Err(CheckpointError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn reserved_state_follows_the_configured_name() {
        let cp = checkpoint(
            vec![system(1, None)],
            vec![transition(1, 1, false), transition(2, 1, true)],
        );

        assert!(cp.validate_with("Transition").is_ok());
        match cp.validate_with("Working") {
            Err(CheckpointError::ValidationFailed { problems }) => {
                assert_eq!(problems, vec!["transition 2 is open in state 'Transition'"]);
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn restored_open_transition_can_be_ended() {
        let cp = checkpoint(
            vec![system(5, None)],
            vec![transition(1, 5, false), transition(2, 5, true)],
        );
        let tracker = Tracker::new(MemoryStore::restore(cp).unwrap());
        let handle = tracker.system(5).await.unwrap();

        assert!(handle.in_transition().await.unwrap());
        let closed = handle
            .end_transition(EndTransition::new("Done"))
            .await
            .unwrap();
        assert_eq!(closed.id, 2);
        assert!(!handle.in_transition().await.unwrap());
        assert_eq!(handle.len().await.unwrap(), 2);
    }

    #[test]
    fn json_and_binary_formats_agree() {
        let cp = checkpoint(vec![system(1, None)], vec![transition(1, 1, false)]);

        let from_json = StoreCheckpoint::from_json(&cp.to_json().unwrap()).unwrap();
        let from_bytes = StoreCheckpoint::from_bytes(&cp.to_bytes().unwrap()).unwrap();

        assert_eq!(from_json.transitions, cp.transitions);
        assert_eq!(from_bytes.transitions, cp.transitions);
        assert_eq!(from_bytes.systems, from_json.systems);
    }

    #[test]
    fn corrupt_bytes_fail_to_deserialize() {
        assert!(matches!(
            StoreCheckpoint::from_bytes(&[0xff, 0x01]),
            Err(CheckpointError::DeserializationFailed(_))
        ));
    }

    #[tokio::test]
    async fn restored_store_keeps_open_transitions() {
        use crate::store::TransitionStore;

        let cp = checkpoint(
            vec![system(5, None)],
            vec![transition(1, 5, false), transition(2, 5, true)],
        );
        let store = MemoryStore::restore(cp).unwrap();

        assert_eq!(store.count_transitions(5).await.unwrap(), 2);
        assert!(store.has_open_transition(5, 1).await.unwrap());

        let system = store.insert_system(Some("next"), None).await.unwrap();
        assert_eq!(system.id, 6);

        let round_trip = store.checkpoint().await;
        assert_eq!(round_trip.transitions.len(), 2);
        assert_eq!(round_trip.version, CHECKPOINT_VERSION);
    }
}
