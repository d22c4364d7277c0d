//! Read-only presentation of systems and their histories.
//!
//! Views serialize with serde for whatever UI or API sits on top; nothing
//! here writes to the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{get_natural_duration, Transition};
use crate::error::{Result, StsError};
use crate::machine::{SystemHandle, Tracker};
use crate::store::TransitionStore;

/// One transition as shown to a reader.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionView {
    pub id: i64,
    pub state: String,
    pub event: Option<String>,
    pub message: Option<String>,
    pub failed: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Stored duration, or elapsed so far while open
    pub duration: i64,
    pub natural_duration: String,
    /// Gap since the previous transition ended (or started, if still open)
    pub delay: Option<String>,
}

impl TransitionView {
    pub fn new(transition: &Transition, previous: Option<&Transition>) -> Self {
        let delay = previous.map(|previous| {
            let since = previous.end_time.unwrap_or(previous.start_time);
            get_natural_duration(since, Some(transition.start_time), false)
        });

        Self {
            id: transition.id,
            state: transition.state.name.clone(),
            event: transition.event.as_ref().map(|e| e.name.clone()),
            message: transition.message.clone(),
            failed: transition.failed,
            start_time: transition.start_time,
            end_time: transition.end_time,
            duration: transition.current_duration(),
            natural_duration: transition.natural_duration(false),
            delay,
        }
    }

    /// Views for an ascending history, each with its delay from the one before.
    pub fn from_history(transitions: &[Transition]) -> Vec<Self> {
        let mut previous = None;
        transitions
            .iter()
            .map(|transition| {
                let view = Self::new(transition, previous);
                previous = Some(transition);
                view
            })
            .collect()
    }
}

/// One system as shown to a reader.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemView {
    pub id: i64,
    pub name: String,
    /// Kind tag of the subject, title-cased; `None` for free-standing systems
    pub subject_kind: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub in_transition: bool,
    pub failed_last_transition: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transitions: Option<Vec<TransitionView>>,
}

impl<S: TransitionStore> SystemHandle<S> {
    /// Render this system, optionally with its full history.
    pub async fn view(&self, with_transitions: bool) -> Result<SystemView> {
        let system = self.store().get_system(self.id()).await?;
        let name = system
            .subject
            .as_ref()
            .filter(|_| system.name.is_none())
            .and_then(|subject| self.tracker().subjects().resolve(subject))
            .unwrap_or_else(|| system.label());

        let transitions = if with_transitions {
            Some(TransitionView::from_history(&self.transitions().await?))
        } else {
            None
        };

        Ok(SystemView {
            id: system.id,
            name,
            subject_kind: system.subject.as_ref().map(|s| title_case(&s.kind)),
            created: system.created,
            modified: system.modified,
            in_transition: self.in_transition().await?,
            failed_last_transition: self.failed_last_transition().await?,
            transitions,
        })
    }

    /// True when the subject's resolver no longer finds it.
    pub fn is_orphaned(&self) -> bool {
        self.system()
            .subject
            .as_ref()
            .is_some_and(|subject| self.tracker().subjects().is_orphaned(subject))
    }
}

impl<S: TransitionStore> Tracker<S> {
    /// Summaries of every system with history, most recently modified first.
    ///
    /// Systems whose subject no longer exists are left out.
    pub async fn render_systems(&self) -> Result<Vec<SystemView>> {
        let mut views = Vec::new();
        for system in self.systems().await? {
            if system.is_orphaned() || system.is_empty().await? {
                continue;
            }
            views.push(system.view(false).await?);
        }
        Ok(views)
    }

    /// One system with its full history. Systems without history are not shown.
    pub async fn render_system(&self, id: i64) -> Result<SystemView> {
        let system = self.system(id).await?;
        if system.is_empty().await? {
            return Err(StsError::NotFound {
                kind: "system",
                key: id.to_string(),
            });
        }
        system.view(true).await
    }
}

fn title_case(kind: &str) -> String {
    kind.split(|c: char| c == ' ' || c == '_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
