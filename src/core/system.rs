//! System records and subject references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tagged reference to an external subject: a kind tag plus its identifier.
///
/// At most one system exists per subject reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    pub kind: String,
    pub id: i64,
}

impl SubjectRef {
    pub fn new(kind: impl Into<String>, id: i64) -> Self {
        Self {
            kind: kind.into(),
            id,
        }
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.kind, self.id)
    }
}

/// The transition history owner for one subject or one named, free-standing system.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct System {
    pub id: i64,
    pub name: Option<String>,
    pub subject: Option<SubjectRef>,
    pub created: DateTime<Utc>,
    /// Bumped whenever a transition is written
    pub modified: DateTime<Utc>,
}

impl System {
    /// Display label: explicit name, else the subject, else the identifier.
    pub fn label(&self) -> String {
        match (&self.name, &self.subject) {
            (Some(name), _) => name.clone(),
            (None, Some(subject)) => subject.to_string(),
            (None, None) => format!("System #{}", self.id),
        }
    }
}

impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
