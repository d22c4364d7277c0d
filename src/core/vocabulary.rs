//! Named catalog vocabulary: states and events.
//!
//! Both catalogs share one shape (identifier + name) and one lifecycle:
//! entries are created lazily on first use of a name and never deleted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the reserved "currently transitioning" state, fixed when the
/// catalog is seeded.
pub const TRANSITION_STATE_ID: i64 = 1;

/// Default name of the reserved "currently transitioning" state.
pub const TRANSITION_STATE_NAME: &str = "Transition";

/// Which catalog an entry belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CatalogKind {
    State,
    Event,
}

impl CatalogKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Event => "event",
        }
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single catalog row as the persistence layer stores it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub name: String,
}

/// Shared behaviour of catalog-backed vocabulary types.
pub trait Vocabulary: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    const KIND: CatalogKind;

    fn from_entry(entry: CatalogEntry) -> Self;

    fn id(&self) -> i64;

    fn name(&self) -> &str;
}

/// A state a transition can result in.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct State {
    pub id: i64,
    pub name: String,
}

/// An event that triggers a state change.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub name: String,
}

macro_rules! impl_vocabulary {
    ($ty:ident, $kind:expr) => {
        impl Vocabulary for $ty {
            const KIND: CatalogKind = $kind;

            fn from_entry(entry: CatalogEntry) -> Self {
                Self {
                    id: entry.id,
                    name: entry.name,
                }
            }

            fn id(&self) -> i64 {
                self.id
            }

            fn name(&self) -> &str {
                &self.name
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.name)
            }
        }

        impl From<$ty> for Lookup<$ty> {
            fn from(value: $ty) -> Self {
                Lookup::Record(value)
            }
        }

        impl From<&$ty> for Lookup<$ty> {
            fn from(value: &$ty) -> Self {
                Lookup::Record(value.clone())
            }
        }
    };
}

impl_vocabulary!(State, CatalogKind::State);
impl_vocabulary!(Event, CatalogKind::Event);

/// How a caller refers to a catalog entry.
///
/// An existing record is used as-is, an identifier must already exist, and a
/// name is fetched or created.
#[derive(Clone, Debug, PartialEq)]
pub enum Lookup<T> {
    Record(T),
    Id(i64),
    Name(String),
}

impl<T> From<i64> for Lookup<T> {
    fn from(id: i64) -> Self {
        Lookup::Id(id)
    }
}

impl<T> From<&str> for Lookup<T> {
    fn from(name: &str) -> Self {
        Lookup::Name(name.to_string())
    }
}

impl<T> From<String> for Lookup<T> {
    fn from(name: String) -> Self {
        Lookup::Name(name)
    }
}

impl<T> From<&String> for Lookup<T> {
    fn from(name: &String) -> Self {
        Lookup::Name(name.clone())
    }
}
