//! STS: state transition history for arbitrary subjects
//!
//! Every subject (a domain object referenced by kind and identifier, or a
//! free-standing named system) owns a System, and every change of that
//! subject's state is recorded as a Transition: the triggering event, the
//! resulting state, start and end times and the duration in milliseconds.
//!
//! The crate follows a "pure core, imperative shell" layout. Record types,
//! duration arithmetic and history slicing live in [`core`] and never touch
//! storage; [`machine`] runs them against a [`store::TransitionStore`].
//!
//! # Core Concepts
//!
//! - **One-phase transitions** record a complete state change at once
//! - **Long-running transitions** are opened in the reserved `Transition`
//!   state and closed later; a system has at most one open transition
//! - **History** is a sequence ascending by start time with negative
//!   indexes and slices
//! - **Vocabulary**: states and events are catalog entries fetched or
//!   created by name
//!
//! # Example
//!
//! ```rust
//! use sts::{EndTransition, StartTransition, Tracker, TransitionRequest};
//! use sts::core::SubjectRef;
//! use sts::store::MemoryStore;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let tracker = Tracker::new(MemoryStore::new());
//! let build = tracker.for_subject(SubjectRef::new("build", 7)).await.unwrap();
//!
//! build.transition(TransitionRequest::new("Queued").event("Submit")).await.unwrap();
//! build.start_transition(StartTransition::new().event("Compile")).await.unwrap();
//! build.end_transition(EndTransition::new("Compiled")).await.unwrap();
//!
//! let last_two = build.slice(-2_i64..).await.unwrap();
//! assert_eq!(last_two[1].state.name, "Compiled");
//! assert_eq!(build.get(-1).await.unwrap().to_string(), "Compile => Compiled");
//! # });
//! ```

pub mod checkpoint;
pub mod config;
pub mod core;
pub mod enforcement;
pub mod error;
pub mod machine;
pub mod registry;
pub mod report;
pub mod store;
pub mod subject;

// Re-export commonly used types
pub use config::TrackerConfig;
pub use core::{Event, HistorySlice, Lookup, State, SubjectRef, System, Transition};
pub use error::{Result, StsError};
pub use machine::{
    EndTransition, ScopeError, ScopedTransition, StartTransition, SystemHandle, Tracker,
    TransitionRequest,
};
pub use report::{SystemView, TransitionView};
