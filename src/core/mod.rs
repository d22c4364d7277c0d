//! Core transition-history types and pure logic.
//!
//! This module holds the record types and the arithmetic that does not touch
//! storage:
//! - State / Event catalog vocabulary and the tagged `Lookup` input
//! - System and Transition records
//! - Duration computation and natural-language formatting
//! - Index/slice planning over an ascending history
//!
//! Everything here is pure; the `machine` module is the shell that runs it
//! against a store.

mod duration;
mod slicing;
mod system;
mod transition;
mod vocabulary;

pub use duration::{get_duration, get_natural_duration, shorten_units, timesince};
pub use slicing::{plan_index, FetchPlan, HistorySlice, Order, SlicePlan, SliceShape};
pub use system::{SubjectRef, System};
pub use transition::{NewTransition, Transition};
pub use vocabulary::{
    CatalogEntry, CatalogKind, Event, Lookup, State, Vocabulary, TRANSITION_STATE_ID,
    TRANSITION_STATE_NAME,
};
