//! Validation-based enforcement of the transition protocol.
//!
//! Every rule that applies to a request is evaluated and ALL violations are
//! reported together, using Stillwater's `Validation` to accumulate them
//! instead of failing at the first broken rule.
//!
//! # Example
//!
//! ```rust
//! use sts::core::State;
//! use sts::enforcement::{check, Operation, ProtocolContext};
//!
//! let sentinel = State { id: 1, name: "Transition".to_string() };
//! let context = ProtocolContext {
//!     operation: Operation::Immediate,
//!     in_transition: true,
//!     target: None,
//!     sentinel: &sentinel,
//! };
//!
//! assert!(check(&context).is_failure());
//! ```

pub mod context;
pub mod rules;
pub mod violations;

pub use context::{Operation, ProtocolContext};
pub use rules::{check, enforce};
pub use violations::Violation;
