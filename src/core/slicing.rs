//! Index and slice arithmetic over an ascending transition history.
//!
//! Storage engines rarely accept negative offsets, so every index or slice is
//! translated here into a plain `(order, offset, limit)` fetch. Tail-relative
//! requests become descending fetches whose rows the caller reverses; the
//! total count is only needed when a non-negative start meets a negative stop.
//!
//! Semantics follow negative-index-capable sequences, with these deliberate
//! restrictions:
//! - a step other than 1 is an index error
//! - `[:]` is a value error (iterate instead of cloning the whole history)
//! - a negative start with a non-negative stop is empty
//!
//! A non-negative start with a negative stop (`[1:-1]`) is not compared
//! directly; the stop is first translated against the total.

use crate::error::{Result, StsError};
use serde::{Deserialize, Serialize};
use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

/// Row ordering by start time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Ascending,
    Descending,
}

/// A concrete range fetch against the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchPlan {
    pub order: Order,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl FetchPlan {
    fn ascending(offset: usize, limit: Option<usize>) -> Self {
        Self {
            order: Order::Ascending,
            offset,
            limit,
        }
    }

    fn descending(offset: usize, limit: Option<usize>) -> Self {
        Self {
            order: Order::Descending,
            offset,
            limit,
        }
    }

    /// Rows fetched in descending order must be reversed before use.
    pub fn reverses(&self) -> bool {
        self.order == Order::Descending
    }
}

/// Outcome of planning a slice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlicePlan {
    Empty,
    Fetch(FetchPlan),
}

/// A slice plan that may still depend on the total number of rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SliceShape {
    Ready(SlicePlan),
    /// Forward slice from `start` up to `back` rows before the end.
    NeedsTotal { start: usize, back: usize },
}

impl SliceShape {
    /// Resolve against the total row count.
    pub fn resolve(self, total: usize) -> SlicePlan {
        match self {
            Self::Ready(plan) => plan,
            Self::NeedsTotal { start, back } => {
                let stop = total.saturating_sub(back);
                forward(start, Some(stop))
            }
        }
    }
}

/// Plan a single-element lookup. Negative indexes count from the end.
pub fn plan_index(index: i64) -> FetchPlan {
    if index >= 0 {
        FetchPlan::ascending(to_usize(index), Some(1))
    } else {
        FetchPlan::descending(to_usize(-(index + 1)), Some(1))
    }
}

/// `[start:stop:step]` bounds over a transition history.
///
/// Standard ranges convert directly: `..3`, `-3..`, `1..3`, `..-3`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HistorySlice {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl HistorySlice {
    pub fn new(start: Option<i64>, stop: Option<i64>) -> Self {
        Self {
            start,
            stop,
            step: None,
        }
    }

    pub fn step(mut self, step: i64) -> Self {
        self.step = Some(step);
        self
    }

    /// Translate these bounds into a fetch, or reject the shape.
    pub fn plan(&self) -> Result<SliceShape> {
        if let Some(step) = self.step {
            if step != 1 {
                return Err(StsError::Index(format!(
                    "slice step {step} is not supported"
                )));
            }
        }

        let (start, stop) = match (self.start, self.stop) {
            (None, None) => {
                return Err(StsError::Value(
                    "cannot slice the full history, iterate it instead".to_string(),
                ))
            }
            (start, stop) => (start, stop),
        };

        if let (Some(start), Some(stop)) = (start, stop) {
            let same_side = (start < 0) == (stop < 0);
            if (same_side && stop <= start) || (start < 0 && stop >= 0) {
                return Ok(SliceShape::Ready(SlicePlan::Empty));
            }
        }

        let shape = match (start, stop) {
            // last `-start` rows, optionally trimmed by `-stop` rows at the tail
            (Some(start), stop) if start < 0 => {
                let take = magnitude(start);
                let back = stop.map_or(0, magnitude);
                SliceShape::Ready(if take > back {
                    SlicePlan::Fetch(FetchPlan::descending(back, Some(take - back)))
                } else {
                    SlicePlan::Empty
                })
            }
            (start, Some(stop)) if stop < 0 => SliceShape::NeedsTotal {
                start: to_usize(start.unwrap_or(0)),
                back: magnitude(stop),
            },
            (start, stop) => SliceShape::Ready(forward(
                to_usize(start.unwrap_or(0)),
                stop.map(to_usize),
            )),
        };

        Ok(shape)
    }
}

impl From<Range<i64>> for HistorySlice {
    fn from(range: Range<i64>) -> Self {
        Self::new(Some(range.start), Some(range.end))
    }
}

impl From<RangeFrom<i64>> for HistorySlice {
    fn from(range: RangeFrom<i64>) -> Self {
        Self::new(Some(range.start), None)
    }
}

impl From<RangeTo<i64>> for HistorySlice {
    fn from(range: RangeTo<i64>) -> Self {
        Self::new(None, Some(range.end))
    }
}

impl From<RangeFull> for HistorySlice {
    fn from(_: RangeFull) -> Self {
        Self::new(None, None)
    }
}

fn forward(start: usize, stop: Option<usize>) -> SlicePlan {
    match stop {
        Some(stop) if stop <= start => SlicePlan::Empty,
        Some(stop) => SlicePlan::Fetch(FetchPlan::ascending(start, Some(stop - start))),
        None => SlicePlan::Fetch(FetchPlan::ascending(start, None)),
    }
}

/// Callers only pass values already known to be non-negative.
fn to_usize(value: i64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

fn magnitude(value: i64) -> usize {
    usize::try_from(value.unsigned_abs()).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(slice: impl Into<HistorySlice>) -> SlicePlan {
        match slice.into().plan().unwrap() {
            SliceShape::Ready(plan) => plan,
            other => panic!("expected a ready plan, got {other:?}"),
        }
    }

    #[test]
    fn leading_slice_is_a_forward_fetch() {
        assert_eq!(
            ready(..3_i64),
            SlicePlan::Fetch(FetchPlan::ascending(0, Some(3)))
        );
        assert_eq!(
            ready(1_i64..3),
            SlicePlan::Fetch(FetchPlan::ascending(1, Some(2)))
        );
        assert_eq!(ready(2_i64..), SlicePlan::Fetch(FetchPlan::ascending(2, None)));
    }

    #[test]
    fn negative_start_fetches_from_the_tail() {
        let plan = ready(-3_i64..);
        assert_eq!(plan, SlicePlan::Fetch(FetchPlan::descending(0, Some(3))));

        let plan = ready(-4_i64..-1);
        assert_eq!(plan, SlicePlan::Fetch(FetchPlan::descending(1, Some(3))));
    }

    #[test]
    fn negative_stop_needs_the_total() {
        let shape = HistorySlice::from(..-3_i64).plan().unwrap();
        assert_eq!(shape, SliceShape::NeedsTotal { start: 0, back: 3 });
        assert_eq!(
            shape.resolve(5),
            SlicePlan::Fetch(FetchPlan::ascending(0, Some(2)))
        );
        assert_eq!(shape.resolve(2), SlicePlan::Empty);

        let shape = HistorySlice::from(1_i64..-1).plan().unwrap();
        assert_eq!(
            shape.resolve(5),
            SlicePlan::Fetch(FetchPlan::ascending(1, Some(3)))
        );
    }

    #[test]
    fn degenerate_slices_are_empty() {
        assert_eq!(ready(-1_i64..-3), SlicePlan::Empty);
        assert_eq!(ready(1_i64..1), SlicePlan::Empty);
        assert_eq!(ready(3_i64..1), SlicePlan::Empty);
        assert_eq!(ready(-2_i64..3), SlicePlan::Empty);
        assert_eq!(ready(..0_i64), SlicePlan::Empty);
    }

    #[test]
    fn full_slice_is_a_value_error() {
        let err = HistorySlice::from(..).plan().unwrap_err();
        assert!(matches!(err, StsError::Value(_)));
    }

    #[test]
    fn stepped_slice_is_an_index_error() {
        let err = HistorySlice::from(0_i64..4).step(2).plan().unwrap_err();
        assert!(matches!(err, StsError::Index(_)));

        // an explicit unit step is fine
        assert!(HistorySlice::from(0_i64..4).step(1).plan().is_ok());
    }

    #[test]
    fn index_plans() {
        assert_eq!(plan_index(3), FetchPlan::ascending(3, Some(1)));
        assert_eq!(plan_index(-1), FetchPlan::descending(0, Some(1)));
        assert_eq!(plan_index(-5), FetchPlan::descending(4, Some(1)));
        assert!(plan_index(-1).reverses());
    }
}
