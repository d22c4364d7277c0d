//! Sequence access to a system's transitions, ascending by start time.

use futures::stream::{self, Stream, TryStreamExt};
use std::sync::Arc;

use super::SystemHandle;
use crate::core::{plan_index, FetchPlan, HistorySlice, Order, SlicePlan, SliceShape, Transition};
use crate::error::{Result, StsError};
use crate::store::TransitionStore;

impl<S: TransitionStore> SystemHandle<S> {
    /// Number of recorded transitions.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.store().count_transitions(self.id()).await?)
    }

    /// True without history. The system itself exists either way.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// The transition at `index`; negative indexes count from the end.
    pub async fn get(&self, index: i64) -> Result<Transition> {
        self.fetch(plan_index(index))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StsError::Index(format!("transition index {index} out of range")))
    }

    /// Transitions within the slice bounds, ascending.
    pub async fn slice(&self, slice: impl Into<HistorySlice>) -> Result<Vec<Transition>> {
        let plan = match slice.into().plan()? {
            SliceShape::Ready(plan) => plan,
            shape @ SliceShape::NeedsTotal { .. } => shape.resolve(self.len().await?),
        };

        match plan {
            SlicePlan::Empty => Ok(Vec::new()),
            SlicePlan::Fetch(fetch) => self.fetch(fetch).await,
        }
    }

    /// The whole history, ascending.
    pub async fn transitions(&self) -> Result<Vec<Transition>> {
        Ok(self
            .store()
            .fetch_transitions(self.id(), Order::Ascending, 0, None)
            .await?)
    }

    /// Lazily page through the history, `page_size` rows per query.
    ///
    /// Each call starts over from the first transition.
    pub fn stream(&self) -> impl Stream<Item = Result<Transition>> + Send + 'static {
        let store = self.tracker().shared_store();
        let system_id = self.id();
        let page_size = self.tracker().config().page_size;

        stream::try_unfold(Some(0), move |cursor| {
            next_page(Arc::clone(&store), system_id, cursor, page_size)
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, StsError>)))
        .try_flatten()
    }

    async fn fetch(&self, plan: FetchPlan) -> Result<Vec<Transition>> {
        let mut rows = self
            .store()
            .fetch_transitions(self.id(), plan.order, plan.offset, plan.limit)
            .await?;
        if plan.reverses() {
            rows.reverse();
        }
        Ok(rows)
    }
}

async fn next_page<S: TransitionStore>(
    store: Arc<S>,
    system_id: i64,
    cursor: Option<usize>,
    page_size: usize,
) -> Result<Option<(Vec<Transition>, Option<usize>)>> {
    let Some(offset) = cursor else {
        return Ok(None);
    };

    let page = store
        .fetch_transitions(system_id, Order::Ascending, offset, Some(page_size))
        .await?;
    if page.is_empty() {
        return Ok(None);
    }

    // a short page is the last one
    let next = (page.len() == page_size).then_some(offset + page.len());
    Ok(Some((page, next)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::core::SubjectRef;
    use crate::machine::{Tracker, TransitionRequest};
    use crate::store::MemoryStore;
    use chrono::{TimeDelta, Utc};
    use futures::TryStreamExt;

    async fn counted(n: usize, page_size: usize) -> SystemHandle<MemoryStore> {
        let config = TrackerConfig {
            page_size,
            ..TrackerConfig::default()
        };
        let tracker = Tracker::with_config(MemoryStore::new(), config).unwrap();
        let system = tracker
            .for_subject(SubjectRef::new("counter", 1))
            .await
            .unwrap();

        let base = Utc::now();
        for i in 0..n {
            let at = base + TimeDelta::seconds(i as i64);
            system
                .transition(
                    TransitionRequest::new(format!("Count {}", i + 1))
                        .start_time(at)
                        .end_time(at),
                )
                .await
                .unwrap();
        }
        system
    }

    fn names(transitions: &[Transition]) -> Vec<&str> {
        transitions.iter().map(|t| t.state.name.as_str()).collect()
    }

    #[tokio::test]
    async fn index_from_either_end() {
        let system = counted(5, 100).await;
        assert_eq!(system.get(0).await.unwrap().state.name, "Count 1");
        assert_eq!(system.get(-2).await.unwrap().state.name, "Count 4");
        assert!(matches!(system.get(-6).await, Err(StsError::Index(_))));
    }

    #[tokio::test]
    async fn non_negative_start_with_negative_stop_uses_the_total() {
        let system = counted(5, 100).await;
        let middle = system.slice(HistorySlice::new(Some(1), Some(-1))).await.unwrap();
        assert_eq!(names(&middle), vec!["Count 2", "Count 3", "Count 4"]);
    }

    #[tokio::test]
    async fn negative_window_stays_ascending() {
        let system = counted(5, 100).await;
        let window = system.slice(-4_i64..-1).await.unwrap();
        assert_eq!(names(&window), vec!["Count 2", "Count 3", "Count 4"]);
    }

    #[tokio::test]
    async fn empty_history_is_still_a_system() {
        let system = counted(0, 100).await;
        assert!(system.is_empty().await.unwrap());
        assert!(system.slice(..3_i64).await.unwrap().is_empty());
        assert!(matches!(system.get(0).await, Err(StsError::Index(_))));
    }

    #[tokio::test]
    async fn stream_pages_through_everything_and_restarts() {
        let system = counted(7, 3).await;

        let first: Vec<Transition> = system.stream().try_collect().await.unwrap();
        assert_eq!(first.len(), 7);
        assert_eq!(first, system.transitions().await.unwrap());

        let again: Vec<Transition> = system.stream().try_collect().await.unwrap();
        assert_eq!(again, first);
    }

    #[tokio::test]
    async fn stream_of_exact_pages_terminates() {
        let system = counted(6, 3).await;
        let all: Vec<Transition> = system.stream().try_collect().await.unwrap();
        assert_eq!(names(&all).last(), Some(&"Count 6"));
        assert_eq!(all.len(), 6);
    }
}
