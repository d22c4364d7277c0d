//! Resolution of tagged subject references.
//!
//! A [`SubjectRef`] only names a subject by kind and identifier. Callers
//! register one resolver per kind; the tracker uses them to label systems and
//! to skip systems whose subject no longer exists.

use crate::core::SubjectRef;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type Resolver = Arc<dyn Fn(i64) -> Option<String> + Send + Sync>;

/// Lookup table from subject kind to resolver.
///
/// # Example
///
/// ```rust
/// use sts::core::SubjectRef;
/// use sts::subject::SubjectRegistry;
///
/// let subjects = SubjectRegistry::new()
///     .with("order", |id| (id < 100).then(|| format!("Order {id}")));
///
/// assert_eq!(
///     subjects.resolve(&SubjectRef::new("order", 7)).as_deref(),
///     Some("Order 7")
/// );
/// assert!(subjects.is_orphaned(&SubjectRef::new("order", 500)));
/// assert!(!subjects.is_orphaned(&SubjectRef::new("invoice", 1)));
/// ```
#[derive(Clone, Default)]
pub struct SubjectRegistry {
    resolvers: HashMap<String, Resolver>,
}

impl SubjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolver returning a subject's display label, or `None`
    /// when the subject is gone. Replaces any resolver for the same kind.
    pub fn register<F>(&mut self, kind: impl Into<String>, resolver: F) -> &mut Self
    where
        F: Fn(i64) -> Option<String> + Send + Sync + 'static,
    {
        self.resolvers.insert(kind.into(), Arc::new(resolver));
        self
    }

    pub fn with<F>(mut self, kind: impl Into<String>, resolver: F) -> Self
    where
        F: Fn(i64) -> Option<String> + Send + Sync + 'static,
    {
        self.register(kind, resolver);
        self
    }

    pub fn knows(&self, kind: &str) -> bool {
        self.resolvers.contains_key(kind)
    }

    /// Display label of the referenced subject. `None` if the kind has no
    /// resolver or the subject no longer exists.
    pub fn resolve(&self, subject: &SubjectRef) -> Option<String> {
        self.resolvers
            .get(&subject.kind)
            .and_then(|resolver| resolver(subject.id))
    }

    /// True when a resolver exists for the kind and cannot find the subject.
    ///
    /// Unregistered kinds are never considered orphaned.
    pub fn is_orphaned(&self, subject: &SubjectRef) -> bool {
        self.knows(&subject.kind) && self.resolve(subject).is_none()
    }
}

impl fmt::Debug for SubjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.resolvers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("SubjectRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn register_replaces_previous_resolver() {
        let mut subjects = SubjectRegistry::new();
        subjects.register("user", |_| Some("old".to_string()));
        subjects.register("user", |id| Some(format!("user-{id}")));

        assert_eq!(
            subjects.resolve(&SubjectRef::new("user", 3)).as_deref(),
            Some("user-3")
        );
    }

    #[test]
    fn unknown_kind_resolves_to_nothing_but_is_not_orphaned() {
        let subjects = SubjectRegistry::new();
        let subject = SubjectRef::new("ghost", 1);
        assert_eq!(subjects.resolve(&subject), None);
        assert!(!subjects.is_orphaned(&subject));
        assert!(!subjects.knows("ghost"));
    }

    #[test]
    fn registered_kind_is_orphaned_only_when_the_subject_is_gone() {
        let subjects =
            SubjectRegistry::new().with("order", |id| (id == 1).then(|| "first".to_string()));

        assert!(subjects.knows("order"));
        assert!(!subjects.is_orphaned(&SubjectRef::new("order", 1)));
        assert!(subjects.is_orphaned(&SubjectRef::new("order", 2)));
    }

    #[test]
    fn clones_share_resolvers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let subjects = SubjectRegistry::new().with("doc", move |id| {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(id.to_string())
        });

        let copy = subjects.clone();
        copy.resolve(&SubjectRef::new("doc", 1));
        subjects.resolve(&SubjectRef::new("doc", 2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn debug_lists_registered_kinds() {
        let subjects = SubjectRegistry::new()
            .with("b", |_| None)
            .with("a", |_| None);
        assert_eq!(format!("{subjects:?}"), r#"SubjectRegistry { kinds: ["a", "b"] }"#);
    }
}
