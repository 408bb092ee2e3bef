//! Resolvers that record how often they run.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cfgraph_core::{BoxError, Resolver};
use serde_json::Value;

/// Shared invocation counter.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// A function resolver returning `value`, and the counter it bumps on every
/// invocation.
///
/// ```
/// use cfgraph_test_utils::counting_resolver;
///
/// let (resolver, calls) = counting_resolver("x");
/// assert_eq!(calls.get(), 0);
/// # drop(resolver);
/// ```
pub fn counting_resolver(value: impl Into<Value>) -> (Resolver, CallCounter) {
    let value = value.into();
    let counter = CallCounter::default();
    let calls = counter.clone();
    let resolver = Resolver::from_sync_fn(move |_ctx| {
        calls.bump();
        Ok::<_, BoxError>(value.clone())
    });
    (resolver, counter)
}
