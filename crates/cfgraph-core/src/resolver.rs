//! Lazy value resolvers
//!
//! A [`Resolver`] produces one item's value. It is either a static value,
//! a function (which may hand back another resolver), a set of labeled
//! branches, a pick from another service, or a plugin lookup. Resolvers
//! with a cache key consult the context's [`CacheProvider`] first and write
//! successful values back.
//!
//! Errors and panics from resolve functions are recorded as
//! [`ResolutionError`]s on the resolver; they never propagate out of a pass.
//!
//! [`CacheProvider`]: crate::cache::CacheProvider

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde_json::Value;

use crate::context::ResolverContext;
use crate::error::ResolutionError;

/// Error type resolve functions may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Maps a picked value before it is stored on the picking item.
pub type TransformFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

type ResolveFn =
    Arc<dyn Fn(ResolverContext) -> BoxFuture<Result<ResolverOutput, BoxError>> + Send + Sync>;
type ConditionFn = Arc<dyn Fn(&ResolverContext) -> bool + Send + Sync>;
type CacheKeyFn = Arc<dyn Fn(&ResolverContext) -> Option<String> + Send + Sync>;

/// Label that marks the default case in [`Resolver::switch_by`].
pub const DEFAULT_BRANCH_LABEL: &str = "_default";

/// What a resolve function hands back.
pub enum ResolverOutput {
    Value(Value),
    /// Another resolver to unwind before a value is available
    Resolver(Resolver),
}

impl From<Value> for ResolverOutput {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Resolver> for ResolverOutput {
    fn from(resolver: Resolver) -> Self {
        Self::Resolver(resolver)
    }
}

#[derive(Clone)]
enum Definition {
    Static(Value),
    Function(ResolveFn),
    Branches(Vec<Branch>),
    Pick {
        service: String,
        key: String,
        transform: Option<TransformFn>,
    },
    Plugin {
        instance_id: String,
        reference: Value,
    },
}

#[derive(Clone)]
enum CacheKey {
    Static(String),
    Computed(CacheKeyFn),
}

impl CacheKey {
    fn compute(&self, ctx: &ResolverContext) -> Option<String> {
        match self {
            Self::Static(key) => Some(key.clone()),
            Self::Computed(f) => f(ctx),
        }
    }
}

/// One labeled option of a branching resolver.
#[derive(Clone)]
pub struct Branch {
    label: String,
    condition: Option<ConditionFn>,
    is_default: bool,
    resolver: Resolver,
    is_active: bool,
}

impl Branch {
    /// A branch selected when `condition` holds.
    pub fn when<F>(label: impl Into<String>, condition: F, resolver: impl Into<Resolver>) -> Self
    where
        F: Fn(&ResolverContext) -> bool + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            condition: Some(Arc::new(condition)),
            is_default: false,
            resolver: resolver.into(),
            is_active: false,
        }
    }

    /// The fallback used when no other branch matches.
    pub fn default_branch(label: impl Into<String>, resolver: impl Into<Resolver>) -> Self {
        Self {
            label: label.into(),
            condition: None,
            is_default: true,
            resolver: resolver.into(),
            is_active: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// Whether this branch was selected in the last resolution.
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }
}

/// Observable outcome of the last resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolverState {
    pub is_resolved: bool,
    pub resolved_value: Option<Value>,
    pub resolution_error: Option<ResolutionError>,
    pub is_using_cache: bool,
    /// Dotted labels of the branches leading to this resolver
    pub branch_path: Option<String>,
}

/// A lazy, cacheable computation producing one value.
///
/// # Example
///
/// ```
/// use cfgraph_core::{Resolver, ResolverContext};
/// use serde_json::json;
///
/// # tokio_test_block(async {
/// let mut resolver = Resolver::switch_by("APP_ENV", [
///     ("dev", Resolver::static_value("x")),
///     ("_default", Resolver::static_value("y")),
/// ]);
/// let ctx = ResolverContext::new("api", "MODE").with_value("APP_ENV", json!("dev"));
/// assert_eq!(resolver.resolve(&ctx).await.unwrap(), json!("x"));
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct Resolver {
    definition: Definition,
    cache_key: Option<CacheKey>,
    state: ResolverState,
    nested: Option<Box<Resolver>>,
    /// Sibling item a switch branches on
    switch_key: Option<String>,
}

impl Resolver {
    fn with_definition(definition: Definition) -> Self {
        Self {
            definition,
            cache_key: None,
            state: ResolverState::default(),
            nested: None,
            switch_key: None,
        }
    }

    pub fn static_value(value: impl Into<Value>) -> Self {
        Self::with_definition(Definition::Static(value.into()))
    }

    /// Resolve by awaiting `f`. The output may be a plain value or another
    /// resolver.
    pub fn from_fn<F, Fut, O>(f: F) -> Self
    where
        F: Fn(ResolverContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, BoxError>> + Send + 'static,
        O: Into<ResolverOutput>,
    {
        let resolve: ResolveFn = Arc::new(move |ctx| {
            let fut = f(ctx);
            Box::pin(async move { fut.await.map(Into::into) })
        });
        Self::with_definition(Definition::Function(resolve))
    }

    pub fn from_sync_fn<F, O>(f: F) -> Self
    where
        F: Fn(&ResolverContext) -> Result<O, BoxError> + Send + Sync + 'static,
        O: Into<ResolverOutput>,
    {
        let resolve: ResolveFn = Arc::new(move |ctx| {
            let output = f(&ctx).map(Into::into);
            Box::pin(std::future::ready(output))
        });
        Self::with_definition(Definition::Function(resolve))
    }

    pub fn branches(branches: Vec<Branch>) -> Self {
        Self::with_definition(Definition::Branches(branches))
    }

    /// Branch on the string value of a sibling item. A case labeled
    /// `_default` becomes the default branch.
    pub fn switch_by<L, R>(key: &str, cases: impl IntoIterator<Item = (L, R)>) -> Self
    where
        L: Into<String>,
        R: Into<Resolver>,
    {
        let selector_key = key.to_string();
        let mut resolver = Self::switch(cases, move |ctx: &ResolverContext| {
            ctx.get(&selector_key).and_then(Value::as_str).map(str::to_string)
        });
        resolver.switch_key = Some(key.to_string());
        resolver
    }

    /// Branch on the current runtime environment.
    pub fn switch_by_environment<L, R>(cases: impl IntoIterator<Item = (L, R)>) -> Self
    where
        L: Into<String>,
        R: Into<Resolver>,
    {
        Self::switch(cases, |ctx: &ResolverContext| {
            ctx.environment().map(str::to_string)
        })
    }

    fn switch<L, R, F>(cases: impl IntoIterator<Item = (L, R)>, selector: F) -> Self
    where
        L: Into<String>,
        R: Into<Resolver>,
        F: Fn(&ResolverContext) -> Option<String> + Send + Sync + 'static,
    {
        let selector = Arc::new(selector);
        let branches = cases
            .into_iter()
            .map(|(label, resolver)| {
                let label: String = label.into();
                if label == DEFAULT_BRANCH_LABEL {
                    return Branch::default_branch(label, resolver);
                }
                let selector = Arc::clone(&selector);
                let expected = label.clone();
                Branch::when(
                    label,
                    move |ctx| selector(ctx).as_deref() == Some(expected.as_str()),
                    resolver,
                )
            })
            .collect();
        Self::branches(branches)
    }

    /// Read an already-resolved value from another service.
    pub fn pick(service: impl Into<String>, key: impl Into<String>) -> Self {
        Self::with_definition(Definition::Pick {
            service: service.into(),
            key: key.into(),
            transform: None,
        })
    }

    pub fn pick_with(
        service: impl Into<String>,
        key: impl Into<String>,
        transform: Option<TransformFn>,
    ) -> Self {
        Self::with_definition(Definition::Pick {
            service: service.into(),
            key: key.into(),
            transform,
        })
    }

    /// Ask plugin `instance_id` for the item identified by `reference`.
    pub fn from_plugin(instance_id: impl Into<String>, reference: impl Into<Value>) -> Self {
        Self::with_definition(Definition::Plugin {
            instance_id: instance_id.into(),
            reference: reference.into(),
        })
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(CacheKey::Static(key.into()));
        self
    }

    /// Derive the cache key from the context. `None` disables caching for
    /// that call.
    pub fn with_computed_cache_key<F>(mut self, f: F) -> Self
    where
        F: Fn(&ResolverContext) -> Option<String> + Send + Sync + 'static,
    {
        self.cache_key = Some(CacheKey::Computed(Arc::new(f)));
        self
    }

    pub fn state(&self) -> &ResolverState {
        &self.state
    }

    pub fn is_resolved(&self) -> bool {
        self.state.is_resolved
    }

    pub fn resolved_value(&self) -> Option<&Value> {
        self.state.resolved_value.as_ref()
    }

    pub fn resolution_error(&self) -> Option<&ResolutionError> {
        self.state.resolution_error.as_ref()
    }

    pub fn is_using_cache(&self) -> bool {
        self.state.is_using_cache
    }

    pub fn branch_path(&self) -> Option<&str> {
        self.state.branch_path.as_deref()
    }

    pub fn branch_list(&self) -> Option<&[Branch]> {
        match &self.definition {
            Definition::Branches(branches) => Some(branches),
            _ => None,
        }
    }

    /// Sibling keys this resolver reads, including those of its branches.
    pub fn sibling_dependencies(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.switch_key.as_deref().into_iter().collect();
        if let Definition::Branches(branches) = &self.definition {
            for branch in branches {
                keys.extend(branch.resolver.sibling_dependencies());
            }
        }
        keys
    }

    /// The resolver returned by the last function call, if any.
    pub fn nested(&self) -> Option<&Resolver> {
        self.nested.as_deref()
    }

    /// The literal value of a static resolver.
    pub fn static_literal(&self) -> Option<&Value> {
        match &self.definition {
            Definition::Static(value) => Some(value),
            _ => None,
        }
    }

    /// `(service, key)` of a pick resolver.
    pub fn picked_from(&self) -> Option<(&str, &str)> {
        match &self.definition {
            Definition::Pick { service, key, .. } => Some((service, key)),
            _ => None,
        }
    }

    pub fn plugin_instance(&self) -> Option<&str> {
        match &self.definition {
            Definition::Plugin { instance_id, .. } => Some(instance_id),
            _ => None,
        }
    }

    /// Forget the outcome of any previous resolution, including branches.
    pub fn reset(&mut self) {
        self.state = ResolverState::default();
        self.nested = None;
        if let Definition::Branches(branches) = &mut self.definition {
            for branch in branches {
                branch.is_active = false;
                branch.resolver.reset();
            }
        }
    }

    /// An unresolved copy of this resolver.
    pub fn fresh(&self) -> Self {
        let mut copy = self.clone();
        copy.reset();
        copy
    }

    /// Resolve to a plain value, recording the outcome on this resolver.
    pub async fn resolve(&mut self, ctx: &ResolverContext) -> Result<Value, ResolutionError> {
        let mut held = Vec::new();
        self.resolve_at(ctx, None, &mut held).await
    }

    fn resolve_at<'a>(
        &'a mut self,
        ctx: &'a ResolverContext,
        branch_path: Option<String>,
        held: &'a mut Vec<String>,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ResolutionError>> + Send + 'a>> {
        Box::pin(async move {
            self.reset();
            self.state.branch_path = branch_path;

            let outcome = self.run(ctx, held).await;
            match &outcome {
                Ok(value) => {
                    self.state.is_resolved = true;
                    self.state.resolved_value = Some(value.clone());
                }
                Err(err) => {
                    tracing::debug!(
                        item = %ctx.path(),
                        branch = ?self.state.branch_path,
                        error = %err,
                        "Resolver failed"
                    );
                    self.state.resolution_error = Some(err.clone());
                }
            }
            outcome
        })
    }

    async fn run(
        &mut self,
        ctx: &ResolverContext,
        held: &mut Vec<String>,
    ) -> Result<Value, ResolutionError> {
        let key = self.cache_key.as_ref().and_then(|k| k.compute(ctx));
        let (Some(key), Some(cache)) = (key, ctx.cache().cloned()) else {
            return self.evaluate(ctx, held).await;
        };

        // keys already held further up this resolution are not locked again
        let _guard = if held.contains(&key) {
            None
        } else {
            Some(ctx.locks().acquire(&key).await)
        };

        if let Some(hit) = cache.get(&key).await {
            tracing::debug!(item = %ctx.path(), cache_key = %key, "Resolver cache hit");
            self.state.is_using_cache = true;
            return Ok(hit);
        }

        held.push(key.clone());
        let outcome = self.evaluate(ctx, held).await;
        held.pop();

        let value = outcome?;
        if let Err(err) = cache.set(&key, value.clone()).await {
            tracing::warn!(cache_key = %key, error = %err, "Failed to write resolver cache");
        }
        Ok(value)
    }

    async fn evaluate(
        &mut self,
        ctx: &ResolverContext,
        held: &mut Vec<String>,
    ) -> Result<Value, ResolutionError> {
        let path = self.state.branch_path.clone();
        if let Some(key) = &self.switch_key {
            if ctx.is_pending_sibling(key) {
                return Err(ResolutionError::SiblingUnresolved { key: key.clone() });
            }
        }
        match &mut self.definition {
            Definition::Static(value) => Ok(value.clone()),
            Definition::Function(resolve) => {
                let resolve = Arc::clone(resolve);
                let call_ctx = ctx.clone();
                let call = AssertUnwindSafe(async move { resolve(call_ctx).await }).catch_unwind();
                let output = with_timeout(call, ctx.timeout())
                    .await?
                    .map_err(|payload| ResolutionError::Failed {
                        message: panic_message(payload.as_ref()),
                    })?
                    .map_err(|err| ResolutionError::Failed {
                        message: err.to_string(),
                    })?;
                match output {
                    ResolverOutput::Value(value) => Ok(value),
                    ResolverOutput::Resolver(next) => {
                        let nested = self.nested.insert(Box::new(next));
                        nested.resolve_at(ctx, path, held).await
                    }
                }
            }
            Definition::Branches(branches) => {
                let selected = branches
                    .iter()
                    .position(|b| {
                        !b.is_default && b.condition.as_ref().is_some_and(|holds| holds(ctx))
                    })
                    .or_else(|| branches.iter().position(|b| b.is_default));
                for (i, branch) in branches.iter_mut().enumerate() {
                    branch.is_active = selected == Some(i);
                }

                let Some(index) = selected else {
                    return Err(ResolutionError::NoMatchingBranch);
                };
                let branch = &mut branches[index];
                let child_path = match path {
                    Some(parent) => format!("{parent}.{}", branch.label),
                    None => branch.label.clone(),
                };
                branch.resolver.resolve_at(ctx, Some(child_path), held).await
            }
            Definition::Pick {
                service,
                key,
                transform,
            } => {
                let value = ctx.get_path(service, key).cloned().ok_or_else(|| {
                    ResolutionError::PickedValueUnresolved {
                        service: service.clone(),
                        key: key.clone(),
                    }
                })?;
                Ok(match transform {
                    Some(transform) => transform(value),
                    None => value,
                })
            }
            Definition::Plugin {
                instance_id,
                reference,
            } => {
                let handle =
                    ctx.plugin(instance_id)
                        .ok_or_else(|| ResolutionError::PluginMissing {
                            instance_id: instance_id.clone(),
                        })?;
                with_timeout(handle.resolve_item(reference), ctx.timeout()).await?
            }
        }
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown payload".to_string());
    format!("panicked: {detail}")
}

async fn with_timeout<T>(
    fut: impl Future<Output = T>,
    limit: Option<Duration>,
) -> Result<T, ResolutionError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ResolutionError::Timeout {
                millis: limit.as_millis() as u64,
            }),
        None => Ok(fut.await),
    }
}

impl From<Value> for Resolver {
    fn from(value: Value) -> Self {
        Self::static_value(value)
    }
}

impl From<&str> for Resolver {
    fn from(value: &str) -> Self {
        Self::static_value(value)
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.definition {
            Definition::Static(_) => "static",
            Definition::Function(_) => "function",
            Definition::Branches(_) => "branches",
            Definition::Pick { .. } => "pick",
            Definition::Plugin { .. } => "plugin",
        };
        // the resolved value is left out; the resolver cannot tell if it is sensitive
        f.debug_struct("Resolver")
            .field("kind", &kind)
            .field("has_cache_key", &self.cache_key.is_some())
            .field("is_resolved", &self.state.is_resolved)
            .field("is_using_cache", &self.state.is_using_cache)
            .field("branch_path", &self.state.branch_path)
            .field("resolution_error", &self.state.resolution_error)
            .finish()
    }
}

impl fmt::Debug for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Branch")
            .field("label", &self.label)
            .field("is_default", &self.is_default)
            .field("is_active", &self.is_active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheProvider, MemoryCache};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx() -> ResolverContext {
        ResolverContext::new("api", "ITEM")
    }

    #[tokio::test]
    async fn test_static_value() {
        let mut r = Resolver::static_value(42);
        assert_eq!(r.resolve(&ctx()).await.unwrap(), json!(42));
        assert!(r.is_resolved());
        assert_eq!(r.resolved_value(), Some(&json!(42)));
    }

    #[tokio::test]
    async fn test_function_error_is_recorded() {
        let mut r = Resolver::from_sync_fn(|_| Err::<Value, BoxError>("boom".into()));
        let err = r.resolve(&ctx()).await.unwrap_err();
        assert_eq!(
            err,
            ResolutionError::Failed {
                message: "boom".into()
            }
        );
        assert!(!r.is_resolved());
        assert_eq!(r.resolution_error(), Some(&err));
    }

    #[tokio::test]
    async fn test_nested_resolvers_unwind() {
        let mut r = Resolver::from_fn(|_| async {
            Ok::<_, BoxError>(Resolver::from_sync_fn(|_| {
                Ok::<_, BoxError>(Resolver::static_value("deep"))
            }))
        });
        assert_eq!(r.resolve(&ctx()).await.unwrap(), json!("deep"));
        let inner = r.nested().unwrap();
        assert_eq!(inner.nested().unwrap().resolved_value(), Some(&json!("deep")));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_function() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut r = Resolver::from_sync_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, BoxError>(json!("token"))
        })
        .with_cache_key("auth-token");
        let ctx = ctx().with_cache(Arc::new(MemoryCache::new()));

        assert_eq!(r.resolve(&ctx).await.unwrap(), json!("token"));
        assert!(!r.is_using_cache());
        assert_eq!(r.resolve(&ctx).await.unwrap(), json!("token"));
        assert!(r.is_using_cache());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_resolution_is_not_cached() {
        let cache = Arc::new(MemoryCache::new());
        let mut r = Resolver::from_sync_fn(|_| Err::<Value, BoxError>("nope".into()))
            .with_cache_key("k");
        let ctx = ctx().with_cache(cache.clone());
        assert!(r.resolve(&ctx).await.is_err());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_nested_resolver_sharing_key_does_not_deadlock() {
        let mut r = Resolver::from_sync_fn(|_| {
            Ok::<_, BoxError>(Resolver::static_value("v").with_cache_key("same"))
        })
        .with_cache_key("same");
        let ctx = ctx().with_cache(Arc::new(MemoryCache::new()));
        assert_eq!(r.resolve(&ctx).await.unwrap(), json!("v"));
    }

    #[tokio::test]
    async fn test_computed_cache_key_uses_context() {
        let cache = Arc::new(MemoryCache::new());
        let mut r = Resolver::static_value(1).with_computed_cache_key(|ctx| Some(ctx.path()));
        r.resolve(&ctx().with_cache(cache.clone())).await.unwrap();
        assert_eq!(cache.get("api.ITEM").await, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_branches_tag_every_branch() {
        let mut r = Resolver::switch_by("APP_ENV", [("dev", "x"), ("prod", "z"), ("_default", "y")]);
        let ctx = ctx().with_value("APP_ENV", json!("prod"));
        assert_eq!(r.resolve(&ctx).await.unwrap(), json!("z"));

        let active: Vec<(&str, bool)> = r
            .branch_list()
            .unwrap()
            .iter()
            .map(|b| (b.label(), b.is_active()))
            .collect();
        assert_eq!(active, vec![("dev", false), ("prod", true), ("_default", false)]);
        assert_eq!(r.branch_list().unwrap()[1].resolver().branch_path(), Some("prod"));
    }

    #[tokio::test]
    async fn test_default_branch_is_not_matched_first() {
        // a default listed first still only applies when nothing else matches
        let mut r = Resolver::branches(vec![
            Branch::default_branch("fallback", "d"),
            Branch::when("always", |_| true, "a"),
        ]);
        assert_eq!(r.resolve(&ctx()).await.unwrap(), json!("a"));
    }

    #[tokio::test]
    async fn test_nested_branch_path() {
        let inner = Resolver::branches(vec![Branch::when("inner", |_| true, "v")]);
        let mut r = Resolver::branches(vec![Branch::when("outer", |_| true, inner)]);
        r.resolve(&ctx()).await.unwrap();
        let outer = &r.branch_list().unwrap()[0];
        let inner = &outer.resolver().branch_list().unwrap()[0];
        assert_eq!(inner.resolver().branch_path(), Some("outer.inner"));
    }

    #[tokio::test]
    async fn test_environment_switch() {
        let mut r = Resolver::switch_by_environment([("staging", "s"), ("_default", "d")]);
        let staging = ctx().with_environment(Some("staging".into()));
        assert_eq!(r.resolve(&staging).await.unwrap(), json!("s"));
        assert_eq!(r.resolve(&ctx()).await.unwrap(), json!("d"));
    }

    #[tokio::test]
    async fn test_switch_waits_for_pending_key() {
        let mut r = Resolver::switch_by("APP_ENV", [("dev", "x"), ("_default", "y")]);
        let pending: std::collections::BTreeSet<String> = ["APP_ENV".to_string()].into();
        let waiting = ctx().with_pending(Arc::new(pending));
        assert_eq!(
            r.resolve(&waiting).await.unwrap_err(),
            ResolutionError::SiblingUnresolved {
                key: "APP_ENV".into()
            }
        );

        // settled without a value, so the default applies
        assert_eq!(r.resolve(&ctx()).await.unwrap(), json!("y"));
        let dev = ctx().with_value("APP_ENV", json!("dev"));
        assert_eq!(r.resolve(&dev).await.unwrap(), json!("x"));
    }

    #[test]
    fn test_sibling_dependencies_include_nested_switches() {
        let inner = Resolver::switch_by("REGION", [("eu", "e"), ("_default", "w")]);
        let r = Resolver::switch_by("APP_ENV", [("prod", inner), ("_default", "d".into())]);
        assert_eq!(r.sibling_dependencies(), vec!["APP_ENV", "REGION"]);
        assert!(Resolver::static_value(1).sibling_dependencies().is_empty());
    }

    #[tokio::test]
    async fn test_panic_in_function_is_recorded() {
        let mut r = Resolver::from_sync_fn(|_| -> Result<Value, BoxError> { panic!("user bug") });
        let err = r.resolve(&ctx()).await.unwrap_err();
        assert_eq!(
            err,
            ResolutionError::Failed {
                message: "panicked: user bug".into()
            }
        );
        assert!(!r.is_resolved());

        let mut r = Resolver::from_fn(|ctx| async move {
            if ctx.key() == "ITEM" {
                panic!("{} exploded", ctx.path());
            }
            Ok::<_, BoxError>(json!(1))
        });
        assert_eq!(
            r.resolve(&ctx()).await.unwrap_err(),
            ResolutionError::Failed {
                message: "panicked: api.ITEM exploded".into()
            }
        );
    }

    #[tokio::test]
    async fn test_pick_requires_resolved_source() {
        let mut r = Resolver::pick_with("db", "PORT", Some(Arc::new(|v| json!(v.to_string()))));
        let err = r.resolve(&ctx()).await.unwrap_err();
        assert!(matches!(err, ResolutionError::PickedValueUnresolved { .. }));

        let mut store = crate::context::ValueStore::new();
        store.insert("db", "PORT", json!(5432));
        let ctx = ctx().with_values(Arc::new(store));
        assert_eq!(r.resolve(&ctx).await.unwrap(), json!("5432"));
    }

    #[tokio::test]
    async fn test_missing_plugin() {
        let mut r = Resolver::from_plugin("vault", "db/password");
        assert_eq!(
            r.resolve(&ctx()).await.unwrap_err(),
            ResolutionError::PluginMissing {
                instance_id: "vault".into()
            }
        );
    }

    #[tokio::test]
    async fn test_timeout_is_opt_in() {
        let slow = || {
            Resolver::from_fn(|_| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, BoxError>(json!("late"))
            })
        };
        let limited = ctx().with_timeout(Some(Duration::from_millis(5)));
        assert_eq!(
            slow().resolve(&limited).await.unwrap_err(),
            ResolutionError::Timeout { millis: 5 }
        );
        assert_eq!(slow().resolve(&ctx()).await.unwrap(), json!("late"));
    }

    #[tokio::test]
    async fn test_fresh_clears_state() {
        let mut r = Resolver::switch_by("K", [("a", "1"), ("_default", "2")]);
        r.resolve(&ctx()).await.unwrap();
        let copy = r.fresh();
        assert!(!copy.is_resolved());
        assert!(copy.branch_list().unwrap().iter().all(|b| !b.is_active()));
    }
}
