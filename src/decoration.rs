//! Decorator and initializer chain.
//!
//! Decorators are factories flagged as such. They target a service type, or
//! every service through the universal target, and run in registration order
//! on each resolved instance. Initializers are decorators that return their
//! input after a side effect.

use std::any::TypeId;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{DiError, DiResult, ErrorKind};
use crate::key::ServiceType;
use crate::provider::{Request, ResolverContext};
use crate::registration::{AnyArc, DecorateFn, Factory, FactoryKind, Instance, Recipe, Setup};
use crate::registry::Registry;
use crate::reuse::Reuse;
use crate::traits::{downcast, Dispose, Resolver};

/// Target type of decorators applying to every service.
pub(crate) struct AnyService;

pub(crate) fn any_target() -> ServiceType {
    ServiceType::of::<AnyService>()
}

pub(crate) fn decorator_factory(target: ServiceType, mut setup: Setup, decorate: DecorateFn) -> Factory {
    setup.kind = FactoryKind::Decorator;
    Factory::new(target, Reuse::Transient, setup, Recipe::Decorator(decorate))
}

pub(crate) fn typed_decorator<T, F>(decorator: F) -> DecorateFn
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>, &ResolverContext) -> DiResult<Arc<T>> + Send + Sync + 'static,
{
    Arc::new(move |instance: &Instance, ctx: &ResolverContext| {
        let value = downcast::<T>(instance.value().clone())?;
        decorator(value, ctx).map(|decorated| decorated as AnyArc)
    })
}

pub(crate) fn typed_initializer<T, F>(action: F) -> DecorateFn
where
    T: Send + Sync + 'static,
    F: Fn(&T, &ResolverContext) -> DiResult<()> + Send + Sync + 'static,
{
    Arc::new(move |instance: &Instance, ctx: &ResolverContext| {
        let value = instance
            .downcast_ref::<T>()
            .ok_or_else(|| DiError::type_mismatch(std::any::type_name::<T>()))?;
        action(value, ctx)?;
        Ok(instance.value().clone())
    })
}

pub(crate) fn any_initializer<F>(action: F) -> DecorateFn
where
    F: Fn(&Instance, &ResolverContext) -> DiResult<()> + Send + Sync + 'static,
{
    Arc::new(move |instance: &Instance, ctx: &ResolverContext| {
        action(instance, ctx)?;
        Ok(instance.value().clone())
    })
}

/// Decorators applying to the service of `request`, in registration order.
///
/// Exact-type decorators and universal ones are merged by factory id, so the
/// relative order of registration is preserved across both lists.
pub(crate) fn matching(registry: &Registry, request: &Request) -> Vec<Arc<Factory>> {
    if !registry.has_decorators() {
        return Vec::new();
    }
    let exact = registry.decorators(request.key().service().id());
    let universal = registry.decorators(TypeId::of::<AnyService>());
    let mut matched: Vec<Arc<Factory>> = exact
        .iter()
        .chain(universal.iter())
        .filter(|d| d.setup().matches(request))
        .cloned()
        .collect();
    matched.sort_by_key(|d| d.id());
    matched
}

/// Collects disposables handed to it and disposes them, newest first, when it
/// is disposed itself.
///
/// Registered by `register_disposable_tracker` as a scoped service, so the
/// tracker of the innermost open scope receives the transients built there
/// and releases them when that scope closes.
#[derive(Default)]
pub struct DisposableTracker {
    state: Mutex<TrackerState>,
}

#[derive(Default)]
struct TrackerState {
    items: Vec<Arc<dyn Dispose>>,
    disposed: bool,
}

impl DisposableTracker {
    /// Takes ownership of a disposable. A tracker that was already disposed
    /// disposes the item immediately.
    pub fn track(&self, item: Arc<dyn Dispose>) {
        let mut state = self.state.lock();
        if state.disposed {
            drop(state);
            item.dispose();
            return;
        }
        state.items.push(item);
    }

    /// Number of items waiting for disposal.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Whether nothing is waiting for disposal.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Dispose for DisposableTracker {
    fn dispose(&self) {
        let items = {
            let mut state = self.state.lock();
            state.disposed = true;
            std::mem::take(&mut state.items)
        };
        let mut failures = 0;
        for item in items.into_iter().rev() {
            if catch_unwind(AssertUnwindSafe(|| item.dispose())).is_err() {
                failures += 1;
            }
        }
        if failures > 0 {
            tracing::error!(failures, "tracked disposables panicked during disposal");
        }
    }
}

pub(crate) fn capture_into_tracker(instance: &Instance, ctx: &ResolverContext) -> DiResult<()> {
    let Some(disposable) = instance.disposable() else {
        return Ok(());
    };
    match ctx.resolution_call().get::<DisposableTracker>() {
        Ok(tracker) => {
            tracker.track(disposable.clone());
            Ok(())
        }
        Err(e) if e.is(ErrorKind::NoCurrentScope) => {
            tracing::trace!(service = instance.type_name(), "no open scope, tracking in root scope");
            ctx.root_scope().track(instance.type_name(), disposable.clone())
        }
        Err(e) => Err(e),
    }
}
