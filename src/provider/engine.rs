//! Resolution engine: factory selection and the entry points used by every
//! resolver.
//!
//! A request is served, in order, by an exact registration, the open-generic
//! family of its shape, its wrapper shape or an implicit capability, the
//! fallback containers, and finally the unknown-service resolvers.

use std::any::TypeId;
use std::sync::Arc;

use crate::collection::ServiceRegistrator;
use crate::error::{DiError, DiResult};
use crate::key::Key;
use crate::registration::{AnyArc, Factory, IfUnresolved, Instance};
use crate::registry::ProducerKey;
use crate::rules::FactorySelector;

use super::compiler::{Compiler, Producer};
use super::context::{CloseFn, Request, ResolverContext, ServiceInfo, Shape, WrapFn};
use super::scope::ResolutionScope;
use super::{Container, ServiceResolver};

/// Resolves `info` through `ctx`.
///
/// Without a frame in `ctx` this is a top-level call: the compiled producer
/// is cached in the registry snapshot and the call's resolution scope is
/// released afterwards if nothing was tracked in it.
pub(crate) fn resolve(ctx: &ResolverContext, info: &ServiceInfo, if_unresolved: IfUnresolved) -> DiResult<Option<AnyArc>> {
    let (request, producer) = producer_for(ctx, info)?;
    match producer {
        Some(producer) => invoke(ctx, &producer).map(|instance| Some(instance.into_value())),
        None if if_unresolved == IfUnresolved::ReturnDefault => Ok(None),
        None => Err(DiError::unknown_service(info.key()).with_chain(|| request.chain())),
    }
}

/// Resolves every registration matching `info`, in registration order.
pub(crate) fn resolve_all(ctx: &ResolverContext, info: &ServiceInfo) -> DiResult<Vec<AnyArc>> {
    candidates(ctx, info)?
        .iter()
        .map(|factory| resolve_factory(ctx, info, factory).map(Instance::into_value))
        .collect()
}

/// Registrations a collection request for `info` would yield right now.
pub(crate) fn candidates(ctx: &ResolverContext, info: &ServiceInfo) -> DiResult<Vec<Arc<Factory>>> {
    ensure_open(ctx)?;
    let request = Request::push(ctx.frame.as_ref(), info.key().clone(), ctx.boundary)?;
    let compiler = Compiler::new(ctx);
    let key = info.key();
    Ok(compiler
        .registry
        .factories(key.service().id())
        .iter()
        .filter(|f| key.service_key().map_or(true, |k| f.service_key() == Some(k)))
        .filter(|f| compiler.matches(f, key, &request))
        .cloned()
        .collect())
}

/// Builds one specific registration of `info`.
pub(crate) fn resolve_factory(ctx: &ResolverContext, info: &ServiceInfo, factory: &Arc<Factory>) -> DiResult<Instance> {
    ensure_open(ctx)?;
    let request = Request::push(ctx.frame.as_ref(), info.key().clone(), ctx.boundary)?;
    let producer = Compiler::new(ctx).compile_selected(&request, info, factory, None)?;
    invoke(ctx, &producer)
}

/// Top-level calls fail once the resolving scope is disposed.
fn ensure_open(ctx: &ResolverContext) -> DiResult<()> {
    if ctx.frame.is_none() && ctx.view.scope.is_disposed() {
        return Err(DiError::scope_disposed(&ctx.view.scope));
    }
    Ok(())
}

fn producer_for(ctx: &ResolverContext, info: &ServiceInfo) -> DiResult<(Arc<Request>, Option<Producer>)> {
    ensure_open(ctx)?;
    let request = Request::push(ctx.frame.as_ref(), info.key().clone(), ctx.boundary)?;
    let compiler = Compiler::new(ctx);
    if ctx.frame.is_some() {
        let producer = compiler.compile_request(&request, info)?;
        return Ok((request, producer));
    }

    let cache_key = ProducerKey {
        key: info.key().clone(),
        shaped: !matches!(info.shape, Shape::Plain),
        scopes: compiler.scopes.clone(),
        rules: compiler.rules.id(),
    };
    if let Some(producer) = compiler.registry.cached_producer(&cache_key) {
        return Ok((request, Some(producer)));
    }
    let producer = compiler
        .compile_request(&request, info)?
        .map(|producer| compiler.registry.cache_producer(cache_key, producer));
    Ok((request, producer))
}

fn invoke(ctx: &ResolverContext, producer: &Producer) -> DiResult<Instance> {
    if ctx.frame.is_some() {
        return producer(ctx);
    }
    let result = producer(ctx);
    if let Some(scope) = ctx.resolution.get() {
        scope.release_if_unused();
    }
    result
}

impl Compiler {
    /// Producer for a pending frame, or `None` when nothing can serve it.
    pub(crate) fn compile_request(&self, request: &Arc<Request>, info: &ServiceInfo) -> DiResult<Option<Producer>> {
        let key = info.key();
        if let Some(factory) = self.select(request, key, self.registry.factories(key.service().id()))? {
            return self.compile_selected(request, info, &factory, None).map(Some);
        }

        match &info.shape {
            Shape::Generic { family, close } => {
                let family_key = Key::from_type(*family).with_optional_key(key.service_key().cloned());
                if let Some(factory) = self.select(request, &family_key, self.registry.factories(family.id()))? {
                    return self.compile_selected(request, info, &factory, Some(*close)).map(Some);
                }
            }
            Shape::Wrapper { inner, deferred, wrap } => {
                return Ok(Some(compile_wrapper(request, inner, *deferred, *wrap)));
            }
            Shape::Plain => {
                if let Some(producer) = implicit(key) {
                    return Ok(Some(producer));
                }
            }
        }

        for fallback in self.rules.fallback_containers() {
            if let Some(producer) = fallback_producer(fallback, info)? {
                tracing::debug!(service = %key, "resolved from fallback container");
                return Ok(Some(producer));
            }
        }

        for resolver in self.rules.unknown_service_resolvers() {
            if let Some(factory) = resolver(request) {
                tracing::debug!(service = %key, factory = %factory.id(), "unknown service resolver supplied a factory");
                return self.compile_selected(request, info, &factory, None).map(Some);
            }
        }
        Ok(None)
    }

    /// Compiles a selected factory, or defers it to a resolution call when
    /// its setup asks for one and the frame is a dependency.
    pub(crate) fn compile_selected(
        &self,
        request: &Arc<Request>,
        info: &ServiceInfo,
        factory: &Arc<Factory>,
        close: Option<CloseFn>,
    ) -> DiResult<Producer> {
        let deferred_parent = match request.parent_frame() {
            Some(parent) if factory.setup().as_resolution_call && !request.is_resolution_call() => parent.clone(),
            _ => return self.compile_factory(request, factory, close),
        };
        let key = info.key().clone();
        let factory = factory.clone();
        Ok(Arc::new(move |ctx| {
            let call = ctx.for_frame(&deferred_parent).resolution_call();
            let request = Request::push(Some(&deferred_parent), key.clone(), true)?;
            let producer = Compiler::new(&call).compile_factory(&request, &factory, close)?;
            let instance = producer(&call)?;
            // tracked where it was built; the holder must not track it again
            Ok(Instance::new(instance.into_value(), None, key.service().name()))
        }))
    }

    /// Picks the factory serving `key` among `factories`.
    fn select(&self, request: &Request, key: &Key, factories: &[Arc<Factory>]) -> DiResult<Option<Arc<Factory>>> {
        if factories.is_empty() {
            return Ok(None);
        }
        let selector = self.rules.factory_selector();
        let mut candidates: Vec<Arc<Factory>> = factories
            .iter()
            .filter(|f| match (key.service_key(), f.service_key()) {
                (Some(wanted), found) => found == Some(wanted),
                (None, None) => true,
                (None, Some(found)) => match selector {
                    Some(FactorySelector::PreferKey(preferred)) => preferred == found,
                    Some(FactorySelector::Custom(_)) => true,
                    _ => false,
                },
            })
            .filter(|f| self.matches(f, key, request))
            .cloned()
            .collect();

        match candidates.len() {
            0 => Ok(None),
            // a keyed registration serves an unkeyed request only if the selector picks it
            1 if key.service_key().is_none() && candidates[0].service_key().is_some() => {
                Ok(selector.and_then(|s| s.select(request, &candidates)))
            }
            1 => Ok(candidates.pop()),
            n => selector
                .and_then(|s| s.select(request, &candidates))
                .map(Some)
                .ok_or_else(|| {
                    DiError::new(
                        crate::error::ErrorKind::AmbiguousDefaults,
                        format!("{} has {} default registrations and no selector picks one", key, n),
                    )
                    .with_chain(|| request.chain())
                }),
        }
    }

    /// Required implementation, condition and implicit scope filters.
    fn matches(&self, factory: &Factory, key: &Key, request: &Request) -> bool {
        key.required_impl().map_or(true, |i| factory.implementation() == Some(i))
            && factory.setup().matches(request)
            && (!self.rules.implicit_scope_check()
                || factory.reuse().scope_name().map_or(true, |name| self.scope_is_open(name, request)))
    }
}

fn compile_wrapper(request: &Arc<Request>, inner: &ServiceInfo, deferred: bool, wrap: WrapFn) -> Producer {
    let outer = request.key();
    let mut inner = inner.clone().with_optional_impl(outer.required_impl().or(inner.key().required_impl()));
    if let Some(key) = outer.service_key() {
        inner = inner.with_key(key.clone());
    }
    let request = request.clone();
    let service = request.key().service().name();
    Arc::new(move |ctx| {
        let mut wrap_ctx = ctx.for_frame(&request);
        if deferred {
            wrap_ctx = wrap_ctx.resolution_call();
        }
        let value = wrap(wrap_ctx, inner.clone())?;
        Ok(Instance::new(value, None, service))
    })
}

type ImplicitFn = fn(&ResolverContext) -> DiResult<AnyArc>;

fn implicit_resolver(ctx: &ResolverContext) -> DiResult<AnyArc> {
    Ok(Arc::new(ServiceResolver::new(ctx.view.clone())))
}

fn implicit_registrator(ctx: &ResolverContext) -> DiResult<AnyArc> {
    Ok(Arc::new(ServiceRegistrator::new(ctx.view.clone())))
}

fn implicit_container(ctx: &ResolverContext) -> DiResult<AnyArc> {
    Ok(Arc::new(ctx.view.clone()))
}

fn implicit_resolution_scope(ctx: &ResolverContext) -> DiResult<AnyArc> {
    let scope = ctx.resolution_scope()?;
    Ok(Arc::new(ResolutionScope::new(ctx.view.with_scope(scope))))
}

/// Capabilities resolvable without registration.
fn implicit(key: &Key) -> Option<Producer> {
    if key.service_key().is_some() {
        return None;
    }
    let id = key.service().id();
    let build: ImplicitFn = if id == TypeId::of::<ServiceResolver>() {
        implicit_resolver
    } else if id == TypeId::of::<ServiceRegistrator>() {
        implicit_registrator
    } else if id == TypeId::of::<Container>() {
        implicit_container
    } else if id == TypeId::of::<ResolutionScope>() {
        implicit_resolution_scope
    } else {
        return None;
    };
    let service = key.service().name();
    Some(Arc::new(move |ctx| Ok(Instance::new(build(ctx)?, None, service))))
}

/// Producer delegating to a fallback container that can serve `info`.
///
/// The producer is cached with the requesting snapshot, so every call
/// resolves against the fallback's current registrations.
fn fallback_producer(fallback: &Container, info: &ServiceInfo) -> DiResult<Option<Producer>> {
    if producer_for(&ResolverContext::top(fallback.clone()), info)?.1.is_none() {
        return Ok(None);
    }
    let fallback = fallback.clone();
    let info = info.clone();
    let service = info.key().service().name();
    Ok(Some(Arc::new(move |_| {
        resolve(&ResolverContext::top(fallback.clone()), &info, IfUnresolved::Throw)?
            .map(|value| Instance::new(value, None, service))
            .ok_or_else(|| DiError::unknown_service(info.key()))
    })))
}
