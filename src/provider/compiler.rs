//! Producer compiler: turns a selected factory into a callable closure graph.
//!
//! Dependencies are compiled inline into their holder's producer unless they
//! ask for a resolution call, in which case the producer calls back into the
//! engine when it runs. Around the base recipe the compiler layers, inside
//! out: transient tracking, decoratee-reuse decorators, the promoted
//! resolution scope, the reuse cache and the remaining decorators.

use std::cmp::Reverse;
use std::sync::Arc;

use crate::decoration;
use crate::error::{DiError, DiResult, ErrorKind};
use crate::registration::{AnyArc, DisposeProbe, ErasedCtor, ErasedMade, Factory, IfUnresolved, Instance, Param, Recipe, Args};
use crate::registry::Registry;
use crate::reuse::{Reuse, ScopeName};
use crate::rules::{ConstructorSelector, Rules};

use super::context::{CloseFn, Request, ResolverContext, ServiceInfo};
use super::engine;
use super::scope::{ScopeKind, ScopeNode, SlotKey};

/// A compiled producer.
pub(crate) type Producer = Arc<dyn Fn(&ResolverContext) -> DiResult<Instance> + Send + Sync>;

type ArgProducer = Arc<dyn Fn(&ResolverContext) -> DiResult<Option<AnyArc>> + Send + Sync>;

/// Compilation against one registry snapshot, rules value and scope chain.
pub(crate) struct Compiler {
    pub(crate) registry: Arc<Registry>,
    pub(crate) rules: Arc<Rules>,
    pub(crate) scopes: Vec<ScopeName>,
}

impl Compiler {
    pub(crate) fn new(ctx: &ResolverContext) -> Self {
        Self {
            registry: ctx.view.core.registry.snapshot(),
            rules: ctx.view.rules.clone(),
            scopes: ctx.view.scope.names(),
        }
    }

    /// Whether a scope named `name` is open for `request`.
    pub(crate) fn scope_is_open(&self, name: &ScopeName, request: &Request) -> bool {
        self.scopes.contains(name) || request.opened_scopes().any(|opened| opened == name)
    }

    /// Producer for `factory`, selected for the pending frame `pending`.
    pub(crate) fn compile_factory(
        &self,
        pending: &Arc<Request>,
        factory: &Arc<Factory>,
        close: Option<CloseFn>,
    ) -> DiResult<Producer> {
        if self.rules.throw_if_runtime_state_required() && factory.requires_runtime_state() {
            return Err(DiError::new(
                ErrorKind::RuntimeStateRequired,
                format!("{} is registered with runtime state ({:?})", pending.key(), factory),
            )
            .with_chain(|| pending.chain()));
        }
        pending.check_lifespan(factory, &self.rules)?;

        let request = pending.with_factory(factory, &self.rules);
        let service = request.key().service().name();
        tracing::trace!(service, factory = %factory.id(), reuse = %factory.reuse(), "compiling producer");

        let mut producer = self.compile_recipe(&request, factory, close)?;
        if request.tracks_disposable() {
            producer = track_transient(producer, service);
        }

        let (decoratee_reuse, outer): (Vec<_>, Vec<_>) = decoration::matching(&self.registry, &request)
            .into_iter()
            .partition(|d| d.setup().use_decoratee_reuse);
        producer = decorate(producer, &request, &decoratee_reuse);
        if factory.setup().open_resolution_scope {
            producer = open_resolution_scope(producer, service);
        }
        producer = reuse_cache(producer, &request, factory);
        producer = decorate(producer, &request, &outer);

        Ok(Arc::new(move |ctx| producer(ctx).map_err(|e| e.with_chain(|| request.chain()))))
    }

    fn compile_recipe(&self, request: &Arc<Request>, factory: &Arc<Factory>, close: Option<CloseFn>) -> DiResult<Producer> {
        let service = request.key().service().name();
        match &factory.recipe {
            Recipe::Instance(value) => {
                let instance = Instance::new(value.clone(), factory.probe(value), service);
                Ok(Arc::new(move |_| Ok(instance.clone())))
            }
            Recipe::Delegate(delegate) => {
                let delegate = delegate.clone();
                let probe = factory.disposable;
                let request = request.clone();
                Ok(Arc::new(move |ctx| {
                    let value = delegate(&ctx.for_frame(&request))?;
                    let disposable = probe.and_then(|p| p(&value));
                    Ok(Instance::new(value, disposable, service))
                }))
            }
            Recipe::Made(made) => self.compile_made(request, made, factory.disposable),
            Recipe::OpenGeneric => match close {
                Some(close) => {
                    let (made, probe) = close();
                    self.compile_made(request, &made, probe)
                }
                None => Err(DiError::unknown_service(request.key()).with_chain(|| request.chain())),
            },
            Recipe::Decorator(_) => Err(DiError::new(
                ErrorKind::UnknownService,
                format!("decorator {} cannot be resolved as a service", factory.id()),
            )),
        }
    }

    fn compile_made(&self, request: &Arc<Request>, made: &ErasedMade, probe: Option<DisposeProbe>) -> DiResult<Producer> {
        let service = request.key().service().name();
        let (ctor, args) = self.select_constructor(request, made)?;
        let names: Vec<&'static str> = ctor.params.iter().map(|p| p.info().key().display_name()).collect();
        let members = made
            .members
            .iter()
            .map(|member| self.compile_param(request, member, IfUnresolved::ReturnDefault))
            .collect::<DiResult<Vec<_>>>()?;
        let invoke = ctor.invoke.clone();

        Ok(Arc::new(move |ctx| {
            let values = args.iter().map(|arg| arg(ctx)).collect::<DiResult<Vec<_>>>()?;
            let member_values = members.iter().map(|member| member(ctx)).collect::<DiResult<Vec<_>>>()?;
            let value = invoke(&Args::new(values, names.clone()), member_values)?;
            let disposable = probe.and_then(|p| p(&value));
            Ok(Instance::new(value, disposable, service))
        }))
    }

    fn select_constructor<'m>(
        &self,
        request: &Arc<Request>,
        made: &'m ErasedMade,
    ) -> DiResult<(&'m ErasedCtor, Vec<ArgProducer>)> {
        let selection_error = |message: String| {
            DiError::new(ErrorKind::ConstructorSelection, message).with_chain(|| request.chain())
        };
        match made.ctors.as_slice() {
            [] => Err(selection_error(format!("{} has no constructor", request.key()))),
            [ctor] => Ok((ctor, self.compile_params(request, &ctor.params)?)),
            ctors => {
                if self.rules.constructor_selector() == ConstructorSelector::Single {
                    return Err(selection_error(format!(
                        "{} declares {} constructors; exactly one is expected",
                        request.key(),
                        ctors.len()
                    )));
                }
                let mut ordered: Vec<&ErasedCtor> = ctors.iter().collect();
                ordered.sort_by_key(|ctor| Reverse(ctor.params.len()));
                for ctor in ordered {
                    match self.compile_params(request, &ctor.params) {
                        Ok(args) => return Ok((ctor, args)),
                        Err(e) => {
                            tracing::trace!(service = %request.key(), params = ctor.params.len(), error = %e, "constructor not resolvable");
                        }
                    }
                }
                Err(selection_error(format!("no constructor of {} is resolvable", request.key())))
            }
        }
    }

    fn compile_params(&self, request: &Arc<Request>, params: &[Param]) -> DiResult<Vec<ArgProducer>> {
        params
            .iter()
            .map(|param| self.compile_param(request, param, IfUnresolved::Throw))
            .collect()
    }

    fn compile_param(&self, request: &Arc<Request>, param: &Param, default_policy: IfUnresolved) -> DiResult<ArgProducer> {
        let policy = param.if_unresolved.unwrap_or(default_policy);
        let default = param.default.clone();
        let info = param.info().clone();
        let holder = request.key().clone();

        if param.as_resolution_call {
            let request = request.clone();
            return Ok(Arc::new(move |ctx| {
                let call = ctx.for_frame(&request).resolution_call();
                match engine::resolve(&call, &info, policy) {
                    Ok(Some(value)) => Ok(Some(value)),
                    Ok(None) => Ok(default.clone()),
                    Err(e) if e.is(ErrorKind::UnknownService) => Err(unresolved(e, &info, &holder)),
                    Err(e) => Err(e),
                }
            }));
        }

        let child = Request::push(Some(request), info.key().clone(), false)?;
        match self.compile_request(&child, &info) {
            Ok(Some(producer)) => Ok(Arc::new(move |ctx| producer(ctx).map(|instance| Some(instance.into_value())))),
            Ok(None) if policy == IfUnresolved::ReturnDefault => Ok(Arc::new(move |_| Ok(default.clone()))),
            Ok(None) => Err(unresolved(
                DiError::unknown_service(info.key()).with_chain(|| child.chain()),
                &info,
                &holder,
            )),
            Err(e) if e.is(ErrorKind::UnknownService) && policy == IfUnresolved::Throw => {
                Err(unresolved(e, &info, &holder))
            }
            Err(e) if e.is(ErrorKind::UnknownService) => Ok(Arc::new(move |_| Ok(default.clone()))),
            Err(e) => Err(e),
        }
    }
}

fn unresolved(error: DiError, info: &ServiceInfo, holder: &crate::key::Key) -> DiError {
    error.rekind(
        ErrorKind::UnresolvedRequiredParameter,
        format!("required dependency {} of {} could not be resolved", info.key(), holder),
    )
}

fn track_transient(producer: Producer, service: &'static str) -> Producer {
    Arc::new(move |ctx| {
        let instance = producer(ctx)?;
        if let Some(disposable) = instance.disposable() {
            ctx.owner.track(service, disposable.clone())?;
        }
        Ok(instance)
    })
}

fn decorate(producer: Producer, request: &Arc<Request>, decorators: &[Arc<Factory>]) -> Producer {
    let mut producer = producer;
    for decorator in decorators {
        let Recipe::Decorator(decorate) = &decorator.recipe else {
            continue;
        };
        let decorate = decorate.clone();
        let request = request.clone();
        let inner = producer;
        producer = Arc::new(move |ctx| {
            let instance = inner(ctx)?;
            let value = decorate(&instance, &ctx.for_frame(&request))?;
            Ok(instance.replace_value(value))
        });
    }
    producer
}

fn open_resolution_scope(producer: Producer, service: &'static str) -> Producer {
    let name = ScopeName::from(service);
    Arc::new(move |ctx| {
        let scope = ctx.view.scope.open_child(Some(name.clone()), ScopeKind::Resolution)?;
        let result = producer(&ctx.promoted(scope.clone()));
        match &result {
            Ok(_) => scope.release_if_unused(),
            Err(_) => {
                if let Err(e) = scope.close() {
                    tracing::error!(error = %e, "closing failed resolution scope");
                }
            }
        }
        result
    })
}

fn reuse_cache(producer: Producer, request: &Arc<Request>, factory: &Factory) -> Producer {
    let reuse = factory.reuse().clone();
    if reuse.is_transient() {
        return producer;
    }
    let key = SlotKey {
        factory: factory.id(),
        service: request.key().service().id(),
    };
    let service = request.key().service().name();
    Arc::new(move |ctx| {
        let scope = reuse_scope(&reuse, ctx, service)?;
        scope.get_or_build(key, service, || producer(&ctx.with_owner(&scope)))
    })
}

fn reuse_scope(reuse: &Reuse, ctx: &ResolverContext, service: &'static str) -> DiResult<Arc<ScopeNode>> {
    match reuse {
        Reuse::Singleton => Ok(ctx.root_scope().clone()),
        Reuse::Scoped if ctx.view.scope.kind() == ScopeKind::Root => Err(DiError::new(
            ErrorKind::NoCurrentScope,
            format!("{} is scoped but no scope is open", service),
        )),
        Reuse::Scoped => Ok(ctx.view.scope.clone()),
        Reuse::ScopedTo(name) => ctx.view.scope.find_named(name).ok_or_else(|| {
            DiError::new(
                ErrorKind::NoCurrentScope,
                format!("{} is bound to scope '{}' which is not open", service, name),
            )
        }),
        Reuse::InResolutionScope => ctx.resolution_scope(),
        Reuse::Transient => Ok(ctx.owner.clone()),
    }
}
