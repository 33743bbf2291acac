//! Container rules: the configuration object consulted by registration and resolution.
//!
//! `Rules` is an immutable value. Every builder call returns a copy with a fresh
//! identity, which keys the compiled-producer cache so that a scope opened with
//! overridden rules never reuses producers compiled under different rules.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "config")]
use crate::error::{DiError, DiResult, ErrorKind};
use crate::key::ServiceKey;
use crate::provider::{Container, Request};
use crate::registration::Factory;
use crate::reuse::Reuse;

static NEXT_RULES_ID: AtomicU64 = AtomicU64::new(1);

fn next_rules_id() -> u64 {
    NEXT_RULES_ID.fetch_add(1, Ordering::Relaxed)
}

/// Merge policy applied when a capability already has registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
pub enum IfAlreadyRegistered {
    /// Fail with `AlreadyRegistered`.
    Throw,
    /// Ignore the new registration.
    Keep,
    /// Drop prior registrations with the same service key.
    Replace,
    /// Append; a duplicate service key fails with `AlreadyRegistered`.
    #[default]
    AppendNonKeyed,
    /// Append unless a registration with the same implementation type exists.
    AppendNewImplementation,
}

/// Custom selection among several candidate factories.
pub type SelectFactory = Arc<dyn Fn(&Request, &[Arc<Factory>]) -> Option<Arc<Factory>> + Send + Sync>;

/// Last-resort factory source consulted after every other resolution step.
///
/// Returning the same `Arc<Factory>` for the same request keeps reused
/// instances stable across calls.
pub type UnknownServiceResolver = Arc<dyn Fn(&Request) -> Option<Arc<Factory>> + Send + Sync>;

/// Strategy picking one factory among multiple default registrations.
#[derive(Clone)]
pub enum FactorySelector {
    /// The most recently registered factory wins.
    PreferLastRegistered,
    /// A factory registered with this key wins over the unkeyed defaults.
    PreferKey(ServiceKey),
    /// User supplied selection.
    Custom(SelectFactory),
}

impl FactorySelector {
    pub(crate) fn select(&self, request: &Request, candidates: &[Arc<Factory>]) -> Option<Arc<Factory>> {
        match self {
            FactorySelector::PreferLastRegistered => candidates.iter().max_by_key(|f| f.id()).cloned(),
            FactorySelector::PreferKey(key) => candidates
                .iter()
                .find(|f| f.service_key() == Some(key))
                .or_else(|| {
                    let defaults: Vec<_> = candidates.iter().filter(|f| f.service_key().is_none()).collect();
                    if defaults.len() == 1 {
                        defaults.into_iter().next()
                    } else {
                        None
                    }
                })
                .cloned(),
            FactorySelector::Custom(select) => select(request, candidates),
        }
    }
}

impl fmt::Debug for FactorySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactorySelector::PreferLastRegistered => f.write_str("PreferLastRegistered"),
            FactorySelector::PreferKey(key) => write!(f, "PreferKey({})", key),
            FactorySelector::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// How a construction recipe is picked when a `Made` declares several constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
pub enum ConstructorSelector {
    /// Exactly one constructor is expected.
    #[default]
    Single,
    /// The constructor with the most parameters, all of them resolvable.
    MostResolvable,
}

/// Container configuration.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{Container, FactorySelector, Reuse, Rules};
///
/// let rules = Rules::default()
///     .with_factory_selector(FactorySelector::PreferLastRegistered)
///     .with_default_reuse(Reuse::Singleton)
///     .without_throw_on_disposable_transient();
///
/// assert_eq!(rules.default_reuse(), &Reuse::Singleton);
/// let container = Container::with_rules(rules);
/// ```
#[derive(Clone)]
pub struct Rules {
    id: u64,
    factory_selector: Option<FactorySelector>,
    unknown_service_resolvers: Vec<UnknownServiceResolver>,
    fallback_containers: Vec<Container>,
    implicit_scope_check: bool,
    throw_on_shorter_lifespan: bool,
    throw_on_disposable_transient: bool,
    track_disposable_transient: bool,
    default_reuse: Reuse,
    default_if_already_registered: IfAlreadyRegistered,
    throw_if_runtime_state_required: bool,
    resolve_enumerable_as_lazy: bool,
    constructor_selector: ConstructorSelector,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            id: next_rules_id(),
            factory_selector: None,
            unknown_service_resolvers: Vec::new(),
            fallback_containers: Vec::new(),
            implicit_scope_check: true,
            throw_on_shorter_lifespan: true,
            throw_on_disposable_transient: true,
            track_disposable_transient: false,
            default_reuse: Reuse::Transient,
            default_if_already_registered: IfAlreadyRegistered::AppendNonKeyed,
            throw_if_runtime_state_required: false,
            resolve_enumerable_as_lazy: false,
            constructor_selector: ConstructorSelector::Single,
        }
    }
}

impl Rules {
    fn renew(mut self) -> Self {
        self.id = next_rules_id();
        self
    }

    /// Identity of this rules value; changes on every modification.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Picks among multiple default registrations instead of failing.
    pub fn with_factory_selector(mut self, selector: FactorySelector) -> Self {
        self.factory_selector = Some(selector);
        self.renew()
    }

    /// Appends an unknown-service resolver.
    pub fn with_unknown_service_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Request) -> Option<Arc<Factory>> + Send + Sync + 'static,
    {
        self.unknown_service_resolvers.push(Arc::new(resolver));
        self.renew()
    }

    /// Appends a fallback container consulted when nothing here matches.
    pub fn with_fallback_container(mut self, container: Container) -> Self {
        self.fallback_containers.push(container);
        self.renew()
    }

    /// Keeps registrations bound to scopes that are not open as candidates.
    pub fn without_implicit_scope_check(mut self) -> Self {
        self.implicit_scope_check = false;
        self.renew()
    }

    /// Disables the reuse lifespan mismatch check.
    pub fn without_throw_on_shorter_lifespan(mut self) -> Self {
        self.throw_on_shorter_lifespan = false;
        self.renew()
    }

    /// Allows registering transient disposables.
    pub fn without_throw_on_disposable_transient(mut self) -> Self {
        self.throw_on_disposable_transient = false;
        self.renew()
    }

    /// Tracks transient disposables in the owning scope.
    pub fn with_track_disposable_transient(mut self) -> Self {
        self.track_disposable_transient = true;
        self.renew()
    }

    /// Reuse applied when a registration does not specify one.
    pub fn with_default_reuse(mut self, reuse: Reuse) -> Self {
        self.default_reuse = reuse;
        self.renew()
    }

    /// Merge policy applied when a registration does not specify one.
    pub fn with_default_if_already_registered(mut self, policy: IfAlreadyRegistered) -> Self {
        self.default_if_already_registered = policy;
        self.renew()
    }

    /// Fails resolution that depends on delegates, literal instances or object keys.
    pub fn with_throw_if_runtime_state_required(mut self) -> Self {
        self.throw_if_runtime_state_required = true;
        self.renew()
    }

    /// Makes `Many<T>` a lazy, restartable sequence.
    pub fn with_resolve_enumerable_as_lazy(mut self) -> Self {
        self.resolve_enumerable_as_lazy = true;
        self.renew()
    }

    /// Selects among several constructors of one recipe.
    pub fn with_constructor_selector(mut self, selector: ConstructorSelector) -> Self {
        self.constructor_selector = selector;
        self.renew()
    }

    pub fn factory_selector(&self) -> Option<&FactorySelector> {
        self.factory_selector.as_ref()
    }

    pub fn unknown_service_resolvers(&self) -> &[UnknownServiceResolver] {
        &self.unknown_service_resolvers
    }

    pub fn fallback_containers(&self) -> &[Container] {
        &self.fallback_containers
    }

    pub fn implicit_scope_check(&self) -> bool {
        self.implicit_scope_check
    }

    pub fn throw_on_shorter_lifespan(&self) -> bool {
        self.throw_on_shorter_lifespan
    }

    pub fn throw_on_disposable_transient(&self) -> bool {
        self.throw_on_disposable_transient
    }

    pub fn track_disposable_transient(&self) -> bool {
        self.track_disposable_transient
    }

    pub fn default_reuse(&self) -> &Reuse {
        &self.default_reuse
    }

    pub fn default_if_already_registered(&self) -> IfAlreadyRegistered {
        self.default_if_already_registered
    }

    pub fn throw_if_runtime_state_required(&self) -> bool {
        self.throw_if_runtime_state_required
    }

    pub fn resolve_enumerable_as_lazy(&self) -> bool {
        self.resolve_enumerable_as_lazy
    }

    pub fn constructor_selector(&self) -> ConstructorSelector {
        self.constructor_selector
    }
}

impl fmt::Debug for Rules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rules")
            .field("id", &self.id)
            .field("factory_selector", &self.factory_selector)
            .field("unknown_service_resolvers", &self.unknown_service_resolvers.len())
            .field("fallback_containers", &self.fallback_containers.len())
            .field("implicit_scope_check", &self.implicit_scope_check)
            .field("throw_on_shorter_lifespan", &self.throw_on_shorter_lifespan)
            .field("throw_on_disposable_transient", &self.throw_on_disposable_transient)
            .field("track_disposable_transient", &self.track_disposable_transient)
            .field("default_reuse", &self.default_reuse)
            .field("default_if_already_registered", &self.default_if_already_registered)
            .field("throw_if_runtime_state_required", &self.throw_if_runtime_state_required)
            .field("resolve_enumerable_as_lazy", &self.resolve_enumerable_as_lazy)
            .field("constructor_selector", &self.constructor_selector)
            .finish()
    }
}

/// Serializable subset of [`Rules`]: the options that are plain data.
///
/// Strategies (factory selectors, unknown-service resolvers, fallback
/// containers) are code and must be added with the builder methods.
#[cfg(feature = "config")]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RulesConfig {
    pub prefer_last_registered: bool,
    pub without_implicit_scope_check: bool,
    pub without_throw_on_shorter_lifespan: bool,
    pub without_throw_on_disposable_transient: bool,
    pub track_disposable_transient: bool,
    /// One of `transient`, `singleton`, `scoped`, `resolution_scope`, or a scope name
    /// prefixed with `scoped_to:`.
    pub default_reuse: Option<String>,
    pub default_if_already_registered: Option<IfAlreadyRegistered>,
    pub throw_if_runtime_state_required: bool,
    pub resolve_enumerable_as_lazy: bool,
    pub constructor_selector: Option<ConstructorSelector>,
}

#[cfg(feature = "config")]
fn parse_reuse(value: &str) -> DiResult<Reuse> {
    match value {
        "transient" => Ok(Reuse::Transient),
        "singleton" => Ok(Reuse::Singleton),
        "scoped" => Ok(Reuse::Scoped),
        "resolution_scope" => Ok(Reuse::InResolutionScope),
        other => other
            .strip_prefix("scoped_to:")
            .map(Reuse::scoped_to)
            .ok_or_else(|| DiError::new(ErrorKind::TypeMismatch, format!("unknown reuse '{}'", other))),
    }
}

#[cfg(feature = "config")]
impl Rules {
    /// Applies a deserialized configuration on top of the defaults.
    pub fn from_config(config: &RulesConfig) -> DiResult<Self> {
        let mut rules = Rules::default();
        if config.prefer_last_registered {
            rules = rules.with_factory_selector(FactorySelector::PreferLastRegistered);
        }
        if config.without_implicit_scope_check {
            rules = rules.without_implicit_scope_check();
        }
        if config.without_throw_on_shorter_lifespan {
            rules = rules.without_throw_on_shorter_lifespan();
        }
        if config.without_throw_on_disposable_transient {
            rules = rules.without_throw_on_disposable_transient();
        }
        if config.track_disposable_transient {
            rules = rules.with_track_disposable_transient();
        }
        if let Some(reuse) = &config.default_reuse {
            rules = rules.with_default_reuse(parse_reuse(reuse)?);
        }
        if let Some(policy) = config.default_if_already_registered {
            rules = rules.with_default_if_already_registered(policy);
        }
        if config.throw_if_runtime_state_required {
            rules = rules.with_throw_if_runtime_state_required();
        }
        if config.resolve_enumerable_as_lazy {
            rules = rules.with_resolve_enumerable_as_lazy();
        }
        if let Some(selector) = config.constructor_selector {
            rules = rules.with_constructor_selector(selector);
        }
        Ok(rules)
    }

    /// Parses a JSON [`RulesConfig`] document.
    pub fn from_json(json: &str) -> DiResult<Self> {
        let config: RulesConfig = serde_json::from_str(json)
            .map_err(|e| DiError::new(ErrorKind::TypeMismatch, format!("invalid rules config: {}", e)))?;
        Self::from_config(&config)
    }
}
