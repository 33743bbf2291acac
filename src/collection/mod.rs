//! Registration surface: the fluent registration builder and the injectable
//! registration-only view.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{DiError, DiResult, ErrorKind};
use crate::key::{Key, ServiceKey, ServiceType};
use crate::provider::{Container, ResolverContext};
use crate::registration::{dispose_probe, AnyArc, DisposeProbe, Factory, FactoryId, Made, Recipe, Setup};
use crate::reuse::Reuse;
use crate::rules::{IfAlreadyRegistered, Rules};
use crate::traits::{Dispose, Registrator};

/// Fluent registration of a service `T`.
///
/// Pick the options, then exactly one recipe (`made`, `delegate` or
/// `instance`), then call [`register`](Self::register).
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{Container, IfAlreadyRegistered, Registrator, Resolver, Reuse};
///
/// struct Port(u16);
///
/// let container = Container::new();
/// container
///     .register::<Port>()
///     .key("admin")
///     .reuse(Reuse::Singleton)
///     .delegate(|_| Ok(Port(9000)))
///     .register()
///     .unwrap();
///
/// // Same key again is rejected by the default merge policy
/// let again = container.register::<Port>().key("admin").instance(Port(9001)).register();
/// assert!(again.is_err());
///
/// // ...unless the new one replaces it
/// container
///     .register::<Port>()
///     .key("admin")
///     .if_already_registered(IfAlreadyRegistered::Replace)
///     .instance(Port(9002))
///     .register()
///     .unwrap();
/// assert_eq!(container.get_keyed::<Port>("admin").unwrap().0, 9002);
/// ```
#[must_use = "call .register() to publish the registration"]
pub struct RegistrationBuilder<'a, T> {
    target: &'a dyn Registrator,
    reuse: Option<Reuse>,
    service_key: Option<ServiceKey>,
    implementation: Option<ServiceType>,
    if_already_registered: Option<IfAlreadyRegistered>,
    setup: Setup,
    recipe: Option<Recipe>,
    disposable: Option<DisposeProbe>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Send + Sync + 'static> RegistrationBuilder<'a, T> {
    pub(crate) fn new(target: &'a dyn Registrator) -> Self {
        Self {
            target,
            reuse: None,
            service_key: None,
            implementation: Some(ServiceType::of::<T>()),
            if_already_registered: None,
            setup: Setup::default(),
            recipe: None,
            disposable: None,
            _marker: PhantomData,
        }
    }

    /// Reuse policy; defaults to the rules' default reuse
    /// (singleton for instances).
    pub fn reuse(mut self, reuse: Reuse) -> Self {
        self.reuse = Some(reuse);
        self
    }

    /// Service key distinguishing this registration.
    pub fn key(mut self, key: impl Into<ServiceKey>) -> Self {
        self.service_key = Some(key.into());
        self
    }

    /// Implementation type, used by `AppendNewImplementation` and
    /// required-implementation requests.
    pub fn implementation<I: ?Sized + 'static>(mut self) -> Self {
        self.implementation = Some(ServiceType::of::<I>());
        self
    }

    /// Clears the implementation type, so the registration is always appended
    /// under `AppendNewImplementation`.
    pub fn without_implementation(mut self) -> Self {
        self.implementation = None;
        self
    }

    /// Merge policy; defaults to the rules' default.
    pub fn if_already_registered(mut self, policy: IfAlreadyRegistered) -> Self {
        self.if_already_registered = Some(policy);
        self
    }

    /// Setup flags.
    pub fn setup(mut self, setup: Setup) -> Self {
        self.setup = setup;
        self
    }

    /// Declarative construction recipe.
    pub fn made(mut self, made: Made<T>) -> Self {
        let (erased, disposable) = made.into_erased();
        self.recipe = Some(Recipe::Made(Arc::new(erased)));
        if disposable.is_some() {
            self.disposable = disposable;
        }
        self
    }

    /// Delegate recipe.
    pub fn delegate<F>(mut self, factory: F) -> Self
    where
        F: Fn(&ResolverContext) -> DiResult<T> + Send + Sync + 'static,
    {
        self.recipe = Some(Recipe::Delegate(Arc::new(move |ctx| {
            factory(ctx).map(|value| Arc::new(value) as AnyArc)
        })));
        self
    }

    /// Pre-built instance.
    pub fn instance(mut self, instance: T) -> Self {
        self.recipe = Some(Recipe::Instance(Arc::new(instance)));
        self
    }

    /// Publishes the registration.
    ///
    /// Returns the new factory id, or `None` when the merge policy kept the
    /// existing registrations.
    pub fn register(self) -> DiResult<Option<FactoryId>> {
        let recipe = self.recipe.ok_or_else(|| {
            DiError::new(
                ErrorKind::ConstructorSelection,
                format!("no construction recipe given for {}", std::any::type_name::<T>()),
            )
        })?;
        let reuse = match (self.reuse, &recipe) {
            (Some(reuse), _) => reuse,
            (None, Recipe::Instance(_)) => Reuse::Singleton,
            (None, _) => self.target.registration_rules().default_reuse().clone(),
        };
        let mut factory = Factory::new(ServiceType::of::<T>(), reuse, self.setup, recipe);
        factory.service_key = self.service_key;
        factory.implementation = self.implementation;
        factory.disposable = self.disposable;
        let id = factory.id();
        Ok(self.target.add_factory(factory, self.if_already_registered)?.then_some(id))
    }
}

impl<'a, T: Dispose> RegistrationBuilder<'a, T> {
    /// Declares the built instances disposable.
    pub fn disposable(mut self) -> Self {
        self.disposable = Some(dispose_probe::<T>);
        self
    }
}

/// Registration-only view of the container, resolvable without registration.
#[derive(Clone)]
pub struct ServiceRegistrator {
    view: Container,
}

impl ServiceRegistrator {
    pub(crate) fn new(view: Container) -> Self {
        Self { view }
    }
}

impl Registrator for ServiceRegistrator {
    fn add_factory(&self, factory: Factory, if_already_registered: Option<IfAlreadyRegistered>) -> DiResult<bool> {
        self.view.add_factory(factory, if_already_registered)
    }

    fn registration_rules(&self) -> Arc<Rules> {
        self.view.registration_rules()
    }

    fn is_registered(&self, key: &Key) -> bool {
        self.view.is_registered(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::Ctor;

    #[test]
    fn missing_recipe_is_an_error() {
        let container = Container::new();
        let err = container.register::<u8>().reuse(Reuse::Singleton).register().unwrap_err();
        assert!(err.is(ErrorKind::ConstructorSelection));
    }

    #[test]
    fn instances_default_to_singleton() {
        let container = Container::new();
        container.register_instance(5u8).unwrap();
        let descriptors = container.service_descriptors();
        assert_eq!(descriptors[0].reuse, Reuse::Singleton);
    }

    #[test]
    fn default_reuse_comes_from_rules() {
        let container = Container::with_rules(Rules::default().with_default_reuse(Reuse::Singleton));
        container
            .register_made(Made::new(Ctor::new(|_| Ok(1u16))))
            .unwrap();
        assert_eq!(container.service_descriptors()[0].reuse, Reuse::Singleton);
    }

    #[test]
    fn trait_registrations_have_no_implementation_by_default() {
        trait Shape: Send + Sync {}
        struct Square;
        impl Shape for Square {}

        let container = Container::new();
        container
            .register_trait::<dyn Shape>()
            .delegate(|_| Ok(Arc::new(Square) as Arc<dyn Shape>))
            .register()
            .unwrap();
        assert!(container.service_descriptors()[0].implementation.is_none());
    }

    #[test]
    fn registrator_view_shares_the_registry() {
        let container = Container::new();
        let registrator = ServiceRegistrator::new(container.clone());
        registrator.register_instance(3u32).unwrap();
        assert!(container.is_registered(&Key::of::<u32>()));
    }
}
