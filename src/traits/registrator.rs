//! Registration trait shared by the container and the injectable registration view.

use std::sync::Arc;

use crate::collection::RegistrationBuilder;
use crate::decoration::{self, DisposableTracker};
use crate::error::DiResult;
use crate::key::{Key, ServiceType};
use crate::provider::ResolverContext;
use crate::registration::{Factory, FactoryId, Instance, Made, Recipe, Setup};
use crate::reuse::Reuse;
use crate::rules::{IfAlreadyRegistered, Rules};
use crate::wrappers::GenericFamily;

/// Registration surface.
///
/// Implemented by `Container` and by the injectable `ServiceRegistrator`.
/// Every registration publishes a new registry snapshot; resolutions already
/// in flight keep the snapshot they started with.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{Container, Ctor, IfAlreadyRegistered, Made, Param, Registrator, Resolver, Reuse};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct UserService { db: Arc<Database> }
///
/// let container = Container::new();
/// container
///     .register::<Database>()
///     .reuse(Reuse::Singleton)
///     .delegate(|_| Ok(Database { url: "postgres://localhost".to_string() }))
///     .register()
///     .unwrap();
/// container
///     .register_made(Made::new(
///         Ctor::new(|args| Ok(UserService { db: args.get::<Database>(0)? }))
///             .param(Param::of::<Database>()),
///     ))
///     .unwrap();
///
/// let users = container.get_required::<UserService>();
/// assert_eq!(users.db.url, "postgres://localhost");
/// ```
pub trait Registrator: Send + Sync {
    /// Publishes a factory under the given merge policy, or the rules' default.
    ///
    /// Returns `Ok(false)` when the merge policy kept the existing registrations.
    fn add_factory(&self, factory: Factory, if_already_registered: Option<IfAlreadyRegistered>) -> DiResult<bool>;

    /// Rules applied to registrations made through this registrator.
    fn registration_rules(&self) -> Arc<Rules>;

    /// Whether a service factory is registered for `key`.
    fn is_registered(&self, key: &Key) -> bool;

    /// Starts a fluent registration of `T`.
    fn register<T: Send + Sync + 'static>(&self) -> RegistrationBuilder<'_, T>
    where
        Self: Sized,
    {
        RegistrationBuilder::new(self)
    }

    /// Starts a fluent registration of a trait-object service `Arc<T>`.
    fn register_trait<T: ?Sized + Send + Sync + 'static>(&self) -> RegistrationBuilder<'_, Arc<T>>
    where
        Self: Sized,
    {
        RegistrationBuilder::new(self).without_implementation()
    }

    /// Registers a construction recipe with the default reuse.
    fn register_made<T: Send + Sync + 'static>(&self, made: Made<T>) -> DiResult<Option<FactoryId>>
    where
        Self: Sized,
    {
        self.register::<T>().made(made).register()
    }

    /// Registers a delegate.
    fn register_delegate<T, F>(&self, reuse: Reuse, factory: F) -> DiResult<Option<FactoryId>>
    where
        Self: Sized,
        T: Send + Sync + 'static,
        F: Fn(&ResolverContext) -> DiResult<T> + Send + Sync + 'static,
    {
        self.register::<T>().reuse(reuse).delegate(factory).register()
    }

    /// Registers a pre-built instance, reused as a singleton.
    fn register_instance<T: Send + Sync + 'static>(&self, instance: T) -> DiResult<Option<FactoryId>>
    where
        Self: Sized,
    {
        self.register::<T>().instance(instance).register()
    }

    /// Registers an open-generic family; every closed member `F: Closes<A>`
    /// becomes resolvable through `get_generic::<F, A>()`.
    fn register_open_generic<F: GenericFamily>(&self, reuse: Reuse) -> DiResult<Option<FactoryId>>
    where
        Self: Sized,
    {
        let factory = Factory::new(ServiceType::of::<F>(), reuse, Setup::default(), Recipe::OpenGeneric);
        let id = factory.id();
        Ok(self.add_factory(factory, None)?.then_some(id))
    }

    /// Registers a decorator for every resolution of `T`.
    fn register_decorator<T, F>(&self, decorator: F) -> DiResult<Option<FactoryId>>
    where
        Self: Sized,
        T: Send + Sync + 'static,
        F: Fn(Arc<T>, &ResolverContext) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        self.register_decorator_with::<T, F>(Setup::default(), decorator)
    }

    /// Registers a decorator with setup flags (condition, `use_decoratee_reuse`).
    fn register_decorator_with<T, F>(&self, setup: Setup, decorator: F) -> DiResult<Option<FactoryId>>
    where
        Self: Sized,
        T: Send + Sync + 'static,
        F: Fn(Arc<T>, &ResolverContext) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        let factory = decoration::decorator_factory(ServiceType::of::<T>(), setup, decoration::typed_decorator(decorator));
        let id = factory.id();
        Ok(self.add_factory(factory, None)?.then_some(id))
    }

    /// Registers an initializer: a decorator that runs `action` and returns its input.
    fn register_initializer<T, F>(&self, action: F) -> DiResult<Option<FactoryId>>
    where
        Self: Sized,
        T: Send + Sync + 'static,
        F: Fn(&T, &ResolverContext) -> DiResult<()> + Send + Sync + 'static,
    {
        self.register_initializer_with::<T, F>(Setup::default(), action)
    }

    /// Registers an initializer with setup flags, typically a condition.
    fn register_initializer_with<T, F>(&self, setup: Setup, action: F) -> DiResult<Option<FactoryId>>
    where
        Self: Sized,
        T: Send + Sync + 'static,
        F: Fn(&T, &ResolverContext) -> DiResult<()> + Send + Sync + 'static,
    {
        let factory = decoration::decorator_factory(ServiceType::of::<T>(), setup, decoration::typed_initializer(action));
        let id = factory.id();
        Ok(self.add_factory(factory, None)?.then_some(id))
    }

    /// Registers an initializer that runs for every resolved service.
    fn register_initializer_any<F>(&self, action: F) -> DiResult<Option<FactoryId>>
    where
        Self: Sized,
        F: Fn(&Instance, &ResolverContext) -> DiResult<()> + Send + Sync + 'static,
    {
        self.register_initializer_any_with(Setup::default(), action)
    }

    /// Registers a universal initializer with setup flags.
    fn register_initializer_any_with<F>(&self, setup: Setup, action: F) -> DiResult<Option<FactoryId>>
    where
        Self: Sized,
        F: Fn(&Instance, &ResolverContext) -> DiResult<()> + Send + Sync + 'static,
    {
        let factory = decoration::decorator_factory(decoration::any_target(), setup, decoration::any_initializer(action));
        let id = factory.id();
        Ok(self.add_factory(factory, None)?.then_some(id))
    }

    /// Registers a scoped [`DisposableTracker`] and a universal initializer that
    /// hands every transient disposable to it.
    fn register_disposable_tracker(&self) -> DiResult<()>
    where
        Self: Sized,
    {
        self.register::<DisposableTracker>()
            .reuse(Reuse::Scoped)
            .disposable()
            .made(Made::of(DisposableTracker::default))
            .if_already_registered(IfAlreadyRegistered::Keep)
            .register()?;
        self.register_initializer_any_with(
            Setup::new().condition(|req| req.reuse().is_transient() && !req.tracks_disposable()),
            decoration::capture_into_tracker,
        )?;
        Ok(())
    }
}
