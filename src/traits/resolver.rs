//! Resolver traits for service resolution.

use std::any::Any;
use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::key::{ServiceKey, ServiceType};
use crate::provider::{engine, ResolverContext, ServiceInfo};
use crate::registration::IfUnresolved;
use crate::wrappers::{Closes, LazyMany, Wrapper};

/// Core resolver trait for object-safe service resolution.
///
/// Everything resolves through a [`ResolverContext`]: the view of the container
/// or scope being resolved from, plus the request frame when the call is made
/// from inside a factory. Most users should use the [`Resolver`] trait instead,
/// which provides typed methods built on top of this one.
pub trait ResolverCore: Send + Sync {
    /// Context that resolution from this resolver starts in.
    fn context(&self) -> ResolverContext;

    /// Resolves a service described by `info`.
    ///
    /// Returns `Ok(None)` only when nothing matched and `if_unresolved` is
    /// [`IfUnresolved::ReturnDefault`].
    fn resolve_info(
        &self,
        info: &ServiceInfo,
        if_unresolved: IfUnresolved,
    ) -> DiResult<Option<Arc<dyn Any + Send + Sync>>> {
        engine::resolve(&self.context(), info, if_unresolved)
    }

    /// Resolves every registration matching `info`, in registration order.
    fn resolve_all_info(&self, info: &ServiceInfo) -> DiResult<Vec<Arc<dyn Any + Send + Sync>>> {
        engine::resolve_all(&self.context(), info)
    }
}

pub(crate) fn downcast<T: Send + Sync + 'static>(value: Arc<dyn Any + Send + Sync>) -> DiResult<Arc<T>> {
    value
        .downcast::<T>()
        .map_err(|_| DiError::type_mismatch(std::any::type_name::<T>()))
}

pub(crate) fn downcast_trait<T: ?Sized + Send + Sync + 'static>(value: Arc<dyn Any + Send + Sync>) -> DiResult<Arc<T>> {
    // Trait objects are stored as Arc<Arc<dyn Trait>>
    downcast::<Arc<T>>(value).map(|boxed| (*boxed).clone())
}

/// High-level resolver interface with generic methods for type-safe service resolution.
///
/// `Container`, `Scope`, `ResolverContext` and the injectable `ServiceResolver`
/// all implement this trait.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{Container, Registrator, Resolver, Reuse};
/// use std::sync::Arc;
///
/// trait Logger: Send + Sync {
///     fn log(&self, msg: &str) -> String;
/// }
///
/// struct ConsoleLogger;
/// impl Logger for ConsoleLogger {
///     fn log(&self, msg: &str) -> String {
///         format!("LOG: {}", msg)
///     }
/// }
///
/// let container = Container::new();
/// container.register_instance(42usize).unwrap();
/// container
///     .register_trait::<dyn Logger>()
///     .reuse(Reuse::Singleton)
///     .delegate(|_| Ok(Arc::new(ConsoleLogger) as Arc<dyn Logger>))
///     .register()
///     .unwrap();
///
/// assert_eq!(*container.get_required::<usize>(), 42);
/// let logger = container.get_required_trait::<dyn Logger>();
/// assert_eq!(logger.log("resolved"), "LOG: resolved");
/// ```
pub trait Resolver: ResolverCore {
    /// Resolves a concrete service type.
    ///
    /// # Examples
    ///
    /// ```
    /// use ferrous_ioc::{Container, Registrator, Resolver};
    ///
    /// let container = Container::new();
    /// container.register_instance("configuration".to_string()).unwrap();
    ///
    /// let config = container.get::<String>().unwrap();
    /// assert_eq!(&*config, "configuration");
    /// ```
    fn get<T: Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.resolve::<T>(None, None, IfUnresolved::Throw)?
            .ok_or_else(|| DiError::unknown_service(std::any::type_name::<T>()))
    }

    /// Resolves a concrete service type, panicking on failure.
    ///
    /// # Panics
    ///
    /// Panics if the service cannot be resolved.
    fn get_required<T: Send + Sync + 'static>(&self) -> Arc<T> {
        self.get::<T>()
            .unwrap_or_else(|e| panic!("Failed to resolve {}: {}", std::any::type_name::<T>(), e))
    }

    /// Resolves `T` if anything provides it.
    fn try_get<T: Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        self.resolve::<T>(None, None, IfUnresolved::ReturnDefault)
    }

    /// Resolves the registration of `T` with service key `key`.
    fn get_keyed<T: Send + Sync + 'static>(&self, key: impl Into<ServiceKey>) -> DiResult<Arc<T>> {
        let key = key.into();
        self.resolve::<T>(Some(key.clone()), None, IfUnresolved::Throw)?
            .ok_or_else(|| DiError::unknown_service(format!("{} {{key={}}}", std::any::type_name::<T>(), key)))
    }

    /// Full resolution call: optional service key, optional required
    /// implementation type and the policy for unresolved services.
    fn resolve<T: Send + Sync + 'static>(
        &self,
        key: Option<ServiceKey>,
        required_impl: Option<ServiceType>,
        if_unresolved: IfUnresolved,
    ) -> DiResult<Option<Arc<T>>> {
        let info = ServiceInfo::of::<T>()
            .with_optional_key(key)
            .with_optional_impl(required_impl);
        self.resolve_info(&info, if_unresolved)?.map(downcast::<T>).transpose()
    }

    /// Resolves a trait-object service registered with `register_trait`.
    fn get_trait<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        let value = self
            .resolve_info(&ServiceInfo::of::<Arc<T>>(), IfUnresolved::Throw)?
            .ok_or_else(|| DiError::unknown_service(std::any::type_name::<Arc<T>>()))?;
        downcast_trait::<T>(value)
    }

    /// Resolves a keyed trait-object service.
    fn get_keyed_trait<T: ?Sized + Send + Sync + 'static>(&self, key: impl Into<ServiceKey>) -> DiResult<Arc<T>> {
        let info = ServiceInfo::of::<Arc<T>>().with_key(key);
        let value = self
            .resolve_info(&info, IfUnresolved::Throw)?
            .ok_or_else(|| DiError::unknown_service(info.key()))?;
        downcast_trait::<T>(value)
    }

    /// Resolves a trait-object service, panicking on failure.
    ///
    /// # Panics
    ///
    /// Panics if the trait cannot be resolved.
    fn get_required_trait<T: ?Sized + Send + Sync + 'static>(&self) -> Arc<T> {
        self.get_trait::<T>()
            .unwrap_or_else(|e| panic!("Failed to resolve trait {}: {}", std::any::type_name::<T>(), e))
    }

    /// Resolves every registration of `T` now, in registration order.
    fn get_all<T: Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
        self.resolve_all_info(&ServiceInfo::of::<T>())?
            .into_iter()
            .map(downcast::<T>)
            .collect()
    }

    /// Resolves every implementation of a trait-object service.
    fn get_all_trait<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Vec<Arc<T>>> {
        self.resolve_all_info(&ServiceInfo::of::<Arc<T>>())?
            .into_iter()
            .map(downcast_trait::<T>)
            .collect()
    }

    /// Lazy, restartable sequence of every registration of `T`.
    ///
    /// Each iteration re-reads the current registrations, so services
    /// registered after this call are seen by later iterations.
    fn resolve_many<T: Send + Sync + 'static>(&self) -> LazyMany<T> {
        LazyMany::new(self.context().resolution_call(), ServiceInfo::of::<T>())
    }

    /// Resolves a wrapper such as `Lazy<T>`, `Func<T>` or `Many<T>`.
    fn get_wrapped<W: Wrapper>(&self) -> DiResult<W> {
        let info = ServiceInfo::wrapped::<W>();
        let value = self
            .resolve_info(&info, IfUnresolved::Throw)?
            .ok_or_else(|| DiError::unknown_service(info.key()))?;
        downcast::<W>(value).map(|w| (*w).clone())
    }

    /// Resolves the member `A` of the open-generic family `F`.
    fn get_generic<F, A>(&self) -> DiResult<Arc<F::Closed>>
    where
        F: Closes<A>,
        A: ?Sized + 'static,
    {
        let info = ServiceInfo::generic::<F, A>();
        let value = self
            .resolve_info(&info, IfUnresolved::Throw)?
            .ok_or_else(|| DiError::unknown_service(info.key()))?;
        downcast::<F::Closed>(value)
    }
}
