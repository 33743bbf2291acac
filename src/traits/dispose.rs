//! Disposal trait for resource cleanup.

use std::sync::Arc;

/// Trait for synchronous resource disposal.
///
/// Implement this trait for services that need structured teardown (flushing
/// caches, closing connections). Register the service as disposable and the
/// owning scope calls `dispose` exactly once when it closes, in reverse
/// creation order.
///
/// A panicking `dispose` does not stop the teardown of the remaining items;
/// the scope reports the failure count from `dispose()` afterwards.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{Container, Dispose, Registrator, Resolver, Reuse};
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// #[derive(Default)]
/// struct Cache {
///     flushed: AtomicBool,
/// }
///
/// impl Dispose for Cache {
///     fn dispose(&self) {
///         self.flushed.store(true, Ordering::SeqCst);
///     }
/// }
///
/// let container = Container::new();
/// container.register::<Cache>()
///     .reuse(Reuse::Scoped)
///     .disposable()
///     .delegate(|_| Ok(Cache::default()))
///     .register()
///     .unwrap();
///
/// let scope = container.open_scope(None).unwrap();
/// let cache = scope.get_required::<Cache>();
/// scope.dispose().unwrap();
/// assert!(cache.flushed.load(Ordering::SeqCst));
/// ```
pub trait Dispose: Send + Sync + 'static {
    /// Perform synchronous cleanup of resources.
    fn dispose(&self);
}

// Lets trait-object services (stored as `Arc<dyn Trait>`) be disposable when
// the trait extends `Dispose`.
impl<T: ?Sized + Dispose> Dispose for Arc<T> {
    fn dispose(&self) {
        (**self).dispose()
    }
}
