//! Service descriptors for introspection and diagnostics.

use crate::key::{Key, ServiceKey, ServiceType};
use crate::registration::{Factory, FactoryId, FactoryKind};
use crate::reuse::Reuse;

/// Snapshot view of one registration.
///
/// Descriptors are copied out of the registry snapshot current at the time of
/// the call; later registrations do not change them.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::{Container, Registrator, Reuse};
///
/// struct Database;
///
/// let container = Container::new();
/// container.register_instance(Database).unwrap();
/// container.register::<u16>().key("port").instance(5432).register().unwrap();
///
/// let descriptors = container.service_descriptors();
/// let db = descriptors.iter().find(|d| d.type_name().contains("Database")).unwrap();
/// assert_eq!(db.reuse, Reuse::Singleton);
/// assert!(!db.is_keyed());
///
/// let port = descriptors.iter().find(|d| d.is_keyed()).unwrap();
/// assert_eq!(port.type_name(), "u16");
/// ```
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    /// Factory id; registration order follows id order.
    pub id: FactoryId,
    /// The capability the factory provides.
    pub key: Key,
    /// Reuse policy.
    pub reuse: Reuse,
    /// Implementation type, when known.
    pub implementation: Option<ServiceType>,
    /// Service, decorator or wrapper.
    pub kind: FactoryKind,
    /// Whether built instances are disposed with their owning scope.
    pub disposable: bool,
    /// Whether the factory is conditional.
    pub conditional: bool,
    /// Whether the factory holds runtime state (delegate, instance, object key).
    pub runtime_state: bool,
}

impl ServiceDescriptor {
    pub(crate) fn from_factory(factory: &Factory) -> Self {
        Self {
            id: factory.id(),
            key: Key::from_type(factory.service()).with_optional_key(factory.service_key().cloned()),
            reuse: factory.reuse().clone(),
            implementation: factory.implementation(),
            kind: factory.kind(),
            disposable: factory.is_disposable(),
            conditional: factory.setup().condition.is_some(),
            runtime_state: factory.requires_runtime_state(),
        }
    }

    /// The service key, if keyed.
    pub fn service_key(&self) -> Option<&ServiceKey> {
        self.key.service_key()
    }

    /// Full type name of the service.
    pub fn type_name(&self) -> &'static str {
        self.key.service().name()
    }

    /// Whether the registration is keyed.
    pub fn is_keyed(&self) -> bool {
        self.service_key().is_some()
    }
}
