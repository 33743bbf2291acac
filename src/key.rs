//! Capability keys: what a registration provides and what a request asks for.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Runtime identity of a service type.
///
/// Equality and hashing use the `TypeId` only; the name is kept for diagnostics.
#[derive(Clone, Copy)]
pub struct ServiceType {
    id: TypeId,
    name: &'static str,
}

impl ServiceType {
    /// Service type of `T`.
    #[inline(always)]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The `TypeId` of the service type.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The `std::any::type_name` of the service type.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The type name without module path, e.g. `Foo<Bar>` for `app::Foo<app::Bar>`.
    pub fn short_name(&self) -> String {
        short_type_name(self.name)
    }
}

impl PartialEq for ServiceType {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceType {}

impl Hash for ServiceType {
    #[inline(always)]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

pub(crate) fn short_type_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut segment = String::new();
    for ch in name.chars() {
        match ch {
            ':' => segment.clear(),
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | '&' | ';' => {
                out.push_str(&segment);
                segment.clear();
                out.push(ch);
            }
            _ => segment.push(ch),
        }
    }
    out.push_str(&segment);
    out
}

/// An opaque object used as a service key. Compared by identity.
#[derive(Clone)]
pub struct ObjectKey {
    value: Arc<dyn Any + Send + Sync>,
    label: &'static str,
}

impl ObjectKey {
    /// Wraps `value` as an identity-compared key.
    pub fn new<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            value,
            label: std::any::type_name::<T>(),
        }
    }

    /// The key object.
    pub fn value(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.value
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.value) as *const ()
    }
}

impl PartialEq for ObjectKey {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for ObjectKey {}

impl Hash for ObjectKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.addr() as usize).hash(state);
    }
}

/// Optional key distinguishing registrations of the same service type.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::ServiceKey;
///
/// let a: ServiceKey = "primary".into();
/// let b = ServiceKey::from(7i64);
/// assert!(a.is_primitive() && b.is_primitive());
/// assert_eq!(a.to_string(), "\"primary\"");
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum ServiceKey {
    /// String key.
    Name(Arc<str>),
    /// Integer key.
    Index(i64),
    /// Identity-compared object key; counts as runtime state.
    Object(ObjectKey),
}

impl ServiceKey {
    /// Primitive keys are reproducible from source; object keys are not.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, ServiceKey::Object(_))
    }

    /// Object key from a shared value.
    pub fn object<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        ServiceKey::Object(ObjectKey::new(value))
    }
}

impl From<&'static str> for ServiceKey {
    fn from(value: &'static str) -> Self {
        ServiceKey::Name(Arc::from(value))
    }
}

impl From<String> for ServiceKey {
    fn from(value: String) -> Self {
        ServiceKey::Name(Arc::from(value))
    }
}

impl From<i64> for ServiceKey {
    fn from(value: i64) -> Self {
        ServiceKey::Index(value)
    }
}

impl From<i32> for ServiceKey {
    fn from(value: i32) -> Self {
        ServiceKey::Index(value as i64)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKey::Name(name) => write!(f, "{:?}", name),
            ServiceKey::Index(i) => write!(f, "{}", i),
            ServiceKey::Object(obj) => write!(f, "<{} @ {:p}>", obj.label, obj.addr()),
        }
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Capability key: service type, optional service key and optional required
/// implementation type.
///
/// Uniqueness is by the composite, so `Key::of::<Foo>()` and
/// `Key::of::<Foo>().with_key("a")` are different capabilities.
///
/// # Examples
///
/// ```rust
/// use ferrous_ioc::Key;
///
/// let plain = Key::of::<u32>();
/// let keyed = Key::of::<u32>().with_key("port");
/// assert_ne!(plain, keyed);
/// assert_eq!(keyed.display_name(), "u32");
/// assert_eq!(keyed.to_string(), "u32 {key=\"port\"}");
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Key {
    service: ServiceType,
    service_key: Option<ServiceKey>,
    required_impl: Option<ServiceType>,
}

impl Key {
    /// Unkeyed capability for `T`.
    #[inline(always)]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::from_type(ServiceType::of::<T>())
    }

    /// Unkeyed capability for a service type.
    pub fn from_type(service: ServiceType) -> Self {
        Self {
            service,
            service_key: None,
            required_impl: None,
        }
    }

    /// Same capability narrowed to a service key.
    pub fn with_key(mut self, key: impl Into<ServiceKey>) -> Self {
        self.service_key = Some(key.into());
        self
    }

    /// Same capability with an optional service key.
    pub fn with_optional_key(mut self, key: Option<ServiceKey>) -> Self {
        self.service_key = key;
        self
    }

    /// Same capability narrowed to registrations implemented by `I`.
    pub fn with_required_impl<I: ?Sized + 'static>(mut self) -> Self {
        self.required_impl = Some(ServiceType::of::<I>());
        self
    }

    pub(crate) fn with_optional_impl(mut self, required: Option<ServiceType>) -> Self {
        self.required_impl = required;
        self
    }

    /// The requested service type.
    pub fn service(&self) -> ServiceType {
        self.service
    }

    /// The service key, if any.
    pub fn service_key(&self) -> Option<&ServiceKey> {
        self.service_key.as_ref()
    }

    /// The required implementation type, if any.
    pub fn required_impl(&self) -> Option<ServiceType> {
        self.required_impl
    }

    /// The service type name, for diagnostics.
    pub fn display_name(&self) -> &'static str {
        self.service.name()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service.name())?;
        match (&self.service_key, &self.required_impl) {
            (None, None) => Ok(()),
            (Some(k), None) => write!(f, " {{key={}}}", k),
            (None, Some(i)) => write!(f, " {{impl={}}}", i),
            (Some(k), Some(i)) => write!(f, " {{key={}, impl={}}}", k, i),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Helper for creating unkeyed type keys.
#[inline(always)]
pub fn key_of_type<T: ?Sized + 'static>() -> Key {
    Key::of::<T>()
}
