//! The registration store: immutable snapshots behind an atomically swapped pointer.

use std::any::TypeId;
use std::sync::Arc;

use ahash::AHashMap;
use arc_swap::{ArcSwap, Guard};
use parking_lot::RwLock;

use crate::error::{DiError, DiResult, ErrorKind};
use crate::key::Key;
use crate::provider::Producer;
use crate::registration::{Factory, FactoryKind};
use crate::reuse::ScopeName;
use crate::rules::IfAlreadyRegistered;

type FactoryList = Arc<[Arc<Factory>]>;

/// Cache key of a compiled top-level producer.
#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) struct ProducerKey {
    pub(crate) key: Key,
    pub(crate) shaped: bool,
    pub(crate) scopes: Vec<ScopeName>,
    pub(crate) rules: u64,
}

/// One published registration snapshot.
///
/// Factory lists are shared between snapshots; only the list touched by a
/// registration is copied. Compiled producers live with the snapshot they were
/// compiled against and disappear with it.
#[derive(Default)]
pub(crate) struct Registry {
    services: AHashMap<TypeId, FactoryList>,
    decorators: AHashMap<TypeId, FactoryList>,
    producers: RwLock<AHashMap<ProducerKey, Producer>>,
    version: u64,
}

impl Registry {
    /// Registered service factories for a type, in registration order.
    pub(crate) fn factories(&self, service: TypeId) -> &[Arc<Factory>] {
        self.services.get(&service).map_or(&[], |list| list)
    }

    /// Decorators targeting a type, in registration order.
    pub(crate) fn decorators(&self, target: TypeId) -> &[Arc<Factory>] {
        self.decorators.get(&target).map_or(&[], |list| list)
    }

    pub(crate) fn has_decorators(&self) -> bool {
        !self.decorators.is_empty()
    }

    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    /// All service factories, grouped by type.
    pub(crate) fn all_factories(&self) -> impl Iterator<Item = &Arc<Factory>> {
        self.services.values().flat_map(|list| list.iter())
    }

    pub(crate) fn all_decorators(&self) -> impl Iterator<Item = &Arc<Factory>> {
        self.decorators.values().flat_map(|list| list.iter())
    }

    pub(crate) fn cached_producer(&self, key: &ProducerKey) -> Option<Producer> {
        self.producers.read().get(key).cloned()
    }

    pub(crate) fn cache_producer(&self, key: ProducerKey, producer: Producer) -> Producer {
        self.producers.write().entry(key).or_insert(producer).clone()
    }

    fn next(&self) -> Registry {
        Registry {
            services: self.services.clone(),
            decorators: self.decorators.clone(),
            producers: RwLock::default(),
            version: self.version + 1,
        }
    }

    /// Computes the snapshot that results from adding `factory` under `policy`.
    ///
    /// Returns `Ok(None)` when the policy keeps the current snapshot unchanged.
    pub(crate) fn with_factory(&self, factory: &Arc<Factory>, policy: IfAlreadyRegistered) -> DiResult<Option<Registry>> {
        let type_id = factory.service().id();
        if factory.kind() == FactoryKind::Decorator {
            let mut next = self.next();
            let list = append(next.decorators.get(&type_id), factory.clone(), |_| true);
            next.decorators.insert(type_id, list);
            return Ok(Some(next));
        }

        let existing = self.factories(type_id);
        let same_key = |f: &Arc<Factory>| f.service_key() == factory.service_key();
        let duplicate = existing.iter().any(|f| same_key(f));
        let already = || {
            DiError::new(
                ErrorKind::AlreadyRegistered,
                match factory.service_key() {
                    Some(key) => format!("{} with key {} is already registered", factory.service(), key),
                    None => format!("{} is already registered", factory.service()),
                },
            )
        };

        let keep_existing: fn(&Arc<Factory>) -> bool = |_| true;
        let list = match policy {
            IfAlreadyRegistered::Throw if duplicate => return Err(already()),
            IfAlreadyRegistered::Keep if duplicate => return Ok(None),
            IfAlreadyRegistered::Replace => {
                append(self.services.get(&type_id), factory.clone(), |f| !same_key(f))
            }
            IfAlreadyRegistered::AppendNonKeyed if duplicate && factory.service_key().is_some() => {
                return Err(already())
            }
            IfAlreadyRegistered::AppendNewImplementation => {
                let same_impl = factory.implementation().map_or(false, |implementation| {
                    existing.iter().any(|f| f.implementation() == Some(implementation))
                });
                if same_impl {
                    return Ok(None);
                }
                if duplicate && factory.service_key().is_some() {
                    return Err(already());
                }
                append(self.services.get(&type_id), factory.clone(), keep_existing)
            }
            _ => append(self.services.get(&type_id), factory.clone(), keep_existing),
        };

        let mut next = self.next();
        next.services.insert(type_id, list);
        Ok(Some(next))
    }
}

fn append(current: Option<&FactoryList>, factory: Arc<Factory>, keep: impl Fn(&Arc<Factory>) -> bool) -> FactoryList {
    current
        .into_iter()
        .flat_map(|list| list.iter())
        .filter(|f| keep(f))
        .cloned()
        .chain(std::iter::once(factory))
        .collect()
}

/// Holder of the current snapshot. Writers copy, compute and compare-and-swap;
/// readers load without locking.
pub(crate) struct RegistryStore {
    current: ArcSwap<Registry>,
}

impl RegistryStore {
    pub(crate) fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Registry::default()),
        }
    }

    /// The current snapshot.
    pub(crate) fn snapshot(&self) -> Arc<Registry> {
        self.current.load_full()
    }

    /// Publishes `factory` under `policy`, retrying when another writer wins the swap.
    ///
    /// Returns whether the registration was added.
    pub(crate) fn register(&self, factory: Arc<Factory>, policy: IfAlreadyRegistered) -> DiResult<bool> {
        let mut current = self.current.load_full();
        loop {
            let next = match current.with_factory(&factory, policy)? {
                Some(next) => Arc::new(next),
                None => {
                    tracing::debug!(service = factory.service().name(), ?policy, "registration kept existing");
                    return Ok(false);
                }
            };
            let version = next.version();
            let previous = self.current.compare_and_swap(&current, next);
            if Arc::ptr_eq(&*previous, &current) {
                tracing::debug!(
                    service = factory.service().name(),
                    id = %factory.id(),
                    version,
                    "registry snapshot published"
                );
                return Ok(true);
            }
            tracing::warn!(service = factory.service().name(), "registry changed concurrently, retrying");
            current = Guard::into_inner(previous);
        }
    }
}
