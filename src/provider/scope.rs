//! Scope tree: per-scope instance caches, disposal and the public scope handles.

use std::any::TypeId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use ahash::AHashMap;
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};

use crate::error::{DiError, DiResult, ErrorKind};
use crate::internal::DisposeBag;
use crate::registration::{FactoryId, Instance};
use crate::reuse::ScopeName;
use crate::rules::Rules;
use crate::traits::{Dispose, Resolver, ResolverCore};

use super::{Container, ResolverContext};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Threads blocked on a slot, mapped to the thread building that slot and
/// the slot's address. Edges are only added when they do not close a cycle.
static WAITING_ON: Lazy<Mutex<AHashMap<ThreadId, (ThreadId, usize)>>> = Lazy::new(|| Mutex::new(AHashMap::new()));

/// Records that `me` waits for `owner` to finish `slot`; fails when `owner`
/// already waits, directly or through other builders, for `me`.
fn begin_wait(me: ThreadId, owner: ThreadId, slot: &Slot) -> bool {
    let mut waiting = WAITING_ON.lock();
    let mut next = Some(owner);
    while let Some(thread) = next {
        if thread == me {
            return false;
        }
        next = waiting.get(&thread).map(|(owner, _)| *owner);
    }
    waiting.insert(me, (owner, slot_address(slot)));
    true
}

fn end_wait(me: ThreadId) {
    WAITING_ON.lock().remove(&me);
}

/// Drops the edges of threads waiting on `slot`, whose builder just finished.
fn release_waiters(slot: &Slot) {
    let mut waiting = WAITING_ON.lock();
    if !waiting.is_empty() {
        let address = slot_address(slot);
        waiting.retain(|_, (_, waited)| *waited != address);
    }
}

fn slot_address(slot: &Slot) -> usize {
    slot as *const Slot as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    Root,
    Opened,
    Resolution,
}

/// Cache slot identity: the factory plus the closed service type, so one
/// open-generic factory caches each closed member separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SlotKey {
    pub(crate) factory: FactoryId,
    pub(crate) service: TypeId,
}

enum SlotState {
    Empty,
    Building(ThreadId),
    Ready(Instance),
}

struct Slot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            state: Mutex::new(SlotState::Empty),
            ready: Condvar::new(),
        }
    }
}

// Resets a slot whose builder failed or panicked so waiters can retry.
struct BuildGuard<'a> {
    slot: &'a Slot,
    finished: bool,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *self.slot.state.lock() = SlotState::Empty;
            release_waiters(self.slot);
            self.slot.ready.notify_all();
        }
    }
}

#[derive(Default)]
struct ScopeState {
    slots: AHashMap<SlotKey, Arc<Slot>>,
    bag: DisposeBag,
    children: Vec<Arc<ScopeNode>>,
    disposed: bool,
}

/// A node of the scope tree.
///
/// The state lock guards only the slot map, the disposal bag and the child
/// list; it is never held while a builder runs.
pub(crate) struct ScopeNode {
    id: u64,
    name: Option<ScopeName>,
    kind: ScopeKind,
    parent: Option<Arc<ScopeNode>>,
    state: Mutex<ScopeState>,
}

impl ScopeNode {
    pub(crate) fn root() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            name: None,
            kind: ScopeKind::Root,
            parent: None,
            state: Mutex::new(ScopeState::default()),
        })
    }

    /// Opens a child scope; fails when this scope is disposed.
    pub(crate) fn open_child(self: &Arc<Self>, name: Option<ScopeName>, kind: ScopeKind) -> DiResult<Arc<Self>> {
        let child = Arc::new(Self {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            name,
            kind,
            parent: Some(self.clone()),
            state: Mutex::new(ScopeState::default()),
        });
        let mut state = self.state.lock();
        if state.disposed {
            return Err(DiError::scope_disposed(self));
        }
        state.children.push(child.clone());
        drop(state);
        tracing::debug!(scope = %child, parent = %self, "scope opened");
        Ok(child)
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// This scope and its ancestors, innermost first.
    pub(crate) fn lineage(self: &Arc<Self>) -> impl Iterator<Item = &Arc<ScopeNode>> {
        std::iter::successors(Some(self), |s| s.parent.as_ref())
    }

    /// Innermost scope in the lineage named `name`.
    pub(crate) fn find_named(self: &Arc<Self>, name: &str) -> Option<Arc<ScopeNode>> {
        self.lineage().find(|s| s.name() == Some(name)).cloned()
    }

    /// Names in the lineage, outermost first.
    pub(crate) fn names(self: &Arc<Self>) -> Vec<ScopeName> {
        let mut names: Vec<ScopeName> = self.lineage().filter_map(|s| s.name.clone()).collect();
        names.reverse();
        names
    }

    /// Returns the cached instance for `key`, building it exactly once.
    ///
    /// Concurrent callers for the same key wait for the first builder. A
    /// builder that fails leaves the slot empty. Re-entering a slot from the
    /// thread that is building it, or waiting on a builder that itself waits
    /// for this thread, fails with `RecursiveDependency` instead of deadlocking.
    pub(crate) fn get_or_build<F>(&self, key: SlotKey, service: &'static str, build: F) -> DiResult<Instance>
    where
        F: FnOnce() -> DiResult<Instance>,
    {
        let slot = {
            let mut state = self.state.lock();
            if state.disposed {
                return Err(DiError::scope_disposed(self));
            }
            state.slots.entry(key).or_default().clone()
        };

        let me = thread::current().id();
        {
            let mut state = slot.state.lock();
            loop {
                match &*state {
                    SlotState::Ready(instance) => {
                        tracing::trace!(service, scope = %self, "cache hit");
                        return Ok(instance.clone());
                    }
                    SlotState::Building(owner) if *owner == me => {
                        return Err(DiError::new(
                            ErrorKind::RecursiveDependency,
                            format!("{} was requested again while it is being built", service),
                        ));
                    }
                    SlotState::Building(owner) => {
                        if !begin_wait(me, *owner, &slot) {
                            return Err(DiError::new(
                                ErrorKind::RecursiveDependency,
                                format!("{} is being built by a thread that waits for this one", service),
                            ));
                        }
                        slot.ready.wait(&mut state);
                        end_wait(me);
                    }
                    SlotState::Empty => {
                        *state = SlotState::Building(me);
                        break;
                    }
                }
            }
        }

        let mut guard = BuildGuard {
            slot: &slot,
            finished: false,
        };
        let built = build();
        {
            let mut state = slot.state.lock();
            *state = match &built {
                Ok(instance) => SlotState::Ready(instance.clone()),
                Err(_) => SlotState::Empty,
            };
            guard.finished = true;
        }
        release_waiters(&slot);
        slot.ready.notify_all();
        drop(guard);

        let instance = built?;
        if let Some(disposable) = instance.disposable() {
            self.track(service, disposable.clone())?;
        }
        Ok(instance)
    }

    /// Adds a disposable to this scope's disposal list.
    ///
    /// On a disposed scope the item is disposed right away and the call fails.
    pub(crate) fn track(&self, service: &'static str, item: Arc<dyn Dispose>) -> DiResult<()> {
        let mut state = self.state.lock();
        if state.disposed {
            drop(state);
            let mut late = DisposeBag::default();
            late.push(service, item);
            late.run_all_reverse();
            return Err(DiError::scope_disposed(self));
        }
        tracing::trace!(service, scope = %self, "tracking disposable");
        state.bag.push(service, item);
        Ok(())
    }

    /// Disposes this scope and everything it spawned; idempotent.
    ///
    /// Children close first, most recently opened first, then the scope's own
    /// disposables in reverse creation order. Failing disposers do not stop
    /// the teardown; their count is reported afterwards.
    pub(crate) fn close(self: &Arc<Self>) -> DiResult<()> {
        let failures = self.close_tree();
        self.detach();
        if failures > 0 {
            return Err(DiError::new(
                ErrorKind::DisposeFailed,
                format!("{} disposer(s) failed while closing {}", failures, self),
            ));
        }
        Ok(())
    }

    fn close_tree(&self) -> usize {
        let (children, mut bag, slots) = {
            let mut state = self.state.lock();
            if state.disposed {
                return 0;
            }
            state.disposed = true;
            (
                std::mem::take(&mut state.children),
                std::mem::take(&mut state.bag),
                std::mem::take(&mut state.slots),
            )
        };
        tracing::debug!(scope = %self, children = children.len(), tracked = bag.len(), "closing scope");
        let mut failures = 0;
        for child in children.iter().rev() {
            failures += child.close_tree();
        }
        failures += bag.run_all_reverse();
        drop(slots);
        failures
    }

    fn detach(&self) {
        if let Some(parent) = &self.parent {
            parent.state.lock().children.retain(|c| c.id != self.id);
        }
    }

    /// Detaches a resolution scope that ended up owning nothing to dispose.
    pub(crate) fn release_if_unused(&self) {
        let unused = {
            let state = self.state.lock();
            !state.disposed && state.bag.is_empty() && state.children.is_empty()
        };
        if unused {
            self.detach();
        }
    }
}

impl fmt::Display for ScopeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, self.kind) {
            (_, ScopeKind::Root) => write!(f, "root scope"),
            (Some(name), _) => write!(f, "scope '{}' #{}", name, self.id),
            (None, ScopeKind::Resolution) => write!(f, "resolution scope #{}", self.id),
            (None, _) => write!(f, "scope #{}", self.id),
        }
    }
}

impl fmt::Debug for ScopeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// An opened scope.
///
/// Scoped services resolved through it are cached in it, and its tracked
/// disposables are released when it is disposed. Dropping an undisposed scope
/// disposes it.
///
/// # Examples
///
/// ```
/// use ferrous_ioc::{Container, Registrator, Resolver, Reuse};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// struct RequestId(usize);
///
/// let counter = Arc::new(AtomicUsize::new(0));
/// let c = counter.clone();
/// let container = Container::new();
/// container
///     .register_delegate(Reuse::Scoped, move |_| Ok(RequestId(c.fetch_add(1, Ordering::SeqCst))))
///     .unwrap();
///
/// let scope1 = container.open_scope(None).unwrap();
/// let scope2 = container.open_scope(Some("request")).unwrap();
///
/// let a = scope1.get_required::<RequestId>();
/// let b = scope1.get_required::<RequestId>();
/// let c = scope2.get_required::<RequestId>();
/// assert!(Arc::ptr_eq(&a, &b));
/// assert!(!Arc::ptr_eq(&a, &c));
/// assert_eq!(scope2.name(), Some("request"));
/// ```
pub struct Scope {
    view: Container,
}

impl Scope {
    pub(crate) fn new(view: Container) -> Self {
        Self { view }
    }

    /// Scope name, if opened with one.
    pub fn name(&self) -> Option<&str> {
        self.view.scope.name()
    }

    /// The container view bound to this scope.
    pub fn container(&self) -> &Container {
        &self.view
    }

    /// Opens a nested scope.
    pub fn open_scope(&self, name: Option<&str>) -> DiResult<Scope> {
        self.view.open_scope(name)
    }

    /// Opens a nested scope with overridden rules.
    pub fn open_scope_with<F>(&self, name: Option<&str>, configure: F) -> DiResult<Scope>
    where
        F: FnOnce(Rules) -> Rules,
    {
        self.view.open_scope_with(name, configure)
    }

    /// Disposes the scope, its nested scopes and its tracked disposables.
    ///
    /// A second call is a no-op.
    pub fn dispose(&self) -> DiResult<()> {
        self.view.scope.close()
    }

    /// Whether the scope has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.view.scope.is_disposed()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if !self.view.scope.is_disposed() {
            tracing::warn!(scope = %self.view.scope, "scope dropped without dispose(), disposing now");
            if let Err(e) = self.view.scope.close() {
                tracing::error!(error = %e, "disposing dropped scope failed");
            }
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope").field("scope", &self.view.scope).finish()
    }
}

impl ResolverCore for Scope {
    fn context(&self) -> ResolverContext {
        ResolverContext::top(self.view.clone())
    }
}

impl Resolver for Scope {}

/// Disposable handle to the resolution scope of the current resolve call.
///
/// Resolvable without registration. For services registered with
/// `Setup::open_resolution_scope` it is the scope opened for that service;
/// disposing it tears down everything built within it.
#[derive(Clone)]
pub struct ResolutionScope {
    view: Container,
}

impl ResolutionScope {
    pub(crate) fn new(view: Container) -> Self {
        Self { view }
    }

    /// Scope name; promoted resolution scopes are named after their service type.
    pub fn name(&self) -> Option<&str> {
        self.view.scope.name()
    }

    /// Disposes the resolution scope.
    pub fn dispose(&self) -> DiResult<()> {
        self.view.scope.close()
    }

    /// Whether the resolution scope has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.view.scope.is_disposed()
    }
}

impl Dispose for ResolutionScope {
    fn dispose(&self) {
        if let Err(e) = self.view.scope.close() {
            tracing::error!(error = %e, "disposing resolution scope failed");
        }
    }
}

impl ResolverCore for ResolutionScope {
    fn context(&self) -> ResolverContext {
        ResolverContext::top(self.view.clone())
    }
}

impl Resolver for ResolutionScope {}

impl fmt::Debug for ResolutionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionScope").field("scope", &self.view.scope).finish()
    }
}
