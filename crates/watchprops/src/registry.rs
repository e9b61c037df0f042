#![forbid(unsafe_code)]

//! The watchable-properties registry.
//!
//! # Design
//!
//! [`Registry<V>`] is a side table from object identity to per-object state
//! (property values plus object-level and constructor-level watcher lists),
//! held in shared, reference-counted storage (`Rc<RefCell<..>>`). Host
//! objects are never mutated; an object is "watchable" exactly when the
//! table has an entry for it. Cloning a `Registry` creates a new handle to
//! the **same** table. Watchers that call back in should capture a
//! [`WeakRegistry`] (see Failure Modes).
//!
//! # Notification protocol
//!
//! `set(object, property, value)` runs, in order:
//!
//! 1. read the previous value;
//! 2. call the object-level watchers for `property`, in registration order;
//! 3. if `object` has a watchable constructor, call that constructor's
//!    constructor-level watchers for `property`, in registration order;
//! 4. store the value.
//!
//! Steps 2–4 follow [`CommitOrder`]; the default is the order above, so a
//! watcher that reads the property during notification still sees the old
//! value. A failing watcher stops the sequence: later watchers are skipped
//! and the value is not stored.
//!
//! # Reentrancy
//!
//! No internal borrow is held while a watcher runs. Watchers may call any
//! registry operation on any object, including unregistering themselves.
//! Each pass iterates a snapshot of its list taken just before the pass, so
//! changes to a list take effect from the next `set`.
//!
//! # Failure Modes
//!
//! - **Reentrant `with`**: the closure passed to [`Registry::with`] runs
//!   under a shared borrow. Calling a mutating operation from inside it
//!   panics (RefCell borrow rules).
//! - **Entry leak**: entries of dropped objects stay in the table until the
//!   next sweep (every `initialize` by default, or an explicit
//!   [`Registry::prune`]).
//! - **Reference cycles**: watchers are stored strongly. A watcher that
//!   captures its own target `Object` keeps that object alive through its
//!   own watcher list, so its entry is never swept. A watcher that captures
//!   a `Registry` clone makes the whole table an `Rc` cycle. Capture
//!   [`WeakObject`](crate::WeakObject) and [`WeakRegistry`] instead.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::config::{CommitOrder, RegistryConfig};
use crate::error::{Operation, Result, WatchError};
use crate::object::{Object, ObjectId, WeakObject};
use crate::state::WatchableState;
use crate::watcher::{ChangeEvent, WatchGuard, Watcher, WatcherScope};

struct Entry<V> {
    owner: WeakObject,
    state: WatchableState<V>,
}

struct RegistryInner<V> {
    entries: HashMap<ObjectId, Entry<V>>,
    config: RegistryConfig,
}

impl<V> RegistryInner<V> {
    fn state(&self, id: ObjectId) -> Option<&WatchableState<V>> {
        self.entries.get(&id).map(|entry| &entry.state)
    }

    fn state_mut(&mut self, id: ObjectId) -> Option<&mut WatchableState<V>> {
        self.entries.get_mut(&id).map(|entry| &mut entry.state)
    }

    /// Detach entries of dropped objects. The caller drops them once the
    /// table borrow is released, since their watchers may own guards that
    /// call back into the registry.
    fn take_dead(&mut self) -> Vec<Entry<V>> {
        let dead: Vec<ObjectId> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.owner.is_alive())
            .map(|(id, _)| *id)
            .collect();
        dead.into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .collect()
    }
}

/// Side table of watchable objects.
pub struct Registry<V> {
    inner: Rc<RefCell<RegistryInner<V>>>,
}

// Manual Clone: shares the same Rc.
impl<V> Clone for Registry<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for Registry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        let properties: usize = inner
            .entries
            .values()
            .map(|entry| entry.state.property_count())
            .sum();
        f.debug_struct("Registry")
            .field("objects", &inner.entries.len())
            .field("properties", &properties)
            .field("config", &inner.config)
            .finish()
    }
}

/// Non-owning handle to a [`Registry`], for watchers that call back into
/// the table that stores them.
pub struct WeakRegistry<V> {
    inner: Weak<RefCell<RegistryInner<V>>>,
}

impl<V> WeakRegistry<V> {
    /// The registry, if any strong handle to it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Registry<V>> {
        self.inner.upgrade().map(|inner| Registry { inner })
    }
}

impl<V> Clone for WeakRegistry<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for WeakRegistry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRegistry")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl<V: Clone + 'static> Default for Registry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + 'static> Registry<V> {
    /// Create an empty registry with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with a custom configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(RegistryInner {
                entries: HashMap::new(),
                config,
            })),
        }
    }

    /// The configuration this registry was created with.
    #[must_use]
    pub fn config(&self) -> RegistryConfig {
        self.inner.borrow().config.clone()
    }

    /// Create a non-owning handle to the same table.
    #[must_use]
    pub fn downgrade(&self) -> WeakRegistry<V> {
        WeakRegistry {
            inner: Rc::downgrade(&self.inner),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Make `object` watchable and hand back a handle to it.
    ///
    /// # Errors
    ///
    /// [`WatchError::AlreadyInitialized`] if `object` is already watchable.
    pub fn initialize(&self, object: &Object) -> Result<Object> {
        let dead = {
            let mut inner = self.inner.borrow_mut();
            if inner.entries.contains_key(&object.id()) {
                return Err(WatchError::AlreadyInitialized {
                    object: object.id(),
                });
            }
            let dead = if inner.config.prune_on_initialize {
                inner.take_dead()
            } else {
                Vec::new()
            };
            inner.entries.insert(
                object.id(),
                Entry {
                    owner: object.downgrade(),
                    state: WatchableState::default(),
                },
            );
            dead
        };
        if !dead.is_empty() {
            debug!(swept = dead.len(), "pruned entries of dropped objects");
        }
        drop(dead);
        debug!(object = %object.id(), "initialized watchable properties");
        Ok(object.clone())
    }

    /// Whether `object` has been initialized on this registry.
    #[must_use]
    pub fn is_watchable(&self, object: &Object) -> bool {
        self.inner.borrow().entries.contains_key(&object.id())
    }

    /// Sweep entries whose objects have been dropped. Returns how many were
    /// removed.
    pub fn prune(&self) -> usize {
        let dead = self.inner.borrow_mut().take_dead();
        let swept = dead.len();
        drop(dead);
        debug!(swept, "pruned entries of dropped objects");
        swept
    }

    /// Number of objects in the table, including not-yet-swept dead ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// Whether the table has no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }

    // ========================================================================
    // Properties
    // ========================================================================

    /// Current value of `property`, `None` if it was never set.
    ///
    /// # Errors
    ///
    /// [`WatchError::NotWatchable`] if `object` was never initialized.
    pub fn get(&self, object: &Object, property: &str) -> Result<Option<V>> {
        self.with(object, property, |value| value.cloned())
    }

    /// Access the current value by reference without cloning.
    ///
    /// # Errors
    ///
    /// [`WatchError::NotWatchable`] if `object` was never initialized.
    ///
    /// # Panics
    ///
    /// Panics if `f` calls a mutating registry operation.
    pub fn with<R>(
        &self,
        object: &Object,
        property: &str,
        f: impl FnOnce(Option<&V>) -> R,
    ) -> Result<R> {
        let inner = self.inner.borrow();
        let state = inner
            .state(object.id())
            .ok_or_else(|| WatchError::not_watchable(Operation::Get, property, object.id()))?;
        Ok(f(state.value(property)))
    }

    /// Store `value` under `property`, notifying watchers.
    ///
    /// # Errors
    ///
    /// - [`WatchError::NotWatchable`] if `object` was never initialized.
    /// - [`WatchError::WatcherFailed`] if a watcher failed. Remaining watchers
    ///   are skipped; under [`CommitOrder::NotifyThenCommit`] the value is not
    ///   stored.
    pub fn set(&self, object: &Object, property: &str, value: V) -> Result<()> {
        let (previous, order) = {
            let inner = self.inner.borrow();
            let state = inner
                .state(object.id())
                .ok_or_else(|| WatchError::not_watchable(Operation::Set, property, object.id()))?;
            (state.value(property).cloned(), inner.config.commit_order)
        };

        match order {
            CommitOrder::NotifyThenCommit => {
                self.notify(object, property, previous.as_ref(), &value)?;
                self.commit(object, property, value)
            }
            CommitOrder::CommitThenNotify => {
                self.commit(object, property, value.clone())?;
                self.notify(object, property, previous.as_ref(), &value)
            }
        }
    }

    fn commit(&self, object: &Object, property: &str, value: V) -> Result<()> {
        let replaced = {
            let mut inner = self.inner.borrow_mut();
            let state = inner
                .state_mut(object.id())
                .ok_or_else(|| WatchError::not_watchable(Operation::Set, property, object.id()))?;
            state.commit(property, value)
        };
        drop(replaced);
        Ok(())
    }

    fn notify(
        &self,
        object: &Object,
        property: &str,
        previous: Option<&V>,
        value: &V,
    ) -> Result<()> {
        let watchers = self.snapshot(object.id(), WatcherScope::Object, property);
        self.dispatch(
            &watchers,
            &ChangeEvent {
                property,
                changed_from: previous,
                changed_to: value,
                target: object,
                scope: WatcherScope::Object,
            },
        )?;

        // A constructor that was never initialized simply has no list.
        if let Some(constructor) = object.constructor() {
            let watchers = self.snapshot(constructor.id(), WatcherScope::Constructor, property);
            self.dispatch(
                &watchers,
                &ChangeEvent {
                    property,
                    changed_from: previous,
                    changed_to: value,
                    target: object,
                    scope: WatcherScope::Constructor,
                },
            )?;
        }
        Ok(())
    }

    fn snapshot(&self, id: ObjectId, scope: WatcherScope, property: &str) -> Vec<Watcher<V>> {
        self.inner
            .borrow()
            .state(id)
            .map(|state| state.watchers(scope).snapshot(property))
            .unwrap_or_default()
    }

    fn dispatch(&self, watchers: &[Watcher<V>], event: &ChangeEvent<'_, V>) -> Result<()> {
        if watchers.is_empty() {
            return Ok(());
        }
        trace!(
            object = %event.target.id(),
            property = event.property,
            scope = %event.scope,
            watchers = watchers.len(),
            "notifying watchers"
        );
        for (index, watcher) in watchers.iter().enumerate() {
            if let Err(source) = watcher.call(event) {
                debug!(
                    object = %event.target.id(),
                    property = event.property,
                    scope = %event.scope,
                    index,
                    error = %source,
                    "watcher failed, aborting set"
                );
                return Err(WatchError::WatcherFailed {
                    property: event.property.to_owned(),
                    scope: event.scope,
                    source,
                });
            }
        }
        Ok(())
    }

    // ========================================================================
    // Object-level watchers
    // ========================================================================

    /// Register `watcher` for `property` on `object`. Registering the same
    /// watcher twice makes it fire twice.
    ///
    /// # Errors
    ///
    /// [`WatchError::NotWatchable`] if `object` was never initialized.
    pub fn watch(&self, object: &Object, property: &str, watcher: Watcher<V>) -> Result<()> {
        self.register(Operation::Watch, WatcherScope::Object, object, property, watcher)
    }

    /// Like [`watch`](Self::watch), returning a guard that unregisters on
    /// drop.
    ///
    /// # Errors
    ///
    /// [`WatchError::NotWatchable`] if `object` was never initialized.
    pub fn watch_scoped(
        &self,
        object: &Object,
        property: &str,
        watcher: Watcher<V>,
    ) -> Result<WatchGuard<V>> {
        self.watch(object, property, watcher.clone())?;
        Ok(WatchGuard::new(
            self.clone(),
            object.clone(),
            property.to_owned(),
            watcher,
            WatcherScope::Object,
        ))
    }

    /// Remove the first registration of `watcher` for `property`, or all of
    /// them when `watcher` is `None`. Removing an unknown watcher is a no-op.
    ///
    /// # Errors
    ///
    /// [`WatchError::NotWatchable`] if `object` was never initialized.
    pub fn unwatch(
        &self,
        object: &Object,
        property: &str,
        watcher: Option<&Watcher<V>>,
    ) -> Result<()> {
        self.unregister(Operation::Unwatch, WatcherScope::Object, object, property, watcher)
    }

    /// Number of object-level registrations for `property`.
    ///
    /// # Errors
    ///
    /// [`WatchError::NotWatchable`] if `object` was never initialized.
    pub fn watcher_count(&self, object: &Object, property: &str) -> Result<usize> {
        self.count(Operation::Watch, WatcherScope::Object, object, property)
    }

    // ========================================================================
    // Constructor-level watchers
    // ========================================================================

    /// Register `watcher` for `property` on every instance of `constructor`.
    ///
    /// # Errors
    ///
    /// [`WatchError::NotWatchable`] if `constructor` itself was never
    /// initialized.
    pub fn watch_on_constructor(
        &self,
        constructor: &Object,
        property: &str,
        watcher: Watcher<V>,
    ) -> Result<()> {
        self.register(
            Operation::WatchOnConstructor,
            WatcherScope::Constructor,
            constructor,
            property,
            watcher,
        )
    }

    /// Like [`watch_on_constructor`](Self::watch_on_constructor), returning a
    /// guard that unregisters on drop.
    ///
    /// # Errors
    ///
    /// [`WatchError::NotWatchable`] if `constructor` was never initialized.
    pub fn watch_on_constructor_scoped(
        &self,
        constructor: &Object,
        property: &str,
        watcher: Watcher<V>,
    ) -> Result<WatchGuard<V>> {
        self.watch_on_constructor(constructor, property, watcher.clone())?;
        Ok(WatchGuard::new(
            self.clone(),
            constructor.clone(),
            property.to_owned(),
            watcher,
            WatcherScope::Constructor,
        ))
    }

    /// Constructor-level counterpart of [`unwatch`](Self::unwatch).
    ///
    /// # Errors
    ///
    /// [`WatchError::NotWatchable`] if `constructor` was never initialized.
    pub fn unwatch_on_constructor(
        &self,
        constructor: &Object,
        property: &str,
        watcher: Option<&Watcher<V>>,
    ) -> Result<()> {
        self.unregister(
            Operation::UnwatchOnConstructor,
            WatcherScope::Constructor,
            constructor,
            property,
            watcher,
        )
    }

    /// Number of constructor-level registrations for `property`.
    ///
    /// # Errors
    ///
    /// [`WatchError::NotWatchable`] if `constructor` was never initialized.
    pub fn constructor_watcher_count(&self, constructor: &Object, property: &str) -> Result<usize> {
        self.count(
            Operation::WatchOnConstructor,
            WatcherScope::Constructor,
            constructor,
            property,
        )
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn register(
        &self,
        operation: Operation,
        scope: WatcherScope,
        object: &Object,
        property: &str,
        watcher: Watcher<V>,
    ) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        let state = inner
            .state_mut(object.id())
            .ok_or_else(|| WatchError::not_watchable(operation, property, object.id()))?;
        state.watchers_mut(scope).push(property, watcher);
        trace!(object = %object.id(), property, %scope, "watcher registered");
        Ok(())
    }

    fn unregister(
        &self,
        operation: Operation,
        scope: WatcherScope,
        object: &Object,
        property: &str,
        watcher: Option<&Watcher<V>>,
    ) -> Result<()> {
        let removed = {
            let mut inner = self.inner.borrow_mut();
            let state = inner
                .state_mut(object.id())
                .ok_or_else(|| WatchError::not_watchable(operation, property, object.id()))?;
            state.watchers_mut(scope).remove(property, watcher)
        };
        trace!(
            object = %object.id(),
            property,
            %scope,
            removed = removed.len(),
            "watchers unregistered"
        );
        Ok(())
    }

    fn count(
        &self,
        operation: Operation,
        scope: WatcherScope,
        object: &Object,
        property: &str,
    ) -> Result<usize> {
        let inner = self.inner.borrow();
        let state = inner
            .state(object.id())
            .ok_or_else(|| WatchError::not_watchable(operation, property, object.id()))?;
        Ok(state.watchers(scope).count(property))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
