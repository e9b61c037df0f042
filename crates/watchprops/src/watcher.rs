#![forbid(unsafe_code)]

//! Watcher callbacks, change events, and scoped registrations.
//!
//! A [`Watcher`] is a reference-counted callback handle. Registration stores
//! a clone of the handle, and removal matches handles by identity, so the
//! same `Watcher` can be registered several times and removed one
//! registration at a time.

use std::fmt;
use std::rc::Rc;

use crate::error::WatcherError;
use crate::object::Object;
use crate::registry::Registry;

type Callback<V> = dyn Fn(&ChangeEvent<'_, V>) -> Result<(), WatcherError>;

/// Which list a watcher was registered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatcherScope {
    /// Registered directly on the mutated object.
    Object,
    /// Registered on the mutated object's constructor.
    Constructor,
}

impl fmt::Display for WatcherScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object => f.write_str("object"),
            Self::Constructor => f.write_str("constructor"),
        }
    }
}

/// A pending property transition, handed to watchers by reference.
///
/// Under the default commit order the new value is not yet stored when the
/// event is delivered: `get` on `target` still returns `changed_from`.
#[derive(Debug)]
pub struct ChangeEvent<'a, V> {
    pub property: &'a str,
    /// Previous value, `None` if the property was never set.
    pub changed_from: Option<&'a V>,
    pub changed_to: &'a V,
    /// The object whose property is changing.
    pub target: &'a Object,
    pub scope: WatcherScope,
}

/// Shared handle to a watcher callback.
///
/// Cloning shares the callback; two handles compare equal only when they
/// came from the same [`Watcher::new`] / [`Watcher::fallible`] call.
pub struct Watcher<V> {
    callback: Rc<Callback<V>>,
}

impl<V: 'static> Watcher<V> {
    /// Wrap an infallible callback.
    #[must_use]
    pub fn new(f: impl Fn(&ChangeEvent<'_, V>) + 'static) -> Self {
        Self::fallible(move |event| {
            f(event);
            Ok(())
        })
    }

    /// Wrap a callback that may fail. An `Err` aborts the `set` that is
    /// notifying it.
    #[must_use]
    pub fn fallible(
        f: impl Fn(&ChangeEvent<'_, V>) -> Result<(), WatcherError> + 'static,
    ) -> Self {
        Self {
            callback: Rc::new(f),
        }
    }
}

impl<V> Watcher<V> {
    pub(crate) fn call(&self, event: &ChangeEvent<'_, V>) -> Result<(), WatcherError> {
        (self.callback)(event)
    }

    /// Identity comparison.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.callback, &other.callback)
    }
}

// Manual Clone: shares the same Rc without requiring `V: Clone`.
impl<V> Clone for Watcher<V> {
    fn clone(&self) -> Self {
        Self {
            callback: Rc::clone(&self.callback),
        }
    }
}

impl<V> PartialEq for Watcher<V> {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl<V> Eq for Watcher<V> {}

impl<V> fmt::Debug for Watcher<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("handles", &Rc::strong_count(&self.callback))
            .finish_non_exhaustive()
    }
}

/// RAII guard for one watcher registration.
///
/// Dropping the guard removes exactly the registration it was returned for
/// (the first matching one, if the same watcher was registered again
/// elsewhere on that list). Use [`WatchGuard::detach`] to keep the
/// registration alive past the guard.
#[must_use = "dropping a WatchGuard unregisters the watcher immediately"]
pub struct WatchGuard<V: Clone + 'static> {
    registry: Registry<V>,
    object: Object,
    property: String,
    watcher: Watcher<V>,
    scope: WatcherScope,
    armed: bool,
}

impl<V: Clone + 'static> WatchGuard<V> {
    pub(crate) fn new(
        registry: Registry<V>,
        object: Object,
        property: String,
        watcher: Watcher<V>,
        scope: WatcherScope,
    ) -> Self {
        Self {
            registry,
            object,
            property,
            watcher,
            scope,
            armed: true,
        }
    }

    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }

    #[must_use]
    pub fn scope(&self) -> WatcherScope {
        self.scope
    }

    /// Release the guard without unregistering.
    pub fn detach(mut self) -> Watcher<V> {
        self.armed = false;
        self.watcher.clone()
    }
}

impl<V: Clone + 'static> Drop for WatchGuard<V> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let result = match self.scope {
            WatcherScope::Object => {
                self.registry
                    .unwatch(&self.object, &self.property, Some(&self.watcher))
            }
            WatcherScope::Constructor => {
                self.registry
                    .unwatch_on_constructor(&self.object, &self.property, Some(&self.watcher))
            }
        };
        // The guard owns its object, so the entry cannot have been swept.
        if let Err(err) = result {
            tracing::warn!(%err, property = %self.property, "watch guard failed to unregister");
        }
    }
}

impl<V: Clone + 'static> fmt::Debug for WatchGuard<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchGuard")
            .field("object", &self.object.id())
            .field("property", &self.property)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
