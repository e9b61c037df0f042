#![forbid(unsafe_code)]

//! Host object handles.
//!
//! An [`Object`] is the thing a registry makes watchable. It carries no data
//! of its own beyond an identity and an optional link to the object that
//! constructed it. Properties and watchers live in the registry's side table,
//! keyed by [`ObjectId`].
//!
//! Cloning an `Object` creates a new handle to the **same** identity. An
//! instance holds a strong handle to its constructor, so a constructor stays
//! alive (and keeps its constructor-level watchers) for as long as any of its
//! instances do.
//!
//! Watchers that need to reach their own target should capture a
//! [`WeakObject`]: the registry stores watchers strongly, so a captured
//! `Object` keeps itself alive through its own watcher list.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique object identity. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, for diagnostics.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct ObjectInner {
    id: ObjectId,
    constructor: Option<Object>,
}

/// Handle to a host object.
///
/// Equality and hashing are by identity only.
#[derive(Clone)]
pub struct Object {
    inner: Rc<ObjectInner>,
}

impl Object {
    /// Create a plain object with no constructor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                id: ObjectId::next(),
                constructor: None,
            }),
        }
    }

    /// Create an instance whose constructor is `constructor`.
    #[must_use]
    pub fn instance_of(constructor: &Object) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                id: ObjectId::next(),
                constructor: Some(constructor.clone()),
            }),
        }
    }

    /// Create an instance of `self`, treating `self` as a constructor.
    #[must_use]
    pub fn instantiate(&self) -> Self {
        Self::instance_of(self)
    }

    /// Identity of this object, shared by all of its clones.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    /// The object that constructed this one, if any.
    #[must_use]
    pub fn constructor(&self) -> Option<&Object> {
        self.inner.constructor.as_ref()
    }

    /// Create a non-owning handle to this object.
    #[must_use]
    pub fn downgrade(&self) -> WeakObject {
        WeakObject {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Object {}

impl Hash for Object {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.inner.id)
            .field("constructor", &self.constructor().map(Object::id))
            .finish()
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object {}", self.inner.id)
    }
}

/// Non-owning handle to an [`Object`].
#[derive(Clone)]
pub struct WeakObject {
    inner: Weak<ObjectInner>,
}

impl WeakObject {
    /// The object, if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Object> {
        self.inner.upgrade().map(|inner| Object { inner })
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakObject")
            .field("id", &self.upgrade().map(|object| object.id()))
            .finish()
    }
}
