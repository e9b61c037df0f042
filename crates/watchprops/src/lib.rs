#![forbid(unsafe_code)]

//! Watchable properties: named, observable key-value storage attached to
//! arbitrary objects.
//!
//! # Role
//! A [`Registry`] makes [`Object`]s watchable. Each watchable object owns an
//! isolated property map plus two sets of watcher lists: object-level
//! watchers fire when that object's property changes, constructor-level
//! watchers fire when a property changes on any instance the object
//! constructed.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use watchprops::{ChangeEvent, Object, Registry, Watcher};
//!
//! let registry: Registry<i32> = Registry::new();
//! let a = registry.initialize(&Object::new())?;
//!
//! let seen = Rc::new(Cell::new(None));
//! let seen_clone = Rc::clone(&seen);
//! registry.watch(&a, "x", Watcher::new(move |ev: &ChangeEvent<'_, i32>| {
//!     seen_clone.set(Some((ev.changed_from.copied(), *ev.changed_to)));
//! }))?;
//!
//! registry.set(&a, "x", 5)?;
//! assert_eq!(seen.get(), Some((None, 5)));
//! assert_eq!(registry.get(&a, "x")?, Some(5));
//! # Ok::<(), watchprops::WatchError>(())
//! ```
//!
//! # Invariants
//!
//! 1. An object is initialized at most once.
//! 2. Watchers are notified in registration order, object-level before
//!    constructor-level.
//! 3. Each notification pass iterates a snapshot, so watchers may reenter
//!    the registry freely.
//! 4. Removing a watcher removes only its first registration.

pub mod config;
pub mod error;
pub mod object;
pub mod registry;
mod state;
pub mod watcher;

pub use config::{CommitOrder, RegistryConfig};
pub use error::{Operation, Result, WatchError, WatcherError};
pub use object::{Object, ObjectId, WeakObject};
pub use registry::{Registry, WeakRegistry};
pub use watcher::{ChangeEvent, WatchGuard, Watcher, WatcherScope};
