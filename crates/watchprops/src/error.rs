#![forbid(unsafe_code)]

//! Error types for registry operations.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Double initialize | `initialize` on a watchable object | `AlreadyInitialized`, state untouched |
//! | Unwatchable target | Any other operation before `initialize` | `NotWatchable` |
//! | Watcher failure | A fallible watcher returned `Err` | `WatcherFailed`, remaining watchers skipped, value not committed |

use std::fmt;

use crate::object::ObjectId;
use crate::watcher::WatcherScope;

/// Error returned by a fallible watcher.
pub type WatcherError = Box<dyn std::error::Error + 'static>;

/// Registry operation names, carried by [`WatchError::NotWatchable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Set,
    Watch,
    Unwatch,
    WatchOnConstructor,
    UnwatchOnConstructor,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Watch => "watch",
            Self::Unwatch => "unwatch",
            Self::WatchOnConstructor => "watch_on_constructor",
            Self::UnwatchOnConstructor => "unwatch_on_constructor",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from registry operations.
#[derive(Debug)]
pub enum WatchError {
    /// `initialize` was called on an object that is already watchable.
    AlreadyInitialized { object: ObjectId },
    /// The target object was never initialized.
    NotWatchable {
        operation: Operation,
        property: String,
        object: ObjectId,
    },
    /// A watcher failed while a `set` was notifying.
    WatcherFailed {
        property: String,
        scope: WatcherScope,
        source: WatcherError,
    },
}

impl WatchError {
    pub(crate) fn not_watchable(operation: Operation, property: &str, object: ObjectId) -> Self {
        Self::NotWatchable {
            operation,
            property: property.to_owned(),
            object,
        }
    }

    /// Whether this is an [`AlreadyInitialized`](Self::AlreadyInitialized) error.
    #[must_use]
    pub fn is_already_initialized(&self) -> bool {
        matches!(self, Self::AlreadyInitialized { .. })
    }

    /// Whether this is a [`NotWatchable`](Self::NotWatchable) error.
    #[must_use]
    pub fn is_not_watchable(&self) -> bool {
        matches!(self, Self::NotWatchable { .. })
    }
}

impl fmt::Display for WatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInitialized { object } => {
                write!(f, "watchable properties already initialized on object {object}")
            }
            Self::NotWatchable {
                operation,
                property,
                object,
            } => write!(
                f,
                "cannot {operation} '{property}' on unwatchable object {object}"
            ),
            Self::WatcherFailed {
                property,
                scope,
                source,
            } => write!(f, "{scope} watcher for '{property}' failed: {source}"),
        }
    }
}

impl std::error::Error for WatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::WatcherFailed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Result alias for registry operations.
pub type Result<T> = std::result::Result<T, WatchError>;
