#![forbid(unsafe_code)]

//! Registry configuration.
//!
//! Defaults reproduce the classic behavior: watchers are notified before the
//! new value is stored, and dead entries are swept whenever a new object is
//! initialized. Both can be overridden programmatically or from the
//! environment:
//!
//! | Variable | Values |
//! |----------|--------|
//! | `WATCHPROPS_COMMIT_ORDER` | `notify-first`, `commit-first` |
//! | `WATCHPROPS_PRUNE_ON_INIT` | `1`/`true`/`yes`/`on`, anything else is off |

use std::str::FromStr;

/// Environment variable selecting [`CommitOrder`].
pub const ENV_COMMIT_ORDER: &str = "WATCHPROPS_COMMIT_ORDER";
/// Environment variable toggling [`RegistryConfig::prune_on_initialize`].
pub const ENV_PRUNE_ON_INIT: &str = "WATCHPROPS_PRUNE_ON_INIT";

/// When `set` stores the new value relative to notifying watchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitOrder {
    /// Notify every watcher, then store. Watchers reading the property see
    /// the old value; a failing watcher leaves the old value in place.
    #[default]
    NotifyThenCommit,
    /// Store first, then notify. Watchers reading the property see the new
    /// value; a failing watcher does not roll the store back.
    CommitThenNotify,
}

impl CommitOrder {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotifyThenCommit => "notify-first",
            Self::CommitThenNotify => "commit-first",
        }
    }
}

impl FromStr for CommitOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "notify-first" | "notify_then_commit" | "notify" => Ok(Self::NotifyThenCommit),
            "commit-first" | "commit_then_notify" | "commit" => Ok(Self::CommitThenNotify),
            other => Err(format!("unknown commit order: {other}")),
        }
    }
}

/// Configuration for a [`Registry`](crate::Registry).
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Ordering of notification and storage inside `set`.
    pub commit_order: CommitOrder,
    /// Sweep entries of dropped objects on every `initialize`.
    pub prune_on_initialize: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            commit_order: CommitOrder::NotifyThenCommit,
            prune_on_initialize: true,
        }
    }
}

impl RegistryConfig {
    /// Defaults, overridden by the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Defaults, overridden through a custom environment lookup.
    ///
    /// Unparseable values are ignored and the default is kept.
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = get_env(ENV_COMMIT_ORDER) {
            match value.parse() {
                Ok(order) => config.commit_order = order,
                Err(err) => {
                    tracing::warn!(%err, variable = ENV_COMMIT_ORDER, "ignoring override");
                }
            }
        }
        if let Some(value) = get_env(ENV_PRUNE_ON_INIT) {
            config.prune_on_initialize = env_flag(&value);
        }
        config
    }

    /// Set the commit order.
    #[must_use]
    pub fn with_commit_order(mut self, order: CommitOrder) -> Self {
        self.commit_order = order;
        self
    }

    /// Set whether `initialize` sweeps dead entries.
    #[must_use]
    pub fn with_prune_on_initialize(mut self, enabled: bool) -> Self {
        self.prune_on_initialize = enabled;
        self
    }
}

#[inline]
fn env_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
