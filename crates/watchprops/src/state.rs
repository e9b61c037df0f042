#![forbid(unsafe_code)]

//! Per-object property storage and watcher lists.
//!
//! # Invariants
//!
//! 1. Watcher lists keep registration order; removal never reorders the
//!    remaining entries.
//! 2. Duplicate registrations are kept as separate entries.
//! 3. Empty lists are dropped from the map, so a property with no watchers
//!    costs nothing on `set`.

use std::collections::HashMap;

use crate::watcher::{Watcher, WatcherScope};

/// Ordered watcher lists keyed by property name.
pub(crate) struct WatcherLists<V> {
    lists: HashMap<String, Vec<Watcher<V>>>,
}

impl<V> Default for WatcherLists<V> {
    fn default() -> Self {
        Self {
            lists: HashMap::new(),
        }
    }
}

impl<V> WatcherLists<V> {
    pub(crate) fn push(&mut self, property: &str, watcher: Watcher<V>) {
        self.lists
            .entry(property.to_owned())
            .or_default()
            .push(watcher);
    }

    /// Remove the first registration of `watcher`, or every registration
    /// for `property` when `watcher` is `None`. Returns the removed handles
    /// so the caller decides where they are dropped.
    pub(crate) fn remove(
        &mut self,
        property: &str,
        watcher: Option<&Watcher<V>>,
    ) -> Vec<Watcher<V>> {
        let Some(watcher) = watcher else {
            return self.lists.remove(property).unwrap_or_default();
        };
        let Some(list) = self.lists.get_mut(property) else {
            return Vec::new();
        };
        let Some(index) = list.iter().position(|w| w.same_as(watcher)) else {
            return Vec::new();
        };
        let removed = list.remove(index);
        if list.is_empty() {
            self.lists.remove(property);
        }
        vec![removed]
    }

    /// Stable copy of the list for one notification pass.
    pub(crate) fn snapshot(&self, property: &str) -> Vec<Watcher<V>> {
        self.lists.get(property).cloned().unwrap_or_default()
    }

    pub(crate) fn count(&self, property: &str) -> usize {
        self.lists.get(property).map_or(0, Vec::len)
    }
}

/// Everything the registry knows about one watchable object.
pub(crate) struct WatchableState<V> {
    values: HashMap<String, V>,
    object_watchers: WatcherLists<V>,
    constructor_watchers: WatcherLists<V>,
}

impl<V> Default for WatchableState<V> {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
            object_watchers: WatcherLists::default(),
            constructor_watchers: WatcherLists::default(),
        }
    }
}

impl<V> WatchableState<V> {
    pub(crate) fn value(&self, property: &str) -> Option<&V> {
        self.values.get(property)
    }

    /// Store `value`, handing back the value it replaced.
    pub(crate) fn commit(&mut self, property: &str, value: V) -> Option<V> {
        self.values.insert(property.to_owned(), value)
    }

    pub(crate) fn watchers(&self, scope: WatcherScope) -> &WatcherLists<V> {
        match scope {
            WatcherScope::Object => &self.object_watchers,
            WatcherScope::Constructor => &self.constructor_watchers,
        }
    }

    pub(crate) fn watchers_mut(&mut self, scope: WatcherScope) -> &mut WatcherLists<V> {
        match scope {
            WatcherScope::Object => &mut self.object_watchers,
            WatcherScope::Constructor => &mut self.constructor_watchers,
        }
    }

    pub(crate) fn property_count(&self) -> usize {
        self.values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn tagged(log: &Rc<RefCell<Vec<char>>>, tag: char) -> Watcher<i32> {
        let log = Rc::clone(log);
        Watcher::new(move |_| log.borrow_mut().push(tag))
    }

    #[test]
    fn push_keeps_order_and_duplicates() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = tagged(&log, 'A');
        let b = tagged(&log, 'B');

        let mut lists = WatcherLists::default();
        lists.push("p", a.clone());
        lists.push("p", b.clone());
        lists.push("p", a.clone());

        let snap = lists.snapshot("p");
        assert_eq!(snap.len(), 3);
        assert!(snap[0].same_as(&a));
        assert!(snap[1].same_as(&b));
        assert!(snap[2].same_as(&a));
    }

    #[test]
    fn remove_first_match_only() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = tagged(&log, 'A');
        let b = tagged(&log, 'B');

        let mut lists = WatcherLists::default();
        lists.push("p", a.clone());
        lists.push("p", b.clone());
        lists.push("p", a.clone());

        assert_eq!(lists.remove("p", Some(&a)).len(), 1);
        let snap = lists.snapshot("p");
        assert_eq!(snap.len(), 2);
        assert!(snap[0].same_as(&b));
        assert!(snap[1].same_as(&a));
    }

    #[test]
    fn remove_missing_is_noop() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = tagged(&log, 'A');
        let b = tagged(&log, 'B');

        let mut lists = WatcherLists::default();
        assert!(lists.remove("p", Some(&a)).is_empty());
        lists.push("p", a.clone());
        assert!(lists.remove("p", Some(&b)).is_empty());
        assert!(lists.remove("q", Some(&a)).is_empty());
        assert_eq!(lists.count("p"), 1);
    }

    #[test]
    fn remove_all_clears_property() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut lists = WatcherLists::default();
        lists.push("p", tagged(&log, 'A'));
        lists.push("p", tagged(&log, 'B'));
        lists.push("q", tagged(&log, 'C'));

        assert_eq!(lists.remove("p", None).len(), 2);
        assert_eq!(lists.count("p"), 0);
        assert_eq!(lists.count("q"), 1);
        assert!(lists.remove("p", None).is_empty());
    }

    #[test]
    fn snapshot_is_detached_from_list() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = tagged(&log, 'A');
        let mut lists = WatcherLists::default();
        lists.push("p", a.clone());

        let snap = lists.snapshot("p");
        let removed = lists.remove("p", Some(&a));
        assert!(removed[0].same_as(&a));
        assert_eq!(snap.len(), 1);
        assert_eq!(lists.count("p"), 0);
    }

    #[test]
    fn state_scopes_are_independent() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut state: WatchableState<i32> = WatchableState::default();
        state
            .watchers_mut(WatcherScope::Object)
            .push("p", tagged(&log, 'A'));

        assert_eq!(state.watchers(WatcherScope::Object).count("p"), 1);
        assert_eq!(state.watchers(WatcherScope::Constructor).count("p"), 0);

        assert_eq!(state.value("p"), None);
        assert_eq!(state.commit("p", 5), None);
        assert_eq!(state.commit("p", 6), Some(5));
        assert_eq!(state.value("p"), Some(&6));
        assert_eq!(state.property_count(), 1);
    }
}
