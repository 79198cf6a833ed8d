// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structural mutation events and the per-node observer registry.
//!
//! Delivery is synchronous and reentrant: a callback receives the mutable
//! [`Network`] and may mutate the graph, which can trigger nested
//! notifications on the same or other registries. Each registry tracks its
//! notification depth; observers added or removed while a notification is in
//! progress are staged and only reconciled when the outermost notification on
//! that registry returns. Consequently an observer added mid-notification
//! does not see the event that was being delivered, and an observer removed
//! mid-notification is not called again.

use crate::connection::Connection;
use crate::network::Network;
use crate::node::NodeKey;
use crate::port::{InputId, OutputId};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// A structural mutation of the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventData {
    /// A child was inserted into the network
    ChildAdded {
        /// The new child
        child: NodeKey,
    },
    /// A child is being removed; its connectors are already gone
    ChildRemoved {
        /// The departing child
        child: NodeKey,
    },
    /// An input was created
    InputAdded {
        /// Owning node
        node: NodeKey,
        /// The new input
        input: InputId,
    },
    /// An input is being deleted; it is already disconnected
    InputRemoved {
        /// Owning node
        node: NodeKey,
        /// The departing input
        input: InputId,
    },
    /// An output was created
    OutputAdded {
        /// Owning node
        node: NodeKey,
        /// The new output
        output: OutputId,
    },
    /// An output is being deleted; every downstream input is already severed
    OutputRemoved {
        /// Owning node
        node: NodeKey,
        /// The departing output
        output: OutputId,
    },
    /// An input resolved to a live output
    ConnectionAdded(Connection),
    /// A live edge is about to be torn down
    ConnectionRemoved(Connection),
    /// A node is about to be deleted
    AboutToBeDeleted {
        /// The node being deleted
        node: NodeKey,
    },
}

/// Observer callback. Receives the network containing the emitting node.
pub type ObserverCallback = Rc<dyn Fn(&mut Network, &EventData)>;

/// Unique identifier of an observer registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Default)]
struct RegistryState {
    depth: u32,
    live: Vec<(ObserverId, ObserverCallback)>,
    to_add: Vec<(ObserverId, ObserverCallback)>,
    to_remove: Vec<ObserverId>,
}

/// Reentrancy-safe list of observers attached to one node.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    state: Rc<RefCell<RegistryState>>,
}

impl ObserverRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback.
    ///
    /// While a notification is being delivered the registration is staged
    /// and takes effect once the outermost notification completes.
    pub fn add<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&mut Network, &EventData) + 'static,
    {
        let id = ObserverId::next();
        let callback: ObserverCallback = Rc::new(callback);
        let mut state = self.state.borrow_mut();
        if state.depth == 0 {
            state.live.push((id, callback));
        } else {
            state.to_add.push((id, callback));
        }
        id
    }

    /// Unregister a callback. Returns false if it was not registered.
    pub fn remove(&self, id: ObserverId) -> bool {
        // Callbacks are dropped after the borrow is released: a closure may own
        // an `Observer` whose drop re-enters this registry.
        let removed;
        {
            let mut state = self.state.borrow_mut();
            if let Some(pos) = state.to_add.iter().position(|(o, _)| *o == id) {
                removed = Some(state.to_add.remove(pos).1);
            } else if !state.live.iter().any(|(o, _)| *o == id) || state.to_remove.contains(&id) {
                return false;
            } else if state.depth == 0 {
                let pos = state.live.iter().position(|(o, _)| *o == id);
                removed = pos.map(|pos| state.live.remove(pos).1);
            } else {
                state.to_remove.push(id);
                removed = None;
            }
        }
        drop(removed);
        true
    }

    /// Whether `id` is registered and not pending removal
    pub fn contains(&self, id: ObserverId) -> bool {
        let state = self.state.borrow();
        let live = state.live.iter().any(|(o, _)| *o == id) && !state.to_remove.contains(&id);
        live || state.to_add.iter().any(|(o, _)| *o == id)
    }

    /// Number of observers that will receive the next notification
    pub fn len(&self) -> usize {
        let state = self.state.borrow();
        state.live.len() - state.to_remove.len() + state.to_add.len()
    }

    /// Whether no observers are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current notification nesting depth
    pub fn depth(&self) -> u32 {
        self.state.borrow().depth
    }

    /// Deliver `event` to every live observer in registration order.
    pub(crate) fn dispatch(&self, network: &mut Network, event: &EventData) {
        let _guard = DispatchGuard::enter(self);
        let mut cursor = 0;
        while let Some(callback) = self.next_callback(&mut cursor) {
            callback(network, event);
        }
    }

    fn next_callback(&self, cursor: &mut usize) -> Option<ObserverCallback> {
        let state = self.state.borrow();
        while let Some((id, callback)) = state.live.get(*cursor) {
            *cursor += 1;
            if !state.to_remove.contains(id) {
                return Some(Rc::clone(callback));
            }
        }
        None
    }

    fn reconcile(&self) {
        let removed: Vec<(ObserverId, ObserverCallback)>;
        {
            let mut state = self.state.borrow_mut();
            let to_remove = std::mem::take(&mut state.to_remove);
            let (kept, dropped): (Vec<_>, Vec<_>) = std::mem::take(&mut state.live)
                .into_iter()
                .partition(|(id, _)| !to_remove.contains(id));
            state.live = kept;
            removed = dropped;
            let mut to_add = std::mem::take(&mut state.to_add);
            state.live.append(&mut to_add);
        }
        drop(removed);
    }

    fn downgrade(&self) -> Weak<RefCell<RegistryState>> {
        Rc::downgrade(&self.state)
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ObserverRegistry")
            .field("depth", &state.depth)
            .field("live", &state.live.len())
            .field("to_add", &state.to_add.len())
            .field("to_remove", &state.to_remove.len())
            .finish()
    }
}

/// Keeps the depth counter balanced even if a callback unwinds.
struct DispatchGuard<'a> {
    registry: &'a ObserverRegistry,
}

impl<'a> DispatchGuard<'a> {
    fn enter(registry: &'a ObserverRegistry) -> Self {
        let depth = {
            let mut state = registry.state.borrow_mut();
            state.depth += 1;
            state.depth
        };
        tracing::trace!(depth, "notification entered");
        Self { registry }
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        let depth = {
            let mut state = self.registry.state.borrow_mut();
            state.depth -= 1;
            state.depth
        };
        tracing::trace!(depth, "notification left");
        if depth == 0 {
            self.registry.reconcile();
        }
    }
}

/// Scoped observer registration.
///
/// Registers on creation and unregisters when dropped. Holds the registry
/// weakly, so it may outlive the observed node.
pub struct Observer {
    id: ObserverId,
    registry: Weak<RefCell<RegistryState>>,
}

impl Observer {
    /// Register `callback` on `registry` for the lifetime of the returned value
    pub fn new<F>(registry: &ObserverRegistry, callback: F) -> Self
    where
        F: Fn(&mut Network, &EventData) + 'static,
    {
        let id = registry.add(callback);
        Self {
            id,
            registry: registry.downgrade(),
        }
    }

    /// Registration identifier
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Whether the observed node still exists and this observer is registered
    pub fn is_attached(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|state| ObserverRegistry { state }.contains(self.id))
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        if let Some(state) = self.registry.upgrade() {
            ObserverRegistry { state }.remove(self.id);
        }
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("id", &self.id)
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;
    use std::cell::Cell;

    fn some_key() -> NodeKey {
        let mut keys: SlotMap<NodeKey, ()> = SlotMap::with_key();
        keys.insert(())
    }

    fn recorder(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> impl Fn(&mut Network, &EventData) {
        let log = Rc::clone(log);
        move |_, _| log.borrow_mut().push(tag)
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let mut network = Network::new("root");
        let registry = ObserverRegistry::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        registry.add(recorder(&log, "a"));
        registry.add(recorder(&log, "b"));
        registry.add(recorder(&log, "c"));

        registry.dispatch(&mut network, &EventData::ChildAdded { child: some_key() });
        assert_eq!(*log.borrow(), ["a", "b", "c"]);
        assert_eq!(registry.depth(), 0);
    }

    #[test]
    fn test_self_removal_during_dispatch() {
        let mut network = Network::new("root");
        let registry = ObserverRegistry::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let own_id = Rc::new(Cell::new(None));

        registry.add(recorder(&log, "first"));
        let handle = registry.clone();
        let slot = Rc::clone(&own_id);
        let inner_log = Rc::clone(&log);
        let id = registry.add(move |_, _| {
            inner_log.borrow_mut().push("once");
            if let Some(id) = slot.get() {
                assert!(handle.remove(id));
            }
        });
        own_id.set(Some(id));
        registry.add(recorder(&log, "last"));

        let event = EventData::ChildAdded { child: some_key() };
        registry.dispatch(&mut network, &event);
        assert_eq!(*log.borrow(), ["first", "once", "last"]);
        assert!(!registry.contains(id));

        log.borrow_mut().clear();
        registry.dispatch(&mut network, &event);
        assert_eq!(*log.borrow(), ["first", "last"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_removing_later_observer_skips_it() {
        let mut network = Network::new("root");
        let registry = ObserverRegistry::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let victim = Rc::new(Cell::new(None));

        let handle = registry.clone();
        let target = Rc::clone(&victim);
        registry.add(move |_, _| {
            if let Some(id) = target.get() {
                handle.remove(id);
            }
        });
        victim.set(Some(registry.add(recorder(&log, "victim"))));

        registry.dispatch(&mut network, &EventData::ChildAdded { child: some_key() });
        assert!(log.borrow().is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_added_during_dispatch_sees_next_event_only() {
        let mut network = Network::new("root");
        let registry = ObserverRegistry::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let added = Rc::new(Cell::new(false));

        let handle = registry.clone();
        let seen_outer = Rc::clone(&seen);
        let added_flag = Rc::clone(&added);
        registry.add(move |_, _| {
            if !added_flag.replace(true) {
                let seen = Rc::clone(&seen_outer);
                handle.add(move |_, event| seen.borrow_mut().push(*event));
                assert_eq!(handle.len(), 2);
            }
        });

        let key = some_key();
        let first = EventData::ChildAdded { child: key };
        let second = EventData::ChildRemoved { child: key };
        registry.dispatch(&mut network, &first);
        assert!(seen.borrow().is_empty());

        registry.dispatch(&mut network, &second);
        assert_eq!(*seen.borrow(), [second]);
    }

    #[test]
    fn test_nested_dispatch_defers_reconcile() {
        let mut network = Network::new("root");
        let registry = ObserverRegistry::new();
        let depths = Rc::new(RefCell::new(Vec::new()));

        let handle = registry.clone();
        let record = Rc::clone(&depths);
        registry.add(move |network, event| {
            record.borrow_mut().push(handle.depth());
            if matches!(event, EventData::ChildAdded { .. }) {
                let id = handle.add(|_, _| {});
                handle.dispatch(network, &EventData::AboutToBeDeleted { node: some_key() });
                // still staged: the outer notification has not finished
                assert!(handle.contains(id));
                assert_eq!(handle.depth(), 1);
            }
        });

        registry.dispatch(&mut network, &EventData::ChildAdded { child: some_key() });
        assert_eq!(*depths.borrow(), [1, 2]);
        assert_eq!(registry.depth(), 0);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_add_then_remove_within_dispatch() {
        let mut network = Network::new("root");
        let registry = ObserverRegistry::new();
        let handle = registry.clone();
        registry.add(move |_, _| {
            let id = handle.add(|_, _| {});
            assert!(handle.remove(id));
        });

        registry.dispatch(&mut network, &EventData::ChildAdded { child: some_key() });
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_scoped_observer_unregisters_on_drop() {
        let registry = ObserverRegistry::new();
        let observer = Observer::new(&registry, |_, _| {});
        assert!(observer.is_attached());
        assert_eq!(registry.len(), 1);

        drop(observer);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_observer_outliving_registry() {
        let registry = ObserverRegistry::new();
        let observer = Observer::new(&registry, |_, _| {});
        drop(registry);
        assert!(!observer.is_attached());
        drop(observer);
    }

    #[test]
    fn test_observer_dropped_inside_callback() {
        let mut network = Network::new("root");
        let registry = ObserverRegistry::new();
        let count = Rc::new(Cell::new(0));
        let holder: Rc<RefCell<Option<Observer>>> = Rc::new(RefCell::new(None));

        let slot = Rc::clone(&holder);
        let counter = Rc::clone(&count);
        let observer = Observer::new(&registry, move |_, _| {
            counter.set(counter.get() + 1);
            let observer = slot.borrow_mut().take();
            drop(observer);
        });
        *holder.borrow_mut() = Some(observer);

        let event = EventData::ChildAdded { child: some_key() };
        registry.dispatch(&mut network, &event);
        registry.dispatch(&mut network, &event);
        assert_eq!(count.get(), 1);
        assert!(registry.is_empty());
    }
}
