use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::element::{ElementHandle, NodeId};
use crate::harness::Harness;
use crate::{Error, Result};

/// Callback bound to an (element, event type) pair.
pub type EventListener = Rc<dyn Fn(&mut Harness, &Event) -> Result<()>>;

/// The synthetic event handed to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub event_type: String,
    pub target: ElementHandle,
    pub time_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Clone)]
struct Listener {
    id: ListenerId,
    callback: EventListener,
}

#[derive(Default)]
pub(crate) struct ListenerStore {
    map: HashMap<NodeId, HashMap<String, Vec<Listener>>>,
    next_id: u64,
}

impl fmt::Debug for ListenerStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self
            .map
            .values()
            .flat_map(HashMap::values)
            .map(Vec::len)
            .sum::<usize>();
        f.debug_struct("ListenerStore")
            .field("nodes", &self.map.len())
            .field("listeners", &total)
            .finish()
    }
}

impl ListenerStore {
    fn add(&mut self, node_id: NodeId, event: &str, callback: EventListener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.map
            .entry(node_id)
            .or_default()
            .entry(event.to_string())
            .or_default()
            .push(Listener { id, callback });
        id
    }

    fn remove(&mut self, node_id: NodeId, event: &str, id: ListenerId) -> bool {
        let Some(events) = self.map.get_mut(&node_id) else {
            return false;
        };
        let Some(listeners) = events.get_mut(event) else {
            return false;
        };
        let Some(pos) = listeners.iter().position(|listener| listener.id == id) else {
            return false;
        };
        listeners.remove(pos);
        if listeners.is_empty() {
            events.remove(event);
        }
        if events.is_empty() {
            self.map.remove(&node_id);
        }
        true
    }

    fn snapshot(&self, node_id: NodeId, event: &str) -> Vec<EventListener> {
        self.map
            .get(&node_id)
            .and_then(|events| events.get(event))
            .map(|listeners| {
                listeners
                    .iter()
                    .map(|listener| Rc::clone(&listener.callback))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn count(&self, node_id: NodeId, event: &str) -> usize {
        self.map
            .get(&node_id)
            .and_then(|events| events.get(event))
            .map_or(0, Vec::len)
    }

    pub(crate) fn remove_node(&mut self, node_id: NodeId) {
        self.map.remove(&node_id);
    }
}

impl Harness {
    /// Registers `callback` for `event_type` on `target`. Listeners for the
    /// same pair run in registration order.
    pub fn add_event_listener<F>(
        &mut self,
        target: ElementHandle,
        event_type: &str,
        callback: F,
    ) -> Result<ListenerId>
    where
        F: Fn(&mut Harness, &Event) -> Result<()> + 'static,
    {
        if !self.dom.contains(target) {
            return Err(Error::DetachedNode(target.to_string()));
        }
        let id = self
            .listeners
            .add(target.node_id(), event_type, Rc::new(callback));
        Ok(id)
    }

    pub fn remove_event_listener(
        &mut self,
        target: ElementHandle,
        event_type: &str,
        id: ListenerId,
    ) -> bool {
        self.listeners.remove(target.node_id(), event_type, id)
    }

    pub fn listener_count(&self, target: ElementHandle, event_type: &str) -> usize {
        self.listeners.count(target.node_id(), event_type)
    }

    /// Synchronously runs every listener registered for (`target`,
    /// `event_type`) when the dispatch starts, in order, and returns how many
    /// ran. There is no propagation to ancestors.
    ///
    /// The listener list is captured up front: listeners added during the
    /// dispatch wait for the next one, and removing `target` mid-dispatch does
    /// not stop the captured listeners. The first listener error aborts the
    /// dispatch and is returned as is.
    pub fn dispatch_event(&mut self, target: ElementHandle, event_type: &str) -> Result<usize> {
        if !self.dom.contains(target) {
            return Err(Error::DetachedNode(target.to_string()));
        }
        let listeners = self.listeners.snapshot(target.node_id(), event_type);
        let label = self.dom.label(target);
        self.trace_event_line(format!(
            "[event] {event_type} target={label} listeners={}",
            listeners.len()
        ));

        let event = Event {
            event_type: event_type.to_string(),
            target,
            time_ms: self.clock.now_ms(),
        };
        let mut invoked = 0usize;
        let outcome = listeners.iter().try_for_each(|listener| {
            invoked += 1;
            listener(self, &event)
        });
        self.reap_listeners();

        if let Err(err) = outcome {
            self.trace_event_line(format!(
                "[event] aborted {event_type} target={label} after={invoked} error={err}"
            ));
            return Err(err);
        }
        Ok(invoked)
    }

    pub fn click_element(&mut self, target: ElementHandle) -> Result<usize> {
        self.dispatch_event(target, "click")
    }

    /// Drops listeners bound to elements the document has freed.
    pub(crate) fn reap_listeners(&mut self) {
        for node_id in self.dom.take_freed() {
            self.listeners.remove_node(node_id);
        }
    }
}
