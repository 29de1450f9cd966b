//! Leaf state lifecycle.

use crate::builder::{Behavior, GraphError, Hook, LeafDefinition};
use crate::core::{Channel, HookResult, MachineError};
use crate::runtime::machine::{Machine, WeakMachine};
use crate::runtime::node::StateNode;
use serde_json::Value;
use std::cell::{Cell, OnceCell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

struct LeafInner {
    name: String,
    definition: Rc<LeafDefinition>,
    behavior: Option<Rc<Behavior>>,
    parent: WeakMachine,
    entered: Cell<bool>,
    enters: OnceCell<Channel<Value>>,
    exits: OnceCell<Channel<Value>>,
    data: RefCell<HashMap<String, Value>>,
}

/// An instantiated state with no children.
///
/// Leaf states own no event channels: event lookups go to the parent
/// machine, with the parent's private events visible.
#[derive(Clone)]
pub struct LeafState {
    inner: Rc<LeafInner>,
}

impl fmt::Debug for LeafState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafState")
            .field("name", &self.inner.name)
            .field("entered", &self.inner.entered.get())
            .finish()
    }
}

impl LeafState {
    pub(crate) fn new(
        name: String,
        definition: Rc<LeafDefinition>,
        behavior: Option<Rc<Behavior>>,
        parent: WeakMachine,
    ) -> Self {
        Self {
            inner: Rc::new(LeafInner {
                name,
                definition,
                behavior,
                parent,
                entered: Cell::new(false),
                enters: OnceCell::new(),
                exits: OnceCell::new(),
                data: RefCell::new(HashMap::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_entered(&self) -> bool {
        self.inner.entered.get()
    }

    pub fn parent(&self) -> Option<Machine> {
        self.inner.parent.upgrade()
    }

    /// Fires at the start of every entry, before any hook runs.
    pub fn enters(&self) -> Channel<Value> {
        self.inner.enters.get_or_init(Channel::new).clone()
    }

    /// Fires after every exit hook has run.
    pub fn exits(&self) -> Channel<Value> {
        self.inner.exits.get_or_init(Channel::new).clone()
    }

    /// Resolve an event channel through the parent machine. Private events
    /// are visible only while the parent has granted access, as it does for
    /// this state's own hooks.
    pub fn get_event(&self, name: &str) -> Option<Channel<Value>> {
        self.parent()?.get_event(name)
    }

    pub fn fire_event(&self, name: &str, data: Value) -> Result<bool, MachineError> {
        match self.get_event(name) {
            Some(channel) => channel.publish(&data).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn can_enter(&self) -> bool {
        !self.is_entered() && self.entry_guard_allows()
    }

    pub fn can_exit(&self) -> bool {
        self.is_entered() && self.inner.definition.lifecycle.allows_exit(&self.node())
    }

    pub(crate) fn entry_guard_allows(&self) -> bool {
        self.inner.definition.lifecycle.allows_entry(&self.node())
    }

    /// Activation-scoped value; cleared on exit.
    pub fn get_data(&self, key: &str) -> Option<Value> {
        self.inner.data.borrow().get(key).cloned()
    }

    pub fn set_data(&self, key: impl Into<String>, value: Value) {
        self.inner.data.borrow_mut().insert(key.into(), value);
    }

    /// Enter the state. Returns `Ok(false)` without effect if
    /// [`can_enter`](Self::can_enter) is false.
    pub fn enter(&self, data: &Value) -> Result<bool, MachineError> {
        if !self.can_enter() {
            trace!(state = %self.name(), "leaf entry rejected");
            return Ok(false);
        }
        self.inner.entered.set(true);
        debug!(state = %self.name(), "entering leaf state");

        if let Some(enters) = self.inner.enters.get() {
            enters.publish(data)?;
        }

        let behavior = self.inner.behavior.as_deref();
        self.run_hooks(
            [
                behavior.and_then(|b| b.before_enter.as_ref()),
                self.inner.definition.lifecycle.on_enter.as_ref(),
                behavior.and_then(|b| b.after_enter.as_ref()),
            ],
            data,
        )?;

        self.wire_transitions()
    }

    /// Exit the state. Returns `Ok(false)` without effect if
    /// [`can_exit`](Self::can_exit) is false.
    pub fn exit(&self, data: &Value) -> Result<bool, MachineError> {
        if !self.can_exit() {
            trace!(state = %self.name(), "leaf exit rejected");
            return Ok(false);
        }
        self.teardown(data).map(|_| true)
    }

    /// Exit regardless of the exit guard, as part of a parent's exit or a
    /// transition that has already consulted it.
    pub(crate) fn teardown(&self, data: &Value) -> HookResult {
        if !self.is_entered() {
            return Ok(());
        }
        debug!(state = %self.name(), "exiting leaf state");

        let behavior = self.inner.behavior.as_deref();
        let hooks = self.run_hooks(
            [
                behavior.and_then(|b| b.before_exit.as_ref()),
                self.inner.definition.lifecycle.on_exit.as_ref(),
                behavior.and_then(|b| b.after_exit.as_ref()),
            ],
            data,
        );

        let notified = match self.inner.exits.get() {
            Some(exits) => exits.publish_all(data),
            None => Ok(()),
        };
        self.inner.entered.set(false);
        self.inner.data.borrow_mut().clear();

        hooks.and(notified)
    }

    fn node(&self) -> StateNode {
        StateNode::Leaf(self.clone())
    }

    fn run_hooks(&self, hooks: [Option<&Hook>; 3], data: &Value) -> HookResult {
        let node = self.node();
        let parent = self.parent();
        let _scope = parent.as_ref().map(Machine::private_scope);
        for hook in hooks.into_iter().flatten() {
            hook(&node, data)?;
        }
        Ok(())
    }

    fn wire_transitions(&self) -> Result<bool, MachineError> {
        let exits = self.exits();
        let parent = self.parent();
        let _scope = parent.as_ref().map(Machine::private_scope);
        for (event, target) in &self.inner.definition.transition_on_events {
            let channel = self.get_event(event).ok_or_else(|| GraphError::UnknownEvent {
                context: format!("State `{}`", self.name()),
                event: event.clone(),
            })?;
            let parent = self.inner.parent.clone();
            let target = target.clone();
            channel.subscribe_until(&exits, move |data| match parent.upgrade() {
                Some(machine) => machine.transition(&target, data.clone()).map(|_| ()),
                None => Ok(()),
            });
        }
        Ok(true)
    }
}
