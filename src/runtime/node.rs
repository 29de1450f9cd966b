//! Uniform handle over leaf states and nested machines.

use crate::core::{Channel, MachineError, Outcome};
use crate::runtime::leaf::LeafState;
use crate::runtime::machine::Machine;
use serde_json::Value;

/// An instantiated state, as seen by hooks and guards.
#[derive(Clone, Debug)]
pub enum StateNode {
    Leaf(LeafState),
    Machine(Machine),
}

impl StateNode {
    /// Name of the slot this state occupies in its parent.
    pub fn name(&self) -> &str {
        match self {
            Self::Leaf(leaf) => leaf.name(),
            Self::Machine(machine) => machine.name(),
        }
    }

    pub fn is_entered(&self) -> bool {
        match self {
            Self::Leaf(leaf) => leaf.is_entered(),
            Self::Machine(machine) => machine.is_entered(),
        }
    }

    /// Current child of a nested machine; always `None` for a leaf.
    pub fn current_state_name(&self) -> Option<String> {
        match self {
            Self::Leaf(_) => None,
            Self::Machine(machine) => machine.current_state_name(),
        }
    }

    pub fn parent(&self) -> Option<Machine> {
        match self {
            Self::Leaf(leaf) => leaf.parent(),
            Self::Machine(machine) => machine.parent(),
        }
    }

    pub fn as_machine(&self) -> Option<&Machine> {
        match self {
            Self::Machine(machine) => Some(machine),
            Self::Leaf(_) => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&LeafState> {
        match self {
            Self::Leaf(leaf) => Some(leaf),
            Self::Machine(_) => None,
        }
    }

    pub fn get_event(&self, name: &str) -> Option<Channel<Value>> {
        match self {
            Self::Leaf(leaf) => leaf.get_event(name),
            Self::Machine(machine) => machine.get_event(name),
        }
    }

    pub fn fire_event(&self, name: &str, data: Value) -> Result<bool, MachineError> {
        match self.get_event(name) {
            Some(channel) => channel.publish(&data).map(|_| true),
            None => Ok(false),
        }
    }

    /// Ask the parent machine to move to sibling `target`.
    pub fn transition_parent(&self, target: &str, data: Value) -> Result<Outcome, MachineError> {
        match self.parent() {
            Some(parent) => parent.transition(target, data),
            None => Ok(Outcome::Ignored),
        }
    }

    pub fn enters(&self) -> Channel<Value> {
        match self {
            Self::Leaf(leaf) => leaf.enters(),
            Self::Machine(machine) => machine.enters(),
        }
    }

    /// Scoping channel: fires once this activation has fully exited.
    pub fn exits(&self) -> Channel<Value> {
        match self {
            Self::Leaf(leaf) => leaf.exits(),
            Self::Machine(machine) => machine.exits(),
        }
    }

    pub fn get_data(&self, key: &str) -> Option<Value> {
        match self {
            Self::Leaf(leaf) => leaf.get_data(key),
            Self::Machine(machine) => machine.get_data(key),
        }
    }

    pub fn set_data(&self, key: impl Into<String>, value: Value) {
        match self {
            Self::Leaf(leaf) => leaf.set_data(key, value),
            Self::Machine(machine) => machine.set_data(key, value),
        }
    }

    pub(crate) fn can_enter(&self) -> bool {
        match self {
            Self::Leaf(leaf) => leaf.can_enter(),
            Self::Machine(machine) => machine.can_enter(),
        }
    }

    pub(crate) fn can_exit(&self) -> bool {
        match self {
            Self::Leaf(leaf) => leaf.can_exit(),
            Self::Machine(machine) => machine.can_exit(),
        }
    }

    /// The declared entry guard alone, ignoring whether the state is
    /// currently entered. Used for self-transitions.
    pub(crate) fn entry_guard_allows(&self) -> bool {
        match self {
            Self::Leaf(leaf) => leaf.entry_guard_allows(),
            Self::Machine(machine) => machine.entry_guard_allows(),
        }
    }

    pub(crate) fn enter(&self, data: &Value) -> Result<(), MachineError> {
        match self {
            Self::Leaf(leaf) => leaf.enter(data).map(|_| ()),
            Self::Machine(machine) => machine.enter(data.clone()).map(|_| ()),
        }
    }

    pub(crate) fn exit(&self, data: &Value) -> Result<(), MachineError> {
        match self {
            Self::Leaf(leaf) => leaf.teardown(data),
            Self::Machine(machine) => machine.exit(data.clone()).map(|_| ()),
        }
    }

    pub(crate) fn configuration_into(&self, path: &mut Vec<String>) {
        path.push(self.name().to_string());
        if let Self::Machine(machine) = self {
            machine.configuration_into(path);
        }
    }
}
