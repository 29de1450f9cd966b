//! Guard predicates controlling entry into and exit out of states.
//!
//! Guards are boolean functions evaluated before a transition touches
//! anything. A guard returning `false` cancels the move without side effects.

use crate::runtime::StateNode;
use std::fmt;
use std::rc::Rc;

/// Predicate evaluated against the state it guards.
///
/// # Example
///
/// ```rust
/// use stratum::builder::{LeafBuilder, MachineBuilder};
/// use stratum::core::Guard;
/// use stratum::runtime::Machine;
///
/// let locked = Guard::new(|_| false);
///
/// let definition = MachineBuilder::new()
///     .start("idle")
///     .state("idle", LeafBuilder::new())
///     .state("vault", LeafBuilder::new().can_enter_guard(locked))
///     .build()
///     .unwrap();
///
/// let machine = Machine::new(definition).unwrap();
/// machine.enter(serde_json::Value::Null).unwrap();
/// machine.transition("vault", serde_json::Value::Null).unwrap();
/// assert_eq!(machine.current_state_name().as_deref(), Some("idle"));
/// ```
#[derive(Clone)]
pub struct Guard {
    predicate: Rc<dyn Fn(&StateNode) -> bool>,
}

impl Guard {
    /// Create a guard from a predicate.
    ///
    /// The predicate receives the guarded state itself, so it can inspect
    /// e.g. the current substate of a composite state before letting it exit.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&StateNode) -> bool + 'static,
    {
        Guard {
            predicate: Rc::new(predicate),
        }
    }

    /// Check whether the guard allows the move.
    pub fn check(&self, state: &StateNode) -> bool {
        (self.predicate)(state)
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Guard")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::MachineBuilder;
    use crate::runtime::Machine;
    use serde_json::Value;

    fn sample_node() -> StateNode {
        let definition = MachineBuilder::new()
            .start("a")
            .states(["a", "b"])
            .build()
            .unwrap();
        StateNode::Machine(Machine::new(definition).unwrap())
    }

    #[test]
    fn guard_allows_matching_states() {
        let node = sample_node();
        let guard = Guard::new(|state| state.is_entered());

        assert!(!guard.check(&node));
        node.as_machine().unwrap().enter(Value::Null).unwrap();
        assert!(guard.check(&node));
    }

    #[test]
    fn guard_can_inspect_current_substate() {
        let node = sample_node();
        let guard = Guard::new(|state| state.current_state_name().as_deref() == Some("b"));
        let machine = node.as_machine().unwrap();

        machine.enter(Value::Null).unwrap();
        assert!(!guard.check(&node));

        machine.transition("b", Value::Null).unwrap();
        assert!(guard.check(&node));
    }

    #[test]
    fn guard_is_deterministic() {
        let node = sample_node();
        let guard = Guard::new(|state| state.name() == "root");

        assert_eq!(guard.check(&node), guard.check(&node));
    }
}
