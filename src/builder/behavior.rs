//! Behavior overrides layered over static definitions.
//!
//! A behavior carries `before`/`after` hooks wrapped around a definition's
//! own `on_enter`/`on_exit`, plus nested behaviors for child states matched
//! by name.

use crate::builder::error::GraphError;
use crate::builder::machine::{MachineDefinition, StateDefinition};
use crate::builder::Hook;
use crate::core::HookResult;
use crate::runtime::StateNode;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Hooks supplied at instantiation time rather than in the definition.
///
/// # Example
///
/// ```rust
/// use stratum::builder::Behavior;
///
/// let behavior = Behavior::new()
///     .before_enter(|_, _| Ok(()))
///     .state("playing", Behavior::new().after_exit(|_, _| Ok(())));
///
/// assert!(behavior.child("playing").is_some());
/// assert!(behavior.child("paused").is_none());
/// ```
#[derive(Clone, Default)]
pub struct Behavior {
    pub(crate) before_enter: Option<Hook>,
    pub(crate) after_enter: Option<Hook>,
    pub(crate) before_exit: Option<Hook>,
    pub(crate) after_exit: Option<Hook>,
    pub(crate) states: HashMap<String, Rc<Behavior>>,
}

impl Behavior {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_enter<F>(mut self, hook: F) -> Self
    where
        F: Fn(&StateNode, &Value) -> HookResult + 'static,
    {
        self.before_enter = Some(Rc::new(hook));
        self
    }

    pub fn after_enter<F>(mut self, hook: F) -> Self
    where
        F: Fn(&StateNode, &Value) -> HookResult + 'static,
    {
        self.after_enter = Some(Rc::new(hook));
        self
    }

    pub fn before_exit<F>(mut self, hook: F) -> Self
    where
        F: Fn(&StateNode, &Value) -> HookResult + 'static,
    {
        self.before_exit = Some(Rc::new(hook));
        self
    }

    pub fn after_exit<F>(mut self, hook: F) -> Self
    where
        F: Fn(&StateNode, &Value) -> HookResult + 'static,
    {
        self.after_exit = Some(Rc::new(hook));
        self
    }

    /// Attach the behavior for a child state.
    pub fn state(mut self, name: impl Into<String>, behavior: Behavior) -> Self {
        self.states.insert(name.into(), Rc::new(behavior));
        self
    }

    pub fn child(&self, name: &str) -> Option<Rc<Behavior>> {
        self.states.get(name).cloned()
    }

    /// Check that every nested behavior names a state the definition has,
    /// all the way down.
    pub(crate) fn validate_against(&self, definition: &MachineDefinition) -> Vec<GraphError> {
        let mut errors = Vec::new();
        for (name, behavior) in &self.states {
            match definition.state(name) {
                None => errors.push(GraphError::UnknownBehaviorState(name.clone())),
                Some(StateDefinition::Composite(factory)) => {
                    errors.extend(behavior.validate_against(factory.definition()));
                }
                Some(StateDefinition::Leaf(_)) => {
                    errors.extend(
                        behavior
                            .states
                            .keys()
                            .map(|child| GraphError::UnknownBehaviorState(format!("{name}.{child}"))),
                    );
                }
            }
        }
        errors
    }
}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Behavior")
            .field("before_enter", &self.before_enter.is_some())
            .field("after_enter", &self.after_enter.is_some())
            .field("before_exit", &self.before_exit.is_some())
            .field("after_exit", &self.after_exit.is_some())
            .field("states", &self.states.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::MachineBuilder;

    #[test]
    fn validation_accepts_matching_shape() {
        let inner = MachineBuilder::new().start("a").states(["a", "b"]).build().unwrap();
        let definition = MachineBuilder::new()
            .start("one")
            .composite("one", inner)
            .state("two", crate::builder::LeafBuilder::new())
            .build()
            .unwrap();

        let behavior = Behavior::new()
            .state("one", Behavior::new().state("b", Behavior::new()))
            .state("two", Behavior::new());

        assert!(behavior.validate_against(&definition).is_empty());
    }

    #[test]
    fn validation_rejects_unknown_names_at_any_depth() {
        let inner = MachineBuilder::new().start("a").states(["a"]).build().unwrap();
        let definition = MachineBuilder::new()
            .start("one")
            .composite("one", inner)
            .states(["two"])
            .build()
            .unwrap();

        let behavior = Behavior::new()
            .state("one", Behavior::new().state("zzz", Behavior::new()))
            .state("two", Behavior::new().state("deeper", Behavior::new()))
            .state("three", Behavior::new());

        let errors = behavior.validate_against(&definition);
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&GraphError::UnknownBehaviorState("zzz".to_string())));
        assert!(errors.contains(&GraphError::UnknownBehaviorState("two.deeper".to_string())));
        assert!(errors.contains(&GraphError::UnknownBehaviorState("three".to_string())));
    }
}
