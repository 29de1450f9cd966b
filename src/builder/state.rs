//! Leaf state definitions.

use crate::builder::Hook;
use crate::core::{Guard, HookResult};
use crate::runtime::StateNode;
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

/// Guards and hooks shared by leaf and composite definitions.
#[derive(Clone, Default)]
pub(crate) struct Lifecycle {
    pub(crate) can_enter: Option<Guard>,
    pub(crate) can_exit: Option<Guard>,
    pub(crate) on_enter: Option<Hook>,
    pub(crate) on_exit: Option<Hook>,
}

impl Lifecycle {
    pub(crate) fn allows_entry(&self, node: &StateNode) -> bool {
        self.can_enter.as_ref().is_none_or(|g| g.check(node))
    }

    pub(crate) fn allows_exit(&self, node: &StateNode) -> bool {
        self.can_exit.as_ref().is_none_or(|g| g.check(node))
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("can_enter", &self.can_enter.is_some())
            .field("can_exit", &self.can_exit.is_some())
            .field("on_enter", &self.on_enter.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .finish()
    }
}

/// Static definition of a state with no children.
#[derive(Clone, Debug, Default)]
pub struct LeafDefinition {
    pub(crate) lifecycle: Lifecycle,
    pub(crate) transition_on_events: Vec<(String, String)>,
}

impl LeafDefinition {
    /// `(event, target)` pairs wired while the state is entered.
    pub fn transition_on_events(&self) -> &[(String, String)] {
        &self.transition_on_events
    }
}

/// Builder for leaf states.
///
/// # Example
///
/// ```rust
/// use stratum::builder::LeafBuilder;
///
/// let waiting = LeafBuilder::new()
///     .on_enter(|_, _| Ok(()))
///     .transition_on("timeout", "expired")
///     .build();
///
/// assert_eq!(waiting.transition_on_events().len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct LeafBuilder {
    definition: LeafDefinition,
}

impl LeafBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Predicate consulted before the state may be entered.
    pub fn can_enter<F>(self, predicate: F) -> Self
    where
        F: Fn(&StateNode) -> bool + 'static,
    {
        self.can_enter_guard(Guard::new(predicate))
    }

    pub fn can_enter_guard(mut self, guard: Guard) -> Self {
        self.definition.lifecycle.can_enter = Some(guard);
        self
    }

    /// Predicate consulted before the state may be left.
    pub fn can_exit<F>(self, predicate: F) -> Self
    where
        F: Fn(&StateNode) -> bool + 'static,
    {
        self.can_exit_guard(Guard::new(predicate))
    }

    pub fn can_exit_guard(mut self, guard: Guard) -> Self {
        self.definition.lifecycle.can_exit = Some(guard);
        self
    }

    pub fn on_enter<F>(mut self, hook: F) -> Self
    where
        F: Fn(&StateNode, &Value) -> HookResult + 'static,
    {
        self.definition.lifecycle.on_enter = Some(Rc::new(hook));
        self
    }

    pub fn on_exit<F>(mut self, hook: F) -> Self
    where
        F: Fn(&StateNode, &Value) -> HookResult + 'static,
    {
        self.definition.lifecycle.on_exit = Some(Rc::new(hook));
        self
    }

    /// While entered, move the parent machine to `target` whenever `event`
    /// fires.
    pub fn transition_on(mut self, event: impl Into<String>, target: impl Into<String>) -> Self {
        self.definition
            .transition_on_events
            .push((event.into(), target.into()));
        self
    }

    pub fn build(self) -> LeafDefinition {
        self.definition
    }
}
