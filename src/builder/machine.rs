//! Composite state definitions and their builder.

use crate::builder::error::{GraphError, InvalidDefinition};
use crate::builder::state::{LeafBuilder, LeafDefinition, Lifecycle};
use crate::builder::transition::{TransitionBuilder, TransitionRule};
use crate::builder::{ErrorHook, Handler, Hook};
use crate::core::{ErrorContext, Guard, HookResult};
use crate::runtime::{Machine, MachineFactory, StateNode};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Check = Validation<(), NonEmptyVec<GraphError>>;

fn check(ok: bool, error: impl FnOnce() -> GraphError) -> Check {
    if ok {
        Validation::success(())
    } else {
        Validation::fail(error())
    }
}

/// A child slot: either a plain leaf or a nested machine template.
#[derive(Clone, Debug)]
pub enum StateDefinition {
    Leaf(Rc<LeafDefinition>),
    Composite(MachineFactory),
}

impl StateDefinition {
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Composite(_))
    }
}

/// A named child definition, as accepted by [`MachineBuilder::states`].
///
/// Bare names become empty leaf states.
#[derive(Clone, Debug)]
pub struct StateEntry {
    name: String,
    definition: StateDefinition,
}

impl From<&str> for StateEntry {
    fn from(name: &str) -> Self {
        String::from(name).into()
    }
}

impl From<String> for StateEntry {
    fn from(name: String) -> Self {
        Self {
            name,
            definition: StateDefinition::Leaf(Rc::new(LeafDefinition::default())),
        }
    }
}

impl From<(&str, LeafBuilder)> for StateEntry {
    fn from((name, leaf): (&str, LeafBuilder)) -> Self {
        Self {
            name: name.to_string(),
            definition: StateDefinition::Leaf(Rc::new(leaf.build())),
        }
    }
}

impl From<(&str, MachineDefinition)> for StateEntry {
    fn from((name, machine): (&str, MachineDefinition)) -> Self {
        Self {
            name: name.to_string(),
            definition: StateDefinition::Composite(MachineFactory::new(machine)),
        }
    }
}

/// Handler invoked when an event fires, optionally only while a given child
/// is current.
#[derive(Clone)]
pub struct EventHandler {
    pub event: String,
    pub state: Option<String>,
    pub(crate) handler: Handler,
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("event", &self.event)
            .field("state", &self.state)
            .finish()
    }
}

/// Validated static definition of a composite state.
#[derive(Clone)]
pub struct MachineDefinition {
    pub(crate) start: String,
    pub(crate) states: Vec<(String, StateDefinition)>,
    pub(crate) events: Vec<String>,
    pub(crate) private_events: Vec<String>,
    pub(crate) transitions: Vec<TransitionRule>,
    pub(crate) handlers: Vec<EventHandler>,
    pub(crate) allow_self_transitions: bool,
    pub(crate) history_limit: Option<usize>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) on_error: Option<ErrorHook>,
}

impl MachineDefinition {
    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn state(&self, name: &str) -> Option<&StateDefinition> {
        self.states
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, definition)| definition)
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.state(name).is_some()
    }

    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.iter().map(|(name, _)| name.as_str())
    }

    pub fn events(&self) -> &[String] {
        &self.events
    }

    pub fn private_events(&self) -> &[String] {
        &self.private_events
    }

    pub fn transitions(&self) -> &[TransitionRule] {
        &self.transitions
    }

    pub fn handlers(&self) -> &[EventHandler] {
        &self.handlers
    }

    pub fn allows_self_transitions(&self) -> bool {
        self.allow_self_transitions
    }

    /// Most records an instance keeps in its history, if bounded.
    pub fn history_limit(&self) -> Option<usize> {
        self.history_limit
    }

    /// Event references in this subtree that resolve to no channel, given
    /// the public events `inherited` from ancestors.
    pub(crate) fn unreachable_events(&self, inherited: &HashSet<String>) -> Vec<GraphError> {
        let mut scope = inherited.clone();
        scope.extend(self.events.iter().cloned());
        let mut local = scope.clone();
        local.extend(self.private_events.iter().cloned());

        let mut errors = Vec::new();
        let mut require = |context: String, event: &str| {
            if !local.contains(event) {
                errors.push(GraphError::UnknownEvent {
                    context,
                    event: event.to_string(),
                });
            }
        };

        for rule in &self.transitions {
            require(format!("Transition to `{}`", rule.to), &rule.event);
        }
        for handler in &self.handlers {
            require("Event handler".to_string(), &handler.event);
        }
        for (name, definition) in &self.states {
            if let StateDefinition::Leaf(leaf) = definition {
                for (event, _) in &leaf.transition_on_events {
                    require(format!("State `{name}`"), event);
                }
            }
        }

        for (_, definition) in &self.states {
            if let StateDefinition::Composite(factory) = definition {
                errors.extend(factory.definition().unreachable_events(&scope));
            }
        }
        errors
    }
}

impl fmt::Debug for MachineDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineDefinition")
            .field("start", &self.start)
            .field("states", &self.state_names().collect::<Vec<_>>())
            .field("events", &self.events)
            .field("private_events", &self.private_events)
            .field("transitions", &self.transitions)
            .field("handlers", &self.handlers)
            .field("allow_self_transitions", &self.allow_self_transitions)
            .field("history_limit", &self.history_limit)
            .finish()
    }
}

/// Builder for composite state definitions.
///
/// # Example
///
/// ```rust
/// use stratum::builder::{MachineBuilder, TransitionBuilder};
///
/// let definition = MachineBuilder::new()
///     .start("a")
///     .states(["a", "b", "c"])
///     .event("next")
///     .transition(TransitionBuilder::new().on("next").from("a").to("b"))
///     .transition(TransitionBuilder::new().on("next").from("b").to("c"))
///     .build()
///     .unwrap();
///
/// assert_eq!(definition.start(), "a");
/// assert_eq!(definition.transitions().len(), 2);
/// ```
#[derive(Default)]
pub struct MachineBuilder {
    start: Option<String>,
    states: Vec<(String, StateDefinition)>,
    events: Vec<String>,
    private_events: Vec<String>,
    transitions: Vec<TransitionBuilder>,
    handlers: Vec<EventHandler>,
    allow_self_transitions: bool,
    history_limit: Option<usize>,
    lifecycle: Lifecycle,
    on_error: Option<ErrorHook>,
}

impl MachineBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the start state (required).
    pub fn start(mut self, name: impl Into<String>) -> Self {
        self.start = Some(name.into());
        self
    }

    /// Add a leaf state.
    pub fn state(mut self, name: impl Into<String>, leaf: LeafBuilder) -> Self {
        self.states
            .push((name.into(), StateDefinition::Leaf(Rc::new(leaf.build()))));
        self
    }

    /// Add a nested machine, instantiated each time the state is entered.
    pub fn composite(self, name: impl Into<String>, definition: MachineDefinition) -> Self {
        self.composite_factory(name, MachineFactory::new(definition))
    }

    /// Add a nested machine from a factory carrying its own default behavior.
    pub fn composite_factory(mut self, name: impl Into<String>, factory: MachineFactory) -> Self {
        self.states
            .push((name.into(), StateDefinition::Composite(factory)));
        self
    }

    /// Add several states at once; bare names become empty leaves.
    pub fn states<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StateEntry>,
    {
        self.states.extend(
            states
                .into_iter()
                .map(Into::into)
                .map(|entry| (entry.name, entry.definition)),
        );
        self
    }

    /// Declare a public event channel.
    pub fn event(mut self, name: impl Into<String>) -> Self {
        self.events.push(name.into());
        self
    }

    pub fn events<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declare an event channel visible only to this machine's own hooks,
    /// handlers and leaf states.
    pub fn private_event(mut self, name: impl Into<String>) -> Self {
        self.private_events.push(name.into());
        self
    }

    /// Add a transition rule. Its fields are validated in [`build`](Self::build).
    pub fn transition(mut self, rule: TransitionBuilder) -> Self {
        self.transitions.push(rule);
        self
    }

    pub fn transitions(mut self, rules: Vec<TransitionBuilder>) -> Self {
        self.transitions.extend(rules);
        self
    }

    /// Run `handler` whenever `event` fires while this machine is entered.
    pub fn on_event<F>(self, event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Machine, &Value) -> HookResult + 'static,
    {
        self.push_handler(event.into(), None, Rc::new(handler))
    }

    /// Run `handler` whenever `event` fires while `state` is the current child.
    pub fn on_event_in<F>(self, event: impl Into<String>, state: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Machine, &Value) -> HookResult + 'static,
    {
        self.push_handler(event.into(), Some(state.into()), Rc::new(handler))
    }

    fn push_handler(mut self, event: String, state: Option<String>, handler: Handler) -> Self {
        self.handlers.push(EventHandler {
            event,
            state,
            handler,
        });
        self
    }

    /// Allow direct `transition` calls to exit and re-enter the current state.
    pub fn allow_self_transitions(mut self, allow: bool) -> Self {
        self.allow_self_transitions = allow;
        self
    }

    /// Keep only the `limit` most recent transition records per instance.
    pub fn history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self
    }

    pub fn can_enter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&StateNode) -> bool + 'static,
    {
        self.lifecycle.can_enter = Some(Guard::new(predicate));
        self
    }

    pub fn can_exit<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&StateNode) -> bool + 'static,
    {
        self.lifecycle.can_exit = Some(Guard::new(predicate));
        self
    }

    pub fn on_enter<F>(mut self, hook: F) -> Self
    where
        F: Fn(&StateNode, &Value) -> HookResult + 'static,
    {
        self.lifecycle.on_enter = Some(Rc::new(hook) as Hook);
        self
    }

    pub fn on_exit<F>(mut self, hook: F) -> Self
    where
        F: Fn(&StateNode, &Value) -> HookResult + 'static,
    {
        self.lifecycle.on_exit = Some(Rc::new(hook) as Hook);
        self
    }

    /// Handler offered failures raised while this machine moves between
    /// its children. Calling `stop_propagation` keeps the machine entered.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Machine, &ErrorContext) -> HookResult + 'static,
    {
        self.on_error = Some(Rc::new(handler));
        self
    }

    /// Validate and build the definition, reporting every problem found.
    pub fn build(self) -> Result<MachineDefinition, InvalidDefinition> {
        let names: Vec<&str> = self.states.iter().map(|(name, _)| name.as_str()).collect();
        let known = |name: &str| names.contains(&name);
        let mut checks: Vec<Check> = Vec::new();

        checks.push(match &self.start {
            None => Validation::fail(GraphError::MissingStart),
            Some(start) => check(known(start), || GraphError::UnknownStart(start.clone())),
        });

        let mut seen = HashSet::new();
        for name in &names {
            checks.push(check(seen.insert(*name), || {
                GraphError::DuplicateState(name.to_string())
            }));
        }

        let mut seen = HashSet::new();
        for event in self.events.iter().chain(&self.private_events) {
            checks.push(check(seen.insert(event.as_str()), || {
                GraphError::DuplicateEvent(event.clone())
            }));
        }

        let mut rules = Vec::new();
        for builder in self.transitions {
            let rule = match builder.build() {
                Ok(rule) => rule,
                Err(error) => {
                    checks.push(Validation::fail(error));
                    continue;
                }
            };
            let context = format!("Transition on `{}`", rule.event);
            for state in std::iter::once(&rule.to).chain(&rule.from) {
                checks.push(check(known(state), || GraphError::UnknownState {
                    context: context.clone(),
                    state: state.clone(),
                }));
            }
            rules.push(rule);
        }

        for handler in &self.handlers {
            if let Some(state) = &handler.state {
                checks.push(check(known(state), || GraphError::UnknownState {
                    context: format!("Handler for `{}`", handler.event),
                    state: state.clone(),
                }));
            }
        }

        for (name, definition) in &self.states {
            if let StateDefinition::Leaf(leaf) = definition {
                for (event, target) in &leaf.transition_on_events {
                    checks.push(check(known(target), || GraphError::UnknownState {
                        context: format!("State `{name}` on `{event}`"),
                        state: target.clone(),
                    }));
                }
            }
        }

        match Validation::all_vec(checks).map(|_| ()) {
            Validation::Success(()) => Ok(MachineDefinition {
                start: self.start.unwrap_or_default(),
                states: self.states,
                events: self.events,
                private_events: self.private_events,
                transitions: rules,
                handlers: self.handlers,
                allow_self_transitions: self.allow_self_transitions,
                history_limit: self.history_limit,
                lifecycle: self.lifecycle,
                on_error: self.on_error,
            }),
            Validation::Failure(errors) => Err(InvalidDefinition(errors.iter().cloned().collect())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transitions;

    #[test]
    fn builder_requires_start() {
        let result = MachineBuilder::new().states(["a"]).build();

        let err = result.unwrap_err();
        assert_eq!(err.errors(), &[GraphError::MissingStart]);
    }

    #[test]
    fn start_must_name_a_state() {
        let err = MachineBuilder::new()
            .start("z")
            .states(["a"])
            .build()
            .unwrap_err();

        assert!(err.contains(&GraphError::UnknownStart("z".to_string())));
    }

    #[test]
    fn validation_accumulates_all_errors() {
        let err = MachineBuilder::new()
            .start("a")
            .states(["a", "a", "b"])
            .event("go")
            .private_event("go")
            .transition(TransitionBuilder::new().on("go").from("nowhere").to("b"))
            .transition(TransitionBuilder::new().on("go"))
            .state("c", LeafBuilder::new().transition_on("go", "missing"))
            .on_event_in("go", "ghost", |_, _| Ok(()))
            .build()
            .unwrap_err();

        assert_eq!(err.errors().len(), 6);
        assert!(err.contains(&GraphError::DuplicateState("a".to_string())));
        assert!(err.contains(&GraphError::DuplicateEvent("go".to_string())));
        assert!(err
            .errors()
            .iter()
            .any(|e| matches!(e, GraphError::MissingField { field: "to", .. })));
        assert!(err.errors().iter().any(
            |e| matches!(e, GraphError::UnknownState { state, .. } if state == "nowhere")
        ));
        assert!(err.errors().iter().any(
            |e| matches!(e, GraphError::UnknownState { state, .. } if state == "missing")
        ));
        assert!(err.errors().iter().any(
            |e| matches!(e, GraphError::UnknownState { state, .. } if state == "ghost")
        ));
    }

    #[test]
    fn states_accepts_mixed_entries() {
        let inner = MachineBuilder::new().start("x").states(["x"]).build().unwrap();
        let entries: Vec<StateEntry> = vec![
            "a".into(),
            ("b", LeafBuilder::new()).into(),
            ("c", inner).into(),
        ];

        let definition = MachineBuilder::new().start("a").states(entries).build().unwrap();

        assert_eq!(definition.state_names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert!(!definition.state("a").unwrap().is_composite());
        assert!(definition.state("c").unwrap().is_composite());
    }

    #[test]
    fn macro_rules_build() {
        let definition = MachineBuilder::new()
            .start("a")
            .states(["a", "b"])
            .event("next")
            .event("reset")
            .transitions(transitions! {
                "next": "a" => "b",
                "reset": * => "a",
            })
            .build()
            .unwrap();

        let rules = definition.transitions();
        assert_eq!(rules[0].from.as_deref(), Some("a"));
        assert_eq!(rules[1].from, None);
        assert_eq!(rules[1].to, "a");
    }

    #[test]
    fn unreachable_events_reports_missing_channels() {
        let inner = MachineBuilder::new()
            .start("x")
            .states(["x", "y"])
            .transition(TransitionBuilder::new().on("outer").to("y"))
            .transition(TransitionBuilder::new().on("secret").to("x"))
            .build()
            .unwrap();
        let definition = MachineBuilder::new()
            .start("one")
            .composite("one", inner)
            .event("outer")
            .private_event("secret")
            .build()
            .unwrap();

        let errors = definition.unreachable_events(&HashSet::new());

        assert_eq!(
            errors,
            vec![GraphError::UnknownEvent {
                context: "Transition to `x`".to_string(),
                event: "secret".to_string(),
            }]
        );
    }

    #[test]
    fn leaf_events_may_use_parent_private_channels() {
        let definition = MachineBuilder::new()
            .start("a")
            .state("a", LeafBuilder::new().transition_on("tick", "b"))
            .states(["b"])
            .private_event("tick")
            .build()
            .unwrap();

        assert!(definition.unreachable_events(&HashSet::new()).is_empty());
    }
}
