//! Composite state machine.
//!
//! A [`Machine`] owns the children of one composite state, its declared
//! event channels and its transition rules. Every entry, exit and
//! transition is processed through a [`Protocol`]: requests made from inside
//! hooks are queued and run in order after the current step, and a failure
//! anywhere in a step tears the machine down before it is reported.

use crate::builder::{Behavior, GraphError, Hook, MachineDefinition, StateDefinition, TransitionRule};
use crate::core::{
    Channel, ErrorContext, HookResult, MachineError, Outcome, StateHistory, TransitionRecord,
};
use crate::runtime::leaf::LeafState;
use crate::runtime::node::StateNode;
use crate::runtime::protocol::{PendingExit, Protocol, QueuedTransition};
use crate::runtime::MachineFactory;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};
use uuid::Uuid;

pub(crate) struct MachineInner {
    id: Uuid,
    name: String,
    definition: Rc<MachineDefinition>,
    behavior: Option<Rc<Behavior>>,
    parent: WeakMachine,
    events: HashMap<String, Channel<Value>>,
    private_events: HashMap<String, Channel<Value>>,
    enters: Channel<Value>,
    exits: Channel<Value>,
    transitions: Channel<TransitionRecord>,
    entered: Cell<bool>,
    current: RefCell<Option<String>>,
    active: RefCell<HashMap<String, StateNode>>,
    protocol: RefCell<Protocol>,
    private_access: Cell<usize>,
    history: RefCell<StateHistory>,
    failure: RefCell<Option<MachineError>>,
    data: RefCell<HashMap<String, Value>>,
}

/// Non-owning reference to a machine, held by children and channel wiring.
#[derive(Clone, Default)]
pub(crate) struct WeakMachine(Weak<MachineInner>);

impl WeakMachine {
    pub(crate) fn upgrade(&self) -> Option<Machine> {
        self.0.upgrade().map(|inner| Machine { inner })
    }
}

/// Grants access to a machine's private events until dropped.
pub(crate) struct PrivateScope {
    machine: Machine,
}

impl Drop for PrivateScope {
    fn drop(&mut self) {
        let access = &self.machine.inner.private_access;
        access.set(access.get().saturating_sub(1));
    }
}

/// An instantiated composite state.
///
/// `Machine` is a cheap handle; clones refer to the same instance. All
/// operations run to completion synchronously and may be called from
/// inside hooks.
///
/// # Example
///
/// ```rust
/// use stratum::builder::MachineBuilder;
/// use stratum::runtime::Machine;
/// use stratum::transitions;
/// use serde_json::Value;
///
/// let definition = MachineBuilder::new()
///     .start("a")
///     .states(["a", "b", "c"])
///     .event("next")
///     .transitions(transitions! {
///         "next": "a" => "b",
///         "next": "b" => "c",
///     })
///     .build()
///     .unwrap();
///
/// let machine = Machine::new(definition).unwrap();
/// machine.enter(Value::Null).unwrap();
/// assert_eq!(machine.current_state_name().as_deref(), Some("a"));
///
/// machine.fire_event("next", Value::Null).unwrap();
/// assert_eq!(machine.current_state_name().as_deref(), Some("b"));
///
/// machine.fire_event("next", Value::Null).unwrap();
/// assert_eq!(machine.current_state_name().as_deref(), Some("c"));
/// ```
#[derive(Clone)]
pub struct Machine {
    inner: Rc<MachineInner>,
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("name", &self.inner.name)
            .field("id", &self.inner.id)
            .field("entered", &self.inner.entered.get())
            .field("current", &self.inner.current.borrow())
            .finish()
    }
}

fn channels(names: &[String]) -> HashMap<String, Channel<Value>> {
    names
        .iter()
        .map(|name| (name.clone(), Channel::new()))
        .collect()
}

fn keep_first(outcome: &mut HookResult, next: HookResult) {
    if outcome.is_ok() {
        *outcome = next;
    }
}

impl Machine {
    /// Validate `definition` and create a root machine with no behavior
    /// overrides.
    pub fn new(definition: MachineDefinition) -> Result<Self, MachineError> {
        MachineFactory::new(definition).create(None, None)
    }

    pub(crate) fn instantiate(
        name: &str,
        definition: Rc<MachineDefinition>,
        behavior: Option<Rc<Behavior>>,
        parent: Option<&Machine>,
    ) -> Self {
        let history = definition
            .history_limit
            .map_or_else(StateHistory::new, StateHistory::with_limit);
        let inner = MachineInner {
            id: Uuid::new_v4(),
            name: name.to_string(),
            events: channels(&definition.events),
            private_events: channels(&definition.private_events),
            definition,
            behavior,
            parent: parent.map(Machine::downgrade).unwrap_or_default(),
            enters: Channel::new(),
            exits: Channel::new(),
            transitions: Channel::new(),
            entered: Cell::new(false),
            current: RefCell::new(None),
            active: RefCell::new(HashMap::new()),
            protocol: RefCell::new(Protocol::default()),
            private_access: Cell::new(0),
            history: RefCell::new(history),
            failure: RefCell::new(None),
            data: RefCell::new(HashMap::new()),
        };
        trace!(machine = %inner.name, id = %inner.id, "machine instantiated");
        Self {
            inner: Rc::new(inner),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakMachine {
        WeakMachine(Rc::downgrade(&self.inner))
    }

    /// Unique id of this activation.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Name of the slot this machine occupies in its parent (`"root"` for
    /// a top-level machine).
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The definition this machine was instantiated from.
    pub fn definition(&self) -> &MachineDefinition {
        &self.inner.definition
    }

    /// The machine whose child this is; `None` for a root machine.
    pub fn parent(&self) -> Option<Machine> {
        self.inner.parent.upgrade()
    }

    /// Whether this activation has been entered and not yet exited.
    pub fn is_entered(&self) -> bool {
        self.inner.entered.get()
    }

    /// Whether a transition is being processed right now.
    pub fn is_transitioning(&self) -> bool {
        self.inner.protocol.borrow().is_busy()
    }

    /// Name of the active child, if any.
    pub fn current_state_name(&self) -> Option<String> {
        self.inner.current.borrow().clone()
    }

    pub fn current_state(&self) -> Option<StateNode> {
        let name = self.current_state_name()?;
        self.active_child(&name)
    }

    /// Instantiated child in slot `name`, if it is active.
    pub fn active_child(&self, name: &str) -> Option<StateNode> {
        self.inner.active.borrow().get(name).cloned()
    }

    /// Names along the active path below this machine, outermost first.
    pub fn configuration(&self) -> Vec<String> {
        let mut path = Vec::new();
        self.configuration_into(&mut path);
        path
    }

    pub(crate) fn configuration_into(&self, path: &mut Vec<String>) {
        if let Some(node) = self.current_state() {
            node.configuration_into(path);
        }
    }

    /// Fires at the start of every entry, before any hook runs.
    pub fn enters(&self) -> Channel<Value> {
        self.inner.enters.clone()
    }

    /// Fires once an exit has fully completed. Scope subscriptions to it
    /// to release them when this machine exits.
    pub fn exits(&self) -> Channel<Value> {
        self.inner.exits.clone()
    }

    /// Every move between children, including the entry and exit records.
    pub fn transitions(&self) -> Channel<TransitionRecord> {
        self.inner.transitions.clone()
    }

    pub fn history(&self) -> StateHistory {
        self.inner.history.borrow().clone()
    }

    /// The failure that tore down the last activation, if it ended in one.
    pub fn failure(&self) -> Option<MachineError> {
        self.inner.failure.borrow().clone()
    }

    /// Activation-scoped value; cleared on exit.
    pub fn get_data(&self, key: &str) -> Option<Value> {
        self.inner.data.borrow().get(key).cloned()
    }

    pub fn set_data(&self, key: impl Into<String>, value: Value) {
        self.inner.data.borrow_mut().insert(key.into(), value);
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

    /// Whether private events are currently visible: true only while this
    /// machine's own hooks, handlers or leaf states are running.
    pub fn can_access_private_events(&self) -> bool {
        self.inner.private_access.get() > 0
    }

    pub(crate) fn private_scope(&self) -> PrivateScope {
        let access = &self.inner.private_access;
        access.set(access.get() + 1);
        PrivateScope {
            machine: self.clone(),
        }
    }

    /// Resolve an event channel: public events, then private events when
    /// permitted, then the parent's resolution.
    pub fn get_event(&self, name: &str) -> Option<Channel<Value>> {
        if let Some(channel) = self.inner.events.get(name) {
            return Some(channel.clone());
        }
        if self.can_access_private_events() {
            if let Some(channel) = self.inner.private_events.get(name) {
                return Some(channel.clone());
            }
        }
        self.get_parent_event(name)
    }

    pub fn get_parent_event(&self, name: &str) -> Option<Channel<Value>> {
        self.parent()?.get_event(name)
    }

    /// Publish `data` on the named channel. Returns `Ok(false)` if no
    /// reachable channel has that name.
    pub fn fire_event(&self, name: &str, data: Value) -> Result<bool, MachineError> {
        match self.get_event(name) {
            Some(channel) => {
                trace!(machine = %self.name(), event = name, "firing event");
                channel.publish(&data).map(|_| true)
            }
            None => {
                trace!(machine = %self.name(), event = name, "no channel for event");
                Ok(false)
            }
        }
    }

    /// Public events declared by this machine and its ancestors.
    pub(crate) fn inherited_events(&self) -> HashSet<String> {
        let mut events: HashSet<String> = self.inner.definition.events.iter().cloned().collect();
        if let Some(parent) = self.parent() {
            events.extend(parent.inherited_events());
        }
        events
    }

    /// Enter the machine and drive it into its start state.
    ///
    /// Entry hooks may redirect the initial move by calling
    /// [`transition`](Self::transition), or abort it by calling
    /// [`exit`](Self::exit). If entry fails the machine is left exited and
    /// the failure is returned.
    pub fn enter(&self, data: Value) -> Result<Outcome, MachineError> {
        if self.is_entered() || !self.inner.protocol.borrow_mut().begin() {
            return Ok(Outcome::Ignored);
        }
        self.inner.entered.set(true);
        *self.inner.failure.borrow_mut() = None;
        debug!(machine = %self.name(), id = %self.id(), "entering machine");

        match self.run_enter(&data) {
            Ok(()) => {
                let mut protocol = self.inner.protocol.borrow_mut();
                if !protocol.has_queued() && !protocol.has_pending_exit() {
                    protocol.enqueue(QueuedTransition {
                        target: self.inner.definition.start.clone(),
                        data,
                        allow_self: false,
                    });
                }
            }
            Err(err) => {
                warn!(machine = %self.name(), id = %self.id(), error = %err, "entry failed");
                self.inner.protocol.borrow_mut().fail(err);
            }
        }

        self.drain().map(|_| Outcome::Applied)
    }

    /// Exit the machine, its active descendants first.
    ///
    /// Called while a transition is being processed, the exit is deferred
    /// until the queue drains and `Outcome::Queued` is returned.
    pub fn exit(&self, data: Value) -> Result<Outcome, MachineError> {
        if !self.is_entered() {
            return Ok(Outcome::Ignored);
        }
        {
            let mut protocol = self.inner.protocol.borrow_mut();
            if protocol.is_busy() {
                trace!(machine = %self.name(), "exit deferred until transitions drain");
                protocol.defer_exit(data);
                return Ok(Outcome::Queued);
            }
            if protocol.is_exiting() {
                return Ok(Outcome::Ignored);
            }
        }
        self.exit_now(&data).map(|_| Outcome::Applied)
    }

    /// Move to child `target`.
    ///
    /// Requests made while another transition is being processed are queued
    /// and `Outcome::Queued` is returned. Otherwise this call processes the
    /// queue until it is empty. A failure while doing so exits the machine
    /// and is returned once the exit has completed.
    pub fn transition(&self, target: &str, data: Value) -> Result<Outcome, MachineError> {
        self.request(
            target.to_string(),
            data,
            self.inner.definition.allow_self_transitions,
        )
    }

    fn request(&self, target: String, data: Value, allow_self: bool) -> Result<Outcome, MachineError> {
        if !self.inner.definition.has_state(&target) {
            return Err(GraphError::UnknownState {
                context: format!("Transition in `{}`", self.name()),
                state: target,
            }
            .into());
        }
        if !self.is_entered() {
            trace!(machine = %self.name(), to = %target, "transition ignored, machine not entered");
            return Ok(Outcome::Ignored);
        }

        let request = QueuedTransition {
            target,
            data,
            allow_self,
        };
        {
            let mut protocol = self.inner.protocol.borrow_mut();
            if protocol.is_busy() {
                trace!(machine = %self.name(), to = %request.target, "transition queued");
                protocol.enqueue(request);
                return Ok(Outcome::Queued);
            }
            if !protocol.begin() {
                return Ok(Outcome::Ignored);
            }
            protocol.enqueue(request);
        }

        self.drain()
            .map(|moved| if moved { Outcome::Applied } else { Outcome::Ignored })
    }

    /// Process queued requests until the queue is empty or a failure aborts
    /// the run, then perform any pending exit. Returns whether any step
    /// moved the machine.
    fn drain(&self) -> Result<bool, MachineError> {
        let mut moved = false;
        loop {
            let next = self.inner.protocol.borrow_mut().next();
            let Some(request) = next else {
                break;
            };
            let settled = self.step(request).and_then(|step_moved| {
                // The child entered by this step may already have exited itself.
                self.prune_current()?;
                Ok(step_moved)
            });
            match settled {
                Ok(step_moved) => moved |= step_moved,
                Err(err) => self.recover(err),
            }
        }

        let pending = self.inner.protocol.borrow_mut().finish();
        let Some(PendingExit { data, failure }) = pending else {
            return Ok(moved);
        };
        if failure.is_some() {
            *self.inner.failure.borrow_mut() = failure.clone();
        }
        let exited = self.exit_now(&data);
        match failure {
            Some(err) => Err(err),
            None => exited.map(|_| true),
        }
    }

    fn step(&self, request: QueuedTransition) -> Result<bool, MachineError> {
        let QueuedTransition {
            target,
            data,
            allow_self,
        } = request;
        self.prune_current()?;
        let from = self.current_state_name();
        let is_self = from.as_deref() == Some(target.as_str());

        if is_self && !allow_self {
            trace!(machine = %self.name(), state = %target, "self-transition skipped");
            return Ok(false);
        }

        let current = from.as_deref().and_then(|name| self.active_child(name));
        if current.as_ref().is_some_and(|node| !node.can_exit()) {
            trace!(machine = %self.name(), from = ?from, to = %target, "exit guard rejected transition");
            return Ok(false);
        }

        let candidate = if is_self {
            None
        } else {
            Some(self.child_instance(&target)?)
        };
        let admitted = match (&candidate, &current) {
            (Some(node), _) => node.can_enter(),
            (None, Some(node)) => node.entry_guard_allows(),
            (None, None) => true,
        };
        if !admitted {
            trace!(machine = %self.name(), from = ?from, to = %target, "entry guard rejected transition");
            return Ok(false);
        }

        if let (Some(name), Some(node)) = (&from, &current) {
            let exited = node.exit(&data);
            self.inner.active.borrow_mut().remove(name);
            *self.inner.current.borrow_mut() = None;
            exited?;
        }

        let node = match candidate {
            Some(node) => node,
            None => self.child_instance(&target)?,
        };
        self.inner
            .active
            .borrow_mut()
            .insert(target.clone(), node.clone());
        *self.inner.current.borrow_mut() = Some(target.clone());

        debug!(machine = %self.name(), id = %self.id(), from = ?from, to = %target, "transition");
        self.record(TransitionRecord::new(from, Some(target)))?;
        node.enter(&data)?;
        Ok(true)
    }

    /// Offer a failed step to the error handler; unless it is handled, abort
    /// the run so the machine exits once unwinding is done.
    fn recover(&self, err: MachineError) {
        if let Err(record_err) = self.prune_current() {
            warn!(machine = %self.name(), error = %record_err, "failed to record pruned child");
        }
        warn!(machine = %self.name(), id = %self.id(), error = %err, "transition failed");

        if let Some(on_error) = self.inner.definition.on_error.clone() {
            let ctx = ErrorContext::new(err.clone());
            let handled = {
                let _scope = self.private_scope();
                on_error(self, &ctx)
            };
            match handled {
                Err(handler_err) => {
                    self.inner.protocol.borrow_mut().fail(handler_err);
                    return;
                }
                Ok(()) if ctx.is_handled() => {
                    debug!(machine = %self.name(), "failure handled");
                    return;
                }
                Ok(()) => {}
            }
        }
        self.inner.protocol.borrow_mut().fail(err);
    }

    /// Forget the current child if it is no longer entered, recording it
    /// as a move from that child to none.
    fn prune_current(&self) -> HookResult {
        let Some(name) = self.current_state_name() else {
            return Ok(());
        };
        if self.active_child(&name).is_some_and(|node| node.is_entered()) {
            return Ok(());
        }
        self.inner.active.borrow_mut().remove(&name);
        *self.inner.current.borrow_mut() = None;
        trace!(machine = %self.name(), child = %name, "pruned exited child");
        self.record(TransitionRecord::new(Some(name), None))
    }

    /// Called when the child machine in `slot` has published its exit. Exits
    /// the parent drives itself are settled by the step or exit in progress;
    /// anything else is the child leaving on its own, which clears the slot
    /// and offers its failure, if any, to this machine's error handling.
    fn child_exited(&self, slot: &str) -> HookResult {
        if self.current_state_name().as_deref() != Some(slot) {
            return Ok(());
        }
        let Some(StateNode::Machine(child)) = self.active_child(slot) else {
            return Ok(());
        };
        if child.is_entered() || !self.inner.protocol.borrow_mut().begin() {
            return Ok(());
        }
        debug!(machine = %self.name(), id = %self.id(), child = slot, "child machine exited on its own");

        if let Err(err) = self.prune_current() {
            self.recover(err);
        }
        if let Some(err) = child.failure() {
            self.recover(err);
        }
        self.drain().map(|_| ())
    }

    fn exit_now(&self, data: &Value) -> HookResult {
        self.inner.entered.set(false);
        self.inner.protocol.borrow_mut().begin_exit();
        debug!(machine = %self.name(), id = %self.id(), "exiting machine");

        let from = self.current_state_name();
        let mut outcome = self.record(TransitionRecord::new(from.clone(), None));

        let children: Vec<StateNode> = {
            let mut active = self.inner.active.borrow_mut();
            let current = from.as_deref().and_then(|name| active.remove(name));
            let rest: Vec<StateNode> = active.drain().map(|(_, node)| node).collect();
            current.into_iter().chain(rest).collect()
        };
        for child in children {
            keep_first(&mut outcome, child.exit(data));
        }
        *self.inner.current.borrow_mut() = None;

        let behavior = self.inner.behavior.as_deref();
        keep_first(
            &mut outcome,
            self.run_hooks(
                [
                    behavior.and_then(|b| b.before_exit.as_ref()),
                    self.inner.definition.lifecycle.on_exit.as_ref(),
                    behavior.and_then(|b| b.after_exit.as_ref()),
                ],
                data,
            ),
        );
        keep_first(&mut outcome, self.inner.exits.publish_all(data));

        self.inner.data.borrow_mut().clear();
        self.inner.protocol.borrow_mut().end_exit();
        outcome
    }

    fn run_enter(&self, data: &Value) -> HookResult {
        self.inner.enters.publish(data)?;
        let behavior = self.inner.behavior.as_deref();
        self.run_hooks(
            [
                behavior.and_then(|b| b.before_enter.as_ref()),
                self.inner.definition.lifecycle.on_enter.as_ref(),
                behavior.and_then(|b| b.after_enter.as_ref()),
            ],
            data,
        )?;
        self.install_rules()?;
        self.install_handlers()
    }

    fn run_hooks(&self, hooks: [Option<&Hook>; 3], data: &Value) -> HookResult {
        let node = self.node();
        let _scope = self.private_scope();
        for hook in hooks.into_iter().flatten() {
            hook(&node, data)?;
        }
        Ok(())
    }

    fn require_event(&self, event: &str, context: impl FnOnce() -> String) -> Result<Channel<Value>, MachineError> {
        self.get_event(event).ok_or_else(|| {
            GraphError::UnknownEvent {
                context: context(),
                event: event.to_string(),
            }
            .into()
        })
    }

    /// One dispatcher per distinct rule event, live until this activation
    /// exits.
    fn install_rules(&self) -> HookResult {
        let _scope = self.private_scope();
        let mut wired: Vec<&str> = Vec::new();
        for rule in &self.inner.definition.transitions {
            if wired.contains(&rule.event.as_str()) {
                continue;
            }
            wired.push(&rule.event);

            let channel = self.require_event(&rule.event, || format!("Transition to `{}`", rule.to))?;
            let machine = self.downgrade();
            let event = rule.event.clone();
            channel.subscribe_until(&self.inner.exits, move |data| match machine.upgrade() {
                Some(machine) => machine.dispatch(&event, data),
                None => Ok(()),
            });
        }
        Ok(())
    }

    fn dispatch(&self, event: &str, data: &Value) -> HookResult {
        let current = self.current_state_name();
        let Some(rule) =
            TransitionRule::select(&self.inner.definition.transitions, event, current.as_deref())
        else {
            trace!(machine = %self.name(), event, current = ?current, "no rule matches");
            return Ok(());
        };
        let allow_self =
            rule.permits_self_transition() || self.inner.definition.allow_self_transitions;
        self.request(rule.to.clone(), data.clone(), allow_self)
            .map(|_| ())
    }

    fn install_handlers(&self) -> HookResult {
        let _scope = self.private_scope();
        for handler in &self.inner.definition.handlers {
            let channel = self.require_event(&handler.event, || "Event handler".to_string())?;
            let machine = self.downgrade();
            let handler = handler.clone();
            channel.subscribe_until(&self.inner.exits, move |data| {
                let Some(machine) = machine.upgrade() else {
                    return Ok(());
                };
                if let Some(state) = &handler.state {
                    if machine.current_state_name().as_deref() != Some(state.as_str()) {
                        return Ok(());
                    }
                }
                let _scope = machine.private_scope();
                (handler.handler)(&machine, data)
            });
        }
        Ok(())
    }

    fn child_instance(&self, name: &str) -> Result<StateNode, MachineError> {
        if let Some(node) = self.active_child(name) {
            return Ok(node);
        }
        let behavior = self.inner.behavior.as_ref().and_then(|b| b.child(name));
        match self.inner.definition.state(name) {
            Some(StateDefinition::Leaf(leaf)) => Ok(StateNode::Leaf(LeafState::new(
                name.to_string(),
                Rc::clone(leaf),
                behavior,
                self.downgrade(),
            ))),
            Some(StateDefinition::Composite(factory)) => {
                let child = factory.instantiate(name, behavior, self)?;
                let parent = self.downgrade();
                let slot = name.to_string();
                child.exits().subscribe(move |_| match parent.upgrade() {
                    Some(parent) => parent.child_exited(&slot),
                    None => Ok(()),
                });
                Ok(StateNode::Machine(child))
            }
            None => Err(GraphError::UnknownState {
                context: format!("Machine `{}`", self.name()),
                state: name.to_string(),
            }
            .into()),
        }
    }

    fn record(&self, record: TransitionRecord) -> HookResult {
        self.inner.history.borrow_mut().push(record.clone());
        self.inner.transitions.publish(&record)
    }

    fn node(&self) -> StateNode {
        StateNode::Machine(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{LeafBuilder, MachineBuilder, TransitionBuilder};
    use crate::transitions;

    fn abc() -> MachineDefinition {
        MachineBuilder::new()
            .start("a")
            .states(["a", "b", "c"])
            .event("next")
            .transitions(transitions! {
                "next": "a" => "b",
                "next": "b" => "c",
            })
            .build()
            .unwrap()
    }

    fn record_log(machine: &Machine) -> Rc<RefCell<Vec<(Option<String>, Option<String>)>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        machine.transitions().subscribe(move |record: &TransitionRecord| {
            sink.borrow_mut().push((record.from.clone(), record.to.clone()));
            Ok(())
        });
        log
    }

    fn names(pairs: &[(Option<&str>, Option<&str>)]) -> Vec<(Option<String>, Option<String>)> {
        pairs
            .iter()
            .map(|(from, to)| (from.map(String::from), to.map(String::from)))
            .collect()
    }

    #[test]
    fn enter_drives_into_start_state() {
        let machine = Machine::new(abc()).unwrap();

        assert_eq!(machine.enter(Value::Null).unwrap(), Outcome::Applied);
        assert!(machine.is_entered());
        assert_eq!(machine.current_state_name().as_deref(), Some("a"));
        assert_eq!(machine.enter(Value::Null).unwrap(), Outcome::Ignored);
    }

    #[test]
    fn exit_on_never_entered_machine_is_noop() {
        let machine = Machine::new(abc()).unwrap();
        let log = record_log(&machine);
        let exits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&exits);
        machine.exits().subscribe(move |_| {
            counter.set(counter.get() + 1);
            Ok(())
        });

        assert_eq!(machine.exit(Value::Null).unwrap(), Outcome::Ignored);
        assert!(log.borrow().is_empty());
        assert_eq!(exits.get(), 0);
    }

    #[test]
    fn entry_and_exit_publish_hierarchical_records() {
        let machine = Machine::new(abc()).unwrap();
        let log = record_log(&machine);

        machine.enter(Value::Null).unwrap();
        machine.fire_event("next", Value::Null).unwrap();
        machine.exit(Value::Null).unwrap();

        assert_eq!(
            *log.borrow(),
            names(&[(None, Some("a")), (Some("a"), Some("b")), (Some("b"), None)])
        );
        assert_eq!(machine.history().get_path(), vec!["a", "b"]);
        assert_eq!(machine.current_state_name(), None);
    }

    #[test]
    fn history_limit_drops_oldest_records() {
        let definition = MachineBuilder::new()
            .start("a")
            .states(["a", "b", "c"])
            .event("next")
            .transitions(transitions! {
                "next": "a" => "b",
                "next": "b" => "c",
            })
            .history_limit(2)
            .build()
            .unwrap();
        let machine = Machine::new(definition).unwrap();
        let log = record_log(&machine);

        machine.enter(Value::Null).unwrap();
        machine.fire_event("next", Value::Null).unwrap();
        machine.fire_event("next", Value::Null).unwrap();

        let history = machine.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history.limit(), Some(2));
        assert_eq!(history.get_path(), vec!["a", "b", "c"]);
        // Observers still see every record.
        assert_eq!(log.borrow().len(), 3);
    }

    #[test]
    fn transition_to_unknown_state_is_graph_error() {
        let machine = Machine::new(abc()).unwrap();
        machine.enter(Value::Null).unwrap();

        let err = machine.transition("zzz", Value::Null).unwrap_err();

        assert!(err.is_graph_error());
        assert!(machine.is_entered());
        assert_eq!(machine.current_state_name().as_deref(), Some("a"));
    }

    #[test]
    fn transition_before_enter_is_ignored() {
        let machine = Machine::new(abc()).unwrap();
        assert_eq!(machine.transition("b", Value::Null).unwrap(), Outcome::Ignored);
        assert_eq!(machine.current_state_name(), None);
    }

    #[test]
    fn fire_event_reports_unknown_names() {
        let machine = Machine::new(abc()).unwrap();
        machine.enter(Value::Null).unwrap();

        assert!(!machine.fire_event("nope", Value::Null).unwrap());
        assert!(machine.fire_event("next", Value::Null).unwrap());
    }

    #[test]
    fn self_transition_needs_permission() {
        let entries = Rc::new(Cell::new(0));
        let counter = Rc::clone(&entries);
        let definition = MachineBuilder::new()
            .start("a")
            .state(
                "a",
                LeafBuilder::new().on_enter(move |_, _| {
                    counter.set(counter.get() + 1);
                    Ok(())
                }),
            )
            .event("again")
            .event("again_explicit")
            .transition(TransitionBuilder::new().on("again").to("a"))
            .transition(TransitionBuilder::new().on("again_explicit").from("a").to("a"))
            .build()
            .unwrap();
        let machine = Machine::new(definition).unwrap();
        machine.enter(Value::Null).unwrap();
        assert_eq!(entries.get(), 1);

        machine.fire_event("again", Value::Null).unwrap();
        assert_eq!(entries.get(), 1);

        machine.fire_event("again_explicit", Value::Null).unwrap();
        assert_eq!(entries.get(), 2);
        assert_eq!(machine.current_state_name().as_deref(), Some("a"));
    }

    #[test]
    fn direct_self_transition_follows_machine_setting() {
        let strict = Machine::new(abc()).unwrap();
        strict.enter(Value::Null).unwrap();
        assert_eq!(strict.transition("a", Value::Null).unwrap(), Outcome::Ignored);

        let relaxed_definition = MachineBuilder::new()
            .start("a")
            .states(["a"])
            .allow_self_transitions(true)
            .build()
            .unwrap();
        let relaxed = Machine::new(relaxed_definition).unwrap();
        relaxed.enter(Value::Null).unwrap();
        assert_eq!(relaxed.transition("a", Value::Null).unwrap(), Outcome::Applied);
    }

    #[test]
    fn exit_guard_blocks_transition_without_side_effects() {
        let definition = MachineBuilder::new()
            .start("a")
            .state("a", LeafBuilder::new().can_exit(|_| false))
            .states(["b"])
            .build()
            .unwrap();
        let machine = Machine::new(definition).unwrap();
        let log = record_log(&machine);
        machine.enter(Value::Null).unwrap();

        assert_eq!(machine.transition("b", Value::Null).unwrap(), Outcome::Ignored);
        assert_eq!(machine.current_state_name().as_deref(), Some("a"));
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn exit_tears_down_vetoing_children() {
        let definition = MachineBuilder::new()
            .start("a")
            .state("a", LeafBuilder::new().can_exit(|_| false))
            .build()
            .unwrap();
        let machine = Machine::new(definition).unwrap();
        machine.enter(Value::Null).unwrap();
        let child = machine.current_state().unwrap();

        machine.exit(Value::Null).unwrap();

        assert!(!child.is_entered());
        assert!(machine.active_child("a").is_none());
    }

    #[test]
    fn private_events_are_hidden_from_outside() {
        let definition = MachineBuilder::new()
            .start("a")
            .states(["a", "b"])
            .private_event("internal")
            .transition(TransitionBuilder::new().on("internal").to("b"))
            .build()
            .unwrap();
        let machine = Machine::new(definition).unwrap();
        machine.enter(Value::Null).unwrap();

        assert!(machine.get_event("internal").is_none());
        assert!(!machine.fire_event("internal", Value::Null).unwrap());
        assert_eq!(machine.current_state_name().as_deref(), Some("a"));
    }

    #[test]
    fn handlers_may_fire_private_events() {
        let definition = MachineBuilder::new()
            .start("a")
            .states(["a", "b"])
            .event("poke")
            .private_event("internal")
            .transition(TransitionBuilder::new().on("internal").to("b"))
            .on_event("poke", |machine, data| {
                assert!(machine.can_access_private_events());
                machine.fire_event("internal", data.clone()).map(|_| ())
            })
            .build()
            .unwrap();
        let machine = Machine::new(definition).unwrap();
        machine.enter(Value::Null).unwrap();

        machine.fire_event("poke", Value::Null).unwrap();

        assert_eq!(machine.current_state_name().as_deref(), Some("b"));
        assert!(!machine.can_access_private_events());
    }

    #[test]
    fn state_scoped_handler_only_runs_in_that_state() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let definition = MachineBuilder::new()
            .start("a")
            .states(["a", "b"])
            .event("ping")
            .on_event_in("ping", "b", move |_, _| {
                counter.set(counter.get() + 1);
                Ok(())
            })
            .build()
            .unwrap();
        let machine = Machine::new(definition).unwrap();
        machine.enter(Value::Null).unwrap();

        machine.fire_event("ping", Value::Null).unwrap();
        assert_eq!(calls.get(), 0);

        machine.transition("b", Value::Null).unwrap();
        machine.fire_event("ping", Value::Null).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn wiring_is_released_on_exit() {
        let machine = Machine::new(abc()).unwrap();
        let next = machine.get_event("next").unwrap();

        machine.enter(Value::Null).unwrap();
        assert_eq!(next.observer_count(), 1);

        machine.exit(Value::Null).unwrap();
        assert_eq!(next.observer_count(), 0);
        assert_eq!(machine.exits().observer_count(), 0);
    }

    #[test]
    fn reentering_rebuilds_children() {
        let machine = Machine::new(abc()).unwrap();
        machine.enter(Value::Null).unwrap();
        let first = machine.current_state().unwrap();
        first.set_data("seen", Value::Bool(true));

        machine.exit(Value::Null).unwrap();
        machine.enter(Value::Null).unwrap();

        let second = machine.current_state().unwrap();
        assert_eq!(second.get_data("seen"), None);
        assert_eq!(machine.current_state_name().as_deref(), Some("a"));
    }

    #[test]
    fn configuration_follows_nested_path() {
        let inner = MachineBuilder::new().start("x").states(["x"]).build().unwrap();
        let definition = MachineBuilder::new()
            .start("one")
            .composite("one", inner)
            .build()
            .unwrap();
        let machine = Machine::new(definition).unwrap();

        assert!(machine.configuration().is_empty());
        machine.enter(Value::Null).unwrap();
        assert_eq!(machine.configuration(), vec!["one", "x"]);
    }
}
