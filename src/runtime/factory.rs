//! Templates for creating independent machine instances.

use crate::builder::{Behavior, InvalidDefinition, MachineDefinition};
use crate::core::MachineError;
use crate::runtime::machine::Machine;
use std::collections::HashSet;
use std::rc::Rc;

/// Creates fresh [`Machine`]s from one shared definition.
///
/// Every instance has its own channels, history and children; nothing is
/// shared between instances except the immutable definition. Composite
/// states hold a factory and instantiate a new child machine every time
/// they are entered.
#[derive(Clone, Debug)]
pub struct MachineFactory {
    definition: Rc<MachineDefinition>,
    behavior: Option<Rc<Behavior>>,
}

impl MachineFactory {
    pub fn new(definition: MachineDefinition) -> Self {
        Self {
            definition: Rc::new(definition),
            behavior: None,
        }
    }

    /// Default behavior for instances created without overrides.
    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = Some(Rc::new(behavior));
        self
    }

    pub fn definition(&self) -> &MachineDefinition {
        &self.definition
    }

    /// Create a top-level instance named `"root"`.
    ///
    /// `behavior` replaces the factory default. With a `parent`, events of
    /// the parent chain become reachable from the new machine, but it is
    /// not placed in any of the parent's slots.
    pub fn create(
        &self,
        behavior: Option<Behavior>,
        parent: Option<&Machine>,
    ) -> Result<Machine, MachineError> {
        self.create_named("root", behavior, parent)
    }

    pub fn create_named(
        &self,
        name: &str,
        behavior: Option<Behavior>,
        parent: Option<&Machine>,
    ) -> Result<Machine, MachineError> {
        let behavior = behavior.map(Rc::new).or_else(|| self.behavior.clone());
        let inherited = parent
            .map(Machine::inherited_events)
            .unwrap_or_else(HashSet::new);

        let mut errors = self.definition.unreachable_events(&inherited);
        if let Some(behavior) = &behavior {
            errors.extend(behavior.validate_against(&self.definition));
        }
        if !errors.is_empty() {
            return Err(InvalidDefinition(errors).into());
        }

        Ok(Machine::instantiate(
            name,
            Rc::clone(&self.definition),
            behavior,
            parent,
        ))
    }

    /// Instance for the composite slot `name` of `parent`. Event scoping
    /// was checked when the root was created.
    pub(crate) fn instantiate(
        &self,
        name: &str,
        behavior: Option<Rc<Behavior>>,
        parent: &Machine,
    ) -> Result<Machine, MachineError> {
        let behavior = behavior.or_else(|| self.behavior.clone());
        if let Some(behavior) = &behavior {
            let errors = behavior.validate_against(&self.definition);
            if !errors.is_empty() {
                return Err(InvalidDefinition(errors).into());
            }
        }
        Ok(Machine::instantiate(
            name,
            Rc::clone(&self.definition),
            behavior,
            Some(parent),
        ))
    }
}
