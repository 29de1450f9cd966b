//! Definition values and the builders that validate them.
//!
//! A state graph is a tree of [`StateDefinition`]s: leaves, or composites
//! holding their own children, events and transition rules. Builders check
//! the graph eagerly and report every problem at once as an
//! [`InvalidDefinition`].

pub mod behavior;
pub mod error;
pub mod machine;
pub mod macros;
pub mod state;
pub mod transition;

pub use behavior::Behavior;
pub use error::{GraphError, InvalidDefinition};
pub use machine::{EventHandler, MachineBuilder, MachineDefinition, StateDefinition, StateEntry};
pub use state::{LeafBuilder, LeafDefinition};
pub use transition::{TransitionBuilder, TransitionRule};

use crate::core::{ErrorContext, HookResult};
use crate::runtime::{Machine, StateNode};
use serde_json::Value;
use std::rc::Rc;

/// Lifecycle hook: receives the state it belongs to and the payload of the
/// operation that triggered it.
pub type Hook = Rc<dyn Fn(&StateNode, &Value) -> HookResult>;

/// Event handler declared on a composite definition.
pub type Handler = Rc<dyn Fn(&Machine, &Value) -> HookResult>;

/// Error handler declared on a composite definition.
pub type ErrorHook = Rc<dyn Fn(&Machine, &ErrorContext) -> HookResult>;
