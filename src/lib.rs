//! Stratum: a hierarchical state machine runtime
//!
//! Stratum runs statecharts: machines whose states may themselves be
//! machines. Definitions are immutable values built and validated up front;
//! the runtime instantiates them into live [`Machine`]s that move between
//! children in response to events published on channels.
//!
//! # Core Concepts
//!
//! - **Definitions**: leaf states, composite machines and transition rules,
//!   built with [`MachineBuilder`] and validated eagerly
//! - **Channels**: synchronous multicast events; every subscription made by
//!   a state is released when that state exits
//! - **Protocol**: transitions requested from inside hooks are queued and
//!   run in order, never interleaved
//! - **Failures**: a failing hook exits the machine before the error
//!   reaches the caller, optionally offered to an `on_error` handler first
//!
//! # Example
//!
//! ```rust
//! use stratum::builder::{LeafBuilder, MachineBuilder};
//! use stratum::runtime::Machine;
//! use stratum::transitions;
//! use serde_json::Value;
//!
//! let door = MachineBuilder::new()
//!     .start("closed")
//!     .states(["closed", "open"])
//!     .events(["push", "pull"])
//!     .transitions(transitions! {
//!         "push": "closed" => "open",
//!         "pull": "open" => "closed",
//!     })
//!     .build()
//!     .unwrap();
//!
//! let house = MachineBuilder::new()
//!     .start("inside")
//!     .composite("inside", door)
//!     .state("outside", LeafBuilder::new())
//!     .build()
//!     .unwrap();
//!
//! let machine = Machine::new(house).unwrap();
//! machine.enter(Value::Null).unwrap();
//! assert_eq!(machine.configuration(), vec!["inside", "closed"]);
//!
//! let inside = machine.current_state().unwrap();
//! inside.fire_event("push", Value::Null).unwrap();
//! assert_eq!(machine.configuration(), vec!["inside", "open"]);
//!
//! machine.transition("outside", Value::Null).unwrap();
//! assert_eq!(machine.configuration(), vec!["outside"]);
//! ```

pub mod builder;
pub mod core;
pub mod runtime;
pub mod snapshot;

// Re-export commonly used types
pub use builder::{Behavior, LeafBuilder, MachineBuilder, MachineDefinition, TransitionBuilder};
pub use core::{Channel, ErrorContext, MachineError, Outcome, StateHistory, TransitionRecord};
pub use runtime::{LeafState, Machine, MachineFactory, StateNode};
pub use snapshot::Snapshot;
