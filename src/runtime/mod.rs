//! Live state instances.
//!
//! Definitions from [`crate::builder`] are instantiated into [`Machine`]s
//! and [`LeafState`]s. Children are created fresh on every entry and
//! dropped on exit; only the definitions are shared.

pub mod factory;
pub mod leaf;
pub mod machine;
pub mod node;
pub(crate) mod protocol;

pub use factory::MachineFactory;
pub use leaf::LeafState;
pub use machine::Machine;
pub use node::StateNode;
