//! Core primitives shared by definitions and the runtime:
//! - `Channel`, the synchronous multicast event primitive
//! - `MachineError`, `Outcome` and `ErrorContext`
//! - `Guard` predicates
//! - Transition records and history

mod channel;
mod error;
mod guard;
mod history;

pub use channel::{Channel, Observer, Subscription};
pub use error::{ErrorContext, HookResult, MachineError, Outcome};
pub use guard::Guard;
pub use history::{StateHistory, TransitionRecord};
