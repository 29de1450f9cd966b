//! Graph errors for malformed machine definitions.

use thiserror::Error;

/// A single problem with a state graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Start state not specified. Call .start(name) before .build()")]
    MissingStart,

    #[error("Start state `{0}` is not one of the declared states")]
    UnknownStart(String),

    #[error("State `{0}` is declared more than once")]
    DuplicateState(String),

    #[error("Event `{0}` is declared more than once")]
    DuplicateEvent(String),

    #[error("{context} names unknown state `{state}`")]
    UnknownState { context: String, state: String },

    #[error("{context} names unknown event `{event}`")]
    UnknownEvent { context: String, event: String },

    #[error("{context} is missing required field `{field}`")]
    MissingField {
        context: String,
        field: &'static str,
    },

    #[error("Behavior override names unknown state `{0}`")]
    UnknownBehaviorState(String),
}

/// Every problem found while validating a definition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid machine definition: {}", join(.0))]
pub struct InvalidDefinition(pub Vec<GraphError>);

impl InvalidDefinition {
    pub fn errors(&self) -> &[GraphError] {
        &self.0
    }

    pub fn contains(&self, error: &GraphError) -> bool {
        self.0.contains(error)
    }
}

fn join(errors: &[GraphError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_definition_lists_every_error() {
        let err = InvalidDefinition(vec![
            GraphError::MissingStart,
            GraphError::DuplicateState("a".to_string()),
        ]);

        let message = err.to_string();
        assert!(message.contains("Start state not specified"));
        assert!(message.contains("`a` is declared more than once"));
        assert!(err.contains(&GraphError::MissingStart));
    }
}
