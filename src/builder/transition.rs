//! Transition rules: `event (+ optional from) -> to`.

use crate::builder::error::GraphError;

/// Declarative mapping from an event to a target sibling state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionRule {
    pub event: String,
    pub from: Option<String>,
    pub to: String,
    pub allow_self_transition: bool,
}

impl TransitionRule {
    /// Whether this rule is a candidate for `event` while `current` is the
    /// active child.
    pub fn applies_to(&self, event: &str, current: Option<&str>) -> bool {
        if self.event != event {
            return false;
        }
        match &self.from {
            Some(from) => current == Some(from.as_str()),
            None => true,
        }
    }

    /// Whether firing this rule may exit and re-enter the current state.
    ///
    /// An explicit `from` shows the self-transition is intended.
    pub fn permits_self_transition(&self) -> bool {
        self.from.is_some() || self.allow_self_transition
    }

    /// Pick the rule that handles `event` from `current`.
    ///
    /// Rules with a matching `from` win over rules without one; among equally
    /// specific rules the earliest declared wins.
    pub fn select<'a>(
        rules: &'a [TransitionRule],
        event: &str,
        current: Option<&str>,
    ) -> Option<&'a TransitionRule> {
        let candidates = || rules.iter().filter(|r| r.applies_to(event, current));
        candidates()
            .find(|r| r.from.is_some())
            .or_else(|| candidates().find(|r| r.from.is_none()))
    }
}

/// Builder for constructing transition rules with a fluent API.
///
/// # Example
///
/// ```rust
/// use stratum::builder::TransitionBuilder;
///
/// let rule = TransitionBuilder::new()
///     .on("next")
///     .from("a")
///     .to("b")
///     .build()
///     .unwrap();
///
/// assert!(rule.applies_to("next", Some("a")));
/// assert!(!rule.applies_to("next", Some("b")));
/// ```
#[derive(Clone, Debug, Default)]
pub struct TransitionBuilder {
    event: Option<String>,
    from: Option<String>,
    to: Option<String>,
    allow_self_transition: bool,
}

impl TransitionBuilder {
    /// Create a new transition builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the triggering event (required).
    pub fn on(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Restrict the rule to one source state (optional).
    pub fn from(mut self, state: impl Into<String>) -> Self {
        self.from = Some(state.into());
        self
    }

    /// Set the target state (required).
    pub fn to(mut self, state: impl Into<String>) -> Self {
        self.to = Some(state.into());
        self
    }

    /// Let the rule exit and re-enter the current state when it already is
    /// the target.
    pub fn allow_self_transition(mut self) -> Self {
        self.allow_self_transition = true;
        self
    }

    /// Build the rule.
    pub fn build(self) -> Result<TransitionRule, GraphError> {
        let context = format!(
            "Transition on `{}`",
            self.event.as_deref().unwrap_or("<unnamed>")
        );
        let event = self.event.ok_or_else(|| GraphError::MissingField {
            context: context.clone(),
            field: "event",
        })?;
        let to = self.to.ok_or(GraphError::MissingField {
            context,
            field: "to",
        })?;

        Ok(TransitionRule {
            event,
            from: self.from,
            to,
            allow_self_transition: self.allow_self_transition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(event: &str, from: Option<&str>, to: &str) -> TransitionRule {
        let builder = TransitionBuilder::new().on(event).to(to);
        match from {
            Some(from) => builder.from(from),
            None => builder,
        }
        .build()
        .unwrap()
    }

    #[test]
    fn builder_validates_required_fields() {
        let missing_to = TransitionBuilder::new().on("next").build();
        assert!(matches!(
            missing_to,
            Err(GraphError::MissingField { field: "to", .. })
        ));

        let missing_event = TransitionBuilder::new().to("b").build();
        assert!(matches!(
            missing_event,
            Err(GraphError::MissingField { field: "event", .. })
        ));
    }

    #[test]
    fn rule_without_from_applies_anywhere() {
        let r = rule("reset", None, "a");
        assert!(r.applies_to("reset", Some("b")));
        assert!(r.applies_to("reset", None));
        assert!(!r.applies_to("next", Some("b")));
    }

    #[test]
    fn specific_rules_win_over_generic_ones() {
        let rules = vec![
            rule("go", None, "generic"),
            rule("go", Some("a"), "specific"),
        ];

        let chosen = TransitionRule::select(&rules, "go", Some("a")).unwrap();
        assert_eq!(chosen.to, "specific");

        let fallback = TransitionRule::select(&rules, "go", Some("b")).unwrap();
        assert_eq!(fallback.to, "generic");
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let rules = vec![
            rule("go", Some("a"), "first"),
            rule("go", Some("a"), "second"),
        ];

        let chosen = TransitionRule::select(&rules, "go", Some("a")).unwrap();
        assert_eq!(chosen.to, "first");
    }

    #[test]
    fn self_transition_needs_explicit_intent() {
        assert!(!rule("go", None, "a").permits_self_transition());
        assert!(rule("go", Some("a"), "a").permits_self_transition());

        let flagged = TransitionBuilder::new()
            .on("go")
            .to("a")
            .allow_self_transition()
            .build()
            .unwrap();
        assert!(flagged.permits_self_transition());
    }
}
