//! Macros for ergonomic definition construction.

/// Declare transition rules compactly.
///
/// `"event": "from" => "to"` restricts a rule to one source state;
/// `"event": * => "to"` applies from any state.
///
/// # Example
///
/// ```
/// use stratum::transitions;
///
/// let rules = transitions! {
///     "next": "a" => "b",
///     "next": "b" => "c",
///     "reset": * => "a",
/// };
///
/// assert_eq!(rules.len(), 3);
/// ```
#[macro_export]
macro_rules! transitions {
    (@rule $event:literal, *, $to:literal) => {
        $crate::builder::TransitionBuilder::new().on($event).to($to)
    };
    (@rule $event:literal, $from:literal, $to:literal) => {
        $crate::builder::TransitionBuilder::new()
            .on($event)
            .from($from)
            .to($to)
    };
    (
        $( $event:literal : $from:tt => $to:literal ),* $(,)?
    ) => {
        vec![ $( $crate::transitions!(@rule $event, $from, $to) ),* ]
    };
}
