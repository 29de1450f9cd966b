//! Queue-driven transition protocol of a single machine.
//!
//! Transition and exit requests made while a machine is already moving
//! between children are not executed in place. They are recorded here and
//! picked up by the call that is driving the machine, once its current step
//! has finished.

use crate::core::MachineError;
use serde_json::Value;
use std::collections::VecDeque;

/// A transition request waiting to be processed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QueuedTransition {
    pub(crate) target: String,
    pub(crate) data: Value,
    pub(crate) allow_self: bool,
}

/// Exit requested while a transition was in flight.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingExit {
    pub(crate) data: Value,
    pub(crate) failure: Option<MachineError>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Phase {
    /// Nothing in flight; the next request drives the queue itself.
    Idle,
    /// A driver is processing the queue.
    Transitioning,
    /// A driver is processing the queue and the machine exits once it is
    /// done. With a failure recorded, nothing else is processed.
    PendingExit(PendingExit),
    /// Teardown in progress; requests are ignored.
    Exiting,
}

#[derive(Debug)]
pub(crate) struct Protocol {
    phase: Phase,
    queue: VecDeque<QueuedTransition>,
}

impl Default for Protocol {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            queue: VecDeque::new(),
        }
    }
}

impl Protocol {
    pub(crate) fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Whether a driver is currently processing the queue.
    pub(crate) fn is_busy(&self) -> bool {
        matches!(self.phase, Phase::Transitioning | Phase::PendingExit(_))
    }

    pub(crate) fn is_exiting(&self) -> bool {
        matches!(self.phase, Phase::Exiting)
    }

    /// Become the driver. Returns `false` if the machine is not idle.
    pub(crate) fn begin(&mut self) -> bool {
        if self.phase != Phase::Idle {
            return false;
        }
        self.phase = Phase::Transitioning;
        true
    }

    pub(crate) fn enqueue(&mut self, request: QueuedTransition) {
        self.queue.push_back(request);
    }

    pub(crate) fn has_queued(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Next request to process, unless a failure has aborted the run.
    pub(crate) fn next(&mut self) -> Option<QueuedTransition> {
        match &self.phase {
            Phase::PendingExit(PendingExit {
                failure: Some(_), ..
            }) => None,
            _ => self.queue.pop_front(),
        }
    }

    /// Record an exit to perform once the queue drains. The first request's
    /// payload is kept; a recorded failure is never replaced.
    pub(crate) fn defer_exit(&mut self, data: Value) {
        if self.phase == Phase::Transitioning {
            self.phase = Phase::PendingExit(PendingExit {
                data,
                failure: None,
            });
        }
    }

    /// Abort the run: drop remaining requests and exit with `failure`.
    pub(crate) fn fail(&mut self, failure: MachineError) {
        self.queue.clear();
        let data = serde_json::json!({ "error": failure.to_string() });
        self.phase = Phase::PendingExit(PendingExit {
            data,
            failure: Some(failure),
        });
    }

    /// Whether an exit (requested or failure-driven) is waiting.
    pub(crate) fn has_pending_exit(&self) -> bool {
        matches!(self.phase, Phase::PendingExit(_))
    }

    /// End the run and hand back any exit that must now be performed.
    pub(crate) fn finish(&mut self) -> Option<PendingExit> {
        self.queue.clear();
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::PendingExit(pending) => Some(pending),
            _ => None,
        }
    }

    pub(crate) fn begin_exit(&mut self) {
        self.queue.clear();
        self.phase = Phase::Exiting;
    }

    pub(crate) fn end_exit(&mut self) {
        self.phase = Phase::Idle;
    }
}
