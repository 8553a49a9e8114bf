//! Reconcile outcomes

use std::time::Duration;

use kube::runtime::controller::Action;

/// Successful result of one reconcile tick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Everything converged; wait for the next watch event
    Done,
    /// A prerequisite is missing; look again after the delay
    RequeueAfter(Duration),
}

impl Outcome {
    /// Map onto a kube-runtime controller action
    pub fn into_action(self) -> Action {
        match self {
            Outcome::Done => Action::await_change(),
            Outcome::RequeueAfter(delay) => Action::requeue(delay),
        }
    }

    /// Whether the tick finished without deferring
    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done)
    }
}
