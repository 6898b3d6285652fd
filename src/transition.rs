//! Edge detection over the backup-target predicate.
//!
//! Only the two edges of the predicate trigger work: false→true activates
//! backups, true→false deactivates them. Every other combination is a no-op,
//! so replaying the same admission call always yields the same intent.

use kube::core::admission::Operation;
use tracing::info;

use crate::target::TargetState;

/// What the orchestrator should do for one admission call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionIntent {
    /// Create the recurring schedule and take an instant backup.
    Activate,
    /// Remove the recurring schedule.
    Deactivate,
    NoOp,
}

/// Map an admission operation and the predicate before/after it to an intent.
///
/// A missing snapshot counts as "not a target".
pub fn decide(
    operation: &Operation,
    old: Option<&TargetState>,
    new: Option<&TargetState>,
) -> TransitionIntent {
    let was = old.is_some_and(|s| s.is_target);
    let is = new.is_some_and(|s| s.is_target);

    match operation {
        Operation::Create if is => TransitionIntent::Activate,
        Operation::Create => TransitionIntent::NoOp,
        Operation::Update => match (was, is) {
            (false, true) => TransitionIntent::Activate,
            (true, false) => TransitionIntent::Deactivate,
            _ => TransitionIntent::NoOp,
        },
        Operation::Delete if was => TransitionIntent::Deactivate,
        Operation::Delete => TransitionIntent::NoOp,
        other => {
            info!(operation = ?other, "unknown operation");
            TransitionIntent::NoOp
        }
    }
}
