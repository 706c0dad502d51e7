use crate::domain::{Outcome, Record};

/// Common contract for every cleaning phase
pub trait Phase: Send + Sync {
    /// Name used in stats and logs
    fn name(&self) -> &'static str;

    /// Run the phase over one record
    fn apply(&self, record: Record) -> Outcome;

    /// Whether records may be handed to this phase out of input order
    fn can_run_parallel(&self) -> bool {
        false
    }
}
