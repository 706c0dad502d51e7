use std::collections::HashSet;
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::constants::DEDUP_PHASE;
use crate::domain::{DropReason, Outcome, Record};
use crate::pipeline::phase::Phase;

/// Drops records whose normalized text was already seen in this run.
///
/// Only the SHA-256 digest of each text is remembered. The first occurrence
/// wins, so this phase must see records in input order.
#[derive(Default)]
pub struct DedupPhase {
    seen: Mutex<HashSet<[u8; 32]>>,
}

impl DedupPhase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn distinct(&self) -> usize {
        self.seen.lock().map(|seen| seen.len()).unwrap_or(0)
    }
}

impl Phase for DedupPhase {
    fn name(&self) -> &'static str {
        DEDUP_PHASE
    }

    fn apply(&self, record: Record) -> Outcome {
        let digest: [u8; 32] = Sha256::digest(record.text.as_bytes()).into();
        let fresh = match self.seen.lock() {
            Ok(mut seen) => seen.insert(digest),
            Err(poisoned) => poisoned.into_inner().insert(digest),
        };
        if fresh {
            Outcome::Kept(record)
        } else {
            debug!(digest = %hex::encode(&digest[..8]), "duplicate document");
            Outcome::dropped(DropReason::DuplicateDocument)
        }
    }
}
