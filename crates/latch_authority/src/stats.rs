//! Enforcer counters
//!
//! Counting vanishes when the `metrics` feature is disabled; every getter
//! then reports zero.

use crate::enforcer::SkipReason;

/// Execute code only when metrics are enabled
macro_rules! metrics {
    ($($tt:tt)*) => {
        #[cfg(feature = "metrics")]
        {
            $($tt)*
        }
    };
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnforcerStats {
    queued: usize,
    dequeued: usize,
    passes: usize,
    emitted: usize,
    skipped_missing_intent: usize,
    skipped_unresolved_worker: usize,
    skipped_not_authoritative: usize,
    skipped_missing_presence: usize,
}

impl EnforcerStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(unused_variables)]
    pub(crate) fn record_queued(&mut self, newly_queued: bool) {
        metrics! {
            if newly_queued {
                self.queued += 1;
            }
        }
    }

    #[allow(unused_variables)]
    pub(crate) fn record_dequeued(&mut self, was_queued: bool) {
        metrics! {
            if was_queued {
                self.dequeued += 1;
            }
        }
    }

    #[allow(unused_variables)]
    pub(crate) fn record_pass(&mut self, emitted: usize) {
        metrics! {
            self.passes += 1;
            self.emitted += emitted;
        }
    }

    #[allow(unused_variables)]
    pub(crate) fn record_skip(&mut self, reason: &SkipReason) {
        metrics! {
            let counter = match reason {
                SkipReason::MissingAuthorityIntent => &mut self.skipped_missing_intent,
                SkipReason::UnresolvedVirtualWorker(_) => &mut self.skipped_unresolved_worker,
                SkipReason::NotAclAuthoritative => &mut self.skipped_not_authoritative,
                SkipReason::MissingComponentPresence => &mut self.skipped_missing_presence,
            };
            *counter += 1;
        }
    }

    /// Entities newly added to the pending set.
    pub fn queued(&self) -> usize {
        self.queued
    }

    /// Entities dropped from the pending set by a handler.
    pub fn dequeued(&self) -> usize {
        self.dequeued
    }

    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn skipped(&self) -> usize {
        self.skipped_missing_intent
            + self.skipped_unresolved_worker
            + self.skipped_not_authoritative
            + self.skipped_missing_presence
    }

    pub fn skipped_missing_intent(&self) -> usize {
        self.skipped_missing_intent
    }

    pub fn skipped_unresolved_worker(&self) -> usize {
        self.skipped_unresolved_worker
    }

    pub fn skipped_not_authoritative(&self) -> usize {
        self.skipped_not_authoritative
    }

    pub fn skipped_missing_presence(&self) -> usize {
        self.skipped_missing_presence
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
