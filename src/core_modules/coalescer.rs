// THEORY:
// The `Coalescer` debounces bursts of observations into one recomputation pass. It is a
// single slot: scheduling arms it (or pushes an armed deadline back), firing consumes it.
// A burst of N observations inside the delay therefore produces one pass, not N.
//
// Deletions mark their direction as "forced" so the dedup controller re-emits it even if
// the signature looks unchanged. Forced directions accumulate across re-arms, so a later
// ordinary observation in the same burst cannot wash a deletion's hint away.
//
// The coalescer owns no task. The pipeline actor sleeps until `deadline()` inside its
// `select!` loop, which keeps every state change on one timeline.

use crate::core_modules::geometry::Direction;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct PendingPass {
    deadline: Instant,
    forced: BTreeSet<Direction>,
}

#[derive(Debug)]
pub struct Coalescer {
    delay: Duration,
    pending: Option<PendingPass>,
}

impl Coalescer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Arms the slot, replacing any pending deadline with `now + delay`.
    pub fn schedule(&mut self, forced: Option<Direction>) {
        self.schedule_at(Instant::now(), forced);
    }

    pub fn schedule_at(&mut self, now: Instant, forced: Option<Direction>) {
        let deadline = now + self.delay;
        let pending = self.pending.get_or_insert_with(|| PendingPass {
            deadline,
            forced: BTreeSet::new(),
        });
        pending.deadline = deadline;
        if let Some(direction) = forced {
            pending.forced.insert(direction);
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Consumes the slot, returning the directions that must be force-emitted.
    pub fn take(&mut self) -> Option<BTreeSet<Direction>> {
        self.pending.take().map(|p| p.forced)
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}
