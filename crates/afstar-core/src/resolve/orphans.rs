use crate::dump::VNode;

/// A vnode held back because its container was not resolvable yet, with its
/// payload
#[derive(Debug, Clone)]
pub struct OrphanRecord {
    pub vnode: VNode,
    pub payload: Vec<u8>,
}

/// Result of draining the orphan buffer
#[derive(Debug, Default)]
pub struct DrainOutcome {
    /// Replay passes run over the buffer
    pub passes: usize,
    /// Records that resolved during a replay
    pub resolved: usize,
    /// Records that never resolved, in arrival order
    pub unresolved: Vec<OrphanRecord>,
}

/// In-memory spool of deferred vnodes, replayed after the main pass
#[derive(Debug, Default)]
pub struct OrphanBuffer {
    records: Vec<OrphanRecord>,
}

impl OrphanBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: OrphanRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids of the buffered vnodes, in arrival order
    pub fn ids(&self) -> Vec<u32> {
        self.records.iter().map(|r| r.vnode.id).collect()
    }

    /// Replay the buffer until it is empty or a pass resolves nothing.
    ///
    /// `replay` gets each record and the buffer for the next pass; it pushes
    /// the record back there if it still cannot be placed. Every pass but the
    /// last removes at least one record, so `k` orphans take at most `k`
    /// passes, whatever their parent links look like.
    pub fn drain_with<E, F>(&mut self, mut replay: F) -> Result<DrainOutcome, E>
    where
        F: FnMut(OrphanRecord, &mut OrphanBuffer) -> Result<(), E>,
    {
        let mut outcome = DrainOutcome::default();

        while !self.is_empty() {
            let before = self.len();
            let mut next = OrphanBuffer::new();

            for record in std::mem::take(&mut self.records) {
                replay(record, &mut next)?;
            }

            outcome.passes += 1;
            let remaining = next.len();
            *self = next;

            if remaining >= before {
                break;
            }
            outcome.resolved += before - remaining;
            tracing::debug!(
                "orphan pass {} resolved {} vnodes, {} left",
                outcome.passes,
                before - remaining,
                remaining
            );
        }

        outcome.unresolved = std::mem::take(&mut self.records);
        Ok(outcome)
    }
}
