use std::collections::BTreeMap;

use bytes::Bytes;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

/// Frames held back behind a missing one before the connection is given up.
/// A lost frame never arrives, so without a cap the other readers would keep
/// filling the buffer for as long as the backend produces data.
pub const MAX_PARKED: usize = 256;

// -----------------------------------------------------------------------------
// ----- Reorderer -------------------------------------------------------------

/// Puts frames pulled through independent endpoints back into the order the
/// relay produced them. At most `limit` frames wait behind a gap.
#[derive(Debug)]
pub struct Reorderer {
    next: u64,
    parked: BTreeMap<u64, Bytes>,
    limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pushed {
    Accepted,
    /// Already delivered or already parked; the frame was dropped.
    Duplicate,
    /// The gap in front of the parked frames is not closing.
    Overflow,
}

// -----------------------------------------------------------------------------
// ----- Reorderer: Static -----------------------------------------------------

impl Reorderer {
    pub fn new() -> Self {
        Self::with_limit(MAX_PARKED)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            next: 0,
            parked: BTreeMap::new(),
            limit: limit.max(1),
        }
    }
}

impl Default for Reorderer {
    fn default() -> Self {
        Self::new()
    }
}

// -----------------------------------------------------------------------------
// ----- Reorderer: Public -----------------------------------------------------

impl Reorderer {
    pub fn push(&mut self, seq: u64, data: Bytes) -> Pushed {
        if seq < self.next || self.parked.contains_key(&seq) {
            return Pushed::Duplicate;
        }
        // The next expected frame is always accepted: it drains the buffer.
        if seq != self.next && self.parked.len() >= self.limit {
            return Pushed::Overflow;
        }
        self.parked.insert(seq, data);
        Pushed::Accepted
    }

    /// Next in-order frame, if it has arrived.
    pub fn pop_ready(&mut self) -> Option<Bytes> {
        let data = self.parked.remove(&self.next)?;
        self.next += 1;
        Some(data)
    }

    pub fn parked(&self) -> usize {
        self.parked.len()
    }

    pub fn next_seq(&self) -> u64 {
        self.next
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
