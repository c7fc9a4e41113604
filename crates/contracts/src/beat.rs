//! Beat - the dispatcher's snapshot of the current chain tip

use tracing::Span;

use crate::{BlockEpoch, BlockHash};

/// Immutable view of the chain tip for one dispatch round.
///
/// A new `Beat` replaces the previous one on every block; older beats may
/// still be held by consumers that have not returned yet. The bound span
/// carries `height` and `hash` so every log line emitted while processing
/// the beat is attributable to it.
#[derive(Debug, Clone)]
pub struct Beat {
    epoch: BlockEpoch,
    span: Span,
}

impl Beat {
    /// Build a beat from a block notification
    pub fn new(epoch: BlockEpoch) -> Self {
        let span = tracing::info_span!("beat", height = epoch.height, hash = %epoch.hash);
        Self { epoch, span }
    }

    /// Block height
    pub fn height(&self) -> u32 {
        self.epoch.height
    }

    /// Block identifier
    pub fn hash(&self) -> BlockHash {
        self.epoch.hash
    }

    /// The raw notification this beat was built from
    pub fn epoch(&self) -> BlockEpoch {
        self.epoch
    }

    /// Logging context bound to this beat's height and hash
    pub fn span(&self) -> &Span {
        &self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beat_accessors() {
        let epoch = BlockEpoch::new(42, BlockHash::new([1u8; 32]));
        let beat = Beat::new(epoch);

        assert_eq!(beat.height(), 42);
        assert_eq!(beat.hash(), BlockHash::new([1u8; 32]));
        assert_eq!(beat.epoch(), epoch);
    }

    #[test]
    fn test_beat_clone_shares_epoch() {
        let beat = Beat::new(BlockEpoch::new(7, BlockHash::ZERO));
        let copy = beat.clone();
        assert_eq!(copy.epoch(), beat.epoch());
    }
}
