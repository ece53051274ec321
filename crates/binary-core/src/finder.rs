use crate::chunk_store::ChunkStore;
use crate::enums::Direction;
use crate::errors::{EngineError, EngineResult};

/// Scans a [`ChunkStore`] for a raw byte pattern.
///
/// Content is pulled through [`ChunkStore::read`] one block at a time, with
/// `pattern.len() - 1` bytes of overlap so matches straddling a block (or
/// chunk) boundary are still seen. The cancellation signal is polled before
/// every block, which bounds the bytes scanned after a cancel request.
#[derive(Debug)]
pub struct Finder<'p> {
    pattern: &'p [u8],
    forward: memchr::memmem::Finder<'p>,
    backward: memchr::memmem::FinderRev<'p>,
    block: u64,
}

impl<'p> Finder<'p> {
    pub fn new(pattern: &'p [u8], block_size: usize) -> EngineResult<Self> {
        if pattern.is_empty() {
            return Err(EngineError::InvalidPattern(
                "search pattern is empty".to_string(),
            ));
        }

        Ok(Self {
            pattern,
            forward: memchr::memmem::Finder::new(pattern),
            backward: memchr::memmem::FinderRev::new(pattern),
            block: block_size.max(1) as u64,
        })
    }

    #[inline]
    #[must_use]
    pub fn pattern(&self) -> &[u8] {
        self.pattern
    }

    /// Finds the next match strictly after (forward) or strictly before
    /// (backward) `from`.
    ///
    /// With `wrap`, a scan that runs off the end continues from the other end
    /// until it is back at `from`, so every position is examined exactly once
    /// and a match sitting at `from` itself is only returned after wrapping.
    pub fn find(
        &self,
        store: &ChunkStore,
        from: u64,
        direction: Direction,
        wrap: bool,
        cancel: &impl util::cancel::CancelSignal,
    ) -> EngineResult<Option<u64>> {
        let total = store.len();

        if from > total {
            return Err(EngineError::out_of_range(from, 0, total));
        }

        let plen = self.pattern.len() as u64;

        if plen > total {
            return Ok(None);
        }

        // Last position a match can start at.
        let last = total - plen;

        let hit = match direction {
            Direction::Forward => {
                let first_pass = match from.checked_add(1) {
                    Some(lo) if lo <= last => self.scan_forward(store, lo, last, cancel)?,
                    _ => None,
                };

                match first_pass {
                    Some(hit) => Some(hit),
                    None if wrap => self.scan_forward(store, 0, from.min(last), cancel)?,
                    None => None,
                }
            }
            Direction::Backward => {
                let first_pass = if from > 0 {
                    self.scan_backward(store, 0, (from - 1).min(last), cancel)?
                } else {
                    None
                };

                match first_pass {
                    Some(hit) => Some(hit),
                    None if wrap && from <= last => {
                        self.scan_backward(store, from, last, cancel)?
                    }
                    None => None,
                }
            }
        };

        tracing::trace!(from, ?direction, wrap, ?hit, "search finished");

        Ok(hit)
    }

    /// Bytes read per block: `block` candidate starts plus the overlap.
    #[inline]
    fn span(&self) -> u64 {
        self.block.saturating_add(self.pattern.len() as u64 - 1)
    }

    /// Lowest match starting in `lo..=hi`.
    fn scan_forward(
        &self,
        store: &ChunkStore,
        lo: u64,
        hi: u64,
        cancel: &impl util::cancel::CancelSignal,
    ) -> EngineResult<Option<u64>> {
        let plen = self.pattern.len() as u64;
        let window_end = hi + plen;
        let mut start = lo;

        while start <= hi {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let end = start.saturating_add(self.span()).min(window_end);
            let bytes = store.read(start, end - start)?;

            if let Some(pos) = self.forward.find(&bytes) {
                return Ok(Some(start + pos as u64));
            }

            start = end - (plen - 1);
        }

        Ok(None)
    }

    /// Highest match starting in `lo..=hi`.
    fn scan_backward(
        &self,
        store: &ChunkStore,
        lo: u64,
        hi: u64,
        cancel: &impl util::cancel::CancelSignal,
    ) -> EngineResult<Option<u64>> {
        let plen = self.pattern.len() as u64;
        let mut end = hi + plen;

        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let span = self.span();
            let start = if end - lo > span { end - span } else { lo };
            let bytes = store.read(start, end - start)?;

            if let Some(pos) = self.backward.rfind(&bytes) {
                return Ok(Some(start + pos as u64));
            }

            if start == lo {
                return Ok(None);
            }

            end = start + plen - 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::io::Write;

    use super::Finder;
    use crate::chunk_store::ChunkStore;
    use crate::config::EngineConfig;
    use crate::enums::Direction::{Backward, Forward};
    use crate::errors::EngineError;
    use util::cancel::{CancelSignal, CancelToken, NeverCancel};

    /// Fires after a fixed number of polls.
    struct CancelAfter {
        polls: Cell<usize>,
        limit: usize,
    }

    impl CancelSignal for CancelAfter {
        fn is_cancelled(&self) -> bool {
            self.polls.set(self.polls.get() + 1);
            self.polls.get() > self.limit
        }
    }

    fn owned(content: &[u8]) -> ChunkStore {
        ChunkStore::from_bytes(content, EngineConfig::default())
    }

    fn find(
        store: &ChunkStore,
        pattern: &[u8],
        from: u64,
        direction: crate::enums::Direction,
        wrap: bool,
    ) -> Option<u64> {
        Finder::new(pattern, 4)
            .unwrap()
            .find(store, from, direction, wrap, &NeverCancel)
            .unwrap()
    }

    #[test]
    fn empty_pattern_is_invalid() {
        assert!(matches!(
            Finder::new(b"", 16),
            Err(EngineError::InvalidPattern(_))
        ));
    }

    #[test]
    fn forward_wraps_to_start() {
        let store = owned(b"ABCXABC");

        assert_eq!(find(&store, b"ABC", 4, Forward, true), Some(0));
        // Same start, same answer: the first match is not skipped or doubled.
        assert_eq!(find(&store, b"ABC", 4, Forward, true), Some(0));
        assert_eq!(find(&store, b"ABC", 4, Forward, false), None);
        assert_eq!(find(&store, b"ABC", 0, Forward, false), Some(4));
    }

    #[test]
    fn backward_wraps_to_end() {
        let store = owned(b"ABCXABC");

        assert_eq!(find(&store, b"ABC", 4, Backward, false), Some(0));
        assert_eq!(find(&store, b"ABC", 0, Backward, false), None);
        assert_eq!(find(&store, b"ABC", 0, Backward, true), Some(4));
        assert_eq!(find(&store, b"ABC", 7, Backward, false), Some(4));
    }

    #[test]
    fn single_match_at_start_position_found_after_full_cycle() {
        let store = owned(b"xxABxx");

        assert_eq!(find(&store, b"AB", 2, Forward, true), Some(2));
        assert_eq!(find(&store, b"AB", 2, Backward, true), Some(2));
        assert_eq!(find(&store, b"AB", 2, Forward, false), None);
    }

    #[test]
    fn content_made_of_pattern_terminates() {
        let store = owned(b"aaaaaaaa");

        assert_eq!(find(&store, b"aa", 6, Forward, true), Some(0));
        assert_eq!(find(&store, b"aa", 3, Forward, true), Some(4));
        assert_eq!(find(&store, b"aa", 0, Backward, true), Some(6));
    }

    #[test]
    fn absent_pattern_returns_none_with_wrap() {
        let store = owned(b"0123456789abcdef");

        assert_eq!(find(&store, b"zz", 5, Forward, true), None);
        assert_eq!(find(&store, b"zz", 5, Backward, true), None);
        assert_eq!(find(&store, b"longer than the content", 0, Forward, true), None);
    }

    #[test]
    fn start_past_end_is_out_of_range() {
        let store = owned(b"abc");
        let finder = Finder::new(b"a", 4).unwrap();

        assert!(matches!(
            finder.find(&store, 4, Forward, true, &NeverCancel),
            Err(EngineError::OutOfRange { .. })
        ));
        assert_eq!(
            finder.find(&store, 3, Forward, true, &NeverCancel).unwrap(),
            Some(0)
        );
    }

    #[test]
    fn matches_across_block_and_chunk_boundaries() {
        let mut temp = tempfile::NamedTempFile::new().unwrap();
        temp.write_all(b"....NEE....").unwrap();
        temp.as_file().sync_all().unwrap();
        let file = std::sync::Arc::new(io::mmap::MappedFile::open(temp.path()).unwrap());
        let config = EngineConfig {
            max_owned_chunk: 1,
            ..EngineConfig::default()
        };
        let mut store = ChunkStore::from_mapped(file, config).unwrap();

        // "....NEE" + "D" + "L" + "E" + "...." with every insert in its own chunk.
        store.insert(7, b"D").unwrap();
        store.insert(8, b"L").unwrap();
        store.insert(9, b"E").unwrap();
        assert!(store.chunk_count() >= 4);

        let pattern = b"NEEDLE";
        for block in [1, 2, 3, 5, 64] {
            let finder = Finder::new(pattern, block).unwrap();

            assert_eq!(
                finder.find(&store, 0, Forward, false, &NeverCancel).unwrap(),
                Some(4),
                "forward, block {block}"
            );
            assert_eq!(
                finder
                    .find(&store, store.len(), Backward, false, &NeverCancel)
                    .unwrap(),
                Some(4),
                "backward, block {block}"
            );
        }
    }

    #[test]
    fn huge_block_size_scans_in_one_read() {
        let store = owned(b"xxABxx");
        let finder = Finder::new(b"AB", usize::MAX).unwrap();

        assert_eq!(
            finder.find(&store, 0, Forward, false, &NeverCancel).unwrap(),
            Some(2)
        );
        assert_eq!(
            finder.find(&store, 6, Backward, false, &NeverCancel).unwrap(),
            Some(2)
        );
        assert_eq!(
            finder.find(&store, 2, Forward, true, &NeverCancel).unwrap(),
            Some(2)
        );
    }

    #[test]
    fn finds_last_possible_position() {
        let store = owned(b"........END");

        assert_eq!(find(&store, b"END", 0, Forward, false), Some(8));
        assert_eq!(find(&store, b"END", 11, Backward, false), Some(8));
    }

    #[test]
    fn cancelled_mid_scan_reports_cancelled() {
        let store = owned(&vec![0u8; 1 << 20]);
        let finder = Finder::new(b"\x01\x02", 4096).unwrap();
        let signal = CancelAfter {
            polls: Cell::new(0),
            limit: 10,
        };

        let result = finder.find(&store, 0, Forward, true, &signal);

        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert_eq!(signal.polls.get(), 11);
    }

    #[test]
    fn pre_cancelled_token_scans_nothing() {
        let store = owned(b"abcabc");
        let token = CancelToken::new();
        token.cancel();

        let result = Finder::new(b"c", 16)
            .unwrap()
            .find(&store, 0, Backward, true, &token);

        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
