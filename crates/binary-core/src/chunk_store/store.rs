use std::ops::{AddAssign, SubAssign};

use crate::chunk_store::chunk::Chunk;
use crate::errors::{EngineError, EngineResult};

/// Ordered sequence of chunks that together form the logical content.
///
/// Chunk boundaries are invisible to callers. Offsets are resolved through a
/// prefix-sum index that is dropped on every structural change and rebuilt on
/// the next lookup, so a burst of edits pays for one rebuild. The index lives
/// in a [`std::sync::OnceLock`] so that concurrent readers can share a store
/// behind a read lock.
#[derive(Debug)]
pub struct ChunkStore {
    chunks: Vec<Chunk>,
    len: u64,
    /// `starts[i]` is the logical offset of `chunks[i]`; the last entry is `len`.
    starts: std::sync::OnceLock<Vec<u64>>,
    mutations_since_compaction: usize,
    compaction_ceiling: usize,
    config: crate::config::EngineConfig,
}

/*

====================================
========= CREATION METHODS =========
====================================

*/

impl ChunkStore {
    #[must_use]
    pub fn new(config: crate::config::EngineConfig) -> Self {
        Self {
            chunks: Vec::new(),
            len: 0,
            starts: std::sync::OnceLock::new(),
            mutations_since_compaction: 0,
            compaction_ceiling: config.max_chunks,
            config,
        }
    }

    /// A store whose whole content is one mapped view of `file`.
    pub fn from_mapped(
        file: std::sync::Arc<io::mmap::MappedFile>,
        config: crate::config::EngineConfig,
    ) -> EngineResult<Self> {
        let mut store = Self::new(config);
        let chunk = Chunk::whole_file(file)?;

        if !chunk.is_empty() {
            store.len = chunk.len();
            store.chunks.push(chunk);
        }

        Ok(store)
    }

    /// A store holding a copy of `bytes`.
    #[must_use]
    pub fn from_bytes(bytes: &[u8], config: crate::config::EngineConfig) -> Self {
        let mut store = Self::new(config);

        if !bytes.is_empty() {
            store.len = bytes.len() as u64;
            store.chunks.push(Chunk::Owned(bytes.to_vec()));
        }

        store
    }
}

/*

====================================
========= INLINE METHODS  ==========
====================================

*/

impl ChunkStore {
    /// Total content length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &crate::config::EngineConfig {
        &self.config
    }

    fn starts(&self) -> &[u64] {
        self.starts.get_or_init(|| {
            let mut starts = Vec::with_capacity(self.chunks.len() + 1);
            let mut acc = 0u64;

            for chunk in &self.chunks {
                starts.push(acc);
                acc.add_assign(chunk.len());
            }
            starts.push(acc);

            starts
        })
    }

    #[inline]
    fn invalidate_index(&mut self) {
        self.starts.take();
    }

    /// Maps a logical offset to `(chunk index, offset within chunk)`.
    ///
    /// `offset == len()` maps to `(chunk_count(), 0)`. Callers validate that
    /// `offset <= len()`.
    #[must_use]
    pub fn locate(&self, offset: u64) -> (usize, u64) {
        let starts = self.starts();
        // starts[0] == 0 <= offset, so the partition point is at least 1.
        let idx = starts.partition_point(|&start| start <= offset) - 1;

        if idx >= self.chunks.len() {
            return (self.chunks.len(), 0);
        }

        (idx, offset - starts[idx])
    }

    fn check_position(&self, offset: u64) -> EngineResult<()> {
        if offset > self.len {
            return Err(EngineError::out_of_range(offset, 0, self.len));
        }

        Ok(())
    }

    fn check_range(&self, offset: u64, length: u64) -> EngineResult<u64> {
        match offset.checked_add(length) {
            Some(end) if end <= self.len => Ok(end),
            _ => Err(EngineError::out_of_range(offset, length, self.len)),
        }
    }
}

/*

===========================
========= READING =========
===========================

*/

impl ChunkStore {
    /// Copies `length` bytes starting at `offset`.
    pub fn read(&self, offset: u64, length: u64) -> EngineResult<Vec<u8>> {
        let slices = self.slices(offset, length)?;
        let mut res = Vec::with_capacity(<u64 as TryInto<usize>>::try_into(length)?);

        for slice in slices {
            res.extend_from_slice(slice?);
        }

        Ok(res)
    }

    /// Zero-copy iteration over the byte range, one slice per chunk touched.
    pub fn slices(&self, offset: u64, length: u64) -> EngineResult<Slices<'_>> {
        self.check_range(offset, length)?;

        let (idx, within) = self.locate(offset);

        Ok(Slices {
            chunks: &self.chunks,
            idx,
            within,
            remaining: length,
        })
    }
}

pub struct Slices<'a> {
    chunks: &'a [Chunk],
    idx: usize,
    within: u64,
    remaining: u64,
}

impl<'a> Iterator for Slices<'a> {
    type Item = EngineResult<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let chunks = self.chunks;
        let chunk = chunks.get(self.idx)?;
        let take = (chunk.len() - self.within).min(self.remaining);
        let slice = chunk.slice(self.within, self.within + take);

        self.remaining.sub_assign(take);
        self.idx.add_assign(1);
        self.within = 0;

        Some(slice)
    }
}

/*

=====================================
========= INSERT / DELETE  ==========
=====================================

*/

impl ChunkStore {
    /// Ensures a chunk boundary at `offset` and returns the index of the
    /// chunk that starts there (`chunk_count()` at the end of content).
    fn split_at(&mut self, offset: u64) -> EngineResult<usize> {
        let (idx, within) = self.locate(offset);

        if within == 0 {
            return Ok(idx);
        }

        let tail = self.chunks[idx].split_off(within)?;
        self.chunks.insert(idx + 1, tail);
        self.invalidate_index();

        Ok(idx + 1)
    }

    /// Re-joins the chunks on either side of `idx` when they describe one
    /// contiguous mapped range.
    fn join_mapped_at(&mut self, idx: usize) {
        if idx == 0 || idx >= self.chunks.len() {
            return;
        }

        let (left, right) = self.chunks.split_at_mut(idx);
        let prev = &mut left[idx - 1];

        if prev.kind() == crate::enums::ChunkKind::Mapped && prev.try_absorb(&right[0], 0) {
            self.chunks.remove(idx);
            self.invalidate_index();
        }
    }

    /// Inserts `bytes` at `offset`.
    ///
    /// Small insertions that land inside or right after an owned chunk are
    /// spliced into it as long as it stays within `max_owned_chunk`;
    /// everything else becomes a new owned chunk between the two halves of
    /// the chunk that contained `offset`.
    pub fn insert(&mut self, offset: u64, bytes: &[u8]) -> EngineResult<()> {
        self.check_position(offset)?;

        if bytes.is_empty() {
            return Ok(());
        }

        let (idx, within) = self.locate(offset);
        let within_usize = <u64 as TryInto<usize>>::try_into(within)?;
        let limit = self.config.max_owned_chunk;

        if within == 0 {
            if let Some(Chunk::Owned(prev)) = idx.checked_sub(1).and_then(|i| self.chunks.get_mut(i))
                && prev.len().saturating_add(bytes.len()) <= limit
            {
                prev.extend_from_slice(bytes);
                self.grow(bytes.len() as u64);

                return Ok(());
            }
        } else if let Some(Chunk::Owned(data)) = self.chunks.get_mut(idx)
            && data.len().saturating_add(bytes.len()) <= limit
        {
            data.splice(within_usize..within_usize, bytes.iter().copied());
            self.grow(bytes.len() as u64);

            return Ok(());
        }

        self.insert_chunks(offset, vec![Chunk::Owned(bytes.to_vec())])
    }

    fn grow(&mut self, added: u64) {
        self.len.add_assign(added);
        self.invalidate_index();
        self.after_mutation();
    }

    /// Splices already-built chunks in at `offset`. Used to put removed
    /// content back when an edit is undone.
    pub fn insert_chunks(&mut self, offset: u64, chunks: Vec<Chunk>) -> EngineResult<()> {
        self.check_position(offset)?;

        let chunks: Vec<Chunk> = chunks.into_iter().filter(|c| !c.is_empty()).collect();

        if chunks.is_empty() {
            return Ok(());
        }

        let added = Chunk::total_len(&chunks);
        let count = chunks.len();
        let at = self.split_at(offset)?;

        self.chunks.splice(at..at, chunks);
        self.len.add_assign(added);
        self.invalidate_index();

        self.join_mapped_at(at + count);
        self.join_mapped_at(at);
        self.after_mutation();

        Ok(())
    }

    fn remove_range(&mut self, offset: u64, length: u64) -> EngineResult<Vec<Chunk>> {
        let end = offset + length;
        let start_idx = self.split_at(offset)?;
        let end_idx = self.split_at(end)?;
        let removed: Vec<Chunk> = self.chunks.drain(start_idx..end_idx).collect();

        self.len.sub_assign(length);
        self.invalidate_index();
        self.join_mapped_at(start_idx);

        Ok(removed)
    }

    /// Removes `length` bytes at `offset` and hands back the removed chunks.
    pub fn delete(&mut self, offset: u64, length: u64) -> EngineResult<Vec<Chunk>> {
        self.check_range(offset, length)?;

        if length == 0 {
            return Ok(Vec::new());
        }

        let removed = self.remove_range(offset, length)?;
        self.after_mutation();

        Ok(removed)
    }

    /// Replaces `bytes.len()` bytes at `offset` with `bytes` and hands back
    /// the chunks that held the previous content.
    ///
    /// When the whole region sits inside one owned chunk the bytes are
    /// swapped in place without touching the chunk list.
    pub fn overwrite(&mut self, offset: u64, bytes: &[u8]) -> EngineResult<Vec<Chunk>> {
        let length = bytes.len() as u64;
        self.check_range(offset, length)?;

        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        let (idx, within) = self.locate(offset);
        let start = <u64 as TryInto<usize>>::try_into(within)?;

        if let Some(Chunk::Owned(data)) = self.chunks.get_mut(idx)
            && start + bytes.len() <= data.len()
        {
            let region = &mut data[start..start + bytes.len()];
            let original = region.to_vec();
            region.copy_from_slice(bytes);
            self.after_mutation();

            return Ok(vec![Chunk::Owned(original)]);
        }

        let original = self.remove_range(offset, length)?;
        self.insert_chunks(offset, vec![Chunk::Owned(bytes.to_vec())])?;

        Ok(original)
    }

    /// Replaces `length` bytes at `offset` with `chunks`.
    pub fn replace(
        &mut self,
        offset: u64,
        length: u64,
        chunks: Vec<Chunk>,
    ) -> EngineResult<Vec<Chunk>> {
        self.check_range(offset, length)?;

        let removed = if length == 0 {
            Vec::new()
        } else {
            self.remove_range(offset, length)?
        };
        self.insert_chunks(offset, chunks)?;

        Ok(removed)
    }
}

/*

====================================
============ COMPACTION ============
====================================

*/

impl ChunkStore {
    fn after_mutation(&mut self) {
        self.mutations_since_compaction.add_assign(1);

        if self.mutations_since_compaction >= self.config.compact_interval
            || self.chunks.len() > self.compaction_ceiling
        {
            self.compact();
        }
    }

    /// Merges neighbouring owned chunks up to `max_owned_chunk` and
    /// neighbouring mapped chunks over contiguous ranges. Content is unchanged.
    pub fn compact(&mut self) {
        let before = self.chunks.len();
        let limit = self.config.max_owned_chunk;
        let mut merged: Vec<Chunk> = Vec::with_capacity(before);

        for chunk in self.chunks.drain(..) {
            if let Some(last) = merged.last_mut()
                && last.try_absorb(&chunk, limit)
            {
                continue;
            }
            merged.push(chunk);
        }

        self.chunks = merged;
        self.mutations_since_compaction = 0;
        // Chunks that refuse to merge would otherwise trigger a pass on every edit.
        self.compaction_ceiling = self.config.max_chunks.max(self.chunks.len() * 2);
        self.invalidate_index();

        tracing::debug!(before, after = self.chunks.len(), "compacted chunk list");
    }

    /// Drops all content and every reference to mapped files.
    pub fn clear(&mut self) {
        self.chunks = Vec::new();
        self.len = 0;
        self.mutations_since_compaction = 0;
        self.compaction_ceiling = self.config.max_chunks;
        self.invalidate_index();
    }
}

#[cfg(test)]
mod chunk_store_tests {
    use std::io::Write;

    use super::ChunkStore;
    use crate::chunk_store::chunk::Chunk;
    use crate::config::EngineConfig;
    use crate::enums::ChunkKind;
    use crate::errors::EngineError;

    fn mapped_store(
        content: &[u8],
        config: EngineConfig,
    ) -> (tempfile::NamedTempFile, ChunkStore) {
        let mut temp = tempfile::NamedTempFile::new().unwrap();
        temp.write_all(content).unwrap();
        temp.as_file().sync_all().unwrap();
        let file = std::sync::Arc::new(io::mmap::MappedFile::open(temp.path()).unwrap());

        (temp, ChunkStore::from_mapped(file, config).unwrap())
    }

    fn all(store: &ChunkStore) -> Vec<u8> {
        store.read(0, store.len()).unwrap()
    }

    /// Forces every insert into its own chunk.
    fn unmerged() -> EngineConfig {
        EngineConfig {
            max_owned_chunk: 1,
            compact_interval: usize::MAX,
            max_chunks: usize::MAX,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn insert_shifts_following_content() {
        let (_t, mut store) = mapped_store(b"helo world", EngineConfig::default());

        store.insert(3, b"l").unwrap();

        assert_eq!(all(&store), b"hello world");
        assert_eq!(store.read(3, 2).unwrap(), b"lo");
        assert_eq!(store.len(), 11);
    }

    #[test]
    fn insert_at_both_ends() {
        let (_t, mut store) = mapped_store(b"world", EngineConfig::default());

        store.insert(0, b"hello ").unwrap();
        store.insert(store.len(), b"!").unwrap();

        assert_eq!(all(&store), b"hello world!");
    }

    #[test]
    fn oversized_read_is_out_of_range() {
        let store = ChunkStore::from_bytes(b"abc", EngineConfig::default());

        assert!(matches!(
            store.read(0, u64::MAX),
            Err(EngineError::OutOfRange { offset: 0, total: 3, .. })
        ));
        assert!(matches!(
            store.read(1, 1 << 40),
            Err(EngineError::OutOfRange { .. })
        ));
        assert!(matches!(
            store.slices(u64::MAX, 1),
            Err(EngineError::OutOfRange { .. })
        ));
    }

    #[test]
    fn insert_past_end_is_rejected_without_change() {
        let (_t, mut store) = mapped_store(b"abc", EngineConfig::default());

        let err = store.insert(4, b"x").unwrap_err();

        assert!(matches!(err, EngineError::OutOfRange { offset: 4, total: 3, .. }));
        assert_eq!(all(&store), b"abc");
        assert_eq!(store.chunk_count(), 1);
    }

    #[test]
    fn insert_splits_mapped_chunk_into_three() {
        let (_t, mut store) = mapped_store(b"abcdef", EngineConfig::default());

        store.insert(3, b"XY").unwrap();

        let kinds: Vec<ChunkKind> = store.chunks().iter().map(Chunk::kind).collect();
        assert_eq!(
            kinds,
            [ChunkKind::Mapped, ChunkKind::Owned, ChunkKind::Mapped]
        );
        assert_eq!(all(&store), b"abcXYdef");
    }

    #[test]
    fn typing_extends_the_owned_chunk() {
        let (_t, mut store) = mapped_store(b"ab", EngineConfig::default());

        for (i, byte) in b"hello".iter().enumerate() {
            store.insert(1 + i as u64, &[*byte]).unwrap();
        }

        assert_eq!(all(&store), b"ahellob");
        assert_eq!(store.chunk_count(), 3);
    }

    #[test]
    fn delete_middle_across_chunks() {
        let (_t, mut store) = mapped_store(b"hello cruel world", unmerged());

        store.insert(6, b"very ").unwrap();
        let removed = store.delete(4, 9).unwrap();

        assert_eq!(all(&store), b"helluel world");
        assert_eq!(Chunk::total_len(&removed), 9);
        let removed_bytes: Vec<u8> = removed
            .iter()
            .flat_map(|c| c.slice(0, c.len()).unwrap().to_vec())
            .collect();
        assert_eq!(removed_bytes, b"o very cr");
    }

    #[test]
    fn delete_everything_then_insert() {
        let (_t, mut store) = mapped_store(b"some content", EngineConfig::default());

        store.delete(0, store.len()).unwrap();
        assert_eq!(store.len(), 0);
        assert_eq!(store.chunk_count(), 0);

        store.insert(0, b"fresh").unwrap();
        assert_eq!(all(&store), b"fresh");
    }

    #[test]
    fn delete_out_of_range_changes_nothing() {
        let (_t, mut store) = mapped_store(b"abcdef", EngineConfig::default());

        assert!(store.delete(4, 3).is_err());
        assert!(store.delete(u64::MAX, 2).is_err());
        assert_eq!(all(&store), b"abcdef");
        assert_eq!(store.chunk_count(), 1);
    }

    #[test]
    fn reinserting_removed_mapped_range_rejoins_chunk() {
        let (_t, mut store) = mapped_store(b"0123456789", EngineConfig::default());

        let removed = store.delete(3, 4).unwrap();
        assert_eq!(store.chunk_count(), 2);

        store.insert_chunks(3, removed).unwrap();
        assert_eq!(all(&store), b"0123456789");
        assert_eq!(store.chunk_count(), 1);
    }

    #[test]
    fn overwrite_in_place_inside_owned_chunk() {
        let mut store = ChunkStore::from_bytes(b"abcdef", EngineConfig::default());

        let original = store.overwrite(1, b"XY").unwrap();

        assert_eq!(all(&store), b"aXYdef");
        assert_eq!(store.chunk_count(), 1);
        assert_eq!(original.len(), 1);
        assert_eq!(original[0].slice(0, 2).unwrap(), b"bc");
    }

    #[test]
    fn overwrite_spanning_chunks() {
        let (_t, mut store) = mapped_store(b"aaaa", unmerged());

        store.insert(2, b"b").unwrap();
        let original = store.overwrite(1, b"XYZ").unwrap();

        assert_eq!(all(&store), b"aXYZa");
        assert_eq!(Chunk::total_len(&original), 3);
        assert!(store.overwrite(3, b"123").is_err());
        assert_eq!(all(&store), b"aXYZa");
    }

    #[test]
    fn replace_restores_original_chunks() {
        let (_t, mut store) = mapped_store(b"0123456789", EngineConfig::default());

        let original = store.overwrite(2, b"abc").unwrap();
        store.replace(2, 3, original).unwrap();

        assert_eq!(all(&store), b"0123456789");
        assert_eq!(store.chunk_count(), 1);
    }

    #[test]
    fn reads_span_three_chunk_boundaries() {
        let (_t, mut store) = mapped_store(b"AAAABBBB", unmerged());

        store.insert(4, b"1").unwrap();
        store.insert(5, b"2").unwrap();
        store.insert(6, b"3").unwrap();

        assert!(store.chunk_count() >= 5);
        assert_eq!(all(&store), b"AAAA123BBBB");
        assert_eq!(store.read(3, 5).unwrap(), b"A123B");
        assert_eq!(store.read(5, 2).unwrap(), b"23");
        assert!(store.read(10, 2).is_err());
    }

    #[test]
    fn locate_maps_boundaries_to_following_chunk() {
        let (_t, mut store) = mapped_store(b"abcdef", unmerged());

        store.insert(3, b"X").unwrap();

        assert_eq!(store.locate(0), (0, 0));
        assert_eq!(store.locate(2), (0, 2));
        assert_eq!(store.locate(3), (1, 0));
        assert_eq!(store.locate(4), (2, 0));
        assert_eq!(store.locate(7), (3, 0));
    }

    #[test]
    fn compaction_merges_small_owned_chunks() {
        let config = EngineConfig {
            max_owned_chunk: 1,
            compact_interval: 8,
            max_chunks: usize::MAX,
            ..EngineConfig::default()
        };
        let mut store = ChunkStore::new(config);

        // Inserting at the front never extends an existing chunk.
        for i in 0..7u8 {
            store.insert(0, &[b'a' + i]).unwrap();
        }
        assert_eq!(store.chunk_count(), 7);

        let before = all(&store);
        store.config.max_owned_chunk = 1024;
        store.insert(0, b"!").unwrap();

        assert_eq!(store.chunk_count(), 1);
        assert_eq!(&all(&store)[1..], &before[..]);
    }

    #[test]
    fn clear_releases_everything() {
        let (_t, mut store) = mapped_store(b"abc", EngineConfig::default());

        store.clear();

        assert!(store.is_empty());
        assert_eq!(store.chunk_count(), 0);
        assert!(store.read(0, 0).unwrap().is_empty());
    }
}
