#[derive(Clone, Debug)]
pub enum Chunk {
    Owned(Vec<u8>),
    Mapped {
        file: std::sync::Arc<io::mmap::MappedFile>,
        /// Byte range inside the mapped file.
        range: std::ops::Range<u64>,
    },
}

impl Chunk {
    /// A chunk covering the whole of `file`.
    pub fn whole_file(
        file: std::sync::Arc<io::mmap::MappedFile>,
    ) -> Result<Self, std::num::TryFromIntError> {
        let len = <usize as TryInto<u64>>::try_into(file.len())?;

        Ok(Chunk::Mapped { file, range: 0..len })
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> u64 {
        match self {
            Chunk::Owned(bytes) => bytes.len() as u64,
            Chunk::Mapped { range, .. } => range.end - range.start,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> crate::enums::ChunkKind {
        match self {
            Chunk::Owned(_) => crate::enums::ChunkKind::Owned,
            Chunk::Mapped { .. } => crate::enums::ChunkKind::Mapped,
        }
    }

    /// Bytes `start..end`, relative to the chunk's own first byte.
    pub fn slice(&self, start: u64, end: u64) -> crate::errors::EngineResult<&[u8]> {
        let len = self.len();

        if start > end || end > len {
            return Err(crate::errors::EngineError::out_of_range(
                start,
                end.saturating_sub(start),
                len,
            ));
        }

        match self {
            Chunk::Owned(bytes) => {
                let s = <u64 as TryInto<usize>>::try_into(start)?;
                let e = <u64 as TryInto<usize>>::try_into(end)?;

                Ok(&bytes[s..e])
            }
            Chunk::Mapped { file, range } => {
                let s = <u64 as TryInto<usize>>::try_into(range.start + start)?;
                let n = <u64 as TryInto<usize>>::try_into(end - start)?;

                // Chunk ranges never extend past the mapping's length, which is
                // fixed when the file is mapped.
                file.bytes(s, n).ok_or_else(|| {
                    crate::errors::EngineError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("{} shrank while mapped", file.path().display()),
                    ))
                })
            }
        }
    }

    /// Splits the chunk at `at`, keeping `..at` in `self` and returning
    /// `at..`. `at` must lie strictly inside the chunk.
    pub(crate) fn split_off(&mut self, at: u64) -> crate::errors::EngineResult<Chunk> {
        debug_assert!(at > 0 && at < self.len());

        match self {
            Chunk::Owned(bytes) => {
                let at = <u64 as TryInto<usize>>::try_into(at)?;

                Ok(Chunk::Owned(bytes.split_off(at)))
            }
            Chunk::Mapped { file, range } => {
                let mid = range.start + at;
                let tail = Chunk::Mapped {
                    file: file.clone(),
                    range: mid..range.end,
                };
                range.end = mid;

                Ok(tail)
            }
        }
    }

    /// Appends `next` to `self` when both can be represented as one chunk:
    /// owned chunks whose combined size stays within `owned_limit`, or mapped
    /// chunks over adjacent ranges of the same mapping.
    pub(crate) fn try_absorb(&mut self, next: &Chunk, owned_limit: usize) -> bool {
        match (self, next) {
            (Chunk::Owned(bytes), Chunk::Owned(more)) => {
                if bytes.len().saturating_add(more.len()) > owned_limit {
                    return false;
                }
                bytes.extend_from_slice(more);

                true
            }
            (
                Chunk::Mapped { file, range },
                Chunk::Mapped {
                    file: next_file,
                    range: next_range,
                },
            ) => {
                if !std::sync::Arc::ptr_eq(file, next_file) || range.end != next_range.start {
                    return false;
                }
                range.end = next_range.end;

                true
            }
            _ => false,
        }
    }

    /// Total length of a run of chunks.
    #[must_use]
    pub fn total_len(chunks: &[Chunk]) -> u64 {
        chunks.iter().map(Chunk::len).sum()
    }
}
