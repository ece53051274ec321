//! Read-only views of files on disk.

/// A whole file mapped read-only.
///
/// The file handle lives as long as the mapping, so the bytes stay readable
/// even after the path is replaced by a save.
#[derive(Debug)]
pub struct MappedFile {
    _file: std::fs::File,
    map: memmap2::Mmap,
    path: std::path::PathBuf,
}

impl MappedFile {
    /// Whether `path` is a regular file with content. Zero-length files
    /// cannot be mapped on every platform.
    pub fn is_mappable(path: impl AsRef<std::path::Path>) -> std::io::Result<bool> {
        let meta = std::fs::metadata(path)?;

        Ok(meta.is_file() && meta.len() > 0)
    }

    /// Maps `path` read-only.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if `path` is not a regular file or is empty.
    /// - Any error from opening or mapping the file.
    pub fn open(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !Self::is_mappable(&path)? {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is empty or not a regular file", path.display()),
            ));
        }

        let file = std::fs::File::open(&path)?;

        // SAFETY:
        // - The file is opened read-only and the handle is kept in `self`
        // - Callers only ever get shared `&[u8]` views
        // - The file must not be truncated while mapped; reading a truncated
        //   tail faults instead of returning an error
        let map = unsafe { memmap2::Mmap::map(&file)? };

        tracing::debug!(path = %path.display(), len = map.len(), "mapped file");

        Ok(Self {
            _file: file,
            map,
            path,
        })
    }

    /// `length` bytes at `offset`, or `None` if that runs past the mapping.
    #[inline]
    #[must_use]
    pub fn bytes(&self, offset: usize, length: usize) -> Option<&[u8]> {
        self.map.get(offset..offset.checked_add(length)?)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}
