/// Largest accepted `scan_block`; a search allocates one block per read.
pub const MAX_SCAN_BLOCK: usize = 64 * 1024 * 1024;

/// Tuning knobs for the content engine.
///
/// Every field has a default, so a configuration file only needs to name the
/// values it wants to change.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound for an owned chunk grown by typing or by compaction.
    pub max_owned_chunk: usize,
    /// Number of mutations between two compaction passes.
    pub compact_interval: usize,
    /// Chunk count that forces compaction before `compact_interval` is reached.
    pub max_chunks: usize,
    /// Bytes scanned between two polls of a search's cancellation signal.
    pub scan_block: usize,
    /// Largest edit, in bytes, that may be coalesced into the previous one.
    pub coalesce_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_owned_chunk: 64 * 1024,
            compact_interval: 256,
            max_chunks: 4096,
            scan_block: 64 * 1024,
            coalesce_limit: 1,
        }
    }
}

impl EngineConfig {
    /// Reads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or one of kind
    /// `InvalidData` if it is not valid configuration JSON.
    pub fn load(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        tracing::debug!(path = %path.as_ref().display(), ?config, "loaded engine config");

        Ok(config.sanitized())
    }

    /// Clamps values that would stall the engine (zero-sized blocks or
    /// chunks) to their smallest workable setting, and caps `scan_block`
    /// at [`MAX_SCAN_BLOCK`].
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        self.max_owned_chunk = self.max_owned_chunk.max(1);
        self.compact_interval = self.compact_interval.max(1);
        self.max_chunks = self.max_chunks.max(1);
        self.scan_block = self.scan_block.clamp(1, MAX_SCAN_BLOCK);
        self
    }
}
