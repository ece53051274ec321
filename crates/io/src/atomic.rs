use std::io::Write;

/// Writes a file through a sibling temporary file and renames it over
/// `target` once `fill` has succeeded and the bytes are synced.
///
/// The temporary file lives in the target's directory so the final rename
/// never crosses file systems. If `fill` or any I/O step fails the temporary
/// file is removed and `target` is left untouched.
///
/// # Errors
///
/// Returns whatever `fill` returns, or the I/O error of creating, syncing or
/// persisting the temporary file.
pub fn write_atomically<E, F>(target: &std::path::Path, fill: F) -> Result<u64, E>
where
    E: From<std::io::Error>,
    F: FnOnce(&mut dyn Write) -> Result<(), E>,
{
    let parent_dir = match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => std::path::Path::new("."),
    };
    let temp_file = tempfile::Builder::new()
        .prefix(".save_tmp_")
        .tempfile_in(parent_dir)?;
    let mut writer = CountingWriter {
        inner: std::io::BufWriter::new(temp_file),
        written: 0,
    };

    fill(&mut writer)?;

    let written = writer.written;
    let temp_file = writer.inner.into_inner().map_err(|e| e.into_error())?;

    temp_file.as_file().sync_all()?;
    temp_file.persist(target).map_err(|e| e.error)?;

    tracing::debug!(path = %target.display(), bytes = written, "wrote file");

    Ok(written)
}

struct CountingWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;

        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
