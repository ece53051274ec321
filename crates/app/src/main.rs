use std::path::PathBuf;

use anyhow::{Context, Result};
use binary_core::config::EngineConfig;
use binary_core::enums::Direction;
use binary_core::pattern::{TextEncoding, encode_text, parse_hex};
use binary_session::ContentSession;
use clap::{Args, Parser, Subcommand, ValueEnum};
use util::cancel::CancelToken;

#[derive(Parser, Debug)]
#[command(name = "binedit", version, about = "Inspect and patch binary files")]
struct Cli {
    /// Engine settings as JSON; missing fields keep their defaults
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the length and layout of a file
    Info { file: PathBuf },

    /// Hex dump a range
    Dump {
        file: PathBuf,
        #[arg(long, default_value = "0", value_parser = parse_offset)]
        offset: u64,
        /// Bytes to show; the rest of the file when omitted
        #[arg(long, value_parser = parse_offset)]
        length: Option<u64>,
        #[arg(long, default_value_t = 16)]
        width: usize,
    },

    /// Search for a byte pattern
    Find {
        file: PathBuf,
        #[command(flatten)]
        pattern: PatternArgs,
        /// How --text is turned into bytes
        #[arg(long, value_enum, default_value = "utf8")]
        encoding: EncodingArg,
        /// Position the search moves away from
        #[arg(long, default_value = "0", value_parser = parse_offset)]
        from: u64,
        #[arg(long)]
        backward: bool,
        #[arg(long)]
        wrap: bool,
        /// List every match in file order
        #[arg(long, conflicts_with_all = ["from", "backward", "wrap"])]
        all: bool,
    },

    /// Apply one edit and save the result
    Patch {
        file: PathBuf,
        #[arg(long, value_parser = parse_offset)]
        at: u64,
        #[command(flatten)]
        edit: EditArgs,
        /// Write here instead of replacing FILE
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct PatternArgs {
    /// Hex digits, e.g. "de ad be ef"
    #[arg(long)]
    hex: Option<String>,
    #[arg(long)]
    text: Option<String>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct EditArgs {
    /// Hex bytes to insert at the offset
    #[arg(long, value_name = "HEX")]
    insert: Option<String>,
    /// Number of bytes to remove at the offset
    #[arg(long, value_name = "COUNT", value_parser = parse_offset)]
    delete: Option<u64>,
    /// Hex bytes to write over the offset
    #[arg(long, value_name = "HEX")]
    overwrite: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum EncodingArg {
    Utf8,
    Utf16le,
    Utf16be,
    Latin1,
}

impl From<EncodingArg> for TextEncoding {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::Utf8 => TextEncoding::Utf8,
            EncodingArg::Utf16le => TextEncoding::Utf16Le,
            EncodingArg::Utf16be => TextEncoding::Utf16Be,
            EncodingArg::Latin1 => TextEncoding::Latin1,
        }
    }
}

/// Decimal, or hexadecimal with a `0x` prefix.
fn parse_offset(raw: &str) -> Result<u64, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse(),
    };

    parsed.map_err(|e| format!("'{raw}' is not an offset: {e}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Info { file } => info(&open(&file, config)?),
        Command::Dump {
            file,
            offset,
            length,
            width,
        } => dump(&open(&file, config)?, offset, length, width),
        Command::Find {
            file,
            pattern,
            encoding,
            from,
            backward,
            wrap,
            all,
        } => {
            let session = open(&file, config)?;
            let pattern = pattern.bytes(encoding.into())?;

            if all {
                let hits = find_all(&session, &pattern)?;
                if hits.is_empty() {
                    println!("not found");
                }
                for hit in hits {
                    println!("{hit:#x}");
                }

                Ok(())
            } else {
                let direction = if backward {
                    Direction::Backward
                } else {
                    Direction::Forward
                };
                find_one(&session, &pattern, from, direction, wrap)
            }
        }
        Command::Patch {
            file,
            at,
            edit,
            output,
        } => {
            let target = output.unwrap_or_else(|| file.clone());
            let written = patch(&file, at, &edit, &target, config)?;
            println!("wrote {written} bytes to {}", target.display());

            Ok(())
        }
    }
}

fn open(file: &std::path::Path, config: EngineConfig) -> Result<ContentSession> {
    ContentSession::open_file(file, config)
        .with_context(|| format!("failed to open {}", file.display()))
}

fn info(session: &ContentSession) -> Result<()> {
    if let Some(path) = session.path() {
        println!("file:   {}", path.display());
    }
    println!("length: {} bytes", session.len()?);
    println!("chunks: {}", session.chunk_count()?);

    Ok(())
}

fn dump(session: &ContentSession, offset: u64, length: Option<u64>, width: usize) -> Result<()> {
    let total = session.len()?;
    let width = width.max(1);
    let length = length.unwrap_or_else(|| total.saturating_sub(offset));
    let bytes = session
        .read(offset, length)
        .with_context(|| format!("cannot read {length} bytes at {offset:#x}"))?;

    for (row, line) in bytes.chunks(width).enumerate() {
        println!("{}", hex_line(offset + (row * width) as u64, line, width));
    }

    Ok(())
}

fn hex_line(offset: u64, bytes: &[u8], width: usize) -> String {
    let mut hex = String::with_capacity(width * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            hex.push(' ');
        }
        hex.push_str(&format!("{byte:02x}"));
    }

    let ascii: String = bytes
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect();

    format!("{offset:08x}  {hex:<pad$}  |{ascii}|", pad = width * 3 - 1)
}

fn find_one(
    session: &ContentSession,
    pattern: &[u8],
    from: u64,
    direction: Direction,
    wrap: bool,
) -> Result<()> {
    match session.find(pattern, from, direction, wrap, &CancelToken::new())? {
        Some(hit) => println!("{hit:#x}"),
        None => println!("not found"),
    }

    Ok(())
}

/// Start offsets of every match, lowest first. Matches may overlap.
fn find_all(session: &ContentSession, pattern: &[u8]) -> Result<Vec<u64>> {
    let token = CancelToken::new();
    let total = session.len()?;

    // Wrapping from the end lands on the lowest match, including one at 0.
    let mut next = session.find(pattern, total, Direction::Forward, true, &token)?;
    let mut hits = Vec::new();

    while let Some(hit) = next {
        hits.push(hit);
        next = session.find(pattern, hit, Direction::Forward, false, &token)?;
    }

    tracing::debug!(count = hits.len(), "listed matches");

    Ok(hits)
}

/// Opens `file`, applies `edit` at `at` and saves to `target`. Returns the
/// length written.
fn patch(
    file: &std::path::Path,
    at: u64,
    edit: &EditArgs,
    target: &std::path::Path,
    config: EngineConfig,
) -> Result<u64> {
    let mut session = open(file, config)?;
    edit.apply(&mut session, at)
        .with_context(|| format!("cannot edit {} at {at:#x}", file.display()))?;

    session
        .save(target)
        .with_context(|| format!("failed to save {}", target.display()))?;

    Ok(session.len()?)
}

impl PatternArgs {
    fn bytes(&self, encoding: TextEncoding) -> Result<Vec<u8>> {
        let bytes = match (&self.hex, &self.text) {
            (Some(hex), _) => parse_hex(hex)?,
            (None, Some(text)) => encode_text(text, encoding)?,
            (None, None) => anyhow::bail!("give a pattern with --hex or --text"),
        };

        Ok(bytes)
    }
}

impl EditArgs {
    fn apply(&self, session: &mut ContentSession, at: u64) -> Result<()> {
        if let Some(hex) = &self.insert {
            session.insert(at, &parse_hex(hex)?)?;
        } else if let Some(count) = self.delete {
            session.delete(at, count)?;
        } else if let Some(hex) = &self.overwrite {
            session.overwrite(at, &parse_hex(hex)?)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{Cli, Command, ContentSession, dump, find_all, hex_line, parse_offset, patch};
    use binary_core::config::EngineConfig;
    use clap::Parser;

    fn file_with(content: &[u8]) -> tempfile::NamedTempFile {
        let mut temp = tempfile::NamedTempFile::new().unwrap();
        temp.write_all(content).unwrap();
        temp.as_file().sync_all().unwrap();
        temp
    }

    fn run_patch(args: &[&str]) -> anyhow::Result<u64> {
        let cli = Cli::try_parse_from(args).unwrap();
        let Command::Patch {
            file,
            at,
            edit,
            output,
        } = cli.command
        else {
            panic!("not a patch command");
        };
        let target = output.unwrap_or_else(|| file.clone());

        patch(&file, at, &edit, &target, EngineConfig::default())
    }

    #[test]
    fn offsets_in_both_radixes() {
        assert_eq!(parse_offset("42"), Ok(42));
        assert_eq!(parse_offset("0x2A"), Ok(42));
        assert!(parse_offset("0xZZ").is_err());
        assert!(parse_offset("-1").is_err());
    }

    #[test]
    fn hex_line_pads_short_rows() {
        assert_eq!(
            hex_line(0x10, b"AB\x00", 4),
            "00000010  41 42 00     |AB.|"
        );
    }

    #[test]
    fn pattern_flags_are_exclusive() {
        assert!(Cli::try_parse_from(["binedit", "find", "f.bin", "--hex", "00", "--text", "a"]).is_err());
        assert!(Cli::try_parse_from(["binedit", "find", "f.bin"]).is_err());
        assert!(Cli::try_parse_from(["binedit", "find", "f.bin", "--text", "a", "--all"]).is_ok());
        assert!(
            Cli::try_parse_from(["binedit", "find", "f.bin", "--text", "a", "--encoding", "utf16le"])
                .is_ok()
        );
    }

    #[test]
    fn patch_takes_one_edit() {
        assert!(
            Cli::try_parse_from(["binedit", "patch", "f.bin", "--at", "0", "--delete", "2"]).is_ok()
        );
        assert!(
            Cli::try_parse_from([
                "binedit", "patch", "f.bin", "--at", "0", "--delete", "2", "--insert", "00"
            ])
            .is_err()
        );
    }

    #[test]
    fn find_all_lists_matches_from_offset_zero() {
        let temp = file_with(b"ABxABxxAB");
        let session = ContentSession::open_file(temp.path(), EngineConfig::default()).unwrap();

        assert_eq!(find_all(&session, b"AB").unwrap(), vec![0, 3, 7]);
        assert_eq!(find_all(&session, b"zz").unwrap(), Vec::<u64>::new());
    }

    #[test]
    fn find_all_reports_overlapping_matches() {
        let temp = file_with(b"aaaa");
        let session = ContentSession::open_file(temp.path(), EngineConfig::default()).unwrap();

        assert_eq!(find_all(&session, b"aa").unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn patch_to_output_leaves_source_alone() {
        let source = file_with(b"0123456789");
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("patched.bin");
        let src = source.path().to_str().unwrap();
        let out = output.to_str().unwrap();

        let written = run_patch(&[
            "binedit", "patch", src, "--at", "0x2", "--insert", "ab cd", "--output", out,
        ])
        .unwrap();

        assert_eq!(written, 12);
        assert_eq!(std::fs::read(&output).unwrap(), b"01\xab\xcd23456789");
        assert_eq!(std::fs::read(source.path()).unwrap(), b"0123456789");
    }

    #[test]
    fn patch_in_place_overwrites_and_deletes() {
        let source = file_with(b"0123456789");
        let src = source.path().to_str().unwrap();

        run_patch(&["binedit", "patch", src, "--at", "0", "--overwrite", "41 42"]).unwrap();
        assert_eq!(std::fs::read(source.path()).unwrap(), b"AB23456789");

        run_patch(&["binedit", "patch", src, "--at", "8", "--delete", "2"]).unwrap();
        assert_eq!(std::fs::read(source.path()).unwrap(), b"AB234567");
    }

    #[test]
    fn failed_patch_writes_nothing() {
        let source = file_with(b"abc");
        let src = source.path().to_str().unwrap();

        assert!(run_patch(&["binedit", "patch", src, "--at", "2", "--delete", "5"]).is_err());
        assert!(run_patch(&["binedit", "patch", src, "--at", "0", "--insert", "zz"]).is_err());
        assert_eq!(std::fs::read(source.path()).unwrap(), b"abc");
    }

    #[test]
    fn dump_past_end_is_an_error() {
        let temp = file_with(b"abc");
        let session = ContentSession::open_file(temp.path(), EngineConfig::default()).unwrap();

        assert!(dump(&session, 0, Some(1 << 40), 16).is_err());
        assert!(dump(&session, 1, None, 16).is_ok());
    }
}
