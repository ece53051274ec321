//! Turning user input into the raw byte patterns the finder compares.

use crate::errors::{EngineError, EngineResult};

/// Character sets a text search pattern can be encoded in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
    /// ISO-8859-1: one byte per character, code points above U+00FF rejected.
    Latin1,
}

/// Parses hexadecimal digit pairs, ignoring whitespace and an optional
/// `0x` prefix per group: `"de ad 0xBEEF"` → `[0xDE, 0xAD, 0xBE, 0xEF]`.
pub fn parse_hex(input: &str) -> EngineResult<Vec<u8>> {
    let mut digits = Vec::with_capacity(input.len());

    for group in input.split_whitespace() {
        let group = group
            .strip_prefix("0x")
            .or_else(|| group.strip_prefix("0X"))
            .unwrap_or(group);

        for ch in group.chars() {
            let digit = ch.to_digit(16).ok_or_else(|| {
                EngineError::InvalidPattern(format!("'{ch}' is not a hexadecimal digit"))
            })?;
            digits.push(digit as u8);
        }
    }

    if digits.is_empty() {
        return Err(EngineError::InvalidPattern(
            "no hexadecimal digits given".to_string(),
        ));
    }

    if digits.len() % 2 != 0 {
        return Err(EngineError::InvalidPattern(format!(
            "odd number of hexadecimal digits ({})",
            digits.len()
        )));
    }

    Ok(digits
        .chunks_exact(2)
        .map(|pair| (pair[0] << 4) | pair[1])
        .collect())
}

/// Encodes `text` as it would appear in a file using `encoding`.
pub fn encode_text(text: &str, encoding: TextEncoding) -> EngineResult<Vec<u8>> {
    if text.is_empty() {
        return Err(EngineError::InvalidPattern(
            "search text is empty".to_string(),
        ));
    }

    let bytes = match encoding {
        TextEncoding::Utf8 => text.as_bytes().to_vec(),
        TextEncoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
        TextEncoding::Utf16Be => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
        TextEncoding::Latin1 => text
            .chars()
            .map(|ch| {
                u8::try_from(u32::from(ch)).map_err(|_| {
                    EngineError::InvalidPattern(format!("'{ch}' has no ISO-8859-1 encoding"))
                })
            })
            .collect::<EngineResult<Vec<u8>>>()?,
    };

    Ok(bytes)
}
