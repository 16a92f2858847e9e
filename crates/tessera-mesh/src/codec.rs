//! Little-endian binary primitives and a line-oriented text reader.
//!
//! Shared by the mesh file formats and by payload implementations so every
//! layer of a model file is encoded the same way.

use std::io::{Read, Write};

use crate::error::MeshError;

/// Largest string length accepted when reading, in bytes.
const MAX_STRING_LEN: u32 = 1 << 20;

// ---------------------------------------------------------------------------
// Binary writers
// ---------------------------------------------------------------------------

/// Write one byte.
pub fn write_u8(out: &mut dyn Write, value: u8) -> Result<(), MeshError> {
    out.write_all(&[value])?;
    Ok(())
}

/// Write a `u32`, little-endian.
pub fn write_u32(out: &mut dyn Write, value: u32) -> Result<(), MeshError> {
    out.write_all(&value.to_le_bytes())?;
    Ok(())
}

/// Write a `usize` as a `u32` count.
pub fn write_count(out: &mut dyn Write, value: usize) -> Result<(), MeshError> {
    let value = u32::try_from(value)
        .map_err(|err| MeshError::Format(format!("count {value}: {err}")))?;
    write_u32(out, value)
}

/// Write an `f64`, little-endian IEEE-754 bits.
pub fn write_f64(out: &mut dyn Write, value: f64) -> Result<(), MeshError> {
    out.write_all(&value.to_le_bytes())?;
    Ok(())
}

/// Write a length-prefixed UTF-8 string.
pub fn write_str(out: &mut dyn Write, value: &str) -> Result<(), MeshError> {
    write_count(out, value.len())?;
    out.write_all(value.as_bytes())?;
    Ok(())
}

/// Write 16 raw bytes (a UUID).
pub fn write_bytes16(out: &mut dyn Write, value: &[u8; 16]) -> Result<(), MeshError> {
    out.write_all(value)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Binary readers
// ---------------------------------------------------------------------------

/// Read one byte.
pub fn read_u8(input: &mut dyn Read) -> Result<u8, MeshError> {
    let mut b = [0u8; 1];
    input.read_exact(&mut b)?;
    Ok(u8::from_le_bytes(b))
}

/// Read a little-endian `u32`.
pub fn read_u32(input: &mut dyn Read) -> Result<u32, MeshError> {
    let mut b = [0u8; 4];
    input.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

/// Read a `u32` count as `usize`.
pub fn read_count(input: &mut dyn Read) -> Result<usize, MeshError> {
    let value = read_u32(input)?;
    usize::try_from(value).map_err(|err| MeshError::Format(format!("count {value}: {err}")))
}

/// Read a little-endian `f64`.
pub fn read_f64(input: &mut dyn Read) -> Result<f64, MeshError> {
    let mut b = [0u8; 8];
    input.read_exact(&mut b)?;
    Ok(f64::from_le_bytes(b))
}

/// Read a length-prefixed UTF-8 string.
pub fn read_str(input: &mut dyn Read) -> Result<String, MeshError> {
    let len = read_u32(input)?;
    if len > MAX_STRING_LEN {
        return Err(MeshError::Format(format!("string length {len} exceeds limit")));
    }
    let len = usize::try_from(len).map_err(|err| MeshError::Format(format!("string length {len}: {err}")))?;
    let mut buf = vec![0u8; len];
    input.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| MeshError::Format(format!("invalid utf-8: {e}")))
}

/// Read 16 raw bytes.
pub fn read_bytes16(input: &mut dyn Read) -> Result<[u8; 16], MeshError> {
    let mut b = [0u8; 16];
    input.read_exact(&mut b)?;
    Ok(b)
}

/// Read and check a magic prefix.
pub fn expect_magic(input: &mut dyn Read, magic: &[u8; 8], what: &'static str) -> Result<(), MeshError> {
    let mut b = [0u8; 8];
    input.read_exact(&mut b)?;
    if &b == magic {
        Ok(())
    } else {
        Err(MeshError::BadMagic { expected: what })
    }
}

// ---------------------------------------------------------------------------
// Text
// ---------------------------------------------------------------------------

/// Cursor over the lines of an in-memory text document.
///
/// Every accessor consumes one line. Errors carry the one-based line number.
#[derive(Debug)]
pub struct TextReader<'a> {
    lines: core::str::Lines<'a>,
    line_no: usize,
}

impl<'a> TextReader<'a> {
    /// Start reading at the first line of `text`.
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines(),
            line_no: 0,
        }
    }

    /// Current one-based line number (the last line returned).
    pub const fn line_no(&self) -> usize {
        self.line_no
    }

    /// Build a parse error at the current line.
    pub fn error(&self, message: impl Into<String>) -> MeshError {
        MeshError::Parse {
            line: self.line_no,
            message: message.into(),
        }
    }

    /// The next line, trimmed.
    pub fn next_line(&mut self) -> Result<&'a str, MeshError> {
        self.line_no = self.line_no.saturating_add(1);
        self.lines
            .next()
            .map(str::trim)
            .ok_or_else(|| self.error("unexpected end of input"))
    }

    /// The next line, which must start with `keyword`; returns the remainder.
    pub fn keyword(&mut self, keyword: &str) -> Result<&'a str, MeshError> {
        let line = self.next_line()?;
        let (head, rest) = line.split_once(' ').unwrap_or((line, ""));
        if head == keyword {
            Ok(rest.trim())
        } else {
            Err(self.error(format!("expected '{keyword}', found '{head}'")))
        }
    }

    /// Parse one whitespace-free field.
    pub fn parse<T>(&self, field: &str, what: &str) -> Result<T, MeshError>
    where
        T: core::str::FromStr,
        T::Err: core::fmt::Display,
    {
        field
            .parse()
            .map_err(|err| self.error(format!("invalid {what} '{field}': {err}")))
    }

    /// Parse exactly `N` whitespace-separated fields of one type.
    pub fn parse_fields<T, const N: usize>(&self, line: &str, what: &str) -> Result<[T; N], MeshError>
    where
        T: core::str::FromStr + Copy + Default,
        T::Err: core::fmt::Display,
    {
        let mut out = [T::default(); N];
        let mut fields = line.split_whitespace();
        for slot in &mut out {
            let field = fields
                .next()
                .ok_or_else(|| self.error(format!("too few {what} fields")))?;
            *slot = self.parse(field, what)?;
        }
        if fields.next().is_some() {
            return Err(self.error(format!("too many {what} fields")));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn binary_primitives_are_exact() {
        let mut buf = Vec::new();
        write_u8(&mut buf, 7).unwrap();
        write_u32(&mut buf, 0xDEAD_BEEF).unwrap();
        write_f64(&mut buf, -0.0).unwrap();
        write_f64(&mut buf, f64::MIN_POSITIVE).unwrap();
        write_str(&mut buf, "Pn").unwrap();

        let mut input = buf.as_slice();
        assert_eq!(read_u8(&mut input).unwrap(), 7);
        assert_eq!(read_u32(&mut input).unwrap(), 0xDEAD_BEEF);
        assert_eq!(read_f64(&mut input).unwrap().to_bits(), (-0.0f64).to_bits());
        assert_eq!(read_f64(&mut input).unwrap().to_bits(), f64::MIN_POSITIVE.to_bits());
        assert_eq!(read_str(&mut input).unwrap(), "Pn");
        assert!(input.is_empty());
    }

    #[test]
    fn truncated_string_is_rejected() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 10).unwrap();
        buf.extend_from_slice(b"abc");
        assert!(matches!(read_str(&mut buf.as_slice()), Err(MeshError::Io(_))));
    }

    #[test]
    fn magic_mismatch() {
        let buf = *b"NOTMAGIC";
        let result = expect_magic(&mut buf.as_slice(), b"TESSGRID", "grid");
        assert!(matches!(result, Err(MeshError::BadMagic { expected: "grid" })));
    }

    #[test]
    fn text_reader_tracks_lines() {
        let mut r = TextReader::new("vertices 2\n1 2 3\n");
        assert_eq!(r.keyword("vertices").unwrap(), "2");
        let line = r.next_line().unwrap();
        let v: [f64; 3] = r.parse_fields(line, "coordinate").unwrap();
        assert_eq!(v.len(), 3);
        let err = r.next_line().unwrap_err();
        assert!(matches!(err, MeshError::Parse { line: 3, .. }));
    }

    #[test]
    fn text_reader_rejects_wrong_keyword() {
        let mut r = TextReader::new("layers 1\n");
        assert!(matches!(r.keyword("vertices"), Err(MeshError::Parse { line: 1, .. })));
    }
}
