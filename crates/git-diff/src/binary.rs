//! Binary file detection and `GIT binary patch` framing.
//!
//! Binary patches encode a zlib-deflated blob (the literal post-image, or a
//! binary delta against the pre-image) using Git's base85 alphabet, wrapped
//! in per-line length prefixes so the patch stays line-oriented like the rest
//! of a unified diff.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::DiffError;

/// Check if data appears to be binary by looking for null bytes.
///
/// Matches C git's buffer_is_binary(): checks the first 8KB for NUL bytes.
pub fn is_binary(data: &[u8]) -> bool {
    let check_len = data.len().min(8192);
    data[..check_len].contains(&0)
}

/// Git's 85-character base85 alphabet (digits, then upper, then lower, then
/// punctuation — not the Z85/RFC1924 ordering).
const ALPHABET: [u8; 85] = *b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz!#$%&()*+-;<=>?@^_`{|}~";

/// Maximum decoded bytes represented by one encoded line.
const MAX_LINE_BYTES: usize = 52;

/// A parsed `GIT binary patch` body: either the literal post-image or a
/// binary delta against the pre-image, both zlib-compressed before encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryPatch {
    /// Full replacement content. `size` is the decompressed (original) length.
    Literal { size: usize, zlib_data: Vec<u8> },
    /// A binary delta against the pre-image. `size` is the delta's decompressed length.
    Delta { size: usize, zlib_data: Vec<u8> },
}

impl BinaryPatch {
    /// Build a literal patch from the new file's raw content.
    pub fn literal(content: &[u8]) -> Result<Self, DiffError> {
        Ok(Self::Literal {
            size: content.len(),
            zlib_data: zlib_compress(content)?,
        })
    }

    /// Decompress and return this patch's payload (the literal content, or the
    /// raw binary delta bytes).
    pub fn decompress(&self) -> Result<Vec<u8>, DiffError> {
        let (size, zlib_data) = match self {
            Self::Literal { size, zlib_data } => (*size, zlib_data),
            Self::Delta { size, zlib_data } => (*size, zlib_data),
        };
        let data = zlib_decompress(zlib_data)?;
        if data.len() != size {
            return Err(DiffError::InvalidBase85(format!(
                "decompressed size {} does not match declared size {}",
                data.len(),
                size
            )));
        }
        Ok(data)
    }

    /// Render as the `GIT binary patch` body text (without the leading
    /// `GIT binary patch` header line or trailing blank line).
    pub fn format(&self) -> String {
        let (kind, size, zlib_data) = match self {
            Self::Literal { size, zlib_data } => ("literal", *size, zlib_data),
            Self::Delta { size, zlib_data } => ("delta", *size, zlib_data),
        };
        let mut out = format!("{kind} {size}\n");
        for line in zlib_data.chunks(MAX_LINE_BYTES) {
            out.push(length_prefix(line.len()));
            out.push_str(&encode_base85(line));
            out.push('\n');
        }
        out
    }

    /// Parse a `literal NNN` / `delta NNN` body (the lines following the
    /// `GIT binary patch` header, up to the blank terminator line).
    pub fn parse(lines: &[&str]) -> Result<Self, DiffError> {
        if lines.is_empty() {
            return Err(DiffError::InvalidBase85("empty binary patch body".into()));
        }

        let (kind, size) = parse_size_line(lines[0])?;

        let mut zlib_data = Vec::new();
        for line in &lines[1..] {
            if line.is_empty() {
                break;
            }
            let mut chars = line.chars();
            let prefix = chars.next().ok_or_else(|| {
                DiffError::InvalidBase85("missing length-prefix byte".into())
            })?;
            let decoded_len = decode_length_prefix(prefix)?;
            let rest: String = chars.collect();
            let decoded = decode_base85(&rest)?;
            if decoded.len() < decoded_len {
                return Err(DiffError::InvalidBase85(format!(
                    "line declares {decoded_len} bytes but only decoded {}",
                    decoded.len()
                )));
            }
            zlib_data.extend_from_slice(&decoded[..decoded_len]);
        }

        Ok(match kind {
            "literal" => Self::Literal { size, zlib_data },
            "delta" => Self::Delta { size, zlib_data },
            other => {
                return Err(DiffError::InvalidBase85(format!(
                    "unknown binary patch kind: {other}"
                )))
            }
        })
    }
}

fn parse_size_line(line: &str) -> Result<(&str, usize), DiffError> {
    let (kind, size_str) = line
        .split_once(' ')
        .ok_or_else(|| DiffError::InvalidBase85(format!("malformed size line: {line}")))?;
    let size: usize = size_str
        .trim()
        .parse()
        .map_err(|_| DiffError::InvalidBase85(format!("invalid size in: {line}")))?;
    Ok((kind, size))
}

/// Line length prefix byte: 'A'..'Z' for 1..26 decoded bytes, 'a'..'z' for 27..52.
fn length_prefix(len: usize) -> char {
    debug_assert!(len >= 1 && len <= MAX_LINE_BYTES);
    if len <= 26 {
        (b'A' + (len - 1) as u8) as char
    } else {
        (b'a' + (len - 27) as u8) as char
    }
}

fn decode_length_prefix(c: char) -> Result<usize, DiffError> {
    match c {
        'A'..='Z' => Ok((c as u8 - b'A') as usize + 1),
        'a'..='z' => Ok((c as u8 - b'a') as usize + 27),
        _ => Err(DiffError::InvalidBase85(format!(
            "invalid length-prefix byte: {c:?}"
        ))),
    }
}

/// Encode bytes (up to 52 at a time) as base85, in 4-byte groups of 5 characters.
fn encode_base85(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() / 4 + 1) * 5);
    for group in data.chunks(4) {
        let mut padded = [0u8; 4];
        padded[..group.len()].copy_from_slice(group);
        let mut acc = u32::from_be_bytes(padded);

        let mut chars = [0u8; 5];
        for slot in chars.iter_mut().rev() {
            *slot = ALPHABET[(acc % 85) as usize];
            acc /= 85;
        }
        out.push_str(std::str::from_utf8(&chars[..group.len() + 1]).unwrap());
    }
    out
}

/// Decode a base85 string back into bytes. The input length need not be a
/// multiple of 5; a short final group (as produced for a partial 4-byte
/// group during encoding) yields fewer than 4 bytes.
///
/// A full 5-character group decodes to a value that always fits in `u32`
/// (it's exactly what the encoder started from), but a padded partial group
/// can legitimately overshoot `u32::MAX` once the missing digits are filled
/// with the maximum symbol — hence the `u64` accumulator here.
fn decode_base85(data: &str) -> Result<Vec<u8>, DiffError> {
    let bytes = data.as_bytes();
    let mut out = Vec::with_capacity((bytes.len() / 5 + 1) * 4);

    for group in bytes.chunks(5) {
        let mut acc: u64 = 0;
        for &b in group {
            let digit = decode_char(b)? as u64;
            acc = acc * 85 + digit;
        }
        // Fill missing trailing digits with the maximum symbol (84), the
        // standard complement to zero-padding on the encode side.
        for _ in group.len()..5 {
            acc = acc * 85 + 84;
        }

        let real_bytes = group.len() - 1;
        let divisor = 256u64.pow((4 - real_bytes) as u32);
        let value = acc / divisor;
        let word = value.to_be_bytes();
        out.extend_from_slice(&word[8 - real_bytes..]);
    }

    Ok(out)
}

fn decode_char(b: u8) -> Result<u8, DiffError> {
    ALPHABET
        .iter()
        .position(|&c| c == b)
        .map(|pos| pos as u8)
        .ok_or_else(|| DiffError::InvalidBase85(format!("byte {:?} is outside the base85 alphabet", b as char)))
}

fn zlib_compress(data: &[u8]) -> Result<Vec<u8>, DiffError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zlib_decompress(data: &[u8]) -> Result<Vec<u8>, DiffError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_not_binary() {
        assert!(!is_binary(b"hello world\nthis is text\n"));
    }

    #[test]
    fn null_byte_is_binary() {
        assert!(is_binary(b"hello\x00world"));
    }

    #[test]
    fn empty_is_not_binary() {
        assert!(!is_binary(b""));
    }

    #[test]
    fn null_at_8k_boundary() {
        let mut data = vec![b'a'; 8192];
        assert!(!is_binary(&data));
        data[8191] = 0;
        assert!(is_binary(&data));
    }

    #[test]
    fn null_beyond_8k_not_detected() {
        let mut data = vec![b'a'; 10000];
        data[9000] = 0;
        assert!(!is_binary(&data));
    }

    #[test]
    fn base85_round_trips_arbitrary_lengths() {
        for len in [0usize, 1, 3, 4, 5, 7, 8, 52, 53, 100] {
            let data: Vec<u8> = (0..len).map(|i| (i * 37 % 256) as u8).collect();
            let encoded = encode_base85(&data);
            let decoded = decode_base85(&encoded).unwrap();
            assert_eq!(&decoded[..data.len()], &data[..]);
        }
    }

    #[test]
    fn decode_base85_rejects_out_of_alphabet_byte() {
        assert!(decode_base85("\"\"\"\"\"").is_err());
    }

    #[test]
    fn literal_patch_round_trips() {
        let content = b"the quick brown fox jumps over the lazy dog, repeated a bit\n".repeat(3);
        let patch = BinaryPatch::literal(&content).unwrap();
        let formatted = patch.format();

        let lines: Vec<&str> = formatted.lines().collect();
        let parsed = BinaryPatch::parse(&lines).unwrap();
        assert_eq!(parsed, patch);
        assert_eq!(parsed.decompress().unwrap(), content);
    }

    #[test]
    fn length_prefix_round_trips() {
        for len in 1..=52 {
            let c = length_prefix(len);
            assert_eq!(decode_length_prefix(c).unwrap(), len);
        }
    }

    #[test]
    fn decompress_rejects_size_mismatch() {
        let patch = BinaryPatch::literal(b"hello").unwrap();
        let tampered = BinaryPatch::Literal {
            size: 999,
            zlib_data: match patch {
                BinaryPatch::Literal { zlib_data, .. } => zlib_data,
                _ => unreachable!(),
            },
        };
        assert!(tampered.decompress().is_err());
    }
}
