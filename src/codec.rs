//! UTF-8 byte encoding of UTF-16 text.
//!
//! Request signatures are computed over UTF-8 bytes, but text handed to the
//! scrobbler by some hosts is a sequence of UTF-16 code units that may
//! contain unpaired surrogates. This module converts between the two
//! representations:
//!
//! * [`to_code_points`] joins surrogate pairs and passes unpaired
//!   surrogates through unchanged
//! * [`to_utf8_bytes`] encodes code points as UTF-8 and refuses lone
//!   surrogates
//! * [`from_code_points`] splits code points back into UTF-16 units
//! * [`decode`] validates UTF-8 bytes and returns their code points
//!
//! # Example
//!
//! ```rust
//! use scrobbler::codec;
//!
//! let units: Vec<u16> = "Sigur Rós".encode_utf16().collect();
//! let bytes = codec::to_utf8_bytes(&units)?;
//! assert_eq!(bytes, "Sigur Rós".as_bytes());
//!
//! let lone = [0x0041, 0xD800];
//! assert!(codec::to_utf8_bytes(&lone).is_err());
//! ```

use thiserror::Error;

/// Highest Unicode code point.
const MAX_CODE_POINT: u32 = 0x10_FFFF;

/// Failures while converting text.
#[derive(Clone, Copy, Debug, Eq, Error, Hash, PartialEq)]
pub enum Error {
    /// A surrogate or out-of-range code point cannot be encoded.
    #[error("code point U+{0:04X} is not a scalar value")]
    InvalidScalarValue(u32),

    /// The bytes are not well-formed UTF-8.
    #[error("invalid UTF-8 byte sequence at offset {offset}")]
    InvalidByteSequence { offset: usize },
}

/// Converts UTF-16 code units into code points.
///
/// Surrogate pairs are combined. An unmatched surrogate is emitted as-is,
/// and when a high surrogate is followed by something other than a low
/// surrogate, that following unit is decoded on its own.
#[must_use]
pub fn to_code_points(text: &[u16]) -> Vec<u32> {
    char::decode_utf16(text.iter().copied())
        .map(|unit| match unit {
            Ok(chr) => u32::from(chr),
            Err(e) => u32::from(e.unpaired_surrogate()),
        })
        .collect()
}

/// Converts code points into UTF-16 code units.
///
/// Code points above the Basic Multilingual Plane are split into surrogate
/// pairs. Surrogates themselves are copied unchanged so that
/// [`to_code_points`] round-trips.
///
/// # Errors
///
/// Returns [`Error::InvalidScalarValue`] for code points above U+10FFFF.
#[expect(clippy::cast_possible_truncation)]
pub fn from_code_points(code_points: &[u32]) -> Result<Vec<u16>, Error> {
    let mut units = Vec::with_capacity(code_points.len());
    for &code_point in code_points {
        if let Ok(unit) = u16::try_from(code_point) {
            units.push(unit);
            continue;
        }

        if code_point > MAX_CODE_POINT {
            return Err(Error::InvalidScalarValue(code_point));
        }

        // Both halves fit in 10 bits, so the casts cannot truncate.
        let offset = code_point - 0x1_0000;
        units.push(0xD800 | ((offset >> 10) & 0x3FF) as u16);
        units.push(0xDC00 | (offset & 0x3FF) as u16);
    }

    Ok(units)
}

/// Appends the UTF-8 encoding of a single code point to `bytes`.
///
/// The encoded length follows the code point's magnitude: one byte below
/// U+0080, two below U+0800, three below U+10000 and four up to U+10FFFF.
///
/// # Errors
///
/// Returns [`Error::InvalidScalarValue`] for surrogates (U+D800 to U+DFFF)
/// and for code points above U+10FFFF.
pub fn encode_code_point(code_point: u32, bytes: &mut Vec<u8>) -> Result<(), Error> {
    let chr = char::from_u32(code_point).ok_or(Error::InvalidScalarValue(code_point))?;

    let mut buffer = [0; 4];
    bytes.extend_from_slice(chr.encode_utf8(&mut buffer).as_bytes());

    Ok(())
}

/// Encodes UTF-16 text as UTF-8 bytes.
///
/// # Errors
///
/// Returns [`Error::InvalidScalarValue`] when the text contains an unpaired
/// surrogate.
pub fn to_utf8_bytes(text: &[u16]) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::with_capacity(text.len());
    for code_point in to_code_points(text) {
        encode_code_point(code_point, &mut bytes)?;
    }

    Ok(bytes)
}

/// Decodes UTF-8 bytes into code points.
///
/// # Errors
///
/// Returns [`Error::InvalidByteSequence`] with the offset of the first
/// offending byte for truncated sequences, stray continuation bytes,
/// overlong forms, encoded surrogates and values above U+10FFFF.
pub fn decode(bytes: &[u8]) -> Result<Vec<u32>, Error> {
    let text = std::str::from_utf8(bytes).map_err(|e| Error::InvalidByteSequence {
        offset: e.valid_up_to(),
    })?;

    Ok(text.chars().map(u32::from).collect())
}
