//! Encoding helpers shared by every JOSE structure: unpadded base64url,
//! compact serialization and fixed-width big integers.

use ct_codecs::{Base64UrlSafeNoPadding, Decoder, Encoder};

use crate::error::*;

/// Encodes bytes as unpadded base64url.
pub fn base64url(data: impl AsRef<[u8]>) -> Result<String, Error> {
    Ok(Base64UrlSafeNoPadding::encode_to_string(data)?)
}

/// Decodes unpadded base64url.
pub fn from_base64url(text: &str) -> Result<Vec<u8>, Error> {
    Base64UrlSafeNoPadding::decode_to_vec(text, None)
        .map_err(|_| JoseError::illegal_argument("Invalid base64url encoding").into())
}

/// Splits a compact serialization into exactly `fields` segments.
///
/// Segments may be empty; two adjacent dots denote an empty field.
pub fn compact_split(token: &str, fields: usize) -> Result<Vec<&str>, Error> {
    let parts: Vec<&str> = token.split('.').collect();
    ensure!(parts.len() == fields, JoseError::CompactEncodingError);
    Ok(parts)
}

/// Joins segments with dots, base64url-encoding each one.
pub fn compact_join<S: AsRef<[u8]>>(segments: &[S]) -> Result<String, Error> {
    let mut compact = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            compact.push('.');
        }
        compact.push_str(&base64url(segment.as_ref())?);
    }
    Ok(compact)
}

/// 64-bit big-endian bit length of the additional authenticated data.
pub fn aad_length(aad: &[u8]) -> [u8; 8] {
    ((aad.len() as u64) * 8).to_be_bytes()
}

/// Removes leading zero bytes from an unsigned big-endian integer.
pub fn trim_leading_zeros(value: &[u8]) -> &[u8] {
    let start = value
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(value.len());
    &value[start..]
}

/// Left-pads an unsigned big-endian integer to `width` bytes.
pub fn to_fixed_width(value: &[u8], width: usize) -> Result<Vec<u8>, Error> {
    let value = trim_leading_zeros(value);
    ensure!(
        value.len() <= width,
        JoseError::illegal_argument(format!(
            "Integer of {} bytes doesn't fit in {} bytes",
            value.len(),
            width
        ))
    );
    let mut fixed = vec![0u8; width - value.len()];
    fixed.extend_from_slice(value);
    Ok(fixed)
}
