// Float codec - fixed-width little-endian IEEE-754 values
//
// No run-length scheme: floats rarely repeat bit-exactly, so each non-null
// value is stored verbatim.

use crate::error::DecodeError;

pub fn encode_f32(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn encode_f64(values: &[f64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 8);
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn decode_f32(bytes: &[u8], count: usize) -> Result<Vec<f32>, DecodeError> {
    check_len(bytes, count, 4)?;
    Ok(bytes
        .chunks_exact(4)
        .take(count)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect())
}

pub fn decode_f64(bytes: &[u8], count: usize) -> Result<Vec<f64>, DecodeError> {
    check_len(bytes, count, 8)?;
    Ok(bytes
        .chunks_exact(8)
        .take(count)
        .map(|chunk| f64::from_le_bytes(chunk.try_into().unwrap()))
        .collect())
}

fn check_len(bytes: &[u8], count: usize, width: usize) -> Result<(), DecodeError> {
    let expected = count * width;
    if bytes.len() < expected {
        return Err(DecodeError::TruncatedStream {
            expected,
            available: bytes.len(),
        });
    }
    Ok(())
}
