// Block compression framing for encoded streams
//
// A framed stream is a sequence of blocks, each prefixed by a 3-byte
// little-endian header of `(length << 1) | is_original`. Blocks that do not
// shrink under the codec are stored original. Block boundaries carry no
// meaning to the codecs above: an encoded value may straddle two blocks.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, Result, WriteError};

/// Maximum block length a 3-byte header can carry (23 bits)
const MAX_BLOCK_SIZE: usize = (1 << 23) - 1;

/// Whole-file compression codec
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Compression {
    /// No compression; blocks are framed but stored verbatim
    None,
    /// Raw deflate, per block
    Zlib,
    /// Zstd with configurable level (1-22), per block
    Zstd { level: i32 },
}

fn encode_block_header(length: usize, is_original: bool) -> [u8; 3] {
    debug_assert!(length <= MAX_BLOCK_SIZE);
    let value = ((length as u32) << 1) | u32::from(is_original);
    let bytes = value.to_le_bytes();
    [bytes[0], bytes[1], bytes[2]]
}

fn decode_block_header(bytes: &[u8]) -> (bool, usize) {
    let value = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
    (value & 1 == 1, (value >> 1) as usize)
}

/// Frame `raw` into length-prefixed blocks of at most `block_size` bytes
pub fn frame(raw: &[u8], block_size: usize, compression: Compression) -> Result<Vec<u8>> {
    let block_size = block_size.clamp(1, MAX_BLOCK_SIZE);
    let mut out = Vec::with_capacity(raw.len() + raw.len() / block_size * 3 + 3);
    for chunk in raw.chunks(block_size) {
        match compress_chunk(chunk, compression)? {
            Some(compressed) if compressed.len() < chunk.len() => {
                out.extend_from_slice(&encode_block_header(compressed.len(), false));
                out.extend_from_slice(&compressed);
            }
            _ => {
                out.extend_from_slice(&encode_block_header(chunk.len(), true));
                out.extend_from_slice(chunk);
            }
        }
    }
    Ok(out)
}

fn compress_chunk(chunk: &[u8], compression: Compression) -> Result<Option<Vec<u8>>> {
    match compression {
        Compression::None => Ok(None),
        Compression::Zlib => {
            let mut encoder =
                flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
            encoder
                .write_all(chunk)
                .and_then(|_| encoder.finish())
                .map(Some)
                .map_err(|e| WriteError::Compression(format!("deflate failed: {}", e)).into())
        }
        Compression::Zstd { level } => zstd::bulk::compress(chunk, level)
            .map(Some)
            .map_err(|e| WriteError::Compression(format!("zstd failed: {}", e)).into()),
    }
}

/// Reassemble the raw bytes of a framed stream
pub fn unframe(framed: &[u8], compression: Compression) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(framed.len());
    let mut pos = 0;
    while pos < framed.len() {
        if framed.len() - pos < 3 {
            return Err(DecodeError::MalformedBlockHeader {
                declared: 3,
                available: framed.len() - pos,
            }
            .into());
        }
        let (is_original, length) = decode_block_header(&framed[pos..]);
        pos += 3;
        if length > framed.len() - pos {
            return Err(DecodeError::MalformedBlockHeader {
                declared: length,
                available: framed.len() - pos,
            }
            .into());
        }
        let block = &framed[pos..pos + length];
        pos += length;
        if is_original {
            out.extend_from_slice(block);
        } else {
            decompress_chunk(block, compression, &mut out)?;
        }
    }
    Ok(out)
}

fn decompress_chunk(block: &[u8], compression: Compression, out: &mut Vec<u8>) -> Result<()> {
    match compression {
        Compression::None => Err(DecodeError::MalformedBlockHeader {
            declared: block.len(),
            available: 0,
        }
        .into()),
        Compression::Zlib => {
            let mut decoder = flate2::read::DeflateDecoder::new(block);
            decoder
                .read_to_end(out)
                .map(|_| ())
                .map_err(|e| DecodeError::Decompression(format!("deflate failed: {}", e)).into())
        }
        Compression::Zstd { .. } => {
            let decoded = zstd::stream::decode_all(block)
                .map_err(|e| DecodeError::Decompression(format!("zstd failed: {}", e)))?;
            out.extend_from_slice(&decoded);
            Ok(())
        }
    }
}
