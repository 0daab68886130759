// String codec - direct length+bytes streams or dictionary encoding
//
// Direct: a LENGTH stream of per-value byte lengths plus one concatenated
// DATA blob. Dictionary: a DATA stream of indices into a deduplicated table,
// whose entries live in a DICTIONARY_DATA blob described by a LENGTH stream.
// Dictionary entries keep first-appearance order so encoding stays
// deterministic and single-pass after the value-collection pass.

use std::collections::{HashMap, HashSet};

use bstr::ByteVec;

use crate::codec::int;
use crate::error::DecodeError;

/// How a string column's DATA stream is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    Direct,
    Dictionary,
}

/// Pick an encoding for one stripe's non-null values.
///
/// A threshold of zero disables dictionary encoding. Otherwise the column
/// must clear the distinct-ratio bar and the dictionary estimate must beat
/// the direct estimate outright.
pub fn choose_encoding(values: &[&str], dict_key_size_threshold: f64) -> StringEncoding {
    if !(dict_key_size_threshold > 0.0) || values.is_empty() {
        return StringEncoding::Direct;
    }
    let mut distinct: HashSet<&str> = HashSet::new();
    let mut total_bytes = 0usize;
    let mut distinct_bytes = 0usize;
    for &value in values {
        total_bytes += value.len();
        if distinct.insert(value) {
            distinct_bytes += value.len();
        }
    }
    let ratio = distinct.len() as f64 / values.len() as f64;
    if ratio > dict_key_size_threshold {
        return StringEncoding::Direct;
    }
    // one byte per RLE'd length or index is a fair small-value estimate
    let direct_estimate = total_bytes + values.len();
    let dictionary_estimate = distinct_bytes + distinct.len() + values.len();
    if dictionary_estimate < direct_estimate {
        StringEncoding::Dictionary
    } else {
        StringEncoding::Direct
    }
}

/// Encode as (length stream, data blob)
pub fn encode_direct(values: &[&str]) -> (Vec<u8>, Vec<u8>) {
    let lengths: Vec<i64> = values.iter().map(|v| v.len() as i64).collect();
    let mut data = Vec::with_capacity(lengths.iter().sum::<i64>() as usize);
    for value in values {
        data.extend_from_slice(value.as_bytes());
    }
    (int::encode(&lengths), data)
}

pub fn decode_direct(
    length_stream: &[u8],
    data: &[u8],
    count: usize,
) -> Result<Vec<String>, DecodeError> {
    let lengths = int::decode(length_stream, count)?;
    let values = split_blob(data, &lengths)?;
    debug_assert_eq!(values.len(), count);
    Ok(values)
}

/// The three streams a dictionary-encoded column produces
#[derive(Debug, Clone)]
pub struct DictionaryStreams {
    /// Per-row dictionary indices (DATA stream)
    pub indices: Vec<u8>,
    /// Dictionary entry lengths (LENGTH stream)
    pub lengths: Vec<u8>,
    /// Concatenated dictionary entries (DICTIONARY_DATA stream)
    pub data: Vec<u8>,
    pub dictionary_size: usize,
}

pub fn encode_dictionary(values: &[&str]) -> DictionaryStreams {
    let mut table: HashMap<&str, i64> = HashMap::new();
    let mut entries: Vec<&str> = Vec::new();
    let mut indices = Vec::with_capacity(values.len());
    for &value in values {
        let next = entries.len() as i64;
        let index = *table.entry(value).or_insert_with(|| {
            entries.push(value);
            next
        });
        indices.push(index);
    }
    let lengths: Vec<i64> = entries.iter().map(|e| e.len() as i64).collect();
    let mut data = Vec::new();
    for entry in &entries {
        data.extend_from_slice(entry.as_bytes());
    }
    DictionaryStreams {
        indices: int::encode(&indices),
        lengths: int::encode(&lengths),
        data,
        dictionary_size: entries.len(),
    }
}

pub fn decode_dictionary(
    index_stream: &[u8],
    length_stream: &[u8],
    data: &[u8],
    count: usize,
    dictionary_size: usize,
) -> Result<Vec<String>, DecodeError> {
    let lengths = int::decode(length_stream, dictionary_size)?;
    let entries = split_blob(data, &lengths)?;
    let indices = int::decode(index_stream, count)?;
    let mut values = Vec::with_capacity(count);
    for raw in indices {
        let index = usize::try_from(raw)
            .map_err(|_| DecodeError::MalformedStream("negative dictionary index"))?;
        let entry = entries
            .get(index)
            .ok_or(DecodeError::DictionaryIndexOutOfRange {
                index,
                size: entries.len(),
            })?;
        values.push(entry.clone());
    }
    Ok(values)
}

/// Slice a concatenated blob by decoded lengths, validating UTF-8
fn split_blob(data: &[u8], lengths: &[i64]) -> Result<Vec<String>, DecodeError> {
    let mut values = Vec::with_capacity(lengths.len());
    let mut offset = 0usize;
    for &raw in lengths {
        let length = usize::try_from(raw)
            .map_err(|_| DecodeError::MalformedStream("negative string length"))?;
        let bytes = data
            .get(offset..offset + length)
            .ok_or(DecodeError::TruncatedStream {
                expected: offset + length,
                available: data.len(),
            })?;
        values.push(
            bytes
                .to_vec()
                .into_string()
                .map_err(|_| DecodeError::InvalidUtf8)?,
        );
        offset += length;
    }
    if offset != data.len() {
        return Err(DecodeError::MalformedStream("unused bytes in data blob"));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_threshold_disables_dictionary() {
        let values = vec!["a"; 100];
        assert_eq!(choose_encoding(&values, 0.0), StringEncoding::Direct);
    }

    #[test]
    fn test_low_cardinality_picks_dictionary() {
        let values: Vec<&str> = ["abcd", "efgh"].into_iter().cycle().take(64).collect();
        assert_eq!(choose_encoding(&values, 0.5), StringEncoding::Dictionary);
    }

    #[test]
    fn test_all_distinct_stays_direct() {
        let values = vec!["a", "cccccc", "ddd", "ee"];
        assert_eq!(choose_encoding(&values, 0.5), StringEncoding::Direct);
        // even a permissive threshold cannot make a dictionary of uniques pay
        assert_eq!(choose_encoding(&values, 1.0), StringEncoding::Direct);
    }

    #[test]
    fn test_direct_roundtrip() {
        let values = vec!["a", "cccccc", "", "ddd", "ee"];
        let (lengths, data) = encode_direct(&values);
        assert_eq!(decode_direct(&lengths, &data, 5).unwrap(), values);
    }

    #[test]
    fn test_dictionary_roundtrip_first_appearance_order() {
        let values = vec!["bb", "aa", "bb", "cc", "aa"];
        let streams = encode_dictionary(&values);
        assert_eq!(streams.dictionary_size, 3);
        // dictionary entries keep first-appearance order: bb, aa, cc
        let entry_lengths = int::decode(&streams.lengths, 3).unwrap();
        assert_eq!(entry_lengths, vec![2, 2, 2]);
        assert_eq!(streams.data, b"bbaacc");
        assert_eq!(int::decode(&streams.indices, 5).unwrap(), vec![0, 1, 0, 2, 1]);

        let decoded =
            decode_dictionary(&streams.indices, &streams.lengths, &streams.data, 5, 3).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_dictionary_index_out_of_range() {
        let streams = encode_dictionary(&["x", "y", "x"]);
        // claim a one-entry dictionary; index 1 must then be rejected
        let result = decode_dictionary(&streams.indices, &int::encode(&[1]), b"x", 3, 1);
        assert_eq!(
            result,
            Err(DecodeError::DictionaryIndexOutOfRange { index: 1, size: 1 })
        );
    }

    #[test]
    fn test_direct_truncated_blob() {
        let (lengths, data) = encode_direct(&["hello", "world"]);
        assert!(matches!(
            decode_direct(&lengths, &data[..8], 2),
            Err(DecodeError::TruncatedStream { .. })
        ));
    }

    #[test]
    fn test_direct_rejects_unused_bytes() {
        let (lengths, mut data) = encode_direct(&["ab", "cd"]);
        data.push(b'!');
        assert_eq!(
            decode_direct(&lengths, &data, 2),
            Err(DecodeError::MalformedStream("unused bytes in data blob"))
        );
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let result = decode_direct(&int::encode(&[2]), &[0xff, 0xfe], 1);
        assert_eq!(result, Err(DecodeError::InvalidUtf8));
    }

    #[test]
    fn test_unicode_lengths_are_bytes() {
        let values = vec!["héllo", "日本語", "🦀"];
        let (lengths, data) = encode_direct(&values);
        assert_eq!(int::decode(&lengths, 3).unwrap(), vec![6, 9, 4]);
        assert_eq!(decode_direct(&lengths, &data, 3).unwrap(), values);
    }
}
