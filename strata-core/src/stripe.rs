// Stripe layer - writing and reading one independently decodable row batch
//
// A stripe is the unit of encoding: every column's buffered values become a
// set of framed streams, and a binary footer at the tail of the stripe
// records per-stream byte ranges plus each column's chosen encoding.
//
// Stripe layout:
// ```text
// [framed stream 0][framed stream 1]...[stripe footer][footer_len: u32 LE]
// ```

use std::io::Write;

use crate::codec::string::StringEncoding;
use crate::codec::{boolean, float, int, string};
use crate::compression::{self, Compression};
use crate::data::{Row, Value};
use crate::error::{DecodeError, Result, WriteError};
use crate::schema::{PrimitiveType, Schema};

/// Writer configuration, threaded into each writer at construction.
/// No process-wide defaults exist.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub compression: Compression,
    /// Framer chunk size in bytes
    pub compression_block_size: usize,
    /// Dictionary-vs-direct selection threshold in [0, 1]; 0 disables
    /// dictionary encoding
    pub dict_key_size_threshold: f64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            compression: Compression::None,
            compression_block_size: 64 * 1024,
            dict_key_size_threshold: 0.0,
        }
    }
}

/// Stream kinds a column can own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Present,
    Data,
    Length,
    DictionaryData,
}

impl StreamKind {
    fn to_u8(self) -> u8 {
        match self {
            StreamKind::Present => 0,
            StreamKind::Data => 1,
            StreamKind::Length => 2,
            StreamKind::DictionaryData => 3,
        }
    }

    fn from_u8(tag: u8) -> Result<Self, DecodeError> {
        match tag {
            0 => Ok(StreamKind::Present),
            1 => Ok(StreamKind::Data),
            2 => Ok(StreamKind::Length),
            3 => Ok(StreamKind::DictionaryData),
            _ => Err(DecodeError::CorruptStripe(format!(
                "unknown stream kind tag {}",
                tag
            ))),
        }
    }
}

/// Byte range of one encoded stream within the stripe's data region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub column: u32,
    pub kind: StreamKind,
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnEncodingKind {
    Direct,
    Dictionary,
}

/// Per-column encoding choice recorded in the stripe footer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnEncoding {
    pub kind: ColumnEncodingKind,
    /// Distinct entry count for dictionary-encoded columns, 0 otherwise
    pub dictionary_size: u32,
}

/// Stripe footer: stream directory plus per-column encodings
#[derive(Debug, Clone, PartialEq)]
pub struct StripeFooter {
    pub row_count: u64,
    pub streams: Vec<StreamInfo>,
    pub columns: Vec<ColumnEncoding>,
}

impl StripeFooter {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_u64(&mut out, self.row_count);
        write_u32(&mut out, self.streams.len() as u32);
        for stream in &self.streams {
            write_u32(&mut out, stream.column);
            out.push(stream.kind.to_u8());
            write_u64(&mut out, stream.offset);
            write_u64(&mut out, stream.length);
        }
        write_u32(&mut out, self.columns.len() as u32);
        for column in &self.columns {
            out.push(match column.kind {
                ColumnEncodingKind::Direct => 0,
                ColumnEncodingKind::Dictionary => 1,
            });
            write_u32(&mut out, column.dictionary_size);
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut pos = 0;
        let row_count = read_u64(bytes, &mut pos)?;

        let stream_count = read_u32(bytes, &mut pos)? as usize;
        // 21 bytes per entry; reject counts the remaining bytes cannot hold
        if stream_count > (bytes.len() - pos) / 21 {
            return Err(DecodeError::CorruptStripe(
                "stream count exceeds footer size".to_string(),
            ));
        }
        let mut streams = Vec::with_capacity(stream_count);
        for _ in 0..stream_count {
            let column = read_u32(bytes, &mut pos)?;
            let kind = StreamKind::from_u8(read_u8(bytes, &mut pos)?)?;
            let offset = read_u64(bytes, &mut pos)?;
            let length = read_u64(bytes, &mut pos)?;
            streams.push(StreamInfo {
                column,
                kind,
                offset,
                length,
            });
        }

        let column_count = read_u32(bytes, &mut pos)? as usize;
        if column_count > (bytes.len() - pos) / 5 {
            return Err(DecodeError::CorruptStripe(
                "column count exceeds footer size".to_string(),
            ));
        }
        let mut columns = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            let kind = match read_u8(bytes, &mut pos)? {
                0 => ColumnEncodingKind::Direct,
                1 => ColumnEncodingKind::Dictionary,
                tag => {
                    return Err(DecodeError::CorruptStripe(format!(
                        "unknown column encoding tag {}",
                        tag
                    )))
                }
            };
            let dictionary_size = read_u32(bytes, &mut pos)?;
            columns.push(ColumnEncoding {
                kind,
                dictionary_size,
            });
        }

        if pos != bytes.len() {
            return Err(DecodeError::CorruptStripe(
                "trailing bytes in stripe footer".to_string(),
            ));
        }
        Ok(StripeFooter {
            row_count,
            streams,
            columns,
        })
    }
}

/// A closed, immutable stripe
#[derive(Debug, Clone, PartialEq)]
pub struct Stripe {
    data: Vec<u8>,
    footer: StripeFooter,
}

impl Stripe {
    pub fn footer(&self) -> &StripeFooter {
        &self.footer
    }

    pub fn row_count(&self) -> u64 {
        self.footer.row_count
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let footer = self.footer.to_bytes();
        let mut out = Vec::with_capacity(self.data.len() + footer.len() + 4);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&footer);
        write_u32(&mut out, footer.len() as u32);
        out
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<u64> {
        let bytes = self.to_bytes();
        writer.write_all(&bytes)?;
        Ok(bytes.len() as u64)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < 4 {
            return Err(DecodeError::CorruptStripe(
                "stripe shorter than footer length field".to_string(),
            ));
        }
        let mut pos = bytes.len() - 4;
        let footer_len = read_u32(bytes, &mut pos)? as usize;
        let data_len = bytes
            .len()
            .checked_sub(4 + footer_len)
            .ok_or_else(|| DecodeError::CorruptStripe("footer length overruns stripe".to_string()))?;
        let footer = StripeFooter::from_bytes(&bytes[data_len..bytes.len() - 4])?;
        Ok(Stripe {
            data: bytes[..data_len].to_vec(),
            footer,
        })
    }
}

/// Buffers rows for one stripe and encodes them on close.
///
/// The writer owns its buffers exclusively; closing either encodes every
/// column or fails, leaving the stripe unusable. Prior stripes are
/// unaffected either way.
pub struct StripeWriter {
    schema: Schema,
    config: WriterConfig,
    columns: Vec<Vec<Option<Value>>>,
    row_count: usize,
    closed: bool,
}

impl StripeWriter {
    pub fn new(schema: Schema, config: WriterConfig) -> Self {
        let columns = vec![Vec::new(); schema.arity()];
        StripeWriter {
            schema,
            config,
            columns,
            row_count: 0,
            closed: false,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Rows buffered since the stripe was opened
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Append one row. Null is accepted for any column type.
    pub fn write(&mut self, row: Row) -> Result<()> {
        if self.closed {
            return Err(WriteError::WriterClosed.into());
        }
        if row.len() != self.schema.arity() {
            return Err(WriteError::SchemaArityMismatch {
                expected: self.schema.arity(),
                actual: row.len(),
            }
            .into());
        }
        for (index, value) in row.iter().enumerate() {
            self.check_value(index, value.as_ref())?;
        }
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.push(value);
        }
        self.row_count += 1;
        Ok(())
    }

    /// Append a columnar batch: one optional-value sequence per column, all
    /// of equal length.
    pub fn write_columns(&mut self, batch: Vec<Vec<Option<Value>>>) -> Result<()> {
        if self.closed {
            return Err(WriteError::WriterClosed.into());
        }
        if batch.len() != self.schema.arity() {
            return Err(WriteError::SchemaArityMismatch {
                expected: self.schema.arity(),
                actual: batch.len(),
            }
            .into());
        }
        let rows = batch.first().map_or(0, Vec::len);
        for column in &batch {
            if column.len() != rows {
                return Err(WriteError::SchemaArityMismatch {
                    expected: rows,
                    actual: column.len(),
                }
                .into());
            }
        }
        for (index, column) in batch.iter().enumerate() {
            for value in column {
                self.check_value(index, value.as_ref())?;
            }
        }
        for (column, values) in self.columns.iter_mut().zip(batch) {
            column.extend(values);
        }
        self.row_count += rows;
        Ok(())
    }

    fn check_value(&self, column: usize, value: Option<&Value>) -> Result<(), WriteError> {
        let value = match value {
            Some(value) => value,
            None => return Ok(()),
        };
        let ty = &self.schema.fields()[column].ty;
        if !value.matches(ty) {
            return Err(WriteError::TypeMismatch {
                column,
                expected: ty.name().to_string(),
                actual: value.kind().to_string(),
            });
        }
        Ok(())
    }

    /// Encode all buffered columns and seal the stripe.
    ///
    /// Per column, in declaration order: derive the present bitmap, run the
    /// column's codec, frame each stream, and record the stream ranges and
    /// encoding in the footer. Further writes fail with `WriterClosed`.
    pub fn close(&mut self) -> Result<Stripe> {
        if self.closed {
            return Err(WriteError::WriterClosed.into());
        }
        self.closed = true;
        let buffers = std::mem::take(&mut self.columns);

        let mut data = Vec::new();
        let mut streams = Vec::new();
        let mut columns = Vec::with_capacity(self.schema.arity());
        for (index, values) in buffers.iter().enumerate() {
            let (raw_streams, encoding) = self.encode_column(index, values)?;
            columns.push(encoding);
            for (kind, raw) in raw_streams {
                let framed = compression::frame(
                    &raw,
                    self.config.compression_block_size,
                    self.config.compression,
                )?;
                streams.push(StreamInfo {
                    column: index as u32,
                    kind,
                    offset: data.len() as u64,
                    length: framed.len() as u64,
                });
                data.extend_from_slice(&framed);
            }
        }

        Ok(Stripe {
            data,
            footer: StripeFooter {
                row_count: self.row_count as u64,
                streams,
                columns,
            },
        })
    }

    fn encode_column(
        &self,
        index: usize,
        values: &[Option<Value>],
    ) -> Result<(Vec<(StreamKind, Vec<u8>)>, ColumnEncoding)> {
        let present: Vec<bool> = values.iter().map(Option::is_some).collect();
        let non_null = boolean::popcount(&present);

        let mut streams = Vec::new();
        // a column with no nulls omits its present stream
        if non_null < values.len() {
            streams.push((StreamKind::Present, boolean::encode(&present)));
        }

        let mut encoding = ColumnEncoding {
            kind: ColumnEncodingKind::Direct,
            dictionary_size: 0,
        };
        match self.schema.fields()[index].ty {
            PrimitiveType::Boolean => {
                let bits: Vec<bool> = values.iter().flatten().filter_map(Value::take_bool).collect();
                debug_assert_eq!(bits.len(), non_null);
                streams.push((StreamKind::Data, boolean::encode(&bits)));
            }
            PrimitiveType::Int { .. } => {
                let ints: Vec<i64> = values.iter().flatten().filter_map(Value::take_int).collect();
                debug_assert_eq!(ints.len(), non_null);
                streams.push((StreamKind::Data, int::encode(&ints)));
            }
            PrimitiveType::Float32 => {
                let floats: Vec<f32> =
                    values.iter().flatten().filter_map(Value::take_float).collect();
                debug_assert_eq!(floats.len(), non_null);
                streams.push((StreamKind::Data, float::encode_f32(&floats)));
            }
            PrimitiveType::Float64 => {
                let doubles: Vec<f64> =
                    values.iter().flatten().filter_map(Value::take_double).collect();
                debug_assert_eq!(doubles.len(), non_null);
                streams.push((StreamKind::Data, float::encode_f64(&doubles)));
            }
            PrimitiveType::String => {
                let strs: Vec<&str> = values.iter().flatten().filter_map(Value::take_str).collect();
                debug_assert_eq!(strs.len(), non_null);
                match string::choose_encoding(&strs, self.config.dict_key_size_threshold) {
                    StringEncoding::Direct => {
                        let (lengths, blob) = string::encode_direct(&strs);
                        streams.push((StreamKind::Data, blob));
                        streams.push((StreamKind::Length, lengths));
                    }
                    StringEncoding::Dictionary => {
                        let dict = string::encode_dictionary(&strs);
                        streams.push((StreamKind::Data, dict.indices));
                        streams.push((StreamKind::Length, dict.lengths));
                        streams.push((StreamKind::DictionaryData, dict.data));
                        encoding = ColumnEncoding {
                            kind: ColumnEncodingKind::Dictionary,
                            dictionary_size: dict.dictionary_size as u32,
                        };
                    }
                }
            }
        }
        Ok((streams, encoding))
    }
}

/// Decodes one stripe, column by column, caching decoded columns for row
/// reads. Any footer or stream inconsistency fails the whole stripe.
pub struct StripeReader {
    schema: Schema,
    compression: Compression,
    data: Vec<u8>,
    footer: StripeFooter,
    cache: Vec<Option<Vec<Option<Value>>>>,
}

impl StripeReader {
    pub fn open(schema: Schema, compression: Compression, bytes: &[u8]) -> Result<Self> {
        let stripe = Stripe::from_bytes(bytes)?;
        Self::from_stripe(schema, compression, stripe)
    }

    pub fn from_stripe(
        schema: Schema,
        compression: Compression,
        stripe: Stripe,
    ) -> Result<Self> {
        let Stripe { data, footer } = stripe;
        if footer.columns.len() != schema.arity() {
            return Err(DecodeError::CorruptStripe(format!(
                "footer describes {} columns, schema has {}",
                footer.columns.len(),
                schema.arity()
            ))
            .into());
        }
        // stream ranges must tile the data region exactly
        let mut end = 0u64;
        for stream in &footer.streams {
            if stream.offset != end {
                return Err(DecodeError::CorruptStripe(format!(
                    "stream at offset {} not contiguous with previous end {}",
                    stream.offset, end
                ))
                .into());
            }
            end = end
                .checked_add(stream.length)
                .ok_or_else(|| DecodeError::CorruptStripe("stream length overflow".to_string()))?;
        }
        if end != data.len() as u64 {
            return Err(DecodeError::CorruptStripe(format!(
                "streams cover {} bytes, stripe has {}",
                end,
                data.len()
            ))
            .into());
        }
        let cache = vec![None; schema.arity()];
        Ok(StripeReader {
            schema,
            compression,
            data,
            footer,
            cache,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn footer(&self) -> &StripeFooter {
        &self.footer
    }

    pub fn row_count(&self) -> usize {
        self.footer.row_count as usize
    }

    /// Decode one column, nulls restored to their original positions.
    /// Columns decode once; subsequent reads hit the cache.
    pub fn read_column(&mut self, index: usize) -> Result<&[Option<Value>]> {
        if index >= self.schema.arity() {
            return Err(DecodeError::ColumnOutOfRange(index).into());
        }
        if self.cache[index].is_none() {
            let column = self.decode_column(index)?;
            self.cache[index] = Some(column);
        }
        self.cache[index]
            .as_deref()
            .ok_or_else(|| DecodeError::CorruptStripe("column cache poisoned".to_string()).into())
    }

    /// Assemble one row across all columns
    pub fn read_row(&mut self, index: usize) -> Result<Row> {
        if index >= self.row_count() {
            return Err(DecodeError::RowOutOfRange(index).into());
        }
        for column in 0..self.schema.arity() {
            self.read_column(column)?;
        }
        let mut row = Vec::with_capacity(self.schema.arity());
        for column in &self.cache {
            match column {
                Some(values) => row.push(values[index].clone()),
                None => {
                    return Err(
                        DecodeError::CorruptStripe("column cache poisoned".to_string()).into()
                    )
                }
            }
        }
        Ok(row)
    }

    fn stream_bytes(&self, column: usize, kind: StreamKind) -> Option<&[u8]> {
        self.footer
            .streams
            .iter()
            .find(|s| s.column == column as u32 && s.kind == kind)
            .map(|s| &self.data[s.offset as usize..(s.offset + s.length) as usize])
    }

    fn required_stream(&self, column: usize, kind: StreamKind) -> Result<Vec<u8>> {
        let framed = self.stream_bytes(column, kind).ok_or_else(|| {
            DecodeError::CorruptStripe(format!("column {} missing {:?} stream", column, kind))
        })?;
        compression::unframe(framed, self.compression)
    }

    fn decode_column(&self, index: usize) -> Result<Vec<Option<Value>>> {
        let row_count = self.row_count();
        let present = match self.stream_bytes(index, StreamKind::Present) {
            Some(framed) => {
                let raw = compression::unframe(framed, self.compression)?;
                boolean::decode(&raw, row_count)?
            }
            None => vec![true; row_count],
        };
        let non_null = boolean::popcount(&present);

        let values: Vec<Value> = match self.schema.fields()[index].ty {
            PrimitiveType::Boolean => {
                let data = self.required_stream(index, StreamKind::Data)?;
                boolean::decode(&data, non_null)?
                    .into_iter()
                    .map(Value::Bool)
                    .collect()
            }
            PrimitiveType::Int { .. } => {
                let data = self.required_stream(index, StreamKind::Data)?;
                int::decode(&data, non_null)?
                    .into_iter()
                    .map(Value::Int)
                    .collect()
            }
            PrimitiveType::Float32 => {
                let data = self.required_stream(index, StreamKind::Data)?;
                float::decode_f32(&data, non_null)?
                    .into_iter()
                    .map(Value::Float)
                    .collect()
            }
            PrimitiveType::Float64 => {
                let data = self.required_stream(index, StreamKind::Data)?;
                float::decode_f64(&data, non_null)?
                    .into_iter()
                    .map(Value::Double)
                    .collect()
            }
            PrimitiveType::String => {
                let data = self.required_stream(index, StreamKind::Data)?;
                let lengths = self.required_stream(index, StreamKind::Length)?;
                let encoding = &self.footer.columns[index];
                let decoded = match encoding.kind {
                    ColumnEncodingKind::Direct => {
                        string::decode_direct(&lengths, &data, non_null)?
                    }
                    ColumnEncodingKind::Dictionary => {
                        let blob = self.required_stream(index, StreamKind::DictionaryData)?;
                        string::decode_dictionary(
                            &data,
                            &lengths,
                            &blob,
                            non_null,
                            encoding.dictionary_size as usize,
                        )?
                    }
                };
                decoded.into_iter().map(Value::String).collect()
            }
        };

        if values.len() != non_null {
            return Err(DecodeError::CorruptStripe(format!(
                "column {} decoded {} values, present bitmap has {}",
                index,
                values.len(),
                non_null
            ))
            .into());
        }
        let mut column = Vec::with_capacity(row_count);
        let mut values = values.into_iter();
        for bit in present {
            column.push(if bit { values.next() } else { None });
        }
        Ok(column)
    }
}

// Footer I/O primitives

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn read_u8(bytes: &[u8], pos: &mut usize) -> Result<u8, DecodeError> {
    let byte = *bytes
        .get(*pos)
        .ok_or_else(|| DecodeError::CorruptStripe("truncated stripe footer".to_string()))?;
    *pos += 1;
    Ok(byte)
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> Result<u32, DecodeError> {
    let slice = bytes
        .get(*pos..*pos + 4)
        .ok_or_else(|| DecodeError::CorruptStripe("truncated stripe footer".to_string()))?;
    *pos += 4;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(slice);
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(bytes: &[u8], pos: &mut usize) -> Result<u64, DecodeError> {
    let slice = bytes
        .get(*pos..*pos + 8)
        .ok_or_else(|| DecodeError::CorruptStripe("truncated stripe footer".to_string()))?;
    *pos += 8;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(slice);
    Ok(u64::from_le_bytes(buf))
}
