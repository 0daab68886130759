// File layer - stripe sequence, file footer, fixed trailer
//
// File layout:
// ```text
// [stripe 1][stripe 2]...[stripe N]
// [file footer]   JSON: schema + compression + stripe directory
// [trailer]       footer_offset: u64 LE, footer_length: u64 LE, magic
// ```
//
// The trailer is the last bytes written and the first bytes read.

use std::io::{Read, Seek, SeekFrom, Write};

use serde::{Deserialize, Serialize};

use crate::compression::Compression;
use crate::data::{Row, Value};
use crate::error::{DecodeError, Result, WriteError};
use crate::schema::Schema;
use crate::stripe::{StripeReader, StripeWriter, WriterConfig};

/// Magic bytes closing every strata file
pub const MAGIC: &[u8; 3] = b"STR";

const TRAILER_LEN: u64 = 8 + 8 + 3;

/// Directory entry for one stripe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeInfo {
    pub offset: u64,
    pub length: u64,
    pub row_count: u64,
}

/// File footer: schema, compression codec, and the stripe directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFooter {
    pub schema: Schema,
    pub compression: Compression,
    pub stripes: Vec<StripeInfo>,
}

/// Writes stripes to an append-only sink and seals the file with a footer
/// and trailer. Stripe boundaries are the caller's call via
/// [`FileWriter::finish_stripe`].
pub struct FileWriter<W: Write> {
    sink: W,
    schema: Schema,
    config: WriterConfig,
    position: u64,
    stripes: Vec<StripeInfo>,
    current: StripeWriter,
}

impl<W: Write> FileWriter<W> {
    pub fn new(sink: W, schema: Schema, config: WriterConfig) -> Self {
        let current = StripeWriter::new(schema.clone(), config.clone());
        FileWriter {
            sink,
            schema,
            config,
            position: 0,
            stripes: Vec::new(),
            current,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Rows buffered in the open stripe
    pub fn pending_rows(&self) -> usize {
        self.current.row_count()
    }

    pub fn write(&mut self, row: Row) -> Result<()> {
        self.current.write(row)
    }

    pub fn write_columns(&mut self, batch: Vec<Vec<Option<Value>>>) -> Result<()> {
        self.current.write_columns(batch)
    }

    /// Seal the open stripe and append it to the sink. A no-op when the open
    /// stripe holds no rows.
    pub fn finish_stripe(&mut self) -> Result<()> {
        if self.current.row_count() == 0 {
            return Ok(());
        }
        let stripe = self.current.close()?;
        self.current = StripeWriter::new(self.schema.clone(), self.config.clone());
        let length = stripe.write_to(&mut self.sink)?;
        self.stripes.push(StripeInfo {
            offset: self.position,
            length,
            row_count: stripe.row_count(),
        });
        self.position += length;
        Ok(())
    }

    /// Seal any pending stripe, write the footer and trailer, and return the
    /// sink.
    pub fn close(mut self) -> Result<W> {
        self.finish_stripe()?;
        let footer = FileFooter {
            schema: self.schema,
            compression: self.config.compression,
            stripes: self.stripes,
        };
        let footer_bytes = serde_json::to_vec(&footer)
            .map_err(|e| WriteError::Serialization(e.to_string()))?;
        self.sink.write_all(&footer_bytes)?;
        self.sink.write_all(&self.position.to_le_bytes())?;
        self.sink
            .write_all(&(footer_bytes.len() as u64).to_le_bytes())?;
        self.sink.write_all(MAGIC)?;
        Ok(self.sink)
    }
}

fn stream_len(seek: &mut impl Seek) -> std::result::Result<u64, std::io::Error> {
    let old_pos = seek.stream_position()?;
    let len = seek.seek(SeekFrom::End(0))?;
    if old_pos != len {
        seek.seek(SeekFrom::Start(old_pos))?;
    }
    Ok(len)
}

/// Reads the trailer and footer once, then serves stripes on demand.
///
/// One corrupt stripe fails alone: the remaining stripes stay readable as
/// long as the footer itself is intact.
pub struct FileReader<R: Read + Seek> {
    reader: R,
    footer: FileFooter,
}

impl<R: Read + Seek> FileReader<R> {
    pub fn open(mut reader: R) -> Result<Self> {
        let file_len = stream_len(&mut reader)?;
        if file_len < TRAILER_LEN {
            return Err(DecodeError::InvalidFooter(format!(
                "file of {} bytes cannot hold a trailer",
                file_len
            ))
            .into());
        }
        reader.seek(SeekFrom::End(-(TRAILER_LEN as i64)))?;
        let mut trailer = [0u8; TRAILER_LEN as usize];
        reader.read_exact(&mut trailer)?;
        if &trailer[16..] != MAGIC {
            return Err(DecodeError::InvalidMagic.into());
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&trailer[..8]);
        let footer_offset = u64::from_le_bytes(buf);
        buf.copy_from_slice(&trailer[8..16]);
        let footer_length = u64::from_le_bytes(buf);
        let data_len = file_len - TRAILER_LEN;
        if footer_offset
            .checked_add(footer_length)
            .filter(|end| *end <= data_len)
            .is_none()
        {
            return Err(DecodeError::InvalidFooter(format!(
                "footer range {}+{} overruns file",
                footer_offset, footer_length
            ))
            .into());
        }

        reader.seek(SeekFrom::Start(footer_offset))?;
        let mut footer_bytes = vec![0u8; footer_length as usize];
        reader.read_exact(&mut footer_bytes)?;
        let footer: FileFooter = serde_json::from_slice(&footer_bytes)
            .map_err(|e| DecodeError::InvalidFooter(e.to_string()))?;

        for info in &footer.stripes {
            if info
                .offset
                .checked_add(info.length)
                .filter(|end| *end <= footer_offset)
                .is_none()
            {
                return Err(DecodeError::InvalidFooter(format!(
                    "stripe range {}+{} overruns footer",
                    info.offset, info.length
                ))
                .into());
            }
        }

        Ok(FileReader { reader, footer })
    }

    pub fn footer(&self) -> &FileFooter {
        &self.footer
    }

    pub fn schema(&self) -> &Schema {
        &self.footer.schema
    }

    pub fn compression(&self) -> Compression {
        self.footer.compression
    }

    pub fn stripe_count(&self) -> usize {
        self.footer.stripes.len()
    }

    /// Total rows across all stripes
    pub fn row_count(&self) -> u64 {
        self.footer.stripes.iter().map(|s| s.row_count).sum()
    }

    /// Read one stripe wholly and open a decoder over it
    pub fn read_stripe(&mut self, index: usize) -> Result<StripeReader> {
        let info = self
            .footer
            .stripes
            .get(index)
            .ok_or(DecodeError::StripeOutOfRange(index))?;
        self.reader.seek(SeekFrom::Start(info.offset))?;
        let mut bytes = vec![0u8; info.length as usize];
        self.reader.read_exact(&mut bytes)?;
        let reader = StripeReader::open(
            self.footer.schema.clone(),
            self.footer.compression,
            &bytes,
        )?;
        if reader.row_count() as u64 != info.row_count {
            return Err(DecodeError::CorruptStripe(format!(
                "stripe {} footer claims {} rows, directory has {}",
                index,
                reader.row_count(),
                info.row_count
            ))
            .into());
        }
        Ok(reader)
    }

    /// Drain every stripe in order into rows
    pub fn read_rows(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::with_capacity(self.row_count() as usize);
        for index in 0..self.stripe_count() {
            let mut stripe = self.read_stripe(index)?;
            for row in 0..stripe.row_count() {
                rows.push(stripe.read_row(row)?);
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use crate::error::Error;
    use crate::schema::{Field, IntWidth, PrimitiveType};
    use std::io::Cursor;

    fn test_schema() -> Schema {
        Schema::new(vec![
            Field::new(
                "n",
                PrimitiveType::Int {
                    width: IntWidth::W64,
                },
            ),
            Field::new("s", PrimitiveType::String),
        ])
        .unwrap()
    }

    fn int_row(n: i64) -> Row {
        vec![Some(Value::Int(n)), Some(Value::String(n.to_string()))]
    }

    fn write_file(stripe_sizes: &[usize], config: WriterConfig) -> Vec<u8> {
        let mut writer = FileWriter::new(Vec::new(), test_schema(), config);
        let mut n = 0;
        for &size in stripe_sizes {
            for _ in 0..size {
                writer.write(int_row(n)).unwrap();
                n += 1;
            }
            writer.finish_stripe().unwrap();
        }
        writer.close().unwrap()
    }

    #[test]
    fn test_single_stripe_roundtrip() {
        let bytes = write_file(&[10], WriterConfig::default());
        let mut reader = FileReader::open(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.stripe_count(), 1);
        assert_eq!(reader.row_count(), 10);
        assert_eq!(reader.schema(), &test_schema());

        let rows = reader.read_rows().unwrap();
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[7], int_row(7));
    }

    #[test]
    fn test_multi_stripe_roundtrip() {
        let bytes = write_file(&[4, 3, 5], WriterConfig::default());
        let mut reader = FileReader::open(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.stripe_count(), 3);
        assert_eq!(reader.row_count(), 12);

        let mut stripe = reader.read_stripe(1).unwrap();
        assert_eq!(stripe.row_count(), 3);
        assert_eq!(stripe.read_row(0).unwrap(), int_row(4));

        let rows = reader.read_rows().unwrap();
        assert_eq!(rows, (0..12).map(int_row).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_file() {
        let writer = FileWriter::new(Vec::new(), test_schema(), WriterConfig::default());
        let bytes = writer.close().unwrap();
        let mut reader = FileReader::open(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.stripe_count(), 0);
        assert_eq!(reader.read_rows().unwrap(), Vec::<Row>::new());
    }

    #[test]
    fn test_finish_stripe_without_rows_is_noop() {
        let mut writer = FileWriter::new(Vec::new(), test_schema(), WriterConfig::default());
        writer.finish_stripe().unwrap();
        writer.write(int_row(1)).unwrap();
        writer.finish_stripe().unwrap();
        writer.finish_stripe().unwrap();
        let bytes = writer.close().unwrap();
        let reader = FileReader::open(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.stripe_count(), 1);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = write_file(&[2], WriterConfig::default());
        let len = bytes.len();
        bytes[len - 1] = b'!';
        assert!(matches!(
            FileReader::open(Cursor::new(bytes)),
            Err(Error::Decode(DecodeError::InvalidMagic))
        ));
    }

    #[test]
    fn test_file_shorter_than_trailer() {
        assert!(matches!(
            FileReader::open(Cursor::new(vec![0u8; 10])),
            Err(Error::Decode(DecodeError::InvalidFooter(_)))
        ));
    }

    #[test]
    fn test_footer_overrun_rejected() {
        let mut bytes = write_file(&[2], WriterConfig::default());
        let len = bytes.len();
        // inflate the declared footer length past the file end
        bytes[len - 11] = 0xff;
        assert!(matches!(
            FileReader::open(Cursor::new(bytes)),
            Err(Error::Decode(DecodeError::InvalidFooter(_)))
        ));
    }

    #[test]
    fn test_corrupt_stripe_leaves_others_readable() {
        let bytes = write_file(&[3, 3], WriterConfig::default());
        let reader = FileReader::open(Cursor::new(bytes.clone())).unwrap();
        let first_len = reader.footer().stripes[0].length as usize;

        // wreck stripe 0's footer length field
        let mut corrupted = bytes;
        corrupted[first_len - 1] ^= 0xff;
        let mut reader = FileReader::open(Cursor::new(corrupted)).unwrap();
        assert!(reader.read_stripe(0).is_err());

        let mut second = reader.read_stripe(1).unwrap();
        assert_eq!(second.read_row(0).unwrap(), int_row(3));
    }

    #[test]
    fn test_stripe_out_of_range() {
        let bytes = write_file(&[2], WriterConfig::default());
        let mut reader = FileReader::open(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            reader.read_stripe(5),
            Err(Error::Decode(DecodeError::StripeOutOfRange(5)))
        ));
    }

    #[test]
    fn test_trailer_is_last_bytes() {
        let bytes = write_file(&[1], WriterConfig::default());
        assert_eq!(&bytes[bytes.len() - 3..], MAGIC);
        let footer_offset =
            u64::from_le_bytes(bytes[bytes.len() - 19..bytes.len() - 11].try_into().unwrap());
        let footer_length =
            u64::from_le_bytes(bytes[bytes.len() - 11..bytes.len() - 3].try_into().unwrap());
        assert_eq!(
            footer_offset + footer_length,
            bytes.len() as u64 - TRAILER_LEN
        );
    }
}
