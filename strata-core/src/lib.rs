// strata-core - an ORC-style columnar stripe codec
//
// Typed rows go in, self-describing stripes of per-column encoded streams
// come out, and back again. The layers, bottom up: per-column codecs
// (codec), block compression framing (compression), stripe encoding
// (stripe), and the overall file layout (file).

pub mod codec;
pub mod compression;
pub mod data;
pub mod error;
pub mod file;
pub mod schema;
pub mod stripe;

pub use compression::Compression;
pub use data::{Row, Value};
pub use error::{Error, Result};
pub use file::{FileReader, FileWriter};
pub use schema::{Field, IntWidth, PrimitiveType, Schema};
pub use stripe::{StripeReader, StripeWriter, WriterConfig};
