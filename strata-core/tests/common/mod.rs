// Test utilities and generators for strata property-based testing

#![allow(dead_code)]

use std::io::Cursor;

use proptest::prelude::*;

use strata_core::compression::Compression;
use strata_core::data::{Row, Value};
use strata_core::file::{FileReader, FileWriter};
use strata_core::schema::{Field, IntWidth, PrimitiveType, Schema};
use strata_core::stripe::WriterConfig;

/// Generate IntWidth values
pub fn arb_int_width() -> impl Strategy<Value = IntWidth> {
    prop_oneof![
        Just(IntWidth::W8),
        Just(IntWidth::W16),
        Just(IntWidth::W32),
        Just(IntWidth::W64),
    ]
}

/// Generate PrimitiveType values
pub fn arb_primitive_type() -> impl Strategy<Value = PrimitiveType> {
    prop_oneof![
        Just(PrimitiveType::Boolean),
        arb_int_width().prop_map(|width| PrimitiveType::Int { width }),
        Just(PrimitiveType::Float32),
        Just(PrimitiveType::Float64),
        Just(PrimitiveType::String),
    ]
}

/// Generate a non-NaN f32 (NaN breaks value equality in roundtrip asserts;
/// bit-exact NaN storage has its own test)
pub fn arb_f32() -> impl Strategy<Value = f32> {
    any::<u32>()
        .prop_map(f32::from_bits)
        .prop_filter("NaN", |f| !f.is_nan())
}

pub fn arb_f64() -> impl Strategy<Value = f64> {
    any::<u64>()
        .prop_map(f64::from_bits)
        .prop_filter("NaN", |f| !f.is_nan())
}

/// Generate a value matching the given column type
pub fn arb_value(ty: PrimitiveType) -> BoxedStrategy<Value> {
    match ty {
        PrimitiveType::Boolean => any::<bool>().prop_map(Value::Bool).boxed(),
        PrimitiveType::Int { width: IntWidth::W8 } => {
            any::<i8>().prop_map(|v| Value::Int(v as i64)).boxed()
        }
        PrimitiveType::Int {
            width: IntWidth::W16,
        } => any::<i16>().prop_map(|v| Value::Int(v as i64)).boxed(),
        PrimitiveType::Int {
            width: IntWidth::W32,
        } => any::<i32>().prop_map(|v| Value::Int(v as i64)).boxed(),
        PrimitiveType::Int {
            width: IntWidth::W64,
        } => any::<i64>().prop_map(Value::Int).boxed(),
        PrimitiveType::Float32 => arb_f32().prop_map(Value::Float).boxed(),
        PrimitiveType::Float64 => arb_f64().prop_map(Value::Double).boxed(),
        PrimitiveType::String => "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String).boxed(),
    }
}

/// Generate a nullable value matching the given column type
pub fn arb_optional_value(ty: PrimitiveType) -> BoxedStrategy<Option<Value>> {
    prop_oneof![
        1 => Just(None),
        3 => arb_value(ty).prop_map(Some),
    ]
    .boxed()
}

/// Generate a schema of 1..5 uniquely named columns
pub fn arb_schema() -> impl Strategy<Value = Schema> {
    prop::collection::vec(arb_primitive_type(), 1..5).prop_map(|types| {
        let fields = types
            .into_iter()
            .enumerate()
            .map(|(i, ty)| Field::new(format!("f{}", i), ty))
            .collect();
        Schema::new(fields).expect("generated names are unique")
    })
}

/// Generate a schema together with rows that match it
pub fn arb_schema_and_rows() -> impl Strategy<Value = (Schema, Vec<Row>)> {
    arb_schema().prop_flat_map(|schema| {
        let row: Vec<BoxedStrategy<Option<Value>>> = schema
            .fields()
            .iter()
            .map(|field| arb_optional_value(field.ty))
            .collect();
        let rows = prop::collection::vec(row, 0..30);
        (Just(schema), rows)
    })
}

/// Generate writer configurations across codecs, block sizes, and thresholds
pub fn arb_config() -> impl Strategy<Value = WriterConfig> {
    let compression = prop_oneof![
        Just(Compression::None),
        Just(Compression::Zlib),
        Just(Compression::Zstd { level: 3 }),
    ];
    let block_size = prop_oneof![Just(7usize), Just(64), Just(4096), Just(64 * 1024)];
    let threshold = prop_oneof![Just(0.0f64), Just(0.5), Just(1.0)];
    (compression, block_size, threshold).prop_map(|(compression, block_size, threshold)| {
        WriterConfig {
            compression,
            compression_block_size: block_size,
            dict_key_size_threshold: threshold,
        }
    })
}

/// Write rows as a single-stripe file and read every row back
pub fn roundtrip_file(schema: &Schema, rows: &[Row], config: WriterConfig) -> Vec<Row> {
    let mut writer = FileWriter::new(Vec::new(), schema.clone(), config);
    for row in rows {
        writer.write(row.clone()).expect("write");
    }
    let bytes = writer.close().expect("close");
    let mut reader = FileReader::open(Cursor::new(bytes)).expect("open");
    reader.read_rows().expect("read_rows")
}
