// Schema layer - struct type definitions shared by writer and reader

use crate::error::SchemaError;
use serde::{Deserialize, Serialize};

/// Bit width of an integer column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    pub fn bits(&self) -> u32 {
        match self {
            IntWidth::W8 => 8,
            IntWidth::W16 => 16,
            IntWidth::W32 => 32,
            IntWidth::W64 => 64,
        }
    }

    /// Whether `value` is representable at this width
    pub fn contains(&self, value: i64) -> bool {
        match self {
            IntWidth::W8 => i8::try_from(value).is_ok(),
            IntWidth::W16 => i16::try_from(value).is_ok(),
            IntWidth::W32 => i32::try_from(value).is_ok(),
            IntWidth::W64 => true,
        }
    }
}

/// Primitive column types
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PrimitiveType {
    Boolean,
    Int { width: IntWidth },
    Float32,
    Float64,
    String,
}

impl PrimitiveType {
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Int { width: IntWidth::W8 } => "int8",
            PrimitiveType::Int {
                width: IntWidth::W16,
            } => "int16",
            PrimitiveType::Int {
                width: IntWidth::W32,
            } => "int32",
            PrimitiveType::Int {
                width: IntWidth::W64,
            } => "int64",
            PrimitiveType::Float32 => "float32",
            PrimitiveType::Float64 => "float64",
            PrimitiveType::String => "string",
        }
    }
}

/// Named field in a struct schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: PrimitiveType,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: PrimitiveType) -> Self {
        Field {
            name: name.into(),
            ty,
        }
    }
}

/// An ordered struct of named primitive columns.
///
/// Field names are unique; the field order is the column order for every
/// stripe written against this schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Result<Self, SchemaError> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(SchemaError::DuplicateFieldName(field.name.clone()));
            }
        }
        Ok(Schema { fields })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of columns
    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }
}
