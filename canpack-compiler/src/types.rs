// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Field types and their native representation.

use serde::Serialize;

/// Scalar types accepted in `var_type` and sub-field `type` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    Float,
    Double,
    /// `u8_array`: raw bytes copied from the frame.
    ByteArray,
}

impl ScalarType {
    /// Resolve a schema type name. Returns `None` for unknown names.
    pub fn resolve(name: &str) -> Option<ScalarType> {
        Some(match name {
            "bool" => ScalarType::Bool,
            "u8" => ScalarType::U8,
            "u16" => ScalarType::U16,
            "u32" => ScalarType::U32,
            "u64" => ScalarType::U64,
            "i8" => ScalarType::I8,
            "i16" => ScalarType::I16,
            "i32" => ScalarType::I32,
            "i64" => ScalarType::I64,
            "float" => ScalarType::Float,
            "double" => ScalarType::Double,
            "u8_array" => ScalarType::ByteArray,
            _ => return None,
        })
    }

    /// Name of the type in schema documents.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::U8 => "u8",
            ScalarType::U16 => "u16",
            ScalarType::U32 => "u32",
            ScalarType::U64 => "u64",
            ScalarType::I8 => "i8",
            ScalarType::I16 => "i16",
            ScalarType::I32 => "i32",
            ScalarType::I64 => "i64",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
            ScalarType::ByteArray => "u8_array",
        }
    }

    /// Native width in bytes. Byte arrays report the element width.
    pub fn width(&self) -> usize {
        match self {
            ScalarType::Bool | ScalarType::U8 | ScalarType::I8 | ScalarType::ByteArray => 1,
            ScalarType::U16 | ScalarType::I16 => 2,
            ScalarType::U32 | ScalarType::I32 | ScalarType::Float => 4,
            ScalarType::U64 | ScalarType::I64 | ScalarType::Double => 8,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ScalarType::Float | ScalarType::Double)
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, ScalarType::I8 | ScalarType::I16 | ScalarType::I32 | ScalarType::I64)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ScalarType::U8
                | ScalarType::U16
                | ScalarType::U32
                | ScalarType::U64
                | ScalarType::I8
                | ScalarType::I16
                | ScalarType::I32
                | ScalarType::I64
        )
    }

    /// Smallest and largest values of integer types.
    pub fn integer_range(&self) -> Option<(f64, f64)> {
        Some(match self {
            ScalarType::U8 => (0.0, u8::MAX as f64),
            ScalarType::U16 => (0.0, u16::MAX as f64),
            ScalarType::U32 => (0.0, u32::MAX as f64),
            ScalarType::U64 => (0.0, u64::MAX as f64),
            ScalarType::I8 => (i8::MIN as f64, i8::MAX as f64),
            ScalarType::I16 => (i16::MIN as f64, i16::MAX as f64),
            ScalarType::I32 => (i32::MIN as f64, i32::MAX as f64),
            ScalarType::I64 => (i64::MIN as f64, i64::MAX as f64),
            _ => return None,
        })
    }

    /// C++ type of the record member.
    pub fn cxx_type(&self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::U8 | ScalarType::ByteArray => "uint8_t",
            ScalarType::U16 => "uint16_t",
            ScalarType::U32 => "uint32_t",
            ScalarType::U64 => "uint64_t",
            ScalarType::I8 => "int8_t",
            ScalarType::I16 => "int16_t",
            ScalarType::I32 => "int32_t",
            ScalarType::I64 => "int64_t",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
        }
    }

    /// Rust type of the record member.
    pub fn rust_type(&self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::U8 | ScalarType::ByteArray => "u8",
            ScalarType::U16 => "u16",
            ScalarType::U32 => "u32",
            ScalarType::U64 => "u64",
            ScalarType::I8 => "i8",
            ScalarType::I16 => "i16",
            ScalarType::I32 => "i32",
            ScalarType::I64 => "i64",
            ScalarType::Float => "f32",
            ScalarType::Double => "f64",
        }
    }
}

/// Unsigned integer type large enough to hold a raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Integer {
    pub width: usize,
}

impl Integer {
    /// Get the native integer type for the given bit width.
    pub fn new(width: usize) -> Integer {
        let width = match width {
            0..=8 => 8,
            9..=16 => 16,
            17..=32 => 32,
            33..=64 => 64,
            _ => unreachable!("width must be 64 bits or less: {width}"),
        };
        Integer { width }
    }

    pub fn mask(&self) -> u64 {
        if self.width >= 64 {
            u64::MAX
        } else {
            (1 << self.width) - 1
        }
    }

    pub fn cxx(&self) -> String {
        format!("uint{}_t", self.width)
    }

    pub fn cxx_signed(&self) -> String {
        format!("int{}_t", self.width)
    }

    pub fn rust(&self) -> String {
        format!("u{}", self.width)
    }

    pub fn rust_signed(&self) -> String {
        format!("i{}", self.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_known_names() {
        assert_eq!(ScalarType::resolve("u8_array"), Some(ScalarType::ByteArray));
        assert_eq!(ScalarType::resolve("double"), Some(ScalarType::Double));
        assert_eq!(ScalarType::resolve("bool"), Some(ScalarType::Bool));
        assert_eq!(ScalarType::resolve("u128"), None);
        assert_eq!(ScalarType::resolve("U8"), None);
    }

    #[test]
    fn integer_ranges() {
        assert_eq!(ScalarType::U8.integer_range(), Some((0.0, 255.0)));
        assert_eq!(ScalarType::I16.integer_range(), Some((-32768.0, 32767.0)));
        assert_eq!(ScalarType::Float.integer_range(), None);
        assert_eq!(ScalarType::Bool.integer_range(), None);
    }

    #[test]
    fn native_widths() {
        assert_eq!(ScalarType::I16.width(), 2);
        assert_eq!(ScalarType::Float.width(), 4);
        assert_eq!(ScalarType::U64.width(), 8);
        assert_eq!(ScalarType::ByteArray.width(), 1);
    }

    #[test]
    fn integer_rounds_up() {
        assert_eq!(Integer::new(1).width, 8);
        assert_eq!(Integer::new(12).width, 16);
        assert_eq!(Integer::new(24).width, 32);
        assert_eq!(Integer::new(64).width, 64);
        assert_eq!(Integer::new(12).mask(), 0xffff);
        assert_eq!(Integer::new(64).mask(), u64::MAX);
        assert_eq!(Integer::new(33).rust(), "u64");
        assert_eq!(Integer::new(3).cxx(), "uint8_t");
    }
}
