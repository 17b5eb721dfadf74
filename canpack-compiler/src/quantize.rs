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

//! Conversions between field values and the raw integers stored in
//! frames.

use crate::bits::BitWindow;
use crate::types::ScalarType;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Codec {
    /// Integer bit pattern, zero extended from the window width.
    Integer,
    /// Non-zero raw value decodes to `true`.
    Bool,
    /// IEEE-754 bit pattern stored at native width.
    BitCast,
    /// Signed fixed point: `value = raw * scale`.
    Zoom { scale: f64 },
    /// Unsigned raw value linearly mapped onto `[min, max]`.
    Range { min: f64, max: f64, bits: usize },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("{ty} cannot be stored in a {width} bit window")]
    UnsupportedFloatWidth { ty: &'static str, width: usize },
    #[error("{ty} stored in {width} byte(s) requires a var_zoom scale factor")]
    MissingScale { ty: &'static str, width: usize },
    #[error("invalid scale factor {0}, expected a finite non-zero number")]
    InvalidScale(f64),
    #[error("{ty} cannot hold a {width} bit window")]
    InvalidFieldWidth { ty: &'static str, width: usize },
    #[error("invalid value range [{min}, {max}]")]
    InvalidValueRange { min: f64, max: f64 },
}

/// Select the codec of a scalar field stored in `window`.
pub fn select(ty: ScalarType, window: &BitWindow, scale: Option<f64>) -> Result<Codec, CodecError> {
    let type_name = ty.name();
    let width = window.width;
    match ty {
        ScalarType::Bool if width <= 8 => Ok(Codec::Bool),
        ty if ty.is_integer() && width <= ty.width() * 8 => Ok(Codec::Integer),
        ScalarType::Float | ScalarType::Double => {
            let aligned = window.offset % 8 == 0 && width % 8 == 0;
            match (ty, width / 8) {
                _ if !aligned => Err(CodecError::UnsupportedFloatWidth { ty: type_name, width }),
                (ScalarType::Float, 4) | (ScalarType::Double, 8) => Ok(Codec::BitCast),
                (ScalarType::Float, 2) | (ScalarType::Double, 2 | 4) => match scale {
                    None => Err(CodecError::MissingScale { ty: type_name, width: width / 8 }),
                    Some(scale) if !scale.is_finite() || scale == 0.0 => {
                        Err(CodecError::InvalidScale(scale))
                    }
                    Some(scale) => Ok(Codec::Zoom { scale }),
                },
                _ => Err(CodecError::UnsupportedFloatWidth { ty: type_name, width }),
            }
        }
        _ => Err(CodecError::InvalidFieldWidth { ty: type_name, width }),
    }
}

/// Select the codec of an array sub-field.
pub fn select_range(min: f64, max: f64, bits: usize) -> Result<Codec, CodecError> {
    if !min.is_finite() || !max.is_finite() || min >= max {
        return Err(CodecError::InvalidValueRange { min, max });
    }
    Ok(Codec::Range { min, max, bits })
}

fn max_raw(bits: usize) -> f64 {
    if bits >= 64 {
        u64::MAX as f64
    } else {
        ((1u64 << bits) - 1) as f64
    }
}

fn sign_extend(raw: u64, width: usize) -> i64 {
    let shift = 64 - width;
    ((raw << shift) as i64) >> shift
}

impl Codec {
    /// Decode a raw value read from a window of `width` bits.
    pub fn decode(&self, raw: u64, width: usize) -> f64 {
        match self {
            Codec::Integer => raw as f64,
            Codec::Bool => (raw != 0) as u8 as f64,
            Codec::BitCast if width == 32 => f32::from_bits(raw as u32) as f64,
            Codec::BitCast => f64::from_bits(raw),
            Codec::Zoom { scale } => sign_extend(raw, width) as f64 * scale,
            Codec::Range { min, max, bits } => min + raw as f64 * (max - min) / max_raw(*bits),
        }
    }

    /// Encode a value into the raw integer stored in a window of
    /// `width` bits.
    pub fn encode(&self, value: f64, width: usize) -> u64 {
        let mask = if width >= 64 { u64::MAX } else { (1 << width) - 1 };
        match self {
            Codec::Integer => (value as i64 as u64) & mask,
            Codec::Bool => (value != 0.0) as u64,
            Codec::BitCast if width == 32 => (value as f32).to_bits() as u64,
            Codec::BitCast => value.to_bits(),
            Codec::Zoom { scale } => ((value / scale).round() as i64 as u64) & mask,
            Codec::Range { min, max, bits } => {
                let scaled = ((value - min) / (max - min) * max_raw(*bits)).round();
                if scaled.is_nan() || scaled <= 0.0 {
                    0
                } else if scaled >= max_raw(*bits) {
                    (max_raw(*bits) as u64) & mask
                } else {
                    scaled as u64
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(first: usize, last: usize) -> BitWindow {
        BitWindow::from_byte_span(first, last)
    }

    #[test]
    fn native_floats_are_bit_cast() {
        assert_eq!(select(ScalarType::Float, &bytes(0, 3), None), Ok(Codec::BitCast));
        assert_eq!(select(ScalarType::Double, &bytes(0, 7), None), Ok(Codec::BitCast));
        let codec = Codec::BitCast;
        assert_eq!(codec.decode(codec.encode(1.5, 32), 32), 1.5);
        assert_eq!(codec.encode(1.0, 32), 0x3f80_0000);
    }

    #[test]
    fn narrow_floats_need_a_scale() {
        assert_eq!(
            select(ScalarType::Float, &bytes(0, 1), None),
            Err(CodecError::MissingScale { ty: "float", width: 2 })
        );
        assert_eq!(
            select(ScalarType::Double, &bytes(0, 3), Some(0.01)),
            Ok(Codec::Zoom { scale: 0.01 })
        );
        assert_eq!(
            select(ScalarType::Float, &bytes(0, 1), Some(0.0)),
            Err(CodecError::InvalidScale(0.0))
        );
    }

    #[test]
    fn unsupported_float_widths() {
        assert!(matches!(
            select(ScalarType::Float, &bytes(0, 2), Some(1.0)),
            Err(CodecError::UnsupportedFloatWidth { .. })
        ));
        assert!(matches!(
            select(ScalarType::Float, &bytes(0, 7), None),
            Err(CodecError::UnsupportedFloatWidth { .. })
        ));
        assert!(matches!(
            select(ScalarType::Double, &BitWindow::from_bit_span(0, 7, 0), Some(1.0)),
            Err(CodecError::UnsupportedFloatWidth { .. })
        ));
    }

    #[test]
    fn integers_fit_their_native_width() {
        assert_eq!(select(ScalarType::U32, &bytes(0, 1), None), Ok(Codec::Integer));
        assert_eq!(
            select(ScalarType::U8, &bytes(0, 1), None),
            Err(CodecError::InvalidFieldWidth { ty: "u8", width: 16 })
        );
        assert_eq!(
            select(ScalarType::Bool, &BitWindow::from_bit_span(0, 0, 0), None),
            Ok(Codec::Bool)
        );
    }

    #[test]
    fn zoom_is_signed() {
        let codec = Codec::Zoom { scale: 0.1 };
        let raw = codec.encode(-12.3, 16);
        assert_eq!(raw, (-123i16) as u16 as u64);
        assert!((codec.decode(raw, 16) + 12.3).abs() < 1e-9);
    }

    #[test]
    fn range_bounds() {
        let codec = select_range(-10.0, 10.0, 12).unwrap();
        assert_eq!(codec.encode(-10.0, 16), 0);
        assert_eq!(codec.encode(10.0, 16), 4095);
        assert_eq!(codec.encode(25.0, 16), 4095);
        assert_eq!(codec.encode(-25.0, 16), 0);
        assert_eq!(codec.decode(4095, 16), 10.0);
        assert!(select_range(1.0, 1.0, 8).is_err());
        assert!(select_range(f64::NAN, 1.0, 8).is_err());
    }

    #[test]
    fn range_error_is_bounded() {
        let (min, max, bits) = (-3.2, 7.9, 10);
        let codec = Codec::Range { min, max, bits };
        let step = (max - min) / max_raw(bits);
        for i in 0..=1000 {
            let value = min + (max - min) * i as f64 / 1000.0;
            let decoded = codec.decode(codec.encode(value, 16), 16);
            assert!((decoded - value).abs() <= step, "value={value} decoded={decoded}");
        }
    }

    #[test]
    fn range_matches_runtime() {
        let (min, max, bits) = (0.0, 4095.0, 12);
        let codec = Codec::Range { min, max, bits };
        for raw in [0u64, 1, 2047, 4095] {
            assert_eq!(codec.decode(raw, 16), canpack_runtime::range_to_float(raw, min, max, 12));
            assert_eq!(
                codec.encode(raw as f64, 16),
                canpack_runtime::float_to_range(raw as f64, min, max, 12)
            );
        }
    }
}
