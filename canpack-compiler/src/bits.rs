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

//! Bit window algebra.
//!
//! A [`BitWindow`] names a run of bits inside a byte buffer. Bits are
//! numbered from the most significant bit of byte 0, so the first
//! byte of a window holds the most significant bits of the value.
//! Windows are turned into small expression trees ([`Expr`]) that the
//! backends render in their own syntax, and that can be evaluated
//! directly to check the generated arithmetic.

use crate::types::Integer;
use serde::Serialize;

/// Mask selecting bits `high..=low` of a byte, bit 7 being the most
/// significant.
pub fn mask(high: usize, low: usize) -> u8 {
    debug_assert!(low <= high && high < 8);
    ((0xffu16 << low) & (0xffu16 >> (7 - high))) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BitWindow {
    /// Offset of the first bit, counted from the most significant bit
    /// of byte 0.
    pub offset: usize,
    /// Width in bits, at most 64.
    pub width: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Byte of the buffer at the given index.
    Byte(usize),
    /// Raw value being written.
    Value(Integer),
    Mask(Box<Expr>, u64),
    Shl(Box<Expr>, usize),
    Shr(Box<Expr>, usize),
    /// Conversion to an unsigned integer type, truncating or zero
    /// extending.
    Cast(Box<Expr>, Integer),
    Or(Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    /// The store covers the whole byte.
    Assign,
    /// The store shares the byte with other fields.
    Or,
}

/// Write of one buffer byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    pub index: usize,
    pub op: StoreOp,
    pub value: Expr,
}

impl Expr {
    /// Width in bits of the integer type the expression evaluates to.
    pub fn width(&self) -> usize {
        match self {
            Expr::Byte(_) => 8,
            Expr::Value(ty) | Expr::Cast(_, ty) => ty.width,
            Expr::Mask(expr, _) | Expr::Shl(expr, _) | Expr::Shr(expr, _) => expr.width(),
            Expr::Or(terms) => terms.iter().map(Expr::width).max().unwrap_or(8),
        }
    }

    fn cast(self, ty: Integer) -> Expr {
        if self.width() == ty.width {
            self
        } else {
            Expr::Cast(Box::new(self), ty)
        }
    }

    /// Evaluate the expression against a buffer and a raw value,
    /// with the truncation rules of the generated code.
    pub fn eval(&self, buf: &[u8], value: u64) -> u64 {
        match self {
            Expr::Byte(index) => buf[*index] as u64,
            Expr::Value(ty) => value & ty.mask(),
            Expr::Mask(expr, mask) => expr.eval(buf, value) & mask,
            Expr::Shl(expr, shift) => {
                (expr.eval(buf, value) << shift) & Integer::new(expr.width()).mask()
            }
            Expr::Shr(expr, shift) => expr.eval(buf, value) >> shift,
            Expr::Cast(expr, ty) => expr.eval(buf, value) & ty.mask(),
            Expr::Or(terms) => terms.iter().fold(0, |acc, term| acc | term.eval(buf, value)),
        }
    }
}

impl Store {
    pub fn apply(&self, buf: &mut [u8], value: u64) {
        let byte = self.value.eval(buf, value) as u8;
        match self.op {
            StoreOp::Assign => buf[self.index] = byte,
            StoreOp::Or => buf[self.index] |= byte,
        }
    }
}

impl BitWindow {
    /// Window of a `[byte, high_bit, low_bit]` parameter.
    pub fn from_bit_span(byte: usize, high: usize, low: usize) -> BitWindow {
        BitWindow { offset: byte * 8 + (7 - high), width: high - low + 1 }
    }

    /// Window of a `[first_byte, last_byte]` parameter.
    pub fn from_byte_span(first: usize, last: usize) -> BitWindow {
        BitWindow { offset: first * 8, width: (last - first + 1) * 8 }
    }

    pub fn end(&self) -> usize {
        self.offset + self.width
    }

    pub fn first_byte(&self) -> usize {
        self.offset / 8
    }

    pub fn last_byte(&self) -> usize {
        (self.end() - 1) / 8
    }

    /// Raw integer type holding the window.
    pub fn integer(&self) -> Integer {
        Integer::new(self.width)
    }

    /// Bits of byte `index` covered by the window, as `(high, low)`.
    fn byte_bits(&self, index: usize) -> (usize, usize) {
        let start = self.offset.max(index * 8) - index * 8;
        let end = self.end().min(index * 8 + 8) - index * 8;
        (7 - start, 8 - end)
    }

    /// Mask of the bits of byte `index` covered by the window.
    pub fn byte_mask(&self, index: usize) -> u8 {
        if index < self.first_byte() || index > self.last_byte() {
            return 0;
        }
        let (high, low) = self.byte_bits(index);
        mask(high, low)
    }

    /// Number of value bits stored after byte `index`.
    fn bits_after(&self, index: usize) -> usize {
        self.end().saturating_sub(index * 8 + 8)
    }

    /// Expression reading the window out of a buffer.
    pub fn read(&self) -> Expr {
        let ty = self.integer();
        let mut terms = (self.first_byte()..=self.last_byte())
            .map(|index| {
                let (high, low) = self.byte_bits(index);
                let mut term = Expr::Byte(index);
                if high < 7 {
                    term = Expr::Mask(Box::new(term), mask(high, low) as u64);
                }
                if low > 0 {
                    term = Expr::Shr(Box::new(term), low);
                }
                term = term.cast(ty);
                match self.bits_after(index) {
                    0 => term,
                    after => Expr::Shl(Box::new(term), after),
                }
            })
            .collect::<Vec<_>>();
        if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Or(terms)
        }
    }

    /// Byte stores writing a raw value into a zeroed window.
    pub fn write(&self) -> Vec<Store> {
        let ty = self.integer();
        let byte = Integer::new(8);
        (self.first_byte()..=self.last_byte())
            .map(|index| {
                let (high, low) = self.byte_bits(index);
                let mut value = Expr::Value(ty);
                let after = self.bits_after(index);
                if after > 0 {
                    value = Expr::Shr(Box::new(value), after);
                }
                if low > 0 {
                    value = Expr::Shl(Box::new(value), low);
                }
                if high == 7 && low == 0 {
                    return Store { index, op: StoreOp::Assign, value: value.cast(byte) };
                }
                if high < 7 {
                    value = Expr::Mask(Box::new(value), mask(high, low) as u64);
                }
                Store { index, op: StoreOp::Or, value: value.cast(byte) }
            })
            .collect()
    }
}
