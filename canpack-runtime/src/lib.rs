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

//! Helper definitions used by the generated Rust backend.
//!
//! The generated decoders and encoders only depend on the contracts
//! declared here: the frame-send primitive ([`FrameSink`]), the
//! decode callbacks ([`DecodeHooks`]), the range quantizers and the
//! receive-order state machine ([`OrderCheck`]).

use std::convert::Infallible;

/// Payload length of a classic CAN frame.
pub const CAN_MAX_DLEN: usize = 8;

/// Payload length of a CAN FD frame.
pub const CANFD_MAX_DLEN: usize = 64;

/// Reported when a frame of a multi-frame set arrives out of sequence.
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
#[error("expected frame index {expected}, got {actual}")]
pub struct OrderError {
    /// Sequence index the set was waiting for.
    pub expected: u8,
    /// Sequence index of the frame that arrived.
    pub actual: u8,
}

/// Type of encoding errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EncodeError<E> {
    #[error("could not send frame {can_id:#x}")]
    SendFailed { can_id: u32, error: E },
    #[error("payload of {len} bytes does not fit the {max} bytes of frame {can_id:#x}")]
    PayloadTooLong { can_id: u32, len: usize, max: usize },
}

/// Outcome of a frame accepted by an [`OrderCheck`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// More frames are needed to complete the set.
    Pending,
    /// The frame was the last of its set.
    Complete,
}

/// Receive-order state machine of one multi-frame set.
///
/// Frames of the set carry the sequence indices `0..len` in declaration
/// order. Each accepted frame advances the expected index, which wraps
/// back to zero after the last frame. Any other index resets the machine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OrderCheck {
    expected: u8,
}

impl OrderCheck {
    pub const fn new() -> Self {
        OrderCheck { expected: 0 }
    }

    /// Sequence index of the next frame expected by the set.
    pub fn expected(&self) -> u8 {
        self.expected
    }

    pub fn reset(&mut self) {
        self.expected = 0;
    }

    /// Record the arrival of frame `index` of a set of `len` frames.
    ///
    /// On mismatch the state is reset and the error carries the index
    /// that was expected before the reset.
    pub fn advance(&mut self, index: u8, len: u8) -> Result<Progress, OrderError> {
        if index != self.expected {
            let expected = self.expected;
            self.expected = 0;
            return Err(OrderError { expected, actual: index });
        }
        if u16::from(index) + 1 >= u16::from(len) {
            self.expected = 0;
            Ok(Progress::Complete)
        } else {
            self.expected += 1;
            Ok(Progress::Pending)
        }
    }

    /// Restart the set with the frame of sequence index 0, after an
    /// order error was reported for that same frame.
    pub fn restart(&mut self, len: u8) -> Progress {
        self.expected = 0;
        match self.advance(0, len) {
            Ok(progress) => progress,
            Err(_) => unreachable!("index 0 is always expected after a reset"),
        }
    }
}

/// Frame-send primitive invoked by generated encoders.
pub trait FrameSink {
    type Error;

    fn send(&mut self, can_id: u32, is_extended: bool, data: &[u8]) -> Result<(), Self::Error>;
}

/// Owned copy of a sent frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub can_id: u32,
    pub is_extended: bool,
    pub data: Vec<u8>,
}

/// Collect frames in memory.
impl FrameSink for Vec<Frame> {
    type Error = Infallible;

    fn send(&mut self, can_id: u32, is_extended: bool, data: &[u8]) -> Result<(), Self::Error> {
        self.push(Frame { can_id, is_extended, data: data.to_vec() });
        Ok(())
    }
}

/// Callbacks invoked by generated decoders.
///
/// Both methods default to doing nothing, so that `()` can be used
/// when the caller is not interested in decode events.
pub trait DecodeHooks<R> {
    /// Called when the last frame of a set was decoded into `record`.
    fn on_complete(&mut self, _record: &R) {}

    /// Called when a frame arrives out of sequence. The set is reset
    /// before the hook returns.
    fn on_order_error(&mut self, _expected_can_id: u32, _actual_can_id: u32) {}
}

impl<R> DecodeHooks<R> for () {}

/// Largest raw value of an unsigned field of `bits` bits.
pub fn max_raw(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Map an unsigned raw value of `bits` bits linearly onto `[min, max]`.
pub fn range_to_float(raw: u64, min: f64, max: f64, bits: u32) -> f64 {
    min + raw as f64 * (max - min) / max_raw(bits) as f64
}

/// Map `value` linearly from `[min, max]` onto the raw range of a
/// `bits` bits field, rounding to the nearest step.
///
/// Values outside of `[min, max]` saturate to the raw range.
pub fn float_to_range(value: f64, min: f64, max: f64, bits: u32) -> u64 {
    let steps = max_raw(bits) as f64;
    let raw = ((value - min) / (max - min) * steps).round();
    if raw.is_nan() || raw <= 0.0 {
        0
    } else if raw >= steps {
        max_raw(bits)
    } else {
        raw as u64
    }
}
