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

//! Frame sequencing.
//!
//! The analyzer produces a [`Schema`] of validated fields. [`generate`]
//! groups the fields per frame identifier, assigns sequence indices to
//! the frames of every message set and derives the order checks of
//! multi-frame sets. The resulting [`Layout`] is rendered by the
//! backends.

use crate::bits::{BitWindow, StoreOp};
use crate::quantize::Codec;
use crate::types::ScalarType;
use serde::Serialize;

/// Payload length of classic CAN frames.
pub const CAN_FRAME_LEN: usize = 8;
/// Payload length of CAN FD frames.
pub const CANFD_FRAME_LEN: usize = 64;
/// Largest number of frames in one message set.
pub const MAX_FRAME_COUNT: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetMode {
    /// The offset is folded into the identifier constants.
    Static(u32),
    /// The offset is added to the identifiers at run time.
    Dynamic,
}

/// Behavior of a decoder receiving a frame out of sequence.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderErrorPolicy {
    /// Discard the frame.
    #[default]
    Drop,
    /// Discard the frame, unless it is the first frame of its set in
    /// which case the set restarts with it.
    Resync,
}

/// Generation options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Name of the generated record type.
    pub name: String,
    pub offset: OffsetMode,
    pub on_order_error: OrderErrorPolicy,
}

impl Options {
    pub fn new(name: &str) -> Options {
        Options {
            name: name.to_owned(),
            offset: OffsetMode::Static(0),
            on_order_error: OrderErrorPolicy::Drop,
        }
    }
}

/// Declared frame identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CanId {
    pub declared: u32,
    /// The identifier is shifted by the identifier offset.
    pub offset: bool,
}

impl CanId {
    /// Identifier after folding in a static offset.
    pub fn resolve(&self, mode: OffsetMode) -> Identifier {
        match mode {
            OffsetMode::Static(offset) if self.offset => {
                Identifier { value: self.declared.wrapping_add(offset), dynamic: false }
            }
            OffsetMode::Dynamic if self.offset => {
                Identifier { value: self.declared, dynamic: true }
            }
            _ => Identifier { value: self.declared, dynamic: false },
        }
    }
}

/// Frame identifier as compared by the generated decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Identifier {
    pub value: u32,
    /// The run time offset is added to `value`.
    pub dynamic: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    ByteSpan { first_byte: usize, last_byte: usize },
    BitSpan { byte: usize, high_bit: usize, low_bit: usize },
}

impl Location {
    pub fn window(&self) -> BitWindow {
        match *self {
            Location::ByteSpan { first_byte, last_byte } => {
                BitWindow::from_byte_span(first_byte, last_byte)
            }
            Location::BitSpan { byte, high_bit, low_bit } => {
                BitWindow::from_bit_span(byte, high_bit, low_bit)
            }
        }
    }
}

/// Field declared with `[[var]]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalarField {
    pub name: String,
    pub ty: ScalarType,
    pub can_id: CanId,
    pub location: Location,
    /// Missing for byte arrays, which are copied verbatim.
    pub codec: Option<Codec>,
    pub description: Option<String>,
}

/// Field packed in the concatenated payload of an array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubField {
    pub name: String,
    pub ty: ScalarType,
    pub window: BitWindow,
    pub codec: Codec,
    pub description: Option<String>,
}

/// Byte buffer transported over several frames.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrayField {
    pub name: String,
    pub element_byte_width: usize,
    pub frame_count: usize,
    pub can_ids: Vec<CanId>,
    pub sub_fields: Vec<SubField>,
    pub description: Option<String>,
}

impl ArrayField {
    pub fn len(&self) -> usize {
        self.element_byte_width * self.frame_count
    }
}

/// Transmit-only frame declared with `[[cmd]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    pub name: String,
    pub can_id: CanId,
    /// Control prefix copied at byte 0.
    pub ctrl_data: Vec<u8>,
    /// Byte index of the first payload byte.
    pub ctrl_len: usize,
    pub description: Option<String>,
}

/// Validated message set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Schema {
    pub canfd: bool,
    pub extended: bool,
    pub frame_len: usize,
    pub vars: Vec<ScalarField>,
    pub arrays: Vec<ArrayField>,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpandError {
    #[error("identifier range {start:#x}..={end:#x} does not contain {frame_count} identifiers")]
    RangeMismatch { start: u32, end: u32, frame_count: usize },
    #[error("{count} identifiers are declared for {frame_count} frames")]
    CountMismatch { count: usize, frame_count: usize },
}

/// Expand the identifier declaration of an array.
///
/// A list of `frame_count` identifiers is taken as is. When more than
/// two frames are declared, a pair of identifiers is taken as the
/// inclusive range `start..=end`.
pub fn expand_can_ids(ids: &[u32], frame_count: usize) -> Result<Vec<u32>, ExpandError> {
    if ids.len() == frame_count {
        return Ok(ids.to_vec());
    }
    match ids {
        [start, end] if frame_count > 2 => {
            let (start, end) = (*start, *end);
            if end < start || (end - start) as usize + 1 != frame_count {
                return Err(ExpandError::RangeMismatch { start, end, frame_count });
            }
            Ok((start..=end).collect())
        }
        _ => Err(ExpandError::CountMismatch { count: ids.len(), frame_count }),
    }
}

/// Record member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub name: String,
    pub ty: ScalarType,
    /// Element count of byte buffers.
    pub len: Option<usize>,
    pub description: Option<String>,
}

/// Scalar value stored in a window of a byte buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldOp {
    pub member: String,
    pub ty: ScalarType,
    pub window: BitWindow,
    pub codec: Codec,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Op {
    /// Scalar field of the frame.
    Field(FieldOp),
    /// Byte array copied from `first_byte` of the frame.
    Bytes { member: String, first_byte: usize, len: usize },
    /// Whole frame copied at `offset` of an array buffer.
    Slice { member: String, offset: usize, len: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub can_id: Identifier,
    /// Sequence index of the frame in its set.
    pub index: usize,
    /// Last frame of its set: completes the record.
    pub terminal: bool,
    /// Operations in declaration order.
    pub ops: Vec<Op>,
    /// Some byte of the frame is not assigned by `ops`: the encoder
    /// zeroes the frame before writing.
    pub zero_fill: bool,
}

/// Array buffer unpacked once all of its frames are received.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Buffer {
    pub member: String,
    pub len: usize,
    pub fields: Vec<FieldOp>,
}

/// Receive order check of a multi-frame set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderCheck {
    /// Name of the decoder state.
    pub name: String,
    /// Identifiers indexed by sequence index.
    pub can_ids: Vec<Identifier>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameSet {
    pub name: String,
    pub order_check: Option<OrderCheck>,
    pub frames: Vec<Frame>,
    pub buffer: Option<Buffer>,
}

/// Command frame: control prefix followed by a caller payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandFrame {
    pub name: String,
    pub can_id: Identifier,
    pub ctrl_data: Vec<u8>,
    pub ctrl_len: usize,
    /// Largest payload fitting after `ctrl_len`.
    pub max_payload: usize,
    pub description: Option<String>,
}

/// Sequenced message set, ready for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub name: String,
    pub canfd: bool,
    pub extended: bool,
    pub frame_len: usize,
    pub offset: OffsetMode,
    pub on_order_error: OrderErrorPolicy,
    pub members: Vec<Member>,
    pub sets: Vec<FrameSet>,
    pub commands: Vec<CommandFrame>,
}

impl Layout {
    pub fn is_dynamic(&self) -> bool {
        self.offset == OffsetMode::Dynamic
    }

    pub fn iter_frames(&self) -> impl Iterator<Item = (&FrameSet, &Frame)> {
        self.sets.iter().flat_map(|set| set.frames.iter().map(move |frame| (set, frame)))
    }
}

fn field_op(field: &ScalarField, codec: Codec) -> FieldOp {
    FieldOp {
        member: field.name.clone(),
        ty: field.ty,
        window: field.location.window(),
        codec,
    }
}

fn zero_fill(ops: &[Op], frame_len: usize) -> bool {
    let mut assigned = vec![false; frame_len];
    for op in ops {
        match op {
            Op::Field(field) => {
                for store in field.window.write() {
                    if store.op == StoreOp::Assign {
                        assigned[store.index] = true;
                    }
                }
            }
            Op::Bytes { first_byte, len, .. } => {
                assigned[*first_byte..*first_byte + len].iter_mut().for_each(|b| *b = true)
            }
            Op::Slice { len, .. } => assigned[..*len].iter_mut().for_each(|b| *b = true),
        }
    }
    assigned.iter().any(|assigned| !assigned)
}

fn order_check(name: String, can_ids: &[Identifier]) -> Option<OrderCheck> {
    (can_ids.len() > 1).then(|| OrderCheck { name, can_ids: can_ids.to_vec() })
}

/// Distinct identifiers of the scalar fields, in order of first
/// appearance. Fields are grouped by the identifier they resolve to, so
/// that an offset declaration and a fixed one landing on the same
/// identifier share a frame.
pub fn scalar_identifiers(vars: &[ScalarField], mode: OffsetMode) -> Vec<Identifier> {
    let mut identifiers = vec![];
    for field in vars {
        let id = field.can_id.resolve(mode);
        if !identifiers.contains(&id) {
            identifiers.push(id);
        }
    }
    identifiers
}

fn scalar_set(schema: &Schema, options: &Options) -> Option<FrameSet> {
    let identifiers = scalar_identifiers(&schema.vars, options.offset);
    if identifiers.is_empty() {
        return None;
    }

    let frames = identifiers
        .iter()
        .enumerate()
        .map(|(index, can_id)| {
            let ops: Vec<_> = schema
                .vars
                .iter()
                .filter(|field| field.can_id.resolve(options.offset) == *can_id)
                .map(|field| match field.codec {
                    Some(codec) => Op::Field(field_op(field, codec)),
                    None => {
                        let window = field.location.window();
                        Op::Bytes {
                            member: field.name.clone(),
                            first_byte: window.first_byte(),
                            len: window.width / 8,
                        }
                    }
                })
                .collect();
            Frame {
                can_id: *can_id,
                index,
                terminal: index + 1 == identifiers.len(),
                zero_fill: zero_fill(&ops, schema.frame_len),
                ops,
            }
        })
        .collect();

    Some(FrameSet {
        name: "vars".to_owned(),
        order_check: order_check("vars".to_owned(), &identifiers),
        frames,
        buffer: None,
    })
}

fn array_set(array: &ArrayField, options: &Options) -> FrameSet {
    let name = format!("array_{}", array.name);
    let identifiers: Vec<_> = array.can_ids.iter().map(|id| id.resolve(options.offset)).collect();
    let frames = identifiers
        .iter()
        .enumerate()
        .map(|(index, can_id)| Frame {
            can_id: *can_id,
            index,
            terminal: index + 1 == identifiers.len(),
            ops: vec![Op::Slice {
                member: array.name.clone(),
                offset: index * array.element_byte_width,
                len: array.element_byte_width,
            }],
            zero_fill: false,
        })
        .collect();
    let buffer = (!array.sub_fields.is_empty()).then(|| Buffer {
        member: array.name.clone(),
        len: array.len(),
        fields: array
            .sub_fields
            .iter()
            .map(|field| FieldOp {
                member: field.name.clone(),
                ty: field.ty,
                window: field.window,
                codec: field.codec,
            })
            .collect(),
    });
    FrameSet { order_check: order_check(name.clone(), &identifiers), name, frames, buffer }
}

fn command_frame(command: &Command, frame_len: usize, options: &Options) -> CommandFrame {
    CommandFrame {
        name: command.name.clone(),
        can_id: command.can_id.resolve(options.offset),
        ctrl_data: command.ctrl_data.clone(),
        ctrl_len: command.ctrl_len,
        max_payload: frame_len.saturating_sub(command.ctrl_len),
        description: command.description.clone(),
    }
}

/// Sequence the frames of a validated schema.
pub fn generate(schema: &Schema, options: &Options) -> Layout {
    let mut members = vec![];
    for field in &schema.vars {
        let len = match field.codec {
            None => Some(field.location.window().width / 8),
            Some(_) => None,
        };
        members.push(Member {
            name: field.name.clone(),
            ty: field.ty,
            len,
            description: field.description.clone(),
        });
    }
    for array in &schema.arrays {
        members.push(Member {
            name: array.name.clone(),
            ty: ScalarType::ByteArray,
            len: Some(array.len()),
            description: array.description.clone(),
        });
        members.extend(array.sub_fields.iter().map(|field| Member {
            name: field.name.clone(),
            ty: field.ty,
            len: None,
            description: field.description.clone(),
        }));
    }

    let mut sets = vec![];
    sets.extend(scalar_set(schema, options));
    sets.extend(schema.arrays.iter().map(|array| array_set(array, options)));
    let commands: Vec<_> = schema
        .commands
        .iter()
        .map(|command| command_frame(command, schema.frame_len, options))
        .collect();

    log::debug!(
        "layout {}: {} member(s), {} set(s), {} frame(s), {} command(s)",
        options.name,
        members.len(),
        sets.len(),
        sets.iter().map(|set| set.frames.len()).sum::<usize>(),
        commands.len()
    );

    Layout {
        name: options.name.clone(),
        canfd: schema.canfd,
        extended: schema.extended,
        frame_len: schema.frame_len,
        offset: options.offset,
        on_order_error: options.on_order_error,
        members,
        sets,
        commands,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::{assert_that, eq};

    fn can_id(declared: u32) -> CanId {
        CanId { declared, offset: true }
    }

    fn var(name: &str, id: u32, location: Location) -> ScalarField {
        ScalarField {
            name: name.to_owned(),
            ty: ScalarType::U8,
            can_id: can_id(id),
            location,
            codec: Some(Codec::Integer),
            description: None,
        }
    }

    fn schema(vars: Vec<ScalarField>, arrays: Vec<ArrayField>) -> Schema {
        Schema { canfd: false, extended: false, frame_len: 8, vars, arrays, commands: vec![] }
    }

    #[test]
    fn range_expansion() {
        assert_eq!(expand_can_ids(&[0x100, 0x103], 4), Ok(vec![0x100, 0x101, 0x102, 0x103]));
        assert_eq!(
            expand_can_ids(&[0x100, 0x103], 3),
            Err(ExpandError::RangeMismatch { start: 0x100, end: 0x103, frame_count: 3 })
        );
        assert_eq!(
            expand_can_ids(&[0x103, 0x100], 4),
            Err(ExpandError::RangeMismatch { start: 0x103, end: 0x100, frame_count: 4 })
        );
    }

    #[test]
    fn explicit_lists() {
        assert_eq!(expand_can_ids(&[0x10, 0x20], 2), Ok(vec![0x10, 0x20]));
        assert_eq!(expand_can_ids(&[0x10], 1), Ok(vec![0x10]));
        assert_eq!(
            expand_can_ids(&[0x10, 0x11, 0x12], 2),
            Err(ExpandError::CountMismatch { count: 3, frame_count: 2 })
        );
        // A pair only denotes a range with more than two frames.
        assert_eq!(
            expand_can_ids(&[0x10, 0x11], 1),
            Err(ExpandError::CountMismatch { count: 2, frame_count: 1 })
        );
    }

    #[test]
    fn static_offset_is_folded() {
        let id = CanId { declared: 0x100, offset: true };
        assert_eq!(id.resolve(OffsetMode::Static(0x20)), Identifier { value: 0x120, dynamic: false });
        assert_eq!(id.resolve(OffsetMode::Dynamic), Identifier { value: 0x100, dynamic: true });
        let fixed = CanId { declared: 0x100, offset: false };
        assert_eq!(fixed.resolve(OffsetMode::Static(0x20)), Identifier { value: 0x100, dynamic: false });
        assert_eq!(fixed.resolve(OffsetMode::Dynamic), Identifier { value: 0x100, dynamic: false });
    }

    #[test]
    fn scalar_set_follows_first_appearance() {
        let byte = |b| Location::ByteSpan { first_byte: b, last_byte: b };
        let schema = schema(
            vec![var("a", 0x201, byte(0)), var("b", 0x200, byte(0)), var("c", 0x201, byte(1))],
            vec![],
        );
        let layout = generate(&schema, &Options::new("Test"));
        assert_that!(layout.sets.len(), eq(1));
        let set = &layout.sets[0];
        let ids: Vec<_> = set.frames.iter().map(|frame| frame.can_id.value).collect();
        assert_that!(ids, eq(vec![0x201, 0x200]));
        assert_that!(set.frames[0].ops.len(), eq(2));
        assert!(!set.frames[0].terminal);
        assert!(set.frames[1].terminal);
        assert!(set.frames[0].zero_fill);
        assert_that!(set.order_check.as_ref().map(|check| check.can_ids.len()), eq(Some(2)));
    }

    #[test]
    fn fields_resolving_to_one_identifier_share_a_frame() {
        let byte = |b| Location::ByteSpan { first_byte: b, last_byte: b };
        let mut fixed = var("a", 0x10, byte(0));
        fixed.can_id.offset = false;
        let same = schema(vec![fixed, var("b", 0x10, byte(1))], vec![]);
        let layout = generate(&same, &Options::new("Test"));
        let set = &layout.sets[0];
        assert_that!(set.frames.len(), eq(1));
        assert_that!(set.frames[0].ops.len(), eq(2));
        assert!(set.frames[0].terminal);
        assert!(set.order_check.is_none());

        // With a static offset the suffixed 0x10 lands on the fixed 0x20.
        let mut fixed = var("a", 0x20, byte(0));
        fixed.can_id.offset = false;
        let shifted = schema(vec![fixed, var("b", 0x10, byte(1))], vec![]);
        let options = Options { offset: OffsetMode::Static(0x10), ..Options::new("Test") };
        let layout = generate(&shifted, &options);
        let ids: Vec<_> = layout.sets[0].frames.iter().map(|frame| frame.can_id.value).collect();
        assert_that!(ids, eq(vec![0x20]));

        // A dynamic offset keeps them apart.
        let options = Options { offset: OffsetMode::Dynamic, ..Options::new("Test") };
        let layout = generate(&shifted, &options);
        assert_that!(layout.sets[0].frames.len(), eq(2));
    }

    #[test]
    fn commands_reserve_their_control_prefix() {
        let mut commands = schema(vec![], vec![]);
        commands.commands.push(Command {
            name: "set_mode".to_owned(),
            can_id: can_id(0x300),
            ctrl_data: vec![0xa5, 0x01],
            ctrl_len: 3,
            description: None,
        });
        let options = Options { offset: OffsetMode::Static(0x10), ..Options::new("Test") };
        let layout = generate(&commands, &options);
        assert!(layout.sets.is_empty());
        assert_that!(layout.commands.len(), eq(1));
        assert_that!(layout.commands[0].can_id, eq(Identifier { value: 0x310, dynamic: false }));
        assert_that!(layout.commands[0].max_payload, eq(5));
    }

    #[test]
    fn single_identifier_has_no_order_check() {
        let schema = schema(
            vec![var("a", 0x10, Location::BitSpan { byte: 0, high_bit: 3, low_bit: 0 })],
            vec![],
        );
        let layout = generate(&schema, &Options::new("Test"));
        assert!(layout.sets[0].order_check.is_none());
        assert!(layout.sets[0].frames[0].terminal);
    }

    #[test]
    fn array_frames_are_slices() {
        let array = ArrayField {
            name: "cloud".to_owned(),
            element_byte_width: 8,
            frame_count: 3,
            can_ids: vec![can_id(0x300), can_id(0x301), can_id(0x302)],
            sub_fields: vec![SubField {
                name: "x".to_owned(),
                ty: ScalarType::Float,
                window: BitWindow { offset: 60, width: 12 },
                codec: Codec::Range { min: 0.0, max: 1.0, bits: 12 },
                description: None,
            }],
            description: Some("point cloud".to_owned()),
        };
        let layout = generate(&schema(vec![], vec![array]), &Options::new("Test"));
        assert_that!(layout.members.len(), eq(2));
        assert_that!(layout.members[0].len, eq(Some(24)));
        let set = &layout.sets[0];
        assert_that!(set.name.as_str(), eq("array_cloud"));
        assert_that!(
            set.frames[2].ops,
            eq(vec![Op::Slice { member: "cloud".to_owned(), offset: 16, len: 8 }])
        );
        assert!(!set.frames[1].zero_fill);
        assert_that!(set.buffer.as_ref().map(|buffer| buffer.len), eq(Some(24)));
    }

    #[test]
    fn full_frames_need_no_zero_fill() {
        let schema = schema(
            vec![
                var("a", 0x10, Location::ByteSpan { first_byte: 0, last_byte: 3 }),
                var("b", 0x10, Location::ByteSpan { first_byte: 4, last_byte: 7 }),
            ],
            vec![],
        );
        let layout = generate(&schema, &Options::new("Test"));
        assert!(!layout.sets[0].frames[0].zero_fill);
    }
}
