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

use codespan_reporting::diagnostic::{Diagnostic, Severity};
use codespan_reporting::files;
use codespan_reporting::term;
use codespan_reporting::term::termcolor;
use heck::ToSnakeCase;
use std::collections::HashMap;
use std::fmt;

use crate::ast::{self, FileId, Located, SourceDatabase, SourceRange};
use crate::bits::BitWindow;
use crate::layout::{
    self, ArrayField, CanId, Command, ExpandError, Location, OffsetMode, Options, ScalarField,
    Schema, SubField,
};
use crate::quantize::{self, CodecError};
use crate::types::ScalarType;

/// List of unique errors reported as analyzer diagnostics.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    UnknownType = 1,
    InvalidBitSpan = 2,
    RangeMismatch = 3,
    UnsupportedFrameCount = 4,
    UnknownCommand = 5,
    InvalidParserParam = 6,
    InvalidCanId = 7,
    DuplicateFieldIdentifier = 8,
    DuplicateCanId = 9,
    DataAreaConflict = 10,
    CanIdCountMismatch = 11,
    UnsupportedFloatWidth = 12,
    MissingScale = 13,
    InvalidScale = 14,
    InvalidFieldWidth = 15,
    InvalidValueRange = 16,
    InvalidSubFieldType = 17,
    InvalidFieldName = 18,
    NonContiguousCanIds = 19,
    IgnoredScale = 20,
    InvalidCommandName = 21,
    DuplicateCommandName = 22,
    InvalidControlData = 23,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "E{}", *self as u16)
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        format!("{}", code)
    }
}

/// Aggregate analyzer diagnostics.
#[derive(Debug, Default)]
pub struct Diagnostics {
    pub diagnostics: Vec<Diagnostic<FileId>>,
}

impl Diagnostics {
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity >= Severity::Error)
    }

    fn push(&mut self, diagnostic: Diagnostic<FileId>) {
        self.diagnostics.push(diagnostic)
    }

    pub fn emit(
        &self,
        sources: &SourceDatabase,
        writer: &mut dyn termcolor::WriteColor,
    ) -> Result<(), files::Error> {
        let config = term::Config::default();
        for d in self.diagnostics.iter() {
            term::emit(writer, &config, sources, d)?;
        }
        Ok(())
    }
}

struct CheckedVar {
    field: ScalarField,
    name: SourceRange,
    can_id: SourceRange,
}

struct CheckedArray {
    field: ArrayField,
    name: SourceRange,
    can_ids: Vec<SourceRange>,
}

struct CheckedCmd {
    command: Command,
    name: SourceRange,
    can_id: SourceRange,
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse a hexadecimal number, optionally prefixed with `0x`.
fn parse_hex(text: &str) -> Option<u32> {
    let text = text.trim();
    let digits = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")).unwrap_or(text);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

/// Parse a hexadecimal identifier, optionally suffixed with `+` to mark
/// it offset eligible.
fn parse_can_id(text: &str) -> Option<(u32, bool)> {
    let text = text.trim();
    match text.strip_suffix('+') {
        Some(text) => parse_hex(text).map(|value| (value, true)),
        None => parse_hex(text).map(|value| (value, false)),
    }
}

fn codec_error(err: CodecError) -> Diagnostic<FileId> {
    let code = match err {
        CodecError::UnsupportedFloatWidth { .. } => ErrorCode::UnsupportedFloatWidth,
        CodecError::MissingScale { .. } => ErrorCode::MissingScale,
        CodecError::InvalidScale(_) => ErrorCode::InvalidScale,
        CodecError::InvalidFieldWidth { .. } => ErrorCode::InvalidFieldWidth,
        CodecError::InvalidValueRange { .. } => ErrorCode::InvalidValueRange,
    };
    Diagnostic::error().with_code(code).with_message(err.to_string())
}

/// Check that record member names are valid and unique across vars,
/// arrays and sub-fields.
fn check_names(file: &ast::File, diagnostics: &mut Diagnostics) {
    let mut seen: HashMap<&str, SourceRange> = HashMap::new();
    for name in file.iter_names() {
        let loc = name.loc(file.file);
        if !is_identifier(name.get_ref()) {
            diagnostics.push(
                Diagnostic::error()
                    .with_code(ErrorCode::InvalidFieldName)
                    .with_message(format!("`{}` is not a valid field name", name.get_ref()))
                    .with_labels(vec![loc.primary()]),
            );
            continue;
        }
        if let Some(prev) = seen.insert(name.get_ref(), loc) {
            diagnostics.push(
                Diagnostic::error()
                    .with_code(ErrorCode::DuplicateFieldIdentifier)
                    .with_message(format!("redeclaration of field `{}`", name.get_ref()))
                    .with_labels(vec![
                        loc.primary(),
                        prev.secondary().with_message(format!(
                            "`{}` is first declared here",
                            name.get_ref()
                        )),
                    ]),
            );
        }
    }
}

fn check_location(
    var: &ast::Var,
    ty: ScalarType,
    file: FileId,
    frame_len: usize,
    diagnostics: &mut Diagnostics,
) -> Option<Location> {
    #[derive(PartialEq)]
    enum Parser {
        Bit,
        Var,
    }

    let params = var.parser_param.get_ref();
    let params_loc = var.parser_param.loc(file);
    let invalid_param = |message: String| {
        Diagnostic::error()
            .with_code(ErrorCode::InvalidParserParam)
            .with_message(message)
            .with_labels(vec![params_loc.primary()])
    };

    let parser = match var.parser_type.as_ref().map(|t| t.get_ref().as_str()) {
        None | Some("auto") => match params.len() {
            2 => Parser::Var,
            3 => Parser::Bit,
            n => {
                diagnostics.push(invalid_param(format!(
                    "expected 2 or 3 parser_param values, got {}",
                    n
                )));
                return None;
            }
        },
        Some("var") => Parser::Var,
        Some("bit") => Parser::Bit,
        Some(other) => {
            diagnostics.push(
                Diagnostic::error()
                    .with_code(ErrorCode::InvalidParserParam)
                    .with_message(format!(
                        "unknown parser_type `{}`, expected `auto`, `bit` or `var`",
                        other
                    ))
                    .with_labels(vec![var
                        .parser_type
                        .as_ref()
                        .map(|t| t.loc(file))
                        .unwrap_or(params_loc)
                        .primary()]),
            );
            return None;
        }
    };

    let invalid_span = |message: String| {
        Diagnostic::error()
            .with_code(ErrorCode::InvalidBitSpan)
            .with_message(message)
            .with_labels(vec![params_loc.primary()])
    };

    match (parser, params.as_slice()) {
        (Parser::Var, [first, last]) => {
            let (first, last) = (*first as usize, *last as usize);
            if first > last || last >= frame_len {
                diagnostics.push(invalid_span(format!(
                    "invalid byte span [{}, {}] in a {} byte frame",
                    first, last, frame_len
                )));
                return None;
            }
            if ty != ScalarType::ByteArray && last - first + 1 > 8 {
                diagnostics.push(invalid_span(format!(
                    "byte span [{}, {}] is wider than 8 bytes",
                    first, last
                )));
                return None;
            }
            Some(Location::ByteSpan { first_byte: first, last_byte: last })
        }
        (Parser::Bit, [byte, high, low]) => {
            let (byte, high, low) = (*byte as usize, *high as usize, *low as usize);
            if ty == ScalarType::ByteArray {
                diagnostics.push(invalid_param("u8_array fields require a byte span".to_owned()));
                return None;
            }
            if byte >= frame_len || low > high || high > 7 {
                diagnostics.push(invalid_span(format!(
                    "invalid bit span [{}, {}, {}] in a {} byte frame",
                    byte, high, low, frame_len
                )));
                return None;
            }
            Some(Location::BitSpan { byte, high_bit: high, low_bit: low })
        }
        (Parser::Var, _) => {
            diagnostics.push(invalid_param(
                "parser_type `var` expects [first_byte, last_byte]".to_owned(),
            ));
            None
        }
        (Parser::Bit, _) => {
            diagnostics.push(invalid_param(
                "parser_type `bit` expects [byte, high_bit, low_bit]".to_owned(),
            ));
            None
        }
    }
}

fn check_var(
    var: &ast::Var,
    file: FileId,
    frame_len: usize,
    diagnostics: &mut Diagnostics,
) -> Option<CheckedVar> {
    let type_loc = var.var_type.loc(file);
    let Some(ty) = ScalarType::resolve(var.var_type.get_ref()) else {
        diagnostics.push(
            Diagnostic::error()
                .with_code(ErrorCode::UnknownType)
                .with_message(format!("unknown type `{}`", var.var_type.get_ref()))
                .with_labels(vec![type_loc.primary()]),
        );
        return None;
    };

    let Some((declared, suffixed)) = parse_can_id(var.can_id.get_ref()) else {
        diagnostics.push(
            Diagnostic::error()
                .with_code(ErrorCode::InvalidCanId)
                .with_message(format!("invalid identifier `{}`", var.can_id.get_ref()))
                .with_labels(vec![var.can_id.loc(file).primary()]),
        );
        return None;
    };

    let location = check_location(var, ty, file, frame_len, diagnostics)?;

    if let Some(zoom) = &var.var_zoom {
        if !ty.is_float() {
            diagnostics.push(
                Diagnostic::warning()
                    .with_code(ErrorCode::IgnoredScale)
                    .with_message(format!("var_zoom is ignored for {} fields", ty.name()))
                    .with_labels(vec![zoom.loc(file).primary()]),
            );
        }
    }

    let codec = match ty {
        ScalarType::ByteArray => None,
        _ => {
            let scale = var.var_zoom.as_ref().map(|zoom| *zoom.get_ref());
            match quantize::select(ty, &location.window(), scale) {
                Ok(codec) => Some(codec),
                Err(err) => {
                    let loc = match (&err, &var.var_zoom) {
                        (CodecError::InvalidScale(_), Some(zoom)) => zoom.loc(file),
                        _ => var.parser_param.loc(file),
                    };
                    diagnostics.push(
                        codec_error(err).with_labels(vec![loc.primary(), type_loc.secondary()]),
                    );
                    return None;
                }
            }
        }
    };

    Some(CheckedVar {
        field: ScalarField {
            name: var.var_name.get_ref().clone(),
            ty,
            can_id: CanId { declared, offset: suffixed },
            location,
            codec,
            description: var.description.clone(),
        },
        name: var.var_name.loc(file),
        can_id: var.can_id.loc(file),
    })
}

fn check_sub_fields(
    array: &ast::Array,
    file: FileId,
    buffer_len: usize,
    diagnostics: &mut Diagnostics,
) -> Option<Vec<SubField>> {
    let mut offset = 0;
    let mut valid = true;
    let mut sub_fields = vec![];
    for content in &array.content {
        let bits = *content.bits.get_ref() as usize;
        let window = BitWindow { offset, width: bits };
        offset += bits;

        let Some(ty) = ScalarType::resolve(content.type_.get_ref()) else {
            diagnostics.push(
                Diagnostic::error()
                    .with_code(ErrorCode::UnknownType)
                    .with_message(format!("unknown type `{}`", content.type_.get_ref()))
                    .with_labels(vec![content.type_.loc(file).primary()]),
            );
            valid = false;
            continue;
        };
        if !ty.is_integer() && !ty.is_float() {
            diagnostics.push(
                Diagnostic::error()
                    .with_code(ErrorCode::InvalidSubFieldType)
                    .with_message(format!("array sub-fields cannot have the type {}", ty.name()))
                    .with_labels(vec![content.type_.loc(file).primary()]),
            );
            valid = false;
            continue;
        }
        if bits == 0 || bits > 64 {
            diagnostics.push(
                Diagnostic::error()
                    .with_code(ErrorCode::InvalidBitSpan)
                    .with_message(format!("invalid sub-field width {}, expected 1 to 64 bits", bits))
                    .with_labels(vec![content.bits.loc(file).primary()]),
            );
            valid = false;
            continue;
        }
        if window.end() > buffer_len * 8 {
            diagnostics.push(
                Diagnostic::error()
                    .with_code(ErrorCode::InvalidBitSpan)
                    .with_message(format!(
                        "sub-field `{}` ends at bit {}, past the {} bits of array `{}`",
                        content.name.get_ref(),
                        window.end(),
                        buffer_len * 8,
                        array.array_name.get_ref()
                    ))
                    .with_labels(vec![content.bits.loc(file).primary()]),
            );
            valid = false;
            continue;
        }
        let (min, max) = (*content.min.get_ref(), *content.max.get_ref());
        if let Some((low, high)) = ty.integer_range() {
            if min < low || max > high {
                diagnostics.push(
                    Diagnostic::error()
                        .with_code(ErrorCode::InvalidValueRange)
                        .with_message(format!(
                            "range [{}, {}] of sub-field `{}` does not fit the type {}",
                            min,
                            max,
                            content.name.get_ref(),
                            ty.name()
                        ))
                        .with_labels(vec![
                            content.min.loc(file).primary(),
                            content.max.loc(file).primary(),
                            content.type_.loc(file).secondary(),
                        ]),
                );
                valid = false;
                continue;
            }
        }
        match quantize::select_range(min, max, bits) {
            Ok(codec) => sub_fields.push(SubField {
                name: content.name.get_ref().clone(),
                ty,
                window,
                codec,
                description: content.description.clone(),
            }),
            Err(err) => {
                diagnostics.push(codec_error(err).with_labels(vec![
                    content.min.loc(file).primary(),
                    content.max.loc(file).primary(),
                ]));
                valid = false;
            }
        }
    }
    valid.then_some(sub_fields)
}

fn check_array(
    array: &ast::Array,
    file: FileId,
    frame_len: usize,
    diagnostics: &mut Diagnostics,
) -> Option<CheckedArray> {
    let frame_count = *array.package_num.get_ref();
    if frame_count == 0 || frame_count > layout::MAX_FRAME_COUNT as u64 {
        diagnostics.push(
            Diagnostic::error()
                .with_code(ErrorCode::UnsupportedFrameCount)
                .with_message(format!(
                    "array `{}` declares {} frames, expected 1 to {}",
                    array.array_name.get_ref(),
                    frame_count,
                    layout::MAX_FRAME_COUNT
                ))
                .with_labels(vec![array.package_num.loc(file).primary()]),
        );
        return None;
    }
    let frame_count = frame_count as usize;

    let list_loc = array.can_id.loc(file);
    let mut ids = vec![];
    let mut suffixed = false;
    for id in array.can_id.get_ref() {
        match parse_can_id(id.get_ref()) {
            Some((value, suffix)) => {
                ids.push((value, id.loc(file)));
                suffixed |= suffix;
            }
            None => diagnostics.push(
                Diagnostic::error()
                    .with_code(ErrorCode::InvalidCanId)
                    .with_message(format!("invalid identifier `{}`", id.get_ref()))
                    .with_labels(vec![id.loc(file).primary()]),
            ),
        }
    }
    if ids.len() != array.can_id.get_ref().len() {
        return None;
    }

    let values: Vec<u32> = ids.iter().map(|(value, _)| *value).collect();
    let declared = match layout::expand_can_ids(&values, frame_count) {
        Ok(declared) => declared,
        Err(err) => {
            let code = match err {
                ExpandError::RangeMismatch { .. } => ErrorCode::RangeMismatch,
                ExpandError::CountMismatch { .. } => ErrorCode::CanIdCountMismatch,
            };
            diagnostics.push(
                Diagnostic::error()
                    .with_code(code)
                    .with_message(format!("array `{}`: {}", array.array_name.get_ref(), err))
                    .with_labels(vec![list_loc.primary()]),
            );
            return None;
        }
    };

    let can_id_locs = if ids.len() == frame_count {
        let mut seen: HashMap<u32, SourceRange> = HashMap::new();
        let mut valid = true;
        for (value, loc) in &ids {
            if let Some(prev) = seen.insert(*value, *loc) {
                diagnostics.push(
                    Diagnostic::error()
                        .with_code(ErrorCode::DuplicateCanId)
                        .with_message(format!(
                            "identifier {:#x} is used twice by array `{}`",
                            value,
                            array.array_name.get_ref()
                        ))
                        .with_labels(vec![loc.primary(), prev.secondary()]),
                );
                valid = false;
            }
        }
        if !valid {
            return None;
        }
        if values.windows(2).any(|pair| pair[0].checked_add(1) != Some(pair[1])) {
            diagnostics.push(
                Diagnostic::warning()
                    .with_code(ErrorCode::NonContiguousCanIds)
                    .with_message(format!(
                        "the identifiers of array `{}` are not contiguous",
                        array.array_name.get_ref()
                    ))
                    .with_labels(vec![list_loc.primary()]),
            );
        }
        ids.iter().map(|(_, loc)| *loc).collect()
    } else {
        vec![list_loc; frame_count]
    };

    let sub_fields = check_sub_fields(array, file, frame_len * frame_count, diagnostics)?;

    Some(CheckedArray {
        field: ArrayField {
            name: array.array_name.get_ref().clone(),
            element_byte_width: frame_len,
            frame_count,
            can_ids: declared
                .into_iter()
                .map(|declared| CanId { declared, offset: suffixed })
                .collect(),
            sub_fields,
            description: array.description.clone(),
        },
        name: array.array_name.loc(file),
        can_ids: can_id_locs,
    })
}

fn check_cmd(
    cmd: &ast::Cmd,
    file: FileId,
    frame_len: usize,
    diagnostics: &mut Diagnostics,
) -> Option<CheckedCmd> {
    let name = cmd.cmd_name.get_ref();
    let name_loc = cmd.cmd_name.loc(file);
    if !is_identifier(name) {
        diagnostics.push(
            Diagnostic::error()
                .with_code(ErrorCode::InvalidCommandName)
                .with_message(format!("`{}` is not a valid command name", name))
                .with_labels(vec![name_loc.primary()]),
        );
        return None;
    }

    let Some((declared, suffixed)) = parse_can_id(cmd.can_id.get_ref()) else {
        diagnostics.push(
            Diagnostic::error()
                .with_code(ErrorCode::InvalidCanId)
                .with_message(format!("invalid identifier `{}`", cmd.can_id.get_ref()))
                .with_labels(vec![cmd.can_id.loc(file).primary()]),
        );
        return None;
    };

    let mut valid = true;
    let mut ctrl_data = vec![];
    for byte in cmd.ctrl_data.iter().flat_map(|data| data.get_ref()) {
        match parse_hex(byte.get_ref()) {
            Some(value) if value <= 0xff => ctrl_data.push(value as u8),
            _ => {
                diagnostics.push(
                    Diagnostic::error()
                        .with_code(ErrorCode::InvalidControlData)
                        .with_message(format!(
                            "`{}` is not a control byte, expected a hex value up to 0xff",
                            byte.get_ref()
                        ))
                        .with_labels(vec![byte.loc(file).primary()]),
                );
                valid = false;
            }
        }
    }
    if !valid {
        return None;
    }

    let ctrl_len = cmd.ctrl_len.as_ref().map_or(0, |len| *len.get_ref());
    let ctrl_len_loc = cmd.ctrl_len.as_ref().map_or(name_loc, |len| len.loc(file));
    let invalid_len = |message: String| {
        Diagnostic::error()
            .with_code(ErrorCode::InvalidControlData)
            .with_message(message)
            .with_labels(vec![ctrl_len_loc.primary()])
    };
    if ctrl_len > frame_len as u64 {
        diagnostics.push(invalid_len(format!(
            "ctrl_len {} of command `{}` exceeds the {} byte frame",
            ctrl_len, name, frame_len
        )));
        return None;
    }
    if (ctrl_len as usize) < ctrl_data.len() {
        diagnostics.push(invalid_len(format!(
            "ctrl_len {} of command `{}` is shorter than its {} control bytes",
            ctrl_len,
            name,
            ctrl_data.len()
        )));
        return None;
    }

    Some(CheckedCmd {
        command: Command {
            name: name.clone(),
            can_id: CanId { declared, offset: suffixed },
            ctrl_data,
            ctrl_len: ctrl_len as usize,
            description: cmd.description.clone(),
        },
        name: name_loc,
        can_id: cmd.can_id.loc(file),
    })
}

/// Check that command names stay distinct once converted to function
/// names.
fn check_command_names(commands: &[CheckedCmd], diagnostics: &mut Diagnostics) {
    let mut seen: HashMap<String, SourceRange> = HashMap::new();
    for cmd in commands {
        if let Some(prev) = seen.insert(cmd.command.name.to_snake_case(), cmd.name) {
            diagnostics.push(
                Diagnostic::error()
                    .with_code(ErrorCode::DuplicateCommandName)
                    .with_message(format!("redeclaration of command `{}`", cmd.command.name))
                    .with_labels(vec![
                        cmd.name.primary(),
                        prev.secondary().with_message("first declared here"),
                    ]),
            );
        }
    }
}

/// Check that identifiers fit the frame format once the static offset
/// is applied.
fn check_can_id_range(
    can_id: &CanId,
    loc: SourceRange,
    extended: bool,
    mode: OffsetMode,
    diagnostics: &mut Diagnostics,
) {
    let (max, format) = if extended { (0x1fff_ffff, "extended") } else { (0x7ff, "standard") };
    let value = match mode {
        OffsetMode::Static(offset) if can_id.offset => can_id.declared.checked_add(offset),
        _ => Some(can_id.declared),
    };
    match value {
        Some(value) if value <= max => (),
        _ => diagnostics.push(
            Diagnostic::error()
                .with_code(ErrorCode::InvalidCanId)
                .with_message(format!(
                    "identifier {:#x} is out of the {} frame range (max {:#x})",
                    can_id.declared, format, max
                ))
                .with_labels(vec![loc.primary()])
                .with_notes(match (mode, value) {
                    (OffsetMode::Static(offset), Some(value)) if can_id.offset => {
                        vec![format!("{:#x} after adding the offset {:#x}", value, offset)]
                    }
                    _ => vec![],
                }),
        ),
    }
}

/// Check that no two fields write the same bits of the same frame.
fn check_data_areas(
    vars: &[CheckedVar],
    arrays: &[CheckedArray],
    frame_len: usize,
    mode: OffsetMode,
    diagnostics: &mut Diagnostics,
) {
    struct Area {
        used: Vec<u8>,
        owner: Vec<Option<SourceRange>>,
    }

    let mut areas: HashMap<layout::Identifier, Area> = HashMap::new();
    let mut claim = |id: layout::Identifier, masks: Vec<(usize, u8)>, loc: SourceRange| {
        let area = areas
            .entry(id)
            .or_insert_with(|| Area { used: vec![0; frame_len], owner: vec![None; frame_len] });
        for &(index, mask) in &masks {
            if area.used[index] & mask != 0 {
                let mut labels = vec![loc.primary()];
                labels.extend(
                    area.owner[index]
                        .map(|owner| owner.secondary().with_message("conflicting field")),
                );
                diagnostics.push(
                    Diagnostic::error()
                        .with_code(ErrorCode::DataAreaConflict)
                        .with_message(format!(
                            "byte {} of frame {:#x} is already used by another field",
                            index, id.value
                        ))
                        .with_labels(labels),
                );
                return;
            }
        }
        for (index, mask) in masks {
            area.used[index] |= mask;
            area.owner[index] = Some(loc);
        }
    };

    for var in vars {
        let window = var.field.location.window();
        let masks = (window.first_byte()..=window.last_byte())
            .map(|index| (index, window.byte_mask(index)))
            .collect();
        claim(var.field.can_id.resolve(mode), masks, var.name);
    }
    for array in arrays {
        for can_id in &array.field.can_ids {
            let masks = (0..frame_len).map(|index| (index, 0xff)).collect();
            claim(can_id.resolve(mode), masks, array.name);
        }
    }
}

/// Validate a schema document.
///
/// Returns the validated schema along with the warnings raised, or
/// the full list of diagnostics when any error is raised.
pub fn analyze(file: &ast::File, options: &Options) -> Result<(Schema, Diagnostics), Diagnostics> {
    let mut diagnostics = Diagnostics::default();
    let frame_len =
        if file.canfd_enable { layout::CANFD_FRAME_LEN } else { layout::CAN_FRAME_LEN };

    check_names(file, &mut diagnostics);
    let mut vars: Vec<CheckedVar> = file
        .var
        .iter()
        .filter_map(|var| check_var(var, file.file, frame_len, &mut diagnostics))
        .collect();
    let mut arrays: Vec<CheckedArray> = file
        .array
        .iter()
        .filter_map(|array| check_array(array, file.file, frame_len, &mut diagnostics))
        .collect();
    let mut commands: Vec<CheckedCmd> = file
        .cmd
        .iter()
        .filter_map(|cmd| check_cmd(cmd, file.file, frame_len, &mut diagnostics))
        .collect();
    check_command_names(&commands, &mut diagnostics);
    if diagnostics.has_errors() {
        return Err(diagnostics);
    }

    // Without any `+` suffix, every identifier is offset.
    let suffixed = vars.iter().any(|var| var.field.can_id.offset)
        || arrays.iter().flat_map(|array| &array.field.can_ids).any(|can_id| can_id.offset)
        || commands.iter().any(|cmd| cmd.command.can_id.offset);
    if !suffixed {
        vars.iter_mut().for_each(|var| var.field.can_id.offset = true);
        arrays
            .iter_mut()
            .flat_map(|array| array.field.can_ids.iter_mut())
            .for_each(|can_id| can_id.offset = true);
        commands.iter_mut().for_each(|cmd| cmd.command.can_id.offset = true);
    }

    for var in &vars {
        check_can_id_range(
            &var.field.can_id,
            var.can_id,
            file.extended_frame,
            options.offset,
            &mut diagnostics,
        );
    }
    for array in &arrays {
        for (can_id, loc) in array.field.can_ids.iter().zip(&array.can_ids) {
            check_can_id_range(can_id, *loc, file.extended_frame, options.offset, &mut diagnostics);
        }
    }
    for cmd in &commands {
        check_can_id_range(
            &cmd.command.can_id,
            cmd.can_id,
            file.extended_frame,
            options.offset,
            &mut diagnostics,
        );
    }

    let mut scalar_ids = vec![];
    for var in &vars {
        let id = var.field.can_id.resolve(options.offset);
        if !scalar_ids.contains(&id) {
            scalar_ids.push(id);
            if scalar_ids.len() == layout::MAX_FRAME_COUNT + 1 {
                diagnostics.push(
                    Diagnostic::error()
                        .with_code(ErrorCode::UnsupportedFrameCount)
                        .with_message(format!(
                            "vars span more than {} frame identifiers",
                            layout::MAX_FRAME_COUNT
                        ))
                        .with_labels(vec![var.can_id.primary()]),
                );
            }
        }
    }

    check_data_areas(&vars, &arrays, frame_len, options.offset, &mut diagnostics);

    if diagnostics.has_errors() {
        return Err(diagnostics);
    }
    let schema = Schema {
        canfd: file.canfd_enable,
        extended: file.extended_frame,
        frame_len,
        vars: vars.into_iter().map(|var| var.field).collect(),
        arrays: arrays.into_iter().map(|array| array.field).collect(),
        commands: commands.into_iter().map(|cmd| cmd.command).collect(),
    };
    Ok((schema, diagnostics))
}
