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

//! Schema document as written by the user.
//!
//! Values keep the byte range they were read from so that the analyzer
//! can point diagnostics at the offending TOML entry.

use codespan_reporting::diagnostic;
use codespan_reporting::files;
use serde::Deserialize;
use std::fmt;
use std::ops;

pub use toml::Spanned;

/// File identifier.
/// References a source file in the source database.
pub type FileId = usize;

/// Source database.
/// Stores the source file contents for reference.
pub type SourceDatabase = files::SimpleFiles<String, String>;

#[derive(Default, Copy, Clone, PartialEq, Eq)]
pub struct SourceRange {
    pub file: FileId,
    /// Byte offset of the first character (counted from zero).
    pub start: usize,
    /// Byte offset past the last character.
    pub end: usize,
}

impl SourceRange {
    pub fn new(file: FileId, span: ops::Range<usize>) -> SourceRange {
        SourceRange { file, start: span.start, end: span.end }
    }

    pub fn primary(&self) -> diagnostic::Label<FileId> {
        diagnostic::Label::primary(self.file, self.start..self.end)
    }

    pub fn secondary(&self) -> diagnostic::Label<FileId> {
        diagnostic::Label::secondary(self.file, self.start..self.end)
    }
}

impl fmt::Debug for SourceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRange").finish_non_exhaustive()
    }
}

/// Location of a value inside the source document.
pub trait Located {
    fn loc(&self, file: FileId) -> SourceRange;
}

impl<T> Located for Spanned<T> {
    fn loc(&self, file: FileId) -> SourceRange {
        SourceRange::new(file, self.span())
    }
}

/// Top-level schema document.
#[derive(Debug, Deserialize)]
pub struct File {
    /// Identifier of the document in the source database.
    #[serde(skip)]
    pub file: FileId,
    /// Frames carry 64 payload bytes instead of 8.
    #[serde(default)]
    pub canfd_enable: bool,
    /// Identifiers are 29 bits wide instead of 11.
    #[serde(default)]
    pub extended_frame: bool,
    #[serde(default)]
    pub var: Vec<Var>,
    #[serde(default)]
    pub array: Vec<Array>,
    #[serde(default)]
    pub cmd: Vec<Cmd>,
}

/// Scalar field declared with `[[var]]`.
#[derive(Debug, Deserialize)]
pub struct Var {
    pub var_type: Spanned<String>,
    pub var_name: Spanned<String>,
    pub can_id: Spanned<String>,
    /// `[first_byte, last_byte]` or `[byte, high_bit, low_bit]`.
    pub parser_param: Spanned<Vec<u8>>,
    /// One of `auto`, `bit` or `var`. Inferred from `parser_param`
    /// when missing.
    #[serde(default)]
    pub parser_type: Option<Spanned<String>>,
    #[serde(default)]
    pub var_zoom: Option<Spanned<f64>>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Multi-frame array declared with `[[array]]`.
#[derive(Debug, Deserialize)]
pub struct Array {
    pub array_name: Spanned<String>,
    pub package_num: Spanned<u64>,
    /// Explicit identifier list, or `[start, end]` when
    /// `package_num > 2`.
    pub can_id: Spanned<Vec<Spanned<String>>>,
    #[serde(default)]
    pub content: Vec<Content>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Sub-field packed inside the concatenated array buffer.
#[derive(Debug, Deserialize)]
pub struct Content {
    pub name: Spanned<String>,
    #[serde(rename = "type")]
    pub type_: Spanned<String>,
    pub min: Spanned<f64>,
    pub max: Spanned<f64>,
    pub bits: Spanned<u32>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Transmit-only command frame declared with `[[cmd]]`.
#[derive(Debug, Deserialize)]
pub struct Cmd {
    pub cmd_name: Spanned<String>,
    pub can_id: Spanned<String>,
    /// Byte index of the first payload byte.
    #[serde(default)]
    pub ctrl_len: Option<Spanned<u64>>,
    /// Control prefix, as hex byte strings.
    #[serde(default)]
    pub ctrl_data: Option<Spanned<Vec<Spanned<String>>>>,
    #[serde(default)]
    pub description: Option<String>,
}

impl File {
    /// Iterate over the names of every record member, in declaration
    /// order, with their location.
    pub fn iter_names(&self) -> impl Iterator<Item = &Spanned<String>> {
        self.var.iter().map(|var| &var.var_name).chain(
            self.array.iter().flat_map(|array| {
                std::iter::once(&array.array_name)
                    .chain(array.content.iter().map(|content| &content.name))
            }),
        )
    }
}
