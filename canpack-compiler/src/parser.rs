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

use crate::ast;
use codespan_reporting::diagnostic::{Diagnostic, Label};

/// Parse a schema document from a string.
///
/// The file is added to the compilation database under the provided
/// name.
pub fn parse_inline(
    sources: &mut ast::SourceDatabase,
    name: &str,
    source: String,
) -> Result<ast::File, Diagnostic<ast::FileId>> {
    let file = sources.add(name.to_owned(), source.clone());
    let mut document: ast::File = toml::from_str(&source).map_err(|err| {
        let diagnostic = Diagnostic::error()
            .with_message(format!("failed to parse input file '{}': {}", name, err.message()));
        match err.span() {
            Some(span) => diagnostic.with_labels(vec![Label::primary(file, span)]),
            None => diagnostic,
        }
    })?;
    document.file = file;
    log::debug!(
        "parsed '{}': {} var(s), {} array(s), {} command(s)",
        name,
        document.var.len(),
        document.array.len(),
        document.cmd.len()
    );
    Ok(document)
}

/// Parse a new source file.
///
/// The source file is fully read and added to the compilation
/// database. Returns the document, or a descriptive error
/// message in case of syntax error.
pub fn parse_file(
    sources: &mut ast::SourceDatabase,
    name: &str,
) -> Result<ast::File, Diagnostic<ast::FileId>> {
    let source = std::fs::read_to_string(name).map_err(|e| {
        Diagnostic::error().with_message(format!("failed to read input file '{}': {}", name, e))
    })?;
    parse_inline(sources, name, source)
}
