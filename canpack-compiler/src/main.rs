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

//! CAN message set compiler.

use argh::FromArgs;
use codespan_reporting::term::{self, termcolor};
use heck::{ToSnakeCase, ToUpperCamelCase};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use canpack_compiler::layout::{OffsetMode, Options, OrderErrorPolicy};
use canpack_compiler::{analyzer, ast, backends, layout, parser};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Language {
    Cxx,
    Rust,
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_lowercase().as_str() {
            "cxx" | "c++" | "cpp" => Ok(Self::Cxx),
            "rust" => Ok(Self::Rust),
            _ => Err(format!("could not parse {input:?}, valid options are 'cxx', 'rust'.")),
        }
    }
}

fn parse_policy(input: &str) -> Result<OrderErrorPolicy, String> {
    match input.to_lowercase().as_str() {
        "drop" => Ok(OrderErrorPolicy::Drop),
        "resync" => Ok(OrderErrorPolicy::Resync),
        _ => Err(format!("could not parse {input:?}, valid options are 'drop', 'resync'.")),
    }
}

/// Offsets are hexadecimal with a `0x` prefix, decimal otherwise.
fn parse_offset(input: &str) -> Result<u32, String> {
    let parsed = match input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        Some(digits) => u32::from_str_radix(digits, 16),
        None => input.parse(),
    };
    parsed.map_err(|err| format!("invalid identifier offset {input:?}: {err}"))
}

#[derive(FromArgs, Debug)]
/// CAN message set compiler.
///
/// Modes: `up` and `up-inclass` print the host data class, `down`
/// writes the device decoder and encoder into the output directory,
/// `layout` prints the resolved frame layout as JSON.
struct Opt {
    #[argh(switch)]
    /// print tool version and exit.
    version: bool,

    #[argh(positional)]
    /// one of 'up', 'up-inclass', 'down', 'layout'.
    mode: Option<String>,

    #[argh(positional)]
    /// input schema file.
    input_file: Option<String>,

    #[argh(positional)]
    /// output directory of the 'down' mode.
    output_dir: Option<String>,

    #[argh(option, default = "0", from_str_fn(parse_offset))]
    /// offset added to the offset eligible identifiers.
    can_id_offset: u32,

    #[argh(switch)]
    /// read the identifier offset at runtime instead.
    dynamic_offset: bool,

    #[argh(option)]
    /// name of the generated record type, defaults to the input file stem.
    name: Option<String>,

    #[argh(option, default = "Language::Cxx")]
    /// generated language of the 'down' mode ("cxx", "rust").
    language: Language,

    #[argh(option, default = "OrderErrorPolicy::Drop", from_str_fn(parse_policy))]
    /// recovery of out of order frames ("drop", "resync").
    on_order_error: OrderErrorPolicy,
}

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("unknown command {0:?}, expected 'up', 'up-inclass', 'down' or 'layout'")]
    UnknownCommand(String),
    #[error("{0}")]
    Usage(String),
    #[error("could not write {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("error while parsing input")]
    Parse,
    #[error("analysis failed")]
    Analysis,
}

fn stderr() -> termcolor::StandardStream {
    termcolor::StandardStream::stderr(termcolor::ColorChoice::Auto)
}

fn emit(sources: &ast::SourceDatabase, diagnostics: &analyzer::Diagnostics) {
    if let Err(err) = diagnostics.emit(sources, &mut stderr().lock()) {
        log::error!("could not print diagnostics: {}", err);
    }
}

fn record_name(opt: &Opt, input_file: &str) -> String {
    match &opt.name {
        Some(name) => name.clone(),
        None => Path::new(input_file)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("message_set")
            .to_upper_camel_case(),
    }
}

/// Parse and analyze the input file, printing diagnostics.
fn compile(
    sources: &mut ast::SourceDatabase,
    input_file: &str,
    options: &Options,
) -> Result<layout::Schema, Error> {
    let file = parser::parse_file(sources, input_file).map_err(|diagnostic| {
        let config = term::Config::default();
        if let Err(err) =
            term::emit(&mut stderr().lock(), &config, sources, &diagnostic)
        {
            log::error!("could not print error: {}", err);
        }
        Error::Parse
    })?;
    match analyzer::analyze(&file, options) {
        Ok((schema, warnings)) => {
            emit(sources, &warnings);
            Ok(schema)
        }
        Err(diagnostics) => {
            emit(sources, &diagnostics);
            Err(Error::Analysis)
        }
    }
}

/// Write `content` to a temporary file of `dir`.
fn stage(dir: &Path, content: &str) -> Result<tempfile::NamedTempFile, Error> {
    let io_error = |source| Error::Io { path: dir.to_owned(), source };
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(io_error)?;
    file.write_all(content.as_bytes()).map_err(io_error)?;
    Ok(file)
}

/// Write all outputs, or none of them.
///
/// Every output is staged next to its destination, then renamed into
/// place. Files renamed before a failing rename are removed.
fn write_all(dir: &Path, outputs: Vec<(PathBuf, String)>) -> Result<(), Error> {
    let mut staged = vec![];
    for (path, content) in outputs {
        staged.push((stage(dir, &content)?, path));
    }
    let mut written: Vec<PathBuf> = vec![];
    for (file, path) in staged {
        if let Err(err) = file.persist(&path) {
            for path in &written {
                let _ = std::fs::remove_file(path);
            }
            return Err(Error::Io { path, source: err.error });
        }
        written.push(path);
    }
    for path in &written {
        log::info!("wrote {}", path.display());
    }
    Ok(())
}

fn generate_down(opt: &Opt, input_file: &str, options: &Options) -> Result<(), Error> {
    let output_dir = opt
        .output_dir
        .as_ref()
        .ok_or_else(|| Error::Usage("'down' requires an output directory".to_owned()))?;
    let mut sources = ast::SourceDatabase::new();
    let schema = compile(&mut sources, input_file, options)?;
    let layout = layout::generate(&schema, options);

    let source_name = Path::new(input_file)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(input_file);
    let stem = options.name.to_snake_case();
    let output_dir = Path::new(output_dir);
    // Everything is rendered before the first file is written.
    let outputs = match opt.language {
        Language::Cxx => {
            let header_name = format!("{}.h", stem);
            vec![
                (
                    output_dir.join(&header_name),
                    backends::cxx::generate_header(&layout, source_name),
                ),
                (
                    output_dir.join(format!("{}.cc", stem)),
                    backends::cxx::generate_source(&layout, source_name, &header_name),
                ),
            ]
        }
        Language::Rust => vec![(
            output_dir.join(format!("{}.rs", stem)),
            backends::rust::generate(&layout, source_name),
        )],
    };
    std::fs::create_dir_all(output_dir)
        .map_err(|source| Error::Io { path: output_dir.to_owned(), source })?;
    write_all(output_dir, outputs)
}

fn run(opt: &Opt) -> Result<(), Error> {
    let Some(mode) = opt.mode.as_deref() else {
        return Err(Error::Usage("No mode is specified".to_owned()));
    };
    if !matches!(mode, "up" | "up-inclass" | "down" | "layout") {
        return Err(Error::UnknownCommand(mode.to_owned()));
    }
    let Some(input_file) = opt.input_file.as_deref() else {
        return Err(Error::Usage("No input file is specified".to_owned()));
    };

    let options = Options {
        name: record_name(opt, input_file),
        offset: if opt.dynamic_offset {
            OffsetMode::Dynamic
        } else {
            OffsetMode::Static(opt.can_id_offset)
        },
        on_order_error: opt.on_order_error,
    };
    log::debug!("options: {:?}", options);

    match mode {
        "up" | "up-inclass" => {
            let mut sources = ast::SourceDatabase::new();
            let schema = compile(&mut sources, input_file, &options)?;
            let in_class = mode == "up-inclass";
            print!("{}", backends::cxx::generate_data_class(&schema, &options.name, in_class));
            Ok(())
        }
        "layout" => {
            let mut sources = ast::SourceDatabase::new();
            let schema = compile(&mut sources, input_file, &options)?;
            let layout = layout::generate(&schema, &options);
            let json = backends::json::generate(&layout)
                .map_err(|err| Error::Usage(format!("could not serialize layout: {err}")))?;
            println!("{}", json);
            Ok(())
        }
        _ => generate_down(opt, input_file, &options),
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let opt: Opt = argh::from_env();

    if opt.version {
        println!("canpackc {}\nCopyright (C) 2025 Google LLC", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    match run(&opt) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
