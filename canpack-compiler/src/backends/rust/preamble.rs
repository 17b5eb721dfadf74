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

use proc_macro2::TokenStream;
use quote::quote;
use std::path::Path;

/// Generate the file preamble.
///
/// The doc attribute is an outer attribute so that the generated code
/// can be expanded in the middle of a module by the derive macros.
pub fn generate(path: &Path) -> TokenStream {
    let filename = path.file_name().and_then(|name| name.to_str()).unwrap_or("<inline>");
    let doc = format!(" @generated rust decoders and encoders from {filename}.");
    quote! {
        #[doc = #doc]
        use canpack_runtime::{DecodeHooks, EncodeError, FrameSink};
    }
}
