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

//! CAN message set compiler: parser, analyzer, frame layout and code
//! generators.

pub mod analyzer;
pub mod ast;
pub mod backends;
pub mod bits;
pub mod layout;
pub mod parser;
pub mod quantize;
#[cfg(test)]
pub mod test_utils;
pub mod types;
