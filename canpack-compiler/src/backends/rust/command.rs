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

//! Generate the command encoders of a message set.

use super::{hex, identifier, type_ident};
use crate::layout::{CommandFrame, Layout};
use heck::ToSnakeCase;
use proc_macro2::{Literal, TokenStream};
use quote::{format_ident, quote};

fn encode_command(layout: &Layout, command: &CommandFrame) -> TokenStream {
    let name = format_ident!("encode_{}", command.name.to_snake_case());
    let offset = layout.is_dynamic().then(|| quote!(can_id_offset: u32,));
    let unused =
        (layout.is_dynamic() && !command.can_id.dynamic).then(|| quote!(let _ = can_id_offset;));
    let id = identifier(&command.can_id, quote!(can_id_offset));
    let extended = layout.extended;
    let frame_len = Literal::usize_unsuffixed(layout.frame_len);
    let ctrl_len = Literal::usize_unsuffixed(command.ctrl_len);
    let max_payload = Literal::usize_unsuffixed(command.max_payload);
    let prefix = (!command.ctrl_data.is_empty()).then(|| {
        let end = Literal::usize_unsuffixed(command.ctrl_data.len());
        let bytes = command.ctrl_data.iter().map(|byte| hex(u64::from(*byte)));
        quote!(data[..#end].copy_from_slice(&[#(#bytes),*]);)
    });

    let mut docs = vec![format!(
        " Send the `{}` command, with `payload` written from byte {}.",
        command.name, command.ctrl_len
    )];
    if let Some(description) = &command.description {
        docs.push(String::new());
        docs.push(format!(" {}", description));
    }
    docs.push(String::new());
    docs.push(format!(
        " Nothing is sent when `payload` is longer than {} bytes.",
        command.max_payload
    ));

    quote! {
        #(#[doc = #docs])*
        pub fn #name<S: FrameSink>(
            #offset
            payload: &[u8],
            sink: &mut S,
        ) -> Result<(), EncodeError<S::Error>> {
            #unused
            let can_id = #id;
            if payload.len() > #max_payload {
                return Err(EncodeError::PayloadTooLong {
                    can_id,
                    len: payload.len(),
                    max: #max_payload,
                });
            }
            let mut data = [0u8; #frame_len];
            #prefix
            data[#ctrl_len..#ctrl_len + payload.len()].copy_from_slice(payload);
            sink.send(can_id, #extended, &data)
                .map_err(|error| EncodeError::SendFailed { can_id, error })
        }
    }
}

/// Generate one associated encode function per command.
pub fn generate(layout: &Layout) -> TokenStream {
    if layout.commands.is_empty() {
        return quote!();
    }
    let name = type_ident(&layout.name);
    let commands = layout.commands.iter().map(|command| encode_command(layout, command));
    quote! {
        impl #name {
            #(#commands)*
        }
    }
}
