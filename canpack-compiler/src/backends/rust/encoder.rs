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

//! Generate the encode method of a record.

use super::{encode_value, expr_tokens, identifier, type_ident, ToIdent};
use crate::bits::StoreOp;
use crate::layout::{FieldOp, Frame, FrameSet, Layout, Op};
use proc_macro2::{Literal, TokenStream};
use quote::quote;

fn encode_field(field: &FieldOp, buf: &TokenStream) -> TokenStream {
    let raw_ty = type_ident(&field.window.integer().rust());
    let value = encode_value(field, &quote!(self));
    let stores = field.window.write().into_iter().map(|store| {
        let index = Literal::usize_unsuffixed(store.index);
        let expr = expr_tokens(&store.value, buf, &quote!(raw));
        match store.op {
            StoreOp::Assign => quote!(#buf[#index] = #expr;),
            StoreOp::Or => quote!(#buf[#index] |= #expr;),
        }
    });
    quote! {
        {
            let raw: #raw_ty = #value;
            #(#stores)*
        }
    }
}

/// Send `data` as the frame, failing on the first sink error.
fn send(layout: &Layout, frame: &Frame, data: TokenStream) -> TokenStream {
    let id = identifier(&frame.can_id, quote!(can_id_offset));
    let extended = layout.extended;
    quote! {
        let can_id = #id;
        sink.send(can_id, #extended, #data)
            .map_err(|error| EncodeError::SendFailed { can_id, error })?;
    }
}

fn encode_frame(layout: &Layout, frame: &Frame) -> TokenStream {
    let frame_len = Literal::usize_unsuffixed(layout.frame_len);
    let mut statements = vec![];
    let mut data = quote!(&data);
    for op in &frame.ops {
        match op {
            Op::Field(field) => statements.push(encode_field(field, &quote!(data))),
            Op::Bytes { member, first_byte, len } => {
                let name = member.as_str().to_ident();
                let start = Literal::usize_unsuffixed(*first_byte);
                let end = Literal::usize_unsuffixed(first_byte + len);
                statements.push(quote!(data[#start..#end].copy_from_slice(&self.#name);));
            }
            Op::Slice { member, offset, len } => {
                let name = member.as_str().to_ident();
                let start = Literal::usize_unsuffixed(*offset);
                let end = Literal::usize_unsuffixed(offset + len);
                data = quote!(&self.#name[#start..#end]);
            }
        }
    }
    let frame_data = (!statements.is_empty()).then(|| quote!(let mut data = [0u8; #frame_len];));
    let send = send(layout, frame, data);
    quote! {
        {
            #frame_data
            #(#statements)*
            #send
        }
    }
}

fn encode_set(layout: &Layout, set: &FrameSet) -> TokenStream {
    match &set.buffer {
        None => {
            let frames = set.frames.iter().map(|frame| encode_frame(layout, frame));
            quote!(#(#frames)*)
        }
        Some(buffer) => {
            let len = Literal::usize_unsuffixed(buffer.len);
            let fields = buffer.fields.iter().map(|field| encode_field(field, &quote!(buffer)));
            let frames = set.frames.iter().map(|frame| {
                let (offset, len) = frame
                    .ops
                    .iter()
                    .find_map(|op| match op {
                        Op::Slice { offset, len, .. } => Some((*offset, *len)),
                        _ => None,
                    })
                    .unwrap_or((frame.index * layout.frame_len, layout.frame_len));
                let start = Literal::usize_unsuffixed(offset);
                let end = Literal::usize_unsuffixed(offset + len);
                let send = send(layout, frame, quote!(&buffer[#start..#end]));
                quote!({ #send })
            });
            quote! {
                {
                    let mut buffer = [0u8; #len];
                    #(#fields)*
                    #(#frames)*
                }
            }
        }
    }
}

/// Generate the encode method of the record type.
pub fn generate(layout: &Layout) -> TokenStream {
    let name = type_ident(&layout.name);
    let offset = layout.is_dynamic().then(|| quote!(can_id_offset: u32,));
    let sets: Vec<_> = layout.sets.iter().map(|set| encode_set(layout, set)).collect();
    let mut unused = vec![];
    if sets.is_empty() {
        unused.push(quote!(let _ = sink;));
    }
    if layout.is_dynamic() && !layout.iter_frames().any(|(_, frame)| frame.can_id.dynamic) {
        unused.push(quote!(let _ = can_id_offset;));
    }

    quote! {
        impl #name {
            /// Encode the record into the frames of its message set, in
            /// declaration order.
            ///
            /// Encoding stops at the first frame rejected by the sink.
            pub fn encode<S: FrameSink>(
                &self,
                #offset
                sink: &mut S,
            ) -> Result<(), EncodeError<S::Error>> {
                #(#unused)*
                #(#sets)*
                Ok(())
            }
        }
    }
}
