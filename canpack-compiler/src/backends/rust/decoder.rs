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

//! Generate the decoder type of a message set.

use super::{decode_value, identifier, type_ident, ToIdent};
use crate::layout::{Buffer, Frame, FrameSet, Layout, Op, OrderErrorPolicy};
use proc_macro2::{Literal, TokenStream};
use quote::{format_ident, quote};

fn order_state(name: &str) -> proc_macro2::Ident {
    format_ident!("{}_order", name)
}

fn decode_buffer(buffer: &Buffer) -> TokenStream {
    let member = buffer.member.as_str().to_ident();
    let buf = quote!(self.record.#member);
    let fields = buffer.fields.iter().map(|field| {
        let name = field.member.as_str().to_ident();
        let value = decode_value(field, &buf);
        quote!(self.record.#name = #value;)
    });
    quote!(#(#fields)*)
}

/// Statements decoding one frame. The statements return early when
/// the frame is dropped by the order check.
fn decode_frame(layout: &Layout, set: &FrameSet, frame: &Frame) -> TokenStream {
    let mut statements = vec![];
    if let Some(check) = &set.order_check {
        let state = order_state(&check.name);
        let index = Literal::usize_unsuffixed(frame.index);
        let len = Literal::usize_unsuffixed(check.can_ids.len());
        let can_ids =
            check.can_ids.iter().map(|id| identifier(id, quote!(self.can_id_offset)));
        let recover = if frame.index == 0 && layout.on_order_error == OrderErrorPolicy::Resync
        {
            // The first frame of the set starts a new sequence.
            quote!(self.#state.restart(#len);)
        } else {
            quote!(return true;)
        };
        statements.push(quote! {
            if let Err(error) = self.#state.advance(#index, #len) {
                let can_ids = [#(#can_ids),*];
                hooks.on_order_error(can_ids[usize::from(error.expected)], can_id);
                #recover
            }
        });
    }

    for op in &frame.ops {
        statements.push(match op {
            Op::Field(field) => {
                let name = field.member.as_str().to_ident();
                let value = decode_value(field, &quote!(data));
                quote!(self.record.#name = #value;)
            }
            Op::Bytes { member, first_byte, len } => {
                let name = member.as_str().to_ident();
                let start = Literal::usize_unsuffixed(*first_byte);
                let end = Literal::usize_unsuffixed(first_byte + len);
                quote!(self.record.#name.copy_from_slice(&data[#start..#end]);)
            }
            Op::Slice { member, offset, len } => {
                let name = member.as_str().to_ident();
                let start = Literal::usize_unsuffixed(*offset);
                let end = Literal::usize_unsuffixed(offset + len);
                let len = Literal::usize_unsuffixed(*len);
                quote!(self.record.#name[#start..#end].copy_from_slice(&data[..#len]);)
            }
        });
    }

    if frame.terminal {
        if let Some(buffer) = &set.buffer {
            statements.push(decode_buffer(buffer));
        }
        statements.push(quote!(hooks.on_complete(&self.record);));
    }
    quote!(#(#statements)*)
}

fn decode_body(layout: &Layout) -> TokenStream {
    let frames: Vec<_> = layout.iter_frames().collect();
    if frames.is_empty() {
        return quote! {
            let _ = (can_id, data, hooks);
            false
        };
    }

    if layout.is_dynamic() {
        let branches = frames.iter().map(|(set, frame)| {
            let id = identifier(&frame.can_id, quote!(self.can_id_offset));
            let body = decode_frame(layout, set, frame);
            quote! {
                if can_id == #id {
                    #body
                    return true;
                }
            }
        });
        quote! {
            #(#branches)*
            false
        }
    } else {
        let arms = frames.iter().map(|(set, frame)| {
            let id = identifier(&frame.can_id, quote!());
            let body = decode_frame(layout, set, frame);
            quote! {
                #id => {
                    #body
                    true
                }
            }
        });
        quote! {
            match can_id {
                #(#arms)*
                _ => false,
            }
        }
    }
}

/// Generate the decoder struct of a layout.
pub fn generate(layout: &Layout) -> TokenStream {
    let name = type_ident(&layout.name);
    let decoder = format_ident!("{}Decoder", layout.name);
    let frame_len = Literal::usize_unsuffixed(layout.frame_len);
    let offset = layout.is_dynamic().then(|| {
        quote! {
            #[doc = " Added to the offset eligible identifiers."]
            pub can_id_offset: u32,
        }
    });
    let states: Vec<_> = layout
        .sets
        .iter()
        .filter_map(|set| set.order_check.as_ref())
        .map(|check| order_state(&check.name))
        .collect();
    let doc = format!(" Decodes the frames of the {} message set.", layout.name);
    let body = decode_body(layout);

    quote! {
        #[doc = #doc]
        #[doc = ""]
        #[doc = " `decode` updates the receive order state of the multi-frame sets:"]
        #[doc = " a decoder shared between contexts must be guarded as a whole."]
        #[derive(Debug, Default, Clone)]
        pub struct #decoder {
            record: #name,
            #offset
            #(#states: canpack_runtime::OrderCheck,)*
        }

        impl #decoder {
            pub fn new() -> Self {
                Self::default()
            }

            /// Last decoded values.
            pub fn record(&self) -> &#name {
                &self.record
            }

            /// Decode one received frame. Returns `false` when the
            /// identifier is not part of the message set.
            pub fn decode<H: DecodeHooks<#name>>(
                &mut self,
                can_id: u32,
                data: &[u8; #frame_len],
                hooks: &mut H,
            ) -> bool {
                #body
            }
        }
    }
}
