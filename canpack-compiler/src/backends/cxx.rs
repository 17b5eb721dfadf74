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

//! C++ compiler backend.
//!
//! The generated code relies on the following runtime declarations,
//! provided by `canpack_runtime.h`:
//!
//! - `bool canpack::send(uint32_t can_id, bool is_extended, const uint8_t* data, size_t len)`
//! - `template <typename To, typename From> To canpack::bit_cast(From value)`
//! - `double canpack::range_to_float(uint64_t raw, double min, double max, unsigned bits)`
//! - `uint64_t canpack::float_to_range(double value, double min, double max, unsigned bits)`

use crate::bits::{Expr, StoreOp};
use crate::layout::{
    Buffer, CommandFrame, FieldOp, Frame, FrameSet, Identifier, Layout, Op, OrderErrorPolicy,
    Schema,
};
use crate::quantize::Codec;
use crate::types::ScalarType;
use heck::ToUpperCamelCase;

fn indent(s: &str, level: usize) -> String {
    let prefix = "    ".repeat(level);
    s.lines()
        .map(|line| if line.is_empty() { line.to_string() } else { format!("{}{}", prefix, line) })
        .collect::<Vec<_>>()
        .join("\n")
}

fn float_literal(value: f64) -> String {
    format!("{:?}", value)
}

fn is_primary(expr: &Expr) -> bool {
    matches!(expr, Expr::Byte(_) | Expr::Value(_) | Expr::Cast(..))
}

/// Render an expression, with parentheses when used as an operand.
fn operand(expr: &Expr, buf: &str, value: &str) -> String {
    if is_primary(expr) {
        render_expr(expr, buf, value)
    } else {
        format!("({})", render_expr(expr, buf, value))
    }
}

fn render_expr(expr: &Expr, buf: &str, value: &str) -> String {
    match expr {
        Expr::Byte(index) => format!("{}[{}]", buf, index),
        Expr::Value(_) => value.to_owned(),
        Expr::Mask(expr, mask) => format!("{} & {:#04x}", operand(expr, buf, value), mask),
        Expr::Shl(expr, shift) => format!("{} << {}", operand(expr, buf, value), shift),
        Expr::Shr(expr, shift) => format!("{} >> {}", operand(expr, buf, value), shift),
        Expr::Cast(expr, ty) => {
            format!("static_cast<{}>({})", ty.cxx(), render_expr(expr, buf, value))
        }
        Expr::Or(terms) => terms
            .iter()
            .map(|term| operand(term, buf, value))
            .collect::<Vec<_>>()
            .join(" | "),
    }
}

fn identifier(id: &Identifier) -> String {
    if id.dynamic {
        format!("{:#x} + can_id_offset", id.value)
    } else {
        format!("{:#x}", id.value)
    }
}

fn member_declaration(name: &str, ty: ScalarType, len: Option<usize>) -> String {
    match len {
        Some(len) => format!("{} {}[{}]", ty.cxx_type(), name, len),
        None => format!("{} {}", ty.cxx_type(), name),
    }
}

/// Expression converting the window read of `field` into its member
/// value.
fn decode_value(field: &FieldOp, buf: &str) -> String {
    let read = field.window.read();
    let raw = field.window.integer();
    let ty = field.ty.cxx_type();
    let rendered = render_expr(&read, buf, "");
    match field.codec {
        Codec::Integer if ty == raw.cxx() => rendered,
        Codec::Integer => format!("static_cast<{}>({})", ty, rendered),
        Codec::Bool => format!("{} != 0", operand(&read, buf, "")),
        Codec::BitCast => format!("canpack::bit_cast<{}>({})", ty, rendered),
        Codec::Zoom { scale } => {
            let value = format!(
                "static_cast<{}>({}) * {}",
                raw.cxx_signed(),
                rendered,
                float_literal(scale)
            );
            match field.ty {
                ScalarType::Double => value,
                _ => format!("static_cast<{}>({})", ty, value),
            }
        }
        Codec::Range { min, max, bits } => {
            let value = format!(
                "canpack::range_to_float({}, {}, {}, {})",
                rendered,
                float_literal(min),
                float_literal(max),
                bits
            );
            match field.ty {
                ScalarType::Double => value,
                ScalarType::Float => format!("static_cast<float>({})", value),
                _ => format!("static_cast<{}>(std::llround({}))", ty, value),
            }
        }
    }
}

/// Expression converting the member value of `field` into the raw
/// integer written into its window.
fn encode_value(field: &FieldOp, record: &str) -> String {
    let raw = field.window.integer().cxx();
    let member = format!("{}.{}", record, field.member);
    match field.codec {
        Codec::Integer => format!("static_cast<{}>({})", raw, member),
        Codec::Bool => format!("static_cast<{}>({} ? 1 : 0)", raw, member),
        Codec::BitCast => format!("canpack::bit_cast<{}>({})", raw, member),
        Codec::Zoom { scale } => format!(
            "static_cast<{}>(static_cast<{}>(std::llround({} / {})))",
            raw,
            field.window.integer().cxx_signed(),
            member,
            float_literal(scale)
        ),
        Codec::Range { min, max, bits } => format!(
            "static_cast<{}>(canpack::float_to_range(static_cast<double>({}), {}, {}, {}))",
            raw,
            member,
            float_literal(min),
            float_literal(max),
            bits
        ),
    }
}

fn encode_field(field: &FieldOp, record: &str, buf: &str) -> String {
    let mut lines = vec![format!(
        "const {} raw = {};",
        field.window.integer().cxx(),
        encode_value(field, record)
    )];
    for store in field.window.write() {
        let op = match store.op {
            StoreOp::Assign => "=",
            StoreOp::Or => "|=",
        };
        lines.push(format!("{}[{}] {} {};", buf, store.index, op, render_expr(&store.value, buf, "raw")));
    }
    format!("{{\n{}\n}}", indent(&lines.join("\n"), 1))
}

fn decode_buffer(buffer: &Buffer) -> Vec<String> {
    let buf = format!("record_.{}", buffer.member);
    buffer
        .fields
        .iter()
        .map(|field| format!("record_.{} = {};", field.member, decode_value(field, &buf)))
        .collect()
}

fn decode_frame(layout: &Layout, set: &FrameSet, frame: &Frame) -> String {
    let mut lines = vec![];
    if let Some(check) = &set.order_check {
        let state = format!("{}_expected_", check.name);
        let can_ids = check.can_ids.iter().map(identifier).collect::<Vec<_>>().join(", ");
        let resync =
            frame.index == 0 && layout.on_order_error == OrderErrorPolicy::Resync;
        lines.push(format!(
            r#"if ({state} != {index}) {{
    if (on_order_error) {{
        const uint32_t can_ids[] = {{{can_ids}}};
        on_order_error(can_ids[{state}], can_id);
    }}
    {state} = 0;{drop}
}}"#,
            state = state,
            index = frame.index,
            can_ids = can_ids,
            drop = if resync { "" } else { "\n    return true;" },
        ));
    }

    for op in &frame.ops {
        lines.push(match op {
            Op::Field(field) => {
                format!("record_.{} = {};", field.member, decode_value(field, "data"))
            }
            Op::Bytes { member, first_byte, len } => {
                format!("std::memcpy(record_.{}, data + {}, {});", member, first_byte, len)
            }
            Op::Slice { member, offset, len } => {
                format!("std::memcpy(record_.{} + {}, data, {});", member, offset, len)
            }
        });
    }

    if let Some(check) = &set.order_check {
        let next = if frame.terminal { 0 } else { frame.index + 1 };
        lines.push(format!("{}_expected_ = {};", check.name, next));
    }
    if frame.terminal {
        if let Some(buffer) = &set.buffer {
            lines.extend(decode_buffer(buffer));
        }
        lines.push("if (on_complete) {\n    on_complete(record_);\n}".to_owned());
    }
    lines.push("return true;".to_owned());
    lines.join("\n")
}

fn generate_decode(layout: &Layout) -> String {
    let frames: Vec<_> = layout.iter_frames().collect();
    let body = if frames.is_empty() {
        "static_cast<void>(can_id);\nstatic_cast<void>(data);\nreturn false;".to_owned()
    } else if layout.is_dynamic() {
        let mut branches = frames
            .iter()
            .map(|(set, frame)| {
                format!(
                    "if (can_id == {}) {{\n{}\n}}",
                    identifier(&frame.can_id),
                    indent(&decode_frame(layout, set, frame), 1)
                )
            })
            .collect::<Vec<_>>();
        branches.push("return false;".to_owned());
        branches.join("\n")
    } else {
        let cases = frames
            .iter()
            .map(|(set, frame)| {
                format!(
                    "case {}: {{\n{}\n}}",
                    identifier(&frame.can_id),
                    indent(&decode_frame(layout, set, frame), 1)
                )
            })
            .collect::<Vec<_>>();
        format!("switch (can_id) {{\n{}\ndefault:\n    return false;\n}}", cases.join("\n"))
    };

    format!(
        "bool {name}Decoder::Decode(uint32_t can_id, const uint8_t* data) {{\n{body}\n}}\n",
        name = layout.name,
        body = indent(&body, 1)
    )
}

fn send(layout: &Layout, frame: &Frame, data: &str) -> String {
    format!(
        "ok = canpack::send({}, {}, {}, {}) && ok;",
        identifier(&frame.can_id),
        layout.extended,
        data,
        layout.frame_len
    )
}

fn encode_set(layout: &Layout, set: &FrameSet) -> Vec<String> {
    let mut lines = vec![];
    match &set.buffer {
        None => {
            for frame in &set.frames {
                if frame.zero_fill {
                    lines.push("std::memset(data, 0, sizeof(data));".to_owned());
                }
                let mut data = "data".to_owned();
                for op in &frame.ops {
                    match op {
                        Op::Field(field) => lines.push(encode_field(field, "record", "data")),
                        Op::Bytes { member, first_byte, len } => lines.push(format!(
                            "std::memcpy(data + {}, record.{}, {});",
                            first_byte, member, len
                        )),
                        Op::Slice { member, offset, .. } => {
                            data = format!("record.{} + {}", member, offset)
                        }
                    }
                }
                lines.push(send(layout, frame, &data));
            }
        }
        Some(buffer) => {
            let mut block = vec![
                format!("uint8_t buffer[{}];", buffer.len),
                "std::memset(buffer, 0, sizeof(buffer));".to_owned(),
            ];
            for field in &buffer.fields {
                block.push(encode_field(field, "record", "buffer"));
            }
            for frame in &set.frames {
                let offset = frame.index * layout.frame_len;
                block.push(send(layout, frame, &format!("buffer + {}", offset)));
            }
            lines.push(format!("{{\n{}\n}}", indent(&block.join("\n"), 1)));
        }
    }
    lines
}

fn generate_encode(layout: &Layout) -> String {
    let mut lines = vec!["bool ok = true;".to_owned()];
    // Array frames are sent straight from their buffer.
    let uses_frame = layout
        .iter_frames()
        .any(|(_, frame)| frame.ops.iter().any(|op| !matches!(op, Op::Slice { .. })));
    if uses_frame {
        lines.push(format!("uint8_t data[{}];", layout.frame_len));
    }
    for set in &layout.sets {
        lines.extend(encode_set(layout, set));
    }
    lines.push("return ok;".to_owned());
    format!(
        "bool {name}Encode(const {name}& record{offset}) {{\n{body}\n}}\n",
        name = layout.name,
        offset = if layout.is_dynamic() { ", uint32_t can_id_offset" } else { "" },
        body = indent(&lines.join("\n"), 1)
    )
}

fn command_signature(layout: &Layout, command: &CommandFrame) -> String {
    format!(
        "bool {}Encode{}(const uint8_t* payload, size_t len{})",
        layout.name,
        command.name.to_upper_camel_case(),
        if layout.is_dynamic() { ", uint32_t can_id_offset" } else { "" }
    )
}

fn command_declaration(layout: &Layout, command: &CommandFrame) -> String {
    let mut lines = vec![];
    if let Some(description) = &command.description {
        lines.push(format!("// {}", description));
    }
    lines.push(format!(
        "// Sends the {} command with up to {} payload bytes after its control prefix.",
        command.name, command.max_payload
    ));
    lines.push("// Returns false when the payload was truncated or the frame could not be sent.".to_owned());
    lines.push(format!("{};", command_signature(layout, command)));
    lines.join("\n")
}

fn generate_command(layout: &Layout, command: &CommandFrame) -> String {
    let mut lines = vec![
        format!("uint8_t data[{}];", layout.frame_len),
        "std::memset(data, 0, sizeof(data));".to_owned(),
    ];
    if layout.is_dynamic() && !command.can_id.dynamic {
        lines.insert(0, "static_cast<void>(can_id_offset);".to_owned());
    }
    if !command.ctrl_data.is_empty() {
        let bytes = command
            .ctrl_data
            .iter()
            .map(|byte| format!("{:#04x}", byte))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("const uint8_t ctrl_data[] = {{{}}};", bytes));
        lines.push("std::memcpy(data, ctrl_data, sizeof(ctrl_data));".to_owned());
    }
    lines.push(format!("const bool fits = len <= {};", command.max_payload));
    lines.push(format!(
        "std::memcpy(data + {}, payload, fits ? len : {});",
        command.ctrl_len, command.max_payload
    ));
    lines.push(format!(
        "return canpack::send({}, {}, data, {}) && fits;",
        identifier(&command.can_id),
        layout.extended,
        layout.frame_len
    ));
    format!("{} {{\n{}\n}}\n", command_signature(layout, command), indent(&lines.join("\n"), 1))
}

fn generate_record(layout: &Layout) -> String {
    let members = layout
        .members
        .iter()
        .map(|member| {
            let declaration = format!("{}{{}};", member_declaration(&member.name, member.ty, member.len));
            match &member.description {
                Some(description) => format!("// {}\n{}", description, declaration),
                None => declaration,
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("struct {} {{\n{}\n}};\n", layout.name, indent(&members, 1))
}

fn generate_decoder_class(layout: &Layout) -> String {
    let states = layout
        .sets
        .iter()
        .filter_map(|set| set.order_check.as_ref())
        .map(|check| format!("uint8_t {}_expected_{{0}};", check.name))
        .collect::<Vec<_>>();
    let offset = if layout.is_dynamic() {
        "\n    // Added to the offset eligible identifiers.\n    uint32_t can_id_offset{0};"
    } else {
        ""
    };

    format!(
        r#"// Decodes the frames of the {name} message set.
//
// Decode() updates the receive order state of the multi-frame sets: a
// decoder shared between interrupt and task contexts must be guarded
// with one lock per message set.
class {name}Decoder {{
public:
    // Called when the last frame of a message set is decoded.
    std::function<void(const {name}&)> on_complete;
    // Called with the expected and the received identifier when a frame
    // is received out of sequence.
    std::function<void(uint32_t, uint32_t)> on_order_error;{offset}

    // Returns false when the identifier is not part of the message set.
    bool Decode(uint32_t can_id, const uint8_t* data);

    const {name}& record() const {{
        return record_;
    }}

private:
    {name} record_{{}};
{states}
}};
"#,
        name = layout.name,
        offset = offset,
        states = indent(&states.join("\n"), 1),
    )
}

fn preamble(source_name: &str) -> String {
    format!(
        "// File generated from {}, with the command:\n//  canpackc down ...\n// /!\\ Do not edit by hand\n",
        source_name
    )
}

/// Generate the header declaring the record type, the decoder class
/// and the encode function.
pub fn generate_header(layout: &Layout, source_name: &str) -> String {
    let mut code = preamble(source_name);
    code.push('\n');
    code.push_str("#pragma once\n\n");
    code.push_str("#include <cstddef>\n");
    code.push_str("#include <cstdint>\n");
    code.push_str("#include <functional>\n\n");
    code.push_str("#include <canpack_runtime.h>\n\n");
    code.push_str(&generate_record(layout));
    code.push('\n');
    code.push_str(&generate_decoder_class(layout));
    code.push('\n');
    code.push_str("// Sends every frame of the message set, in declaration order.\n");
    code.push_str("// Returns false when any frame could not be sent.\n");
    code.push_str(&format!(
        "bool {name}Encode(const {name}& record{offset});\n",
        name = layout.name,
        offset = if layout.is_dynamic() { ", uint32_t can_id_offset" } else { "" },
    ));
    for command in &layout.commands {
        code.push('\n');
        code.push_str(&command_declaration(layout, command));
        code.push('\n');
    }
    code
}

/// Generate the source file implementing the decoder and the encode
/// function.
pub fn generate_source(layout: &Layout, source_name: &str, header_name: &str) -> String {
    let mut code = preamble(source_name);
    code.push('\n');
    code.push_str(&format!("#include \"{}\"\n\n", header_name));
    code.push_str("#include <cmath>\n");
    code.push_str("#include <cstring>\n\n");
    code.push_str(&generate_decode(layout));
    code.push('\n');
    code.push_str(&generate_encode(layout));
    for command in &layout.commands {
        code.push('\n');
        code.push_str(&generate_command(layout, command));
    }
    code
}

/// Generate the host side data class and the `LINK_VAR` lines binding
/// its members, for placement outside or inside of a class.
pub fn generate_data_class(schema: &Schema, name: &str, in_class: bool) -> String {
    let space = if in_class { "    " } else { "  " };
    let mut vars = vec![];
    let mut links = vec![];
    for field in &schema.vars {
        let len = (field.ty == ScalarType::ByteArray).then(|| field.location.window().width / 8);
        vars.push(format!("{}{};", space, member_declaration(&field.name, field.ty, len)));
        links.push(format!("{}ptc->LINK_VAR(ptc->GetData()->{});", space, field.name));
    }
    for array in &schema.arrays {
        vars.push(format!(
            "{}{};",
            space,
            member_declaration(&array.name, ScalarType::ByteArray, Some(array.len()))
        ));
        links.push(format!("{}ptc->LINK_VAR(ptc->GetData()->{});", space, array.name));
    }
    if vars.is_empty() {
        vars.push(format!("{}// No field is declared in this message set.", space));
        links.push(format!("{}// No field to link.", space));
    }

    let (open, close) = if in_class { ("  ", "  ") } else { ("", "") };
    format!(
        "{open}class {name}Data\n{open}{{\n{open}public:\n{vars}\n{close}}};\n\n{links}\n",
        open = open,
        close = close,
        name = name,
        vars = vars.join("\n"),
        links = links.join("\n"),
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bits::BitWindow;
    use crate::layout::{self, Options};
    use crate::test_utils::assert_contains;
    use crate::{analyzer, ast, parser};

    fn compile(text: &str, options: &Options) -> (Schema, Layout) {
        let mut db = ast::SourceDatabase::new();
        let file = parser::parse_inline(&mut db, "test.toml", text.to_owned()).unwrap();
        let (schema, _) = analyzer::analyze(&file, options).unwrap();
        let layout = layout::generate(&schema, options);
        (schema, layout)
    }

    const MOTOR: &str = r#"
[[var]]
var_type = "u16"
var_name = "speed"
can_id = "0x100"
parser_param = [0, 1]
description = "wheel speed"

[[var]]
var_type = "u8"
var_name = "mode"
can_id = "0x100"
parser_param = [2, 5, 2]

[[var]]
var_type = "float"
var_name = "temperature"
can_id = "0x101"
parser_param = [0, 1]
var_zoom = 0.1

[[array]]
array_name = "cloud"
package_num = 3
can_id = ["0x200", "0x202"]
content = [{ name = "x", type = "double", min = -10, max = 10, bits = 12 }]
"#;

    #[test]
    fn render_reads() {
        let read = BitWindow::from_byte_span(0, 1).read();
        assert_eq!(
            render_expr(&read, "data", ""),
            "(static_cast<uint16_t>(data[0]) << 8) | static_cast<uint16_t>(data[1])"
        );
        let read = BitWindow::from_bit_span(2, 5, 2).read();
        assert_eq!(render_expr(&read, "data", ""), "(data[2] & 0x3c) >> 2");
        let read = BitWindow::from_bit_span(2, 7, 0).read();
        assert_eq!(render_expr(&read, "data", ""), "data[2]");
    }

    #[test]
    fn render_writes() {
        let stores = BitWindow::from_bit_span(2, 5, 2).write();
        assert_eq!(render_expr(&stores[0].value, "data", "raw"), "(raw << 2) & 0x3c");
        let stores = BitWindow { offset: 4, width: 12 }.write();
        assert_eq!(stores[0].op, StoreOp::Or);
        assert_eq!(render_expr(&stores[0].value, "data", "raw"), "static_cast<uint8_t>((raw >> 8) & 0x0f)");
        assert_eq!(stores[1].op, StoreOp::Assign);
        assert_eq!(render_expr(&stores[1].value, "data", "raw"), "static_cast<uint8_t>(raw)");
    }

    #[test]
    fn header_declares_record_decoder_and_encoder() {
        let (_, layout) = compile(MOTOR, &Options::new("Motor"));
        let header = generate_header(&layout, "motor.toml");
        assert_contains(&header, "#pragma once");
        assert_contains(&header, "#include <canpack_runtime.h>");
        assert_contains(&header, "    // wheel speed\n    uint16_t speed{};");
        assert_contains(&header, "uint8_t cloud[24]{};");
        assert_contains(&header, "double x{};");
        assert_contains(&header, "class MotorDecoder {");
        assert_contains(&header, "uint8_t vars_expected_{0};");
        assert_contains(&header, "uint8_t array_cloud_expected_{0};");
        assert_contains(&header, "one lock per message set");
        assert_contains(&header, "bool MotorEncode(const Motor& record);");
    }

    #[test]
    fn static_decoder_dispatches_with_a_switch() {
        let (_, layout) = compile(MOTOR, &Options::new("Motor"));
        let source = generate_source(&layout, "motor.toml", "motor.h");
        assert_contains(&source, "#include \"motor.h\"");
        assert_contains(&source, "switch (can_id) {");
        assert_contains(&source, "case 0x100: {");
        assert_contains(
            &source,
            "record_.speed = (static_cast<uint16_t>(data[0]) << 8) | static_cast<uint16_t>(data[1]);",
        );
        assert_contains(&source, "record_.mode = (data[2] & 0x3c) >> 2;");
        assert_contains(
            &source,
            "record_.temperature = static_cast<float>(static_cast<int16_t>((static_cast<uint16_t>(data[0]) << 8) | static_cast<uint16_t>(data[1])) * 0.1);",
        );
        assert_contains(&source, "const uint32_t can_ids[] = {0x100, 0x101};");
        assert_contains(&source, "std::memcpy(record_.cloud + 16, data, 8);");
        assert_contains(&source, "record_.x = canpack::range_to_float(");
        assert_contains(&source, "default:\n        return false;");
    }

    #[test]
    fn order_guards_drop_frames() {
        let (_, layout) = compile(MOTOR, &Options::new("Motor"));
        let source = generate_source(&layout, "motor.toml", "motor.h");
        assert_contains(
            &source,
            r#"        if (array_cloud_expected_ != 1) {
            if (on_order_error) {
                const uint32_t can_ids[] = {0x200, 0x201, 0x202};
                on_order_error(can_ids[array_cloud_expected_], can_id);
            }
            array_cloud_expected_ = 0;
            return true;
        }"#,
        );
        assert_contains(&source, "array_cloud_expected_ = 0;\n        record_.x =");
    }

    #[test]
    fn resync_lets_first_frames_through() {
        let options = Options { on_order_error: layout::OrderErrorPolicy::Resync, ..Options::new("Motor") };
        let (_, layout) = compile(MOTOR, &options);
        let source = generate_source(&layout, "motor.toml", "motor.h");
        assert_contains(
            &source,
            "            vars_expected_ = 0;\n        }\n        record_.speed =",
        );
    }

    #[test]
    fn dynamic_decoder_uses_a_conditional_chain() {
        let options = Options { offset: layout::OffsetMode::Dynamic, ..Options::new("Motor") };
        let (_, layout) = compile(MOTOR, &options);
        let source = generate_source(&layout, "motor.toml", "motor.h");
        assert!(!source.contains("switch"));
        assert_contains(&source, "if (can_id == 0x100 + can_id_offset) {");
        assert_contains(&source, "bool MotorEncode(const Motor& record, uint32_t can_id_offset) {");
        assert_contains(&source, "ok = canpack::send(0x202 + can_id_offset, false, buffer + 16, 8) && ok;");
        let header = generate_header(&layout, "motor.toml");
        assert_contains(&header, "uint32_t can_id_offset{0};");
    }

    #[test]
    fn static_offset_is_folded() {
        let options = Options { offset: layout::OffsetMode::Static(0x10), ..Options::new("Motor") };
        let (_, layout) = compile(MOTOR, &options);
        let source = generate_source(&layout, "motor.toml", "motor.h");
        assert_contains(&source, "case 0x110: {");
        assert_contains(&source, "case 0x212: {");
    }

    #[test]
    fn encoder_zeroes_shared_frames() {
        let (_, layout) = compile(MOTOR, &Options::new("Motor"));
        let source = generate_source(&layout, "motor.toml", "motor.h");
        assert_contains(&source, "uint8_t data[8];");
        assert_contains(&source, "std::memset(data, 0, sizeof(data));");
        assert_contains(&source, "const uint8_t raw = static_cast<uint8_t>(record.mode);");
        assert_contains(&source, "data[2] |= (raw << 2) & 0x3c;");
        assert_contains(
            &source,
            "const uint16_t raw = static_cast<uint16_t>(static_cast<int16_t>(std::llround(record.temperature / 0.1)));",
        );
        assert_contains(&source, "ok = canpack::send(0x100, false, data, 8) && ok;");
        assert_contains(&source, "uint8_t buffer[24];");
        assert_contains(&source, "ok = canpack::send(0x201, false, buffer + 8, 8) && ok;");
    }

    #[test]
    fn raw_arrays_are_sent_from_the_record() {
        let (_, layout) = compile(
            r#"
canfd_enable = true
extended_frame = true

[[array]]
array_name = "blob"
package_num = 2
can_id = ["0x1000", "0x1001"]
"#,
            &Options::new("Blob"),
        );
        let source = generate_source(&layout, "blob.toml", "blob.h");
        assert!(!source.contains("uint8_t data["));
        assert_contains(&source, "ok = canpack::send(0x1001, true, record.blob + 64, 64) && ok;");
        assert_contains(&source, "std::memcpy(record_.blob + 64, data, 64);");
    }

    #[test]
    fn shared_identifier_has_one_case() {
        let (_, layout) = compile(
            r#"
[[var]]
var_type = "u8"
var_name = "a"
can_id = "0x10"
parser_param = [0, 0]

[[var]]
var_type = "u8"
var_name = "b"
can_id = "0x10+"
parser_param = [1, 1]
"#,
            &Options::new("Shared"),
        );
        let source = generate_source(&layout, "shared.toml", "shared.h");
        assert_eq!(source.matches("case 0x10:").count(), 1);
        assert_eq!(source.matches("canpack::send(0x10,").count(), 1);
        assert_contains(&source, "record_.a = data[0];\n        record_.b = data[1];");
        assert!(!source.contains("vars_expected_"));
    }

    const COMMANDS: &str = r#"
[[cmd]]
cmd_name = "set_mode"
can_id = "0x300"
ctrl_len = 3
ctrl_data = ["0xA5", "0x01"]
description = "switch the motor mode"

[[cmd]]
cmd_name = "reset"
can_id = "0x301"
"#;

    #[test]
    fn commands_copy_prefix_and_payload() {
        let (_, layout) = compile(COMMANDS, &Options::new("Motor"));
        let header = generate_header(&layout, "motor.toml");
        assert_contains(&header, "// switch the motor mode\n");
        assert_contains(&header, "with up to 5 payload bytes");
        assert_contains(&header, "bool MotorEncodeSetMode(const uint8_t* payload, size_t len);");
        assert_contains(&header, "bool MotorEncodeReset(const uint8_t* payload, size_t len);");

        let source = generate_source(&layout, "motor.toml", "motor.h");
        assert_contains(
            &source,
            r#"bool MotorEncodeSetMode(const uint8_t* payload, size_t len) {
    uint8_t data[8];
    std::memset(data, 0, sizeof(data));
    const uint8_t ctrl_data[] = {0xa5, 0x01};
    std::memcpy(data, ctrl_data, sizeof(ctrl_data));
    const bool fits = len <= 5;
    std::memcpy(data + 3, payload, fits ? len : 5);
    return canpack::send(0x300, false, data, 8) && fits;
}"#,
        );
        assert_contains(&source, "const bool fits = len <= 8;");
    }

    #[test]
    fn dynamic_commands_take_the_offset() {
        let options = Options { offset: layout::OffsetMode::Dynamic, ..Options::new("Motor") };
        let (_, layout) = compile(COMMANDS, &options);
        let source = generate_source(&layout, "motor.toml", "motor.h");
        assert_contains(
            &source,
            "bool MotorEncodeReset(const uint8_t* payload, size_t len, uint32_t can_id_offset) {",
        );
        assert_contains(&source, "return canpack::send(0x301 + can_id_offset, false, data, 8) && fits;");
    }

    #[test]
    fn data_class() {
        let (schema, _) = compile(MOTOR, &Options::new("Motor"));
        let code = generate_data_class(&schema, "Motor", false);
        assert_contains(&code, "class MotorData\n{\npublic:\n  uint16_t speed;\n");
        assert_contains(&code, "  uint8_t cloud[24];\n};");
        assert_contains(&code, "  ptc->LINK_VAR(ptc->GetData()->temperature);");
        assert!(!code.contains(" x;"));

        let code = generate_data_class(&schema, "Motor", true);
        assert_contains(&code, "  class MotorData\n  {\n  public:\n    uint16_t speed;\n");
        assert_contains(&code, "    ptc->LINK_VAR(ptc->GetData()->cloud);");
    }

    #[test]
    fn empty_data_class() {
        let (schema, _) = compile("", &Options::new("Empty"));
        let code = generate_data_class(&schema, "Empty", false);
        assert_contains(&code, "  // No field is declared in this message set.");
    }
}
