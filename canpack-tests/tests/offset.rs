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

use canpack_derive::canpack_inline;

#[canpack_inline(
    r#"
[[var]]
var_type = "u8"
var_name = "a"
can_id = "0x100+"
parser_param = [0, 7, 0]

[[var]]
var_type = "u8"
var_name = "b"
can_id = "0x7f0"
parser_param = [0, 7, 0]
"#,
    name = "Node",
    dynamic_offset = true
)]
#[cfg(test)]
mod dynamic_offset {
    use canpack_runtime::Frame;

    #[test]
    fn test_decode_with_offset() {
        let mut decoder = NodeDecoder::new();
        decoder.can_id_offset = 0x20;
        assert!(!decoder.decode(0x100, &[1; 8], &mut ()));
        assert!(decoder.decode(0x120, &[1; 8], &mut ()));
        // Identifiers without the `+` suffix are not offset.
        assert!(decoder.decode(0x7f0, &[2; 8], &mut ()));
        assert_eq!(decoder.record(), &Node { a: 1, b: 2 });
    }

    #[test]
    fn test_encode_with_offset() {
        let mut frames: Vec<Frame> = vec![];
        Node { a: 1, b: 2 }.encode(0x20, &mut frames).unwrap();
        let can_ids: Vec<u32> = frames.iter().map(|frame| frame.can_id).collect();
        assert_eq!(can_ids, vec![0x120, 0x7f0]);
    }

    #[test]
    fn test_order_error_reports_offset_identifier() {
        #[derive(Default)]
        struct Recorder(Vec<(u32, u32)>);

        impl DecodeHooks<Node> for Recorder {
            fn on_order_error(&mut self, expected_can_id: u32, actual_can_id: u32) {
                self.0.push((expected_can_id, actual_can_id));
            }
        }

        let mut decoder = NodeDecoder::new();
        decoder.can_id_offset = 0x40;
        let mut hooks = Recorder::default();
        assert!(decoder.decode(0x7f0, &[2; 8], &mut hooks));
        assert_eq!(hooks.0, vec![(0x140, 0x7f0)]);
    }
}

#[canpack_inline(
    r#"
extended_frame = true

[[var]]
var_type = "u16"
var_name = "a"
can_id = "0x100"
parser_param = [0, 1]

[[var]]
var_type = "u16"
var_name = "b"
can_id = "0x101"
parser_param = [0, 1]
"#,
    name = "Node",
    can_id_offset = 0x10
)]
#[cfg(test)]
mod static_offset {
    use canpack_runtime::Frame;

    #[test]
    fn test_offset_is_folded() {
        let mut frames: Vec<Frame> = vec![];
        Node { a: 0x1234, b: 0x5678 }.encode(&mut frames).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].can_id, 0x110);
        assert_eq!(frames[1].can_id, 0x111);
        assert!(frames.iter().all(|frame| frame.is_extended));

        let mut decoder = NodeDecoder::new();
        assert!(!decoder.decode(0x100, &[0; 8], &mut ()));
        for frame in &frames {
            let data: &[u8; 8] = frame.data.as_slice().try_into().unwrap();
            assert!(decoder.decode(frame.can_id, data, &mut ()));
        }
        assert_eq!(decoder.record(), &Node { a: 0x1234, b: 0x5678 });
    }

    #[derive(Debug, PartialEq)]
    struct BusOff;

    /// Accepts `capacity` frames, then fails.
    struct LimitedSink {
        capacity: usize,
        sent: Vec<u32>,
    }

    impl FrameSink for LimitedSink {
        type Error = BusOff;

        fn send(&mut self, can_id: u32, _is_extended: bool, _data: &[u8]) -> Result<(), BusOff> {
            if self.sent.len() == self.capacity {
                return Err(BusOff);
            }
            self.sent.push(can_id);
            Ok(())
        }
    }

    #[test]
    fn test_encode_stops_at_first_failure() {
        let mut sink = LimitedSink { capacity: 1, sent: vec![] };
        let result = Node { a: 1, b: 2 }.encode(&mut sink);
        assert_eq!(result, Err(EncodeError::SendFailed { can_id: 0x111, error: BusOff }));
        assert_eq!(sink.sent, vec![0x110]);
    }
}
