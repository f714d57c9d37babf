//! The envelope every transport sends and receives (C3+C4 combined): an
//! 8-byte outer frame header wrapping a [`LongHeader`] and its three
//! byte regions (`fwd`, `body`, `data`).

use rapace_protocol::error::ProtocolError;
use rapace_protocol::header::{package_type, Direction, HeaderFormat, LongHeader, ShortHeader};
use rapace_wire::frame::{decode_frame_header, encode_frame_header, FrameCodecError, FRAME_HEADER_LEN};

/// One message on the wire: a request, a response, or a status (§4.5-§4.9).
///
/// `fwd` is reserved for future routing extensions (spec.md §4.4's
/// forward-region); this implementation carries it opaquely and never
/// inspects its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub package_type: u8,
    pub msg_type: u64,
    pub req_id: u64,
    pub fwd: Vec<u8>,
    pub body: Vec<u8>,
    pub data: Vec<u8>,
}

impl Message {
    pub fn request(msg_type: u64, req_id: u64, body: Vec<u8>, data: Vec<u8>) -> Self {
        Message {
            package_type: package_type::REQUEST,
            msg_type,
            req_id,
            fwd: Vec::new(),
            body,
            data,
        }
    }

    pub fn response(msg_type: u64, req_id: u64, body: Vec<u8>, data: Vec<u8>) -> Self {
        Message {
            package_type: package_type::RESPONSE,
            msg_type,
            req_id,
            fwd: Vec::new(),
            body,
            data,
        }
    }

    /// A protocol- or schema-level failure report in place of the real
    /// response; see [`package_type::STATUS`].
    pub fn status(req_id: u64, body: Vec<u8>) -> Self {
        Message {
            package_type: package_type::STATUS,
            msg_type: 0,
            req_id,
            fwd: Vec::new(),
            body,
            data: Vec::new(),
        }
    }
}

fn frame_err(e: FrameCodecError) -> ProtocolError {
    match e {
        FrameCodecError::Truncated { .. } => ProtocolError::TruncatedFrame,
        FrameCodecError::UnsupportedVersion(v) => ProtocolError::BadVersion(v),
        FrameCodecError::BadMagic(_) => ProtocolError::BadMagic,
        FrameCodecError::PayloadTooLarge { len, max } => ProtocolError::LengthOverrun {
            declared: len as u64,
            remaining: max as u64,
        },
    }
}

/// Serialize `message` as a complete wire frame: 8-byte outer header, then
/// an RPC header in the connection's configured [`HeaderFormat`], then the
/// message's regions.
///
/// `HeaderFormat::Short` has no room for `fwd`/`data` (spec.md §4.3 carries
/// only `msg_type`/`req_id`) or for a `package_type` beyond request/response,
/// so encoding a status message or one with a non-empty `fwd`/`data` region
/// in that format fails with [`ProtocolError::ShortHeaderUnsupported`].
pub fn encode_message(message: &Message, max_payload: u32, format: HeaderFormat) -> Result<Vec<u8>, ProtocolError> {
    let payload = match format {
        HeaderFormat::Long => {
            let header = LongHeader {
                package_type: message.package_type,
                msg_type: message.msg_type,
                req_id: message.req_id,
                fwd_len: message.fwd.len() as u64,
                body_len: message.body.len() as u64,
                data_len: message.data.len() as u64,
            };
            let header_bytes = header.encode().map_err(|_| ProtocolError::MalformedFieldHead)?;

            let mut payload = Vec::with_capacity(
                header_bytes.len() + message.fwd.len() + message.body.len() + message.data.len(),
            );
            payload.extend_from_slice(&header_bytes);
            payload.extend_from_slice(&message.fwd);
            payload.extend_from_slice(&message.body);
            payload.extend_from_slice(&message.data);
            payload
        }
        HeaderFormat::Short => {
            if !message.fwd.is_empty() || !message.data.is_empty() {
                return Err(ProtocolError::ShortHeaderUnsupported(
                    "fwd/data regions require the long header".into(),
                ));
            }
            let direction = match message.package_type {
                package_type::REQUEST => Direction::Request,
                package_type::RESPONSE => Direction::Response,
                other => {
                    return Err(ProtocolError::ShortHeaderUnsupported(format!(
                        "package_type {other} has no short-header representation"
                    )))
                }
            };
            let header = ShortHeader {
                direction,
                msg_type: message.msg_type,
                req_id: message.req_id,
            };
            let header_bytes = header.encode().map_err(|_| ProtocolError::MalformedFieldHead)?;

            let mut payload = Vec::with_capacity(header_bytes.len() + message.body.len());
            payload.extend_from_slice(&header_bytes);
            payload.extend_from_slice(&message.body);
            payload
        }
    };

    let frame_header = encode_frame_header(payload.len() as u32, max_payload).map_err(frame_err)?;

    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    out.extend_from_slice(&frame_header);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Attempt to decode one message from the front of `buf`, reading the RPC
/// header in `format`.
///
/// Returns `Ok(None)` when `buf` does not yet hold a complete frame (the
/// caller should read more bytes and retry); this is what lets
/// [`crate::transport::stream`] accumulate a message across several reads.
pub fn try_decode_message(
    buf: &[u8],
    max_payload: u32,
    format: HeaderFormat,
) -> Result<Option<(usize, Message)>, ProtocolError> {
    if buf.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }
    let frame_header = match decode_frame_header(&buf[..FRAME_HEADER_LEN], max_payload) {
        Ok(h) => h,
        Err(FrameCodecError::Truncated { .. }) => return Ok(None),
        Err(e) => return Err(frame_err(e)),
    };

    let total = FRAME_HEADER_LEN + frame_header.payload_len as usize;
    if buf.len() < total {
        return Ok(None);
    }
    let payload = &buf[FRAME_HEADER_LEN..total];

    let message = match format {
        HeaderFormat::Long => {
            let (consumed, header) =
                LongHeader::decode(payload).map_err(|_| ProtocolError::MalformedFieldHead)?;
            let mut offset = consumed;
            let fwd_len = header.fwd_len as usize;
            let body_len = header.body_len as usize;
            let data_len = header.data_len as usize;

            let declared = fwd_len + body_len + data_len;
            if offset + declared > payload.len() {
                return Err(ProtocolError::LengthOverrun {
                    declared: declared as u64,
                    remaining: (payload.len() - offset) as u64,
                });
            }

            let fwd = payload[offset..offset + fwd_len].to_vec();
            offset += fwd_len;
            let body = payload[offset..offset + body_len].to_vec();
            offset += body_len;
            let data = payload[offset..offset + data_len].to_vec();
            offset += data_len;
            debug_assert_eq!(offset, payload.len());

            Message {
                package_type: header.package_type,
                msg_type: header.msg_type,
                req_id: header.req_id,
                fwd,
                body,
                data,
            }
        }
        HeaderFormat::Short => {
            let (consumed, header) =
                ShortHeader::decode(payload).map_err(|_| ProtocolError::MalformedFieldHead)?;
            let body = payload[consumed..].to_vec();
            let package_type = match header.direction {
                Direction::Request => package_type::REQUEST,
                Direction::Response => package_type::RESPONSE,
            };
            Message {
                package_type,
                msg_type: header.msg_type,
                req_id: header.req_id,
                fwd: Vec::new(),
                body,
                data: Vec::new(),
            }
        }
    };
    Ok(Some((total, message)))
}

/// Decode exactly one message, treating an incomplete buffer as an error.
/// For use where `buf` is known to hold a whole frame already (the mem
/// transport's tests, mostly); the stream pump uses [`try_decode_message`].
pub fn decode_message(buf: &[u8], max_payload: u32, format: HeaderFormat) -> Result<(usize, Message), ProtocolError> {
    try_decode_message(buf, max_payload, format)?.ok_or(ProtocolError::TruncatedFrame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_a_request() {
        let message = Message::request(7, 42, vec![1, 2, 3], vec![9, 9]);
        let encoded = encode_message(&message, 1 << 20, HeaderFormat::Long).unwrap();
        let (consumed, decoded) = decode_message(&encoded, 1 << 20, HeaderFormat::Long).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, message);
    }

    #[test]
    fn roundtrips_with_empty_regions() {
        let message = Message::status(5, vec![0]);
        let encoded = encode_message(&message, 1 << 20, HeaderFormat::Long).unwrap();
        let (_, decoded) = decode_message(&encoded, 1 << 20, HeaderFormat::Long).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn try_decode_reports_incomplete_buffers() {
        let message = Message::request(1, 1, vec![1, 2, 3, 4, 5], vec![]);
        let encoded = encode_message(&message, 1 << 20, HeaderFormat::Long).unwrap();
        for cut in 0..encoded.len() {
            assert_eq!(
                try_decode_message(&encoded[..cut], 1 << 20, HeaderFormat::Long).unwrap(),
                None
            );
        }
        assert!(try_decode_message(&encoded, 1 << 20, HeaderFormat::Long)
            .unwrap()
            .is_some());
    }

    #[test]
    fn decode_rejects_length_overrun() {
        let message = Message::request(1, 1, vec![1, 2, 3], vec![]);
        let mut encoded = encode_message(&message, 1 << 20, HeaderFormat::Long).unwrap();
        // Corrupt the long header's body_len to claim more than is present.
        encoded[9] = 0x1F;
        let result = decode_message(&encoded, 1 << 20, HeaderFormat::Long);
        assert!(result.is_err());
    }

    #[test]
    fn two_frames_back_to_back_decode_independently() {
        let a = Message::request(1, 1, vec![1], vec![]);
        let b = Message::response(1, 1, vec![2, 2], vec![]);
        let mut buf = encode_message(&a, 1 << 20, HeaderFormat::Long).unwrap();
        buf.extend_from_slice(&encode_message(&b, 1 << 20, HeaderFormat::Long).unwrap());

        let (consumed_a, decoded_a) = decode_message(&buf, 1 << 20, HeaderFormat::Long).unwrap();
        assert_eq!(decoded_a, a);
        let (consumed_b, decoded_b) = decode_message(&buf[consumed_a..], 1 << 20, HeaderFormat::Long).unwrap();
        assert_eq!(decoded_b, b);
        assert_eq!(consumed_a + consumed_b, buf.len());
    }

    #[test]
    fn short_header_roundtrips_a_request_and_response() {
        let request = Message::request(7, 42, vec![1, 2, 3], vec![]);
        let encoded = encode_message(&request, 1 << 20, HeaderFormat::Short).unwrap();
        let (consumed, decoded) = decode_message(&encoded, 1 << 20, HeaderFormat::Short).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded, request);

        let response = Message::response(7, 42, vec![9, 9], vec![]);
        let encoded = encode_message(&response, 1 << 20, HeaderFormat::Short).unwrap();
        let (_, decoded) = decode_message(&encoded, 1 << 20, HeaderFormat::Short).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn short_header_rejects_fwd_and_data_regions() {
        let message = Message::request(1, 1, vec![1], vec![9]);
        assert_eq!(
            encode_message(&message, 1 << 20, HeaderFormat::Short),
            Err(ProtocolError::ShortHeaderUnsupported(
                "fwd/data regions require the long header".into()
            ))
        );
    }

    #[test]
    fn short_header_rejects_status_package_type() {
        let message = Message::status(1, vec![0]);
        assert!(matches!(
            encode_message(&message, 1 << 20, HeaderFormat::Short),
            Err(ProtocolError::ShortHeaderUnsupported(_))
        ));
    }
}
