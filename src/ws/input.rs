//! WebSocket frame parsing (RFC 6455). Mirrors the strict,
//! step-by-step validation style of `http::input`: every protocol
//! violation maps to a specific close code rather than a generic error.

use crate::error::{ReadFrameError, WebSocketProtocolError};
use crate::http::InputStream;
use crate::ws::frame::{OpCode, WebSocketFrame};

fn protocol_error(message: impl Into<String>) -> ReadFrameError {
    WebSocketProtocolError::new(1002, message).into()
}

fn message_too_big(message: impl Into<String>) -> ReadFrameError {
    WebSocketProtocolError::new(1009, message).into()
}

/// Reads one frame off the wire, unmasking its payload in place.
/// `Ok(None)` means the peer closed the TCP connection before sending any
/// byte of a new frame (distinct from a WebSocket Close frame).
pub async fn read_frame(
    reader: &mut InputStream,
    max_frame_size: u64,
    compression_active: bool,
) -> Result<Option<WebSocketFrame>, ReadFrameError> {
    let first = match reader.read_byte().await? {
        Some(b) => b,
        None => return Ok(None),
    };

    let fin = first & 0x80 != 0;
    let rsv1 = first & 0x40 != 0;
    let rsv2 = first & 0x20 != 0;
    let rsv3 = first & 0x10 != 0;
    let opcode_bits = first & 0x0F;

    if rsv2 || rsv3 {
        return Err(protocol_error("reserved bits RSV2/RSV3 must be zero"));
    }
    if rsv1 && !compression_active {
        return Err(protocol_error(
            "RSV1 set without a negotiated extension that defines it",
        ));
    }

    let opcode = OpCode::from_u8(opcode_bits)
        .ok_or_else(|| protocol_error("unknown opcode"))?;

    let mut second = [0u8; 1];
    reader.read_exact(&mut second).await?;
    let second = second[0];

    let masked = second & 0x80 != 0;
    if !masked {
        return Err(protocol_error("client frames must be masked"));
    }

    let len7 = second & 0x7F;
    let payload_len: u64 = if len7 < 126 {
        len7 as u64
    } else if len7 == 126 {
        let mut ext = [0u8; 2];
        reader.read_exact(&mut ext).await?;
        u16::from_be_bytes(ext) as u64
    } else {
        let mut ext = [0u8; 8];
        reader.read_exact(&mut ext).await?;
        let len = u64::from_be_bytes(ext);
        if len & 0x8000_0000_0000_0000 != 0 {
            return Err(protocol_error(
                "64-bit extended payload length must not set the most significant bit",
            ));
        }
        len
    };

    if opcode.is_control() {
        if !fin {
            return Err(protocol_error("control frames must not be fragmented"));
        }
        if payload_len > 125 {
            return Err(protocol_error("control frame payload exceeds 125 bytes"));
        }
    }

    if payload_len > max_frame_size {
        return Err(message_too_big(format!(
            "frame payload of {} bytes exceeds the configured maximum of {} bytes",
            payload_len, max_frame_size
        )));
    }

    let mut mask_key = [0u8; 4];
    reader.read_exact(&mut mask_key).await?;

    let mut payload = vec![0u8; payload_len as usize];
    reader.read_exact(&mut payload).await?;
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask_key[i % 4];
    }

    Ok(Some(WebSocketFrame {
        fin,
        rsv1,
        rsv2,
        rsv3,
        opcode,
        payload,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::stream::ByteStream;

    fn masked_frame(fin: bool, opcode: OpCode, payload: &[u8], key: [u8; 4]) -> Vec<u8> {
        let mut out = Vec::new();
        out.push((if fin { 0x80 } else { 0 }) | opcode.as_u8());
        assert!(payload.len() < 126);
        out.push(0x80 | payload.len() as u8);
        out.extend_from_slice(&key);
        for (i, &b) in payload.iter().enumerate() {
            out.push(b ^ key[i % 4]);
        }
        out
    }

    #[tokio::test]
    async fn reads_and_unmasks_a_text_frame() {
        let bytes = masked_frame(true, OpCode::Text, b"hello", [1, 2, 3, 4]);
        let mut reader = ByteStream::new(std::io::Cursor::new(bytes), 64);
        let frame = read_frame(&mut reader, 1 << 20, false).await.unwrap().unwrap();
        assert_eq!(frame.opcode, OpCode::Text);
        assert!(frame.fin);
        assert_eq!(frame.payload, b"hello");
    }

    #[tokio::test]
    async fn unmasked_frame_is_a_protocol_error() {
        let mut out = vec![0x81u8, 0x05];
        out.extend_from_slice(b"hello");
        let mut reader = ByteStream::new(std::io::Cursor::new(out), 64);
        let err = read_frame(&mut reader, 1 << 20, false).await.unwrap_err();
        match err {
            ReadFrameError::Protocol(p) => assert_eq!(p.code, 1002),
            _ => panic!("expected protocol error"),
        }
    }

    #[tokio::test]
    async fn fragmented_control_frame_is_a_protocol_error() {
        let bytes = masked_frame(false, OpCode::Ping, b"hi", [9, 9, 9, 9]);
        let mut reader = ByteStream::new(std::io::Cursor::new(bytes), 64);
        let err = read_frame(&mut reader, 1 << 20, false).await.unwrap_err();
        match err {
            ReadFrameError::Protocol(p) => assert_eq!(p.code, 1002),
            _ => panic!("expected protocol error"),
        }
    }

    #[tokio::test]
    async fn clean_eof_before_any_byte_is_none() {
        let mut reader = ByteStream::new(std::io::Cursor::new(Vec::<u8>::new()), 64);
        assert!(read_frame(&mut reader, 1 << 20, false).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_frame_reports_1009() {
        let bytes = masked_frame(true, OpCode::Binary, b"abcdefgh", [1, 1, 1, 1]);
        let mut reader = ByteStream::new(std::io::Cursor::new(bytes), 64);
        let err = read_frame(&mut reader, 4, false).await.unwrap_err();
        match err {
            ReadFrameError::Protocol(p) => assert_eq!(p.code, 1009),
            _ => panic!("expected message-too-big error"),
        }
    }
}
