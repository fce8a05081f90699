//! The WebSocket message loop (RFC 6455): dispatches decoded
//! frames to a `WebSocketHandler` actor, reassembling fragmented messages
//! and serializing outbound sends behind the session's writer lock.

use crate::config::ServerConfig;
use crate::error::ReadFrameError;
use crate::handler::WebSocketHandler;
use crate::http::{InputStream, OutputStream};
use crate::ws::compression::{CompressionEncoder, CompressionDecoder, NegotiatedCompression};
use crate::ws::frame::OpCode;
use crate::ws::input::read_frame;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Staged by a successful handshake for the connection task to hand
/// off to `run_websocket_exchange`.
pub struct WebSocketUpgrade {
    pub handler: Box<dyn WebSocketHandler>,
    pub compression: Option<NegotiatedCompression>,
}

struct SessionSendState {
    writer: OutputStream,
    encoder: Option<CompressionEncoder>,
}

/// The handle a `WebSocketHandler` uses to send messages back. Sends are
/// serialized by an internal lock; the read side never touches this lock,
/// since only the exchange loop reads.
pub struct WebSocketSession {
    send: Mutex<SessionSendState>,
    max_outbound_frame_size: usize,
}

fn frame_header(fin: bool, rsv1: bool, opcode: OpCode, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    out.push((if fin { 0x80 } else { 0 }) | (if rsv1 { 0x40 } else { 0 }) | opcode.as_u8());
    if len < 126 {
        out.push(len as u8);
    } else if len <= u16::MAX as usize {
        out.push(126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }
    out
}

impl WebSocketSession {
    fn new(writer: OutputStream, encoder: Option<CompressionEncoder>, max_outbound_frame_size: usize) -> Self {
        WebSocketSession {
            send: Mutex::new(SessionSendState { writer, encoder }),
            max_outbound_frame_size,
        }
    }

    async fn send_frame(&self, opcode: OpCode, payload: Vec<u8>, compressible: bool) -> std::io::Result<()> {
        let mut state = self.send.lock().await;

        let (payload, rsv1) = if compressible && payload.len() >= 256 {
            match &mut state.encoder {
                Some(encoder) => (encoder.compress_message(&payload)?, true),
                None => (payload, false),
            }
        } else {
            (payload, false)
        };

        if payload.len() <= self.max_outbound_frame_size || opcode.is_control() {
            let header = frame_header(true, rsv1, opcode, payload.len());
            state.writer.write_all(&header).await?;
            state.writer.write_all(&payload).await?;
        } else {
            let mut offset = 0;
            let mut first = true;
            while offset < payload.len() {
                let end = (offset + self.max_outbound_frame_size).min(payload.len());
                let is_last = end == payload.len();
                let chunk_opcode = if first { opcode } else { OpCode::Continuation };
                let header = frame_header(is_last, rsv1 && first, chunk_opcode, end - offset);
                state.writer.write_all(&header).await?;
                state.writer.write_all(&payload[offset..end]).await?;
                offset = end;
                first = false;
            }
        }
        state.writer.flush().await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> std::io::Result<()> {
        self.send_frame(OpCode::Text, text.into().into_bytes(), true).await
    }

    pub async fn send_binary(&self, data: Vec<u8>) -> std::io::Result<()> {
        self.send_frame(OpCode::Binary, data, true).await
    }

    pub async fn send_ping(&self, payload: Vec<u8>) -> std::io::Result<()> {
        self.send_frame(OpCode::Ping, payload, false).await
    }

    pub async fn send_pong(&self, payload: Vec<u8>) -> std::io::Result<()> {
        self.send_frame(OpCode::Pong, payload, false).await
    }

    pub async fn send_close(&self, code: u16, reason: impl Into<String>) -> std::io::Result<()> {
        let reason = reason.into();
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());
        self.send_frame(OpCode::Close, payload, false).await
    }
}

struct FragmentedMessage {
    opcode: OpCode,
    compressed: bool,
    buffer: Vec<u8>,
}

fn parse_close_payload(payload: &[u8]) -> (u16, String) {
    if payload.len() < 2 {
        return (1005, String::new());
    }
    let code = u16::from_be_bytes([payload[0], payload[1]]);
    let reason = String::from_utf8_lossy(&payload[2..]).into_owned();
    (code, reason)
}

/// Runs the message loop for an upgraded connection until the session
/// closes, either by a Close handshake, a protocol violation, or the peer
/// disconnecting abruptly.
pub async fn run_websocket_exchange(
    reader: InputStream,
    writer: OutputStream,
    upgrade: WebSocketUpgrade,
    config: &ServerConfig,
) {
    let mut reader = reader;
    let WebSocketUpgrade { handler, compression } = upgrade;
    let (encoder, mut decoder) = match compression {
        Some(c) => (Some(c.encoder), Some(c.decoder)),
        None => (None, None),
    };

    let session = WebSocketSession::new(writer, encoder, config.max_outbound_frame_size);
    let mut handler = handler.on_start().await;
    let mut fragment: Option<FragmentedMessage> = None;

    let (final_code, final_reason) = loop {
        let compression_active = decoder.is_some();
        let frame = match read_frame(&mut reader, config.maximum_websocket_frame_size, compression_active).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break (1006, "connection closed without a close handshake".to_string()),
            Err(ReadFrameError::Protocol(e)) => {
                let _ = session.send_close(e.code, e.message.clone()).await;
                break (e.code, e.message);
            }
            Err(ReadFrameError::Io(e)) => {
                debug!(error = %e, "websocket connection closed with an I/O error");
                break (1006, "connection closed without a close handshake".to_string());
            }
        };

        if frame.rsv1 && (frame.opcode == OpCode::Continuation || frame.opcode.is_control()) {
            let _ = session
                .send_close(1002, "RSV1 is only valid on the first frame of a message")
                .await;
            break (1002, "RSV1 set on a continuation or control frame".to_string());
        }

        match frame.opcode {
            OpCode::Close => {
                let (received_code, reason) = parse_close_payload(&frame.payload);
                let send_code = if received_code == 1005 { 1000 } else { received_code };
                let _ = session.send_close(send_code, String::new()).await;
                break (received_code, reason);
            }
            OpCode::Ping => {
                handler = handler.on_ping(&session, frame.payload).await;
            }
            OpCode::Pong => {
                handler = handler.on_pong(&session, frame.payload).await;
            }
            OpCode::Text | OpCode::Binary => {
                if fragment.is_some() {
                    let _ = session
                        .send_close(1002, "new message started before the previous one finished")
                        .await;
                    break (1002, "overlapping fragmented message".to_string());
                }
                if frame.fin {
                    let payload = match decode_if_needed(frame.rsv1, &mut decoder, frame.payload) {
                        Ok(p) => p,
                        Err(_) => {
                            let _ = session.send_close(1007, "invalid compressed payload").await;
                            break (1007, "invalid compressed payload".to_string());
                        }
                    };
                    match dispatch_message(handler, &session, frame.opcode, payload).await {
                        Ok(next) => handler = next,
                        Err((next, code)) => {
                            let _ = session.send_close(code, "payload was not valid UTF-8").await;
                            handler = next;
                            break (code, "payload was not valid UTF-8".to_string());
                        }
                    }
                } else {
                    fragment = Some(FragmentedMessage {
                        opcode: frame.opcode,
                        compressed: frame.rsv1,
                        buffer: frame.payload,
                    });
                }
            }
            OpCode::Continuation => {
                let Some(mut msg) = fragment.take() else {
                    let _ = session
                        .send_close(1002, "continuation frame without a preceding fragment")
                        .await;
                    break (1002, "unexpected continuation frame".to_string());
                };
                msg.buffer.extend_from_slice(&frame.payload);
                if frame.fin {
                    let payload = match decode_if_needed(msg.compressed, &mut decoder, msg.buffer) {
                        Ok(p) => p,
                        Err(_) => {
                            let _ = session.send_close(1007, "invalid compressed payload").await;
                            break (1007, "invalid compressed payload".to_string());
                        }
                    };
                    match dispatch_message(handler, &session, msg.opcode, payload).await {
                        Ok(next) => handler = next,
                        Err((next, code)) => {
                            let _ = session.send_close(code, "payload was not valid UTF-8").await;
                            handler = next;
                            break (code, "payload was not valid UTF-8".to_string());
                        }
                    }
                } else {
                    fragment = Some(msg);
                }
            }
        }
    };

    handler.on_close(final_code, final_reason).await;
}

fn decode_if_needed(
    rsv1: bool,
    decoder: &mut Option<CompressionDecoder>,
    payload: Vec<u8>,
) -> std::io::Result<Vec<u8>> {
    if rsv1 {
        match decoder {
            Some(decoder) => decoder.decompress_message(&payload),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "RSV1 set without a negotiated compression extension",
            )),
        }
    } else {
        Ok(payload)
    }
}

/// Dispatches a fully reassembled, decompressed message to the handler.
/// `Err` carries the close code for the one failure mode possible here: a
/// Text frame whose payload isn't valid UTF-8 (close code 1007).
async fn dispatch_message(
    handler: Box<dyn WebSocketHandler>,
    session: &WebSocketSession,
    opcode: OpCode,
    payload: Vec<u8>,
) -> Result<Box<dyn WebSocketHandler>, (Box<dyn WebSocketHandler>, u16)> {
    match opcode {
        OpCode::Text => match String::from_utf8(payload) {
            Ok(text) => Ok(handler.on_text(session, text).await),
            Err(_) => {
                warn!("rejected a text frame with invalid UTF-8 payload");
                Err((handler, 1007))
            }
        },
        OpCode::Binary => Ok(handler.on_binary(session, payload).await),
        _ => unreachable!("dispatch_message only called for Text/Binary"),
    }
}
