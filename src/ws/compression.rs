//! permessage-deflate (RFC 7692). Uses `flate2`'s low-level
//! `Compress`/`Decompress` engines directly rather than the `Read`/`Write`
//! wrappers, since each WebSocket message is compressed independently with
//! an explicit sync-flush boundary rather than as a stream.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use std::io;

const SYNC_FLUSH_TRAILER: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];
const CHUNK: usize = 8192;

/// Owns the compressor half of a negotiated permessage-deflate session.
/// Lives behind the connection's writer lock, since outbound sends are
/// already serialized there.
pub struct CompressionEncoder {
    compress: Compress,
    no_context_takeover: bool,
}

impl CompressionEncoder {
    pub fn new(no_context_takeover: bool) -> Self {
        CompressionEncoder {
            compress: Compress::new(Compression::default(), false),
            no_context_takeover,
        }
    }

    /// Deflates `message`, strips the 4-byte sync-flush trailer (it's
    /// implied on the wire per RFC 7692), and resets the window if
    /// `no_context_takeover` was negotiated.
    pub fn compress_message(&mut self, message: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(message.len());
        let mut buf = [0u8; CHUNK];

        // Feed the whole message first, with no flush: this only buffers
        // internally, so the sync marker below appears exactly once, at
        // the true end of the message, rather than once per chunk.
        let mut offset = 0usize;
        while offset < message.len() {
            let before_in = self.compress.total_in();
            let before_out = self.compress.total_out();
            self.compress
                .compress(&message[offset..], &mut buf, FlushCompress::None)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            offset += (self.compress.total_in() - before_in) as usize;
            out.extend_from_slice(&buf[..(self.compress.total_out() - before_out) as usize]);
        }

        // Drain everything buffered internally and write the sync-flush
        // trailer. `BufError` here just means the output chunk filled up
        // mid-flush and another round is needed; anything else means the
        // flush is done.
        loop {
            let before_out = self.compress.total_out();
            let status = self
                .compress
                .compress(&[], &mut buf, FlushCompress::Sync)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            out.extend_from_slice(&buf[..(self.compress.total_out() - before_out) as usize]);
            if status != Status::BufError {
                break;
            }
        }

        if out.ends_with(&SYNC_FLUSH_TRAILER) {
            out.truncate(out.len() - SYNC_FLUSH_TRAILER.len());
        }
        if self.no_context_takeover {
            self.compress.reset();
        }
        Ok(out)
    }
}

/// Owns the decompressor half. Lives unguarded in the connection's single
/// read loop: only one task ever reads, so there is no contention to
/// serialize against.
pub struct CompressionDecoder {
    decompress: Decompress,
    no_context_takeover: bool,
}

impl CompressionDecoder {
    pub fn new(no_context_takeover: bool) -> Self {
        CompressionDecoder {
            decompress: Decompress::new(false),
            no_context_takeover,
        }
    }

    /// Appends the sync-flush trailer back and inflates.
    pub fn decompress_message(&mut self, payload: &[u8]) -> io::Result<Vec<u8>> {
        let mut input = Vec::with_capacity(payload.len() + SYNC_FLUSH_TRAILER.len());
        input.extend_from_slice(payload);
        input.extend_from_slice(&SYNC_FLUSH_TRAILER);

        let mut out = Vec::with_capacity(payload.len() * 2);
        let mut buf = [0u8; CHUNK];
        let mut input_consumed = 0usize;
        loop {
            let before_in = self.decompress.total_in();
            let before_out = self.decompress.total_out();
            let status = self
                .decompress
                .decompress(&input[input_consumed..], &mut buf, FlushDecompress::Sync)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            input_consumed += (self.decompress.total_in() - before_in) as usize;
            out.extend_from_slice(&buf[..(self.decompress.total_out() - before_out) as usize]);
            if status == Status::StreamEnd || input_consumed >= input.len() {
                break;
            }
        }
        if self.no_context_takeover {
            self.decompress.reset(false);
        }
        Ok(out)
    }
}

/// The aggregate state produced by a successful permessage-deflate
/// negotiation.
pub struct NegotiatedCompression {
    pub encoder: CompressionEncoder,
    pub decoder: CompressionDecoder,
    pub server_no_context_takeover: bool,
    pub client_no_context_takeover: bool,
}

impl NegotiatedCompression {
    pub fn new(server_no_context_takeover: bool, client_no_context_takeover: bool) -> Self {
        NegotiatedCompression {
            encoder: CompressionEncoder::new(server_no_context_takeover),
            decoder: CompressionDecoder::new(client_no_context_takeover),
            server_no_context_takeover,
            client_no_context_takeover,
        }
    }

    pub fn response_header_value(&self) -> String {
        let mut parts = vec!["permessage-deflate".to_string()];
        if self.server_no_context_takeover {
            parts.push("server_no_context_takeover".to_string());
        }
        if self.client_no_context_takeover {
            parts.push("client_no_context_takeover".to_string());
        }
        parts.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_message() {
        let mut encoder = CompressionEncoder::new(false);
        let mut decoder = CompressionDecoder::new(false);
        let message = b"the quick brown fox jumps over the lazy dog, repeatedly, for compressibility";
        let compressed = encoder.compress_message(message).unwrap();
        let decompressed = decoder.decompress_message(&compressed).unwrap();
        assert_eq!(decompressed, message);
    }

    #[test]
    fn context_takeover_carries_dictionary_across_messages() {
        let mut encoder = CompressionEncoder::new(false);
        let mut decoder = CompressionDecoder::new(false);
        let a = encoder.compress_message(b"repeated payload segment").unwrap();
        let b = encoder.compress_message(b"repeated payload segment").unwrap();
        assert!(b.len() <= a.len());
        assert_eq!(
            decoder.decompress_message(&a).unwrap(),
            b"repeated payload segment"
        );
        assert_eq!(
            decoder.decompress_message(&b).unwrap(),
            b"repeated payload segment"
        );
    }
}
