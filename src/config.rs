//! `ServerConfig`: an immutable, cloneable bag of limits, built
//! with a fluent builder mirroring `HttpResponse`'s own builder style.
//! Wrapped in an `Arc` once by `Server::new` and shared read-only
//! across every connection task — configuration is immutable after
//! startup.

pub mod mime;

/// Default input buffer size: 8 KiB.
pub const DEFAULT_INPUT_BUFFER_SIZE: usize = 8 * 1024;
/// Default output buffer size: 64 KiB.
pub const DEFAULT_OUTPUT_BUFFER_SIZE: usize = 64 * 1024;
/// Default maximum request body size: 10,000,000 bytes.
pub const DEFAULT_MAXIMUM_REQUEST_BODY_SIZE: u64 = 10_000_000;
/// Default per-chunk cap in chunked decoding: 8 MiB.
pub const DEFAULT_MAXIMUM_CHUNK_SIZE: u64 = 8 * 1024 * 1024;
/// Default inbound WebSocket frame size cap: 16 MiB.
pub const DEFAULT_MAXIMUM_WEBSOCKET_FRAME_SIZE: u64 = 16 * 1024 * 1024;
/// Outbound fragmentation threshold: 1 MiB.
pub const DEFAULT_MAX_OUTBOUND_FRAME_SIZE: usize = 1024 * 1024;
/// Gzip auto-compression threshold: a low default length threshold
/// (~850 bytes).
pub const DEFAULT_GZIP_THRESHOLD: usize = 850;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub input_buffer_size: usize,
    pub output_buffer_size: usize,
    pub maximum_request_body_size: u64,
    pub maximum_chunk_size: u64,
    pub maximum_websocket_frame_size: u64,
    pub max_outbound_frame_size: usize,
    pub gzip_threshold: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            input_buffer_size: DEFAULT_INPUT_BUFFER_SIZE,
            output_buffer_size: DEFAULT_OUTPUT_BUFFER_SIZE,
            maximum_request_body_size: DEFAULT_MAXIMUM_REQUEST_BODY_SIZE,
            maximum_chunk_size: DEFAULT_MAXIMUM_CHUNK_SIZE,
            maximum_websocket_frame_size: DEFAULT_MAXIMUM_WEBSOCKET_FRAME_SIZE,
            max_outbound_frame_size: DEFAULT_MAX_OUTBOUND_FRAME_SIZE,
            gzip_threshold: DEFAULT_GZIP_THRESHOLD,
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServerConfigBuilder {
    inner: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn input_buffer_size(mut self, bytes: usize) -> Self {
        self.inner.input_buffer_size = bytes;
        self
    }

    pub fn output_buffer_size(mut self, bytes: usize) -> Self {
        self.inner.output_buffer_size = bytes;
        self
    }

    pub fn maximum_request_body_size(mut self, bytes: u64) -> Self {
        self.inner.maximum_request_body_size = bytes;
        self
    }

    pub fn maximum_chunk_size(mut self, bytes: u64) -> Self {
        self.inner.maximum_chunk_size = bytes;
        self
    }

    pub fn maximum_websocket_frame_size(mut self, bytes: u64) -> Self {
        self.inner.maximum_websocket_frame_size = bytes;
        self
    }

    pub fn max_outbound_frame_size(mut self, bytes: usize) -> Self {
        self.inner.max_outbound_frame_size = bytes;
        self
    }

    pub fn gzip_threshold(mut self, bytes: usize) -> Self {
        self.inner.gzip_threshold = bytes;
        self
    }

    pub fn build(self) -> ServerConfig {
        self.inner
    }
}
