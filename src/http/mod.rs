//! HTTP/1.1 message handling.

pub mod body;
pub mod exchange;
pub mod header;
pub mod input;
pub mod response;
pub mod stream;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::io::BufWriter;

pub type ReadHalf = OwnedReadHalf;
pub type WriteHalf = OwnedWriteHalf;
pub type InputStream = stream::ByteStream<ReadHalf>;
pub type OutputStream = BufWriter<WriteHalf>;
