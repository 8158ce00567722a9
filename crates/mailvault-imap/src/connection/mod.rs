//! TLS connection setup, DEFLATE layering, and protocol framing.

mod deflate;
mod framed;
mod stream;

pub use deflate::DeflateStream;
pub use framed::{DEFAULT_READ_TIMEOUT, FramedStream, ResponseAccumulator};
pub use stream::{ImapStream, connect_tls, create_tls_connector};
