//! Incremental decoding of the chat response body.
//!
//! - `decoder`: UTF-8 aware line splitting over arbitrary byte boundaries
//! - `sse`: `data: {content, done}` parsing and the pull-based chunk stream

pub mod decoder;
pub mod sse;

pub use decoder::Utf8LineDecoder;
pub use sse::{ChunkDecoder, ChunkStream, DATA_PREFIX, chunk_stream, parse_data_line};
