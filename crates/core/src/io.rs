//! Turning response bodies into frames.

mod decoder;
mod reader;

pub use decoder::LineDecoder;
pub use reader::FrameReader;
