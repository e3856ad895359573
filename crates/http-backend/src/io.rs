mod chunks;

pub use chunks::ResponseChunks;
