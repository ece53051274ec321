/// # Chunk Store Module.
///
/// The logical byte stream of a session, kept as an ordered list of owned
/// and memory-mapped chunks.
pub mod chunk;
pub mod store;

pub use chunk::Chunk;
pub use store::{ChunkStore, Slices};
