//! Binary content engine: a chunked byte store that can sit on top of a
//! memory-mapped file, an undo/redo log of invertible edits, and a
//! cancellable pattern finder.
pub mod chunk_store;
pub mod config;
pub mod edit_log;
pub mod enums;
pub mod errors;
pub mod finder;
pub mod pattern;
