//! File access for the content engine: read-only memory maps of source
//! files and crash-safe write-back of edited content.
pub mod atomic;
pub mod mmap;
