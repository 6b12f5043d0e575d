//! Audio reassembly into a single output file.

pub mod assembler;

pub use assembler::{ConcatTool, FfmpegConcat, reassemble};
