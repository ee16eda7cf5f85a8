//! # sassline-compiler
//!
//! SCSS compilation with source maps and hash-gated atomic output writes.
//!
//! Call [`compile`] to turn one entry point into `<stem>.css` and
//! `<stem>.css.map` inside an output folder.

pub mod compile;
pub mod error;
pub mod source_map;
pub mod writer;

pub use compile::{compile, output_paths, render, CompileOptions, CompileOutput};
pub use error::CompileError;
pub use source_map::SourceMap;
pub use writer::WriteResult;
