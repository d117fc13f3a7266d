//! Writers for crawl and news output files.
//!
//! # Submodules
//!
//! - [`json`]: Atomic JSON replacement, used for crawl output and named datasets
//! - [`csv`]: Headline export for the news crawl

pub mod csv;
pub mod json;
