//! Discord presentation for engine results.

pub mod embeds;
