//! Component 4 – renderings of a parsed script.
pub mod json;
pub mod text;
