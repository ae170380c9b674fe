//! Codec module - canonical binary encoding of chain entities

mod entity;
mod reader;
mod writer;

pub use entity::*;
pub use reader::*;
pub use writer::*;
