//! Node module - genesis construction and the block handler

mod genesis;
mod handler;

pub use genesis::*;
pub use handler::*;
