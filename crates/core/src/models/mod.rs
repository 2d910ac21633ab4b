//! Data models for Survivote

mod chapter;
mod influence;
mod player;
mod result;
mod room;
mod vote;

pub use chapter::*;
pub use influence::*;
pub use player::*;
pub use result::*;
pub use room::*;
pub use vote::*;
