//! API request handlers

mod compile;
mod health;

pub use compile::*;
pub use health::*;
