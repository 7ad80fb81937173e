//! Utilities - terminal progress and styling

pub mod progress;
pub mod styling;

pub use progress::*;
pub use styling::*;
