// Utility functions
pub mod error;
pub mod tokens;

pub use error::*;
pub use tokens::*;
