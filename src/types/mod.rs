pub mod constants;
pub mod error;

pub use constants::*;
pub use error::{ChatError, Result};
