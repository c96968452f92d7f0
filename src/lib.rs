pub mod error;
pub mod layers;

pub use error::{Error, Result};
