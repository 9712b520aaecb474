pub mod config;
pub mod error;
pub mod float;
pub mod json;

pub use config::ComponentSpec;
pub use error::{AppError, AppResult, ErrorKind};
pub use float::FloatCmp;
