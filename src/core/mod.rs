pub mod types;
pub mod error;
pub mod config;
pub mod progress;
pub mod registry;

pub use types::*;
pub use error::*;
pub use config::*;
pub use progress::*;
pub use registry::*;
