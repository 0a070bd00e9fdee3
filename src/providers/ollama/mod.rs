pub mod client;
pub mod options;
pub mod stream;
pub mod types;

pub use client::*;
pub use options::*;
