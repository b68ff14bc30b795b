//! Command implementations for ota-cli

pub mod upload;

pub use upload::upload;
