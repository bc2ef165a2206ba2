pub mod error;
pub mod geo;
pub mod cache;
pub mod terrain;
pub mod physics;
pub mod orbit;
pub mod scoring;
pub mod forecast;
pub mod io;
pub mod config;

pub use error::{Result, VisibilityError};

#[cfg(test)]
mod tests;
