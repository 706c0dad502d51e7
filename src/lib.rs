pub mod app;
pub mod constants;
pub mod domain;
pub mod error;
pub mod infra;
pub mod language_model;
pub mod observability;
pub mod pipeline;

pub use error::{CleanerError, Result};
