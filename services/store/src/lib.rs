pub mod adapters;
pub mod config;
pub mod error;
pub mod repository;

pub use repository::{Repository, DOCUMENT_ID_COUNTER};
