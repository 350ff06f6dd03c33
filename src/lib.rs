// Library exports for threadline
// The binary and the integration tests both build on these modules

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod rules;
pub mod sync;
pub mod view;

pub use engine::{CommentEngine, Created, EngineConfig, Outcome, PageLoad};
pub use error::{BackendError, EngineError, EngineResult, ErrorKind, ValidationError};
