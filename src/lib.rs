//! Batch adapter for the Kling AI generative-media API
//!
//! Turns batches of `(resource, operation, parameters)` items into
//! authenticated Kling API calls (image, video, lip-sync, virtual try-on and
//! account cost endpoints) and returns one JSON result per item.

pub mod auth;
pub mod credentials;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod request;
pub mod transport;

pub use error::{Error, ErrorKind, Result};
