//! Audio output backends for the polymix mixer.

mod cpal_backend;
mod traits;

pub use cpal_backend::CpalBackend;
pub use traits::{AudioBackend, AudioError, PullFn, StreamFormat, StreamStatus};
