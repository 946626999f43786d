//! Prompt-to-image generation through ImageRouter with a single-job controller.

pub mod artifact;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod imagerouter;
pub mod models;
pub mod routes;
pub mod transport;

pub use controller::{ControllerOptions, GenerationController};
pub use error::{ErrorDetail, ErrorKind, PipelineError, SubmitError};
pub use models::{GenerationEvent, GenerationRequest, GenerationResult, ImageModel, JobHandle, JobState};
pub use transport::{HttpReply, HttpTransport, ReqwestTransport};
