//! 核心编排层：错误分类、推理编排器（worker + 队列）、响应路由、帧驱动引擎

pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod router;

pub use engine::Engine;
pub use error::{ErrorKind, OrchestratorError, ProviderError};
pub use orchestrator::{
    InferenceOrchestrator, InferenceRequest, InferenceResponse, OrchestratorOptions,
    ResponseOutcome, StreamLimits,
};
pub use router::{user_facing_message, Delivery, Dispatch, ResponseRouter};
