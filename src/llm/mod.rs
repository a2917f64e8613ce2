//! LLM 层：后端抽象与实现（Ollama / 云端占位 / Mock）及工厂

pub mod cloud;
pub mod factory;
pub mod mock;
pub mod ollama;
pub mod traits;

pub use cloud::CloudBackend;
pub use factory::{create_provider, check_providers, CheckStatus, ProviderRegistry, ProviderReport};
pub use mock::{EchoProvider, ScriptedProvider};
pub use ollama::{NdjsonDecoder, OllamaProvider};
pub use traits::{ChatOptions, ChunkStream, LlmProvider};
