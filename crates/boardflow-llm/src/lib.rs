pub mod providers;
pub mod retry;
pub mod streaming;

use boardflow_core::config::ModelConfig;
use boardflow_core::traits::LlmClient;

pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an LLM client for a capability role, honoring its retry config.
///
/// Every provider speaks the OpenAI chat-completions dialect here; Ollama,
/// vLLM, Groq, OpenRouter and friends all work via `base_url`.
pub fn create_client(config: &ModelConfig) -> Box<dyn LlmClient> {
    let client: Box<dyn LlmClient> = Box::new(OpenAiClient::new());
    match &config.retry {
        Some(retry) => Box::new(RetryingClient::new(client, retry.clone())),
        None => client,
    }
}
