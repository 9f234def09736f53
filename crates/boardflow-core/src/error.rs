use thiserror::Error;

#[derive(Debug, Error)]
pub enum BoardflowError {
    // Board input that cannot be parsed. The only fault that aborts a run.
    #[error("Board parse error: {0}")]
    GraphParse(String),

    // LLM capability errors — recovered at node granularity
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    // Router decision errors
    #[error("Route decision unparseable: {0}")]
    RouteDecision(String),

    // Run cancelled by the caller (timeout or signal)
    #[error("Run cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BoardflowError>;
