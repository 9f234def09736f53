use serde::{Deserialize, Serialize};

/// The interchangeable worker capabilities a node can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    Text,
    Vision,
}

impl WorkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Vision => "vision",
        }
    }
}

impl std::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What actually happened to a node: which worker ran it, or a routing fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultKind {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "vision")]
    Vision,
    #[serde(rename = "routed-error")]
    RoutedError,
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Vision => "vision",
            Self::RoutedError => "routed-error",
        }
    }
}

impl std::fmt::Display for ResultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<WorkerKind> for ResultKind {
    fn from(kind: WorkerKind) -> Self {
        match kind {
            WorkerKind::Text => Self::Text,
            WorkerKind::Vision => Self::Vision,
        }
    }
}

/// Token usage reported by a capability for a single call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn is_zero(&self) -> bool {
        self.prompt_tokens == 0 && self.completion_tokens == 0 && self.total_tokens == 0
    }
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

/// The immutable record of one node's execution outcome.
///
/// Written exactly once by the pipeline handling that node; owned by the
/// result store afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    pub kind: ResultKind,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    // Worker-stage usage
    #[serde(default, skip_serializing_if = "is_zero")]
    pub prompt_tokens: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub completion_tokens: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub total_tokens: u64,
    // Router-stage usage
    #[serde(default, skip_serializing_if = "is_zero")]
    pub router_prompt_tokens: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub router_completion_tokens: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub router_total_tokens: u64,
}

impl NodeResult {
    /// A successful (or worker-failed) result from a worker run.
    pub fn from_worker(kind: WorkerKind, output: String, error: Option<String>) -> Self {
        Self {
            kind: kind.into(),
            output,
            error,
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            router_prompt_tokens: 0,
            router_completion_tokens: 0,
            router_total_tokens: 0,
        }
    }

    /// A degraded result for a node whose routing stage failed.
    pub fn routed_error(error: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::RoutedError,
            output: String::new(),
            error: Some(error.into()),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            router_prompt_tokens: 0,
            router_completion_tokens: 0,
            router_total_tokens: 0,
        }
    }

    pub fn with_worker_usage(mut self, usage: TokenUsage) -> Self {
        self.prompt_tokens = usage.prompt_tokens;
        self.completion_tokens = usage.completion_tokens;
        self.total_tokens = usage.total_tokens;
        self
    }

    pub fn with_router_usage(mut self, usage: TokenUsage) -> Self {
        self.router_prompt_tokens = usage.prompt_tokens;
        self.router_completion_tokens = usage.completion_tokens;
        self.router_total_tokens = usage.total_tokens;
        self
    }
}

/// Role in a chat exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message sent to a capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Stop reason from the capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

/// A streaming increment from a capability.
///
/// The typed usage variant is the whole response contract — nothing
/// downstream should need to introspect provider payloads.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),
    /// The response is complete.
    Stop(StopReason),
    /// Usage counters attached to the final message.
    Usage(TokenUsage),
}
