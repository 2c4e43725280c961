use fm_domain::error::Result;
use fm_domain::stream::{BoxStream, CompletionEvent};
use fm_domain::tool::{Message, ToolSpec};
use fm_domain::turn::{ModelEffort, ReasoningSummary};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The two client back-end shapes.
///
/// Single-agent modes use `Responses` (server-driven tool events); the
/// multi-agent modes need the richer scheduling of the `Chat` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientShape {
    Responses,
    Chat,
}

/// Reasoning controls forwarded to the model when the shape supports them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReasoningControls {
    pub effort: Option<ModelEffort>,
    pub summary: Option<ReasoningSummary>,
}

/// A shape-agnostic streamed completion request.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Deployment name.
    pub model: String,
    /// The conversation messages to send.
    pub messages: Vec<Message>,
    /// Tool specs the model may invoke.
    pub tools: Vec<ToolSpec>,
    /// Sampling temperature (0.0 – 2.0). `None` lets the provider choose.
    pub temperature: Option<f32>,
    /// Reasoning effort / summary controls.
    pub reasoning: ReasoningControls,
    /// Provider-side conversation thread, when the shape keeps one.
    pub thread_id: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core client trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every LLM client implements.
///
/// Implementations translate between the internal event surface
/// ([`CompletionEvent`]) and the wire format of their HTTP API.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Request a streamed completion.
    async fn stream(
        &self,
        req: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<CompletionEvent>>>;

    /// Create a provider-side conversation thread, returning its id.
    ///
    /// Shapes without server-side threads mint a local id; teardown is then
    /// a no-op, but callers treat every thread as an owned resource.
    async fn create_thread(&self) -> Result<String>;

    /// Release a provider-side conversation thread.
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;

    /// Which back-end shape this client implements.
    fn shape(&self) -> ClientShape;

    /// A unique identifier for this client instance.
    fn client_id(&self) -> &str;
}
