pub mod chat_completions;
pub mod model_router;
pub mod provider;
pub mod raw_http;
pub mod registry;
pub mod text_extraction;

// Re-export for convenience
pub use chat_completions::ChatCompletionsClient;
pub use model_router::{DispatchOutcome, ModelRouter, RouterError};
pub use provider::{ChatProvider, ChatRequest, ProviderError};
pub use raw_http::RawHttpClient;
pub use registry::{build_registry, AvailableModel, ModelEntry, ProviderKind, Registry};
pub use text_extraction::{ExtractionError, PlainTextExtractor, TextExtractor};
