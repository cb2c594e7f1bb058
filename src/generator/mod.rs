pub mod client;
pub mod error;
pub mod extract;
pub mod types;

use async_trait::async_trait;

pub use client::AnthropicGenerator;
pub use error::{ExtractError, GeneratorError};
pub use extract::{extract_as, extract_json};
pub use types::GenerationRequest;

/// A generative text model. Output is opaque text; callers validate it.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GeneratorError>;
}
