//! Provider adapter trait
//!
//! One implementation per backend family. Adapters own the wire protocol,
//! enforce their own request timeout, and convert backend errors into the
//! shared taxonomy before anything reaches the router.

use crate::completion::{GenerationRequest, ProviderOutput};
use crate::error::Result;

/// Uniform interface to one external generation backend
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider id (e.g. "openai")
    fn id(&self) -> &str;

    /// Whether the backend offers an embeddings endpoint
    fn supports_embeddings(&self) -> bool;

    /// Submit a completion request against the given model
    async fn generate(&self, request: &GenerationRequest, model: &str) -> Result<ProviderOutput>;

    /// Generate embeddings for the given texts
    async fn embed(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>>;

    /// Probe backend reachability
    async fn test_connection(&self) -> bool;
}
