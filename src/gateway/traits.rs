use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;

use super::types::{single_chunk_stream, Generation, GenerationRequest, ModelInfo, TokenStream};

/// One loaded backend serving one model.
///
/// Implementations must honor `cancel`: once it fires the call should stop
/// its backend work and return [`GatewayError::Cancelled`].
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    fn model_id(&self) -> &str;

    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<Generation, GatewayError>;

    async fn stream(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<TokenStream, GatewayError> {
        let generation = self.generate(request, cancel).await?;
        Ok(single_chunk_stream(generation))
    }

    async fn health_check(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Model-id addressed access to every backend the deployment knows about.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn generate(
        &self,
        model_id: &str,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<Generation, GatewayError>;

    async fn stream(
        &self,
        model_id: &str,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<TokenStream, GatewayError> {
        let generation = self.generate(model_id, request, cancel).await?;
        Ok(single_chunk_stream(generation))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, GatewayError> {
        Ok(Vec::new())
    }

    async fn model_info(&self, model_id: &str) -> Result<Option<ModelInfo>, GatewayError> {
        let models = self.list_models().await?;
        Ok(models.into_iter().find(|model| model.id == model_id))
    }
}

/// Creates adapters for the pool on first use of a model id.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    async fn load(&self, model_id: &str) -> Result<Arc<dyn ModelAdapter>, GatewayError>;

    async fn list_models(&self) -> Result<Vec<ModelInfo>, GatewayError> {
        Ok(Vec::new())
    }
}
