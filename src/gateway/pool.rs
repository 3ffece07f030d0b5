use std::borrow::Borrow;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayError;

use super::traits::{AdapterFactory, ModelAdapter, ModelGateway};
use super::types::{Generation, GenerationRequest, ModelInfo, TokenStream};

type AdapterSlot = Arc<OnceCell<Arc<dyn ModelAdapter>>>;

/// Warmed-adapter cache: one adapter instance per model id.
///
/// The first caller for a model id loads it through the factory; callers that
/// arrive while that load is in flight wait for it instead of starting another.
/// A failed load drops the slot so the next call tries again and unknown ids
/// leave nothing behind.
pub struct AdapterPool {
    factory: Arc<dyn AdapterFactory>,
    slots: Mutex<HashMap<ModelKey, AdapterSlot>>,
}

impl AdapterPool {
    pub fn new(factory: Arc<dyn AdapterFactory>) -> Self {
        Self {
            factory,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Installs an already-loaded adapter under its model id.
    pub fn register(&self, adapter: Arc<dyn ModelAdapter>) -> Result<(), GatewayError> {
        let key = ModelKey::new(adapter.model_id())?;
        let slot = Arc::new(OnceCell::new_with(Some(adapter)));
        self.lock_slots().insert(key, slot);
        Ok(())
    }

    /// Number of model ids with a loaded adapter.
    pub fn warmed_count(&self) -> usize {
        self.lock_slots()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    /// Returns the adapter for `model_id`, loading it on first use.
    pub async fn adapter(&self, model_id: &str) -> Result<Arc<dyn ModelAdapter>, GatewayError> {
        let slot = self.slot(model_id)?;
        let loaded = slot
            .get_or_try_init(|| async {
                log::info!("loading adapter model_id={model_id}");
                self.factory.load(model_id).await
            })
            .await;
        match loaded {
            Ok(adapter) => Ok(adapter.clone()),
            Err(err) => {
                self.evict_empty(model_id, &slot);
                Err(err)
            }
        }
    }

    /// Removes `slot` if it is still the entry for `model_id` and never loaded.
    fn evict_empty(&self, model_id: &str, slot: &AdapterSlot) {
        let mut slots = self.lock_slots();
        let stale = slots
            .get(model_id)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && !current.initialized());
        if stale {
            slots.remove(model_id);
        }
    }

    fn slot(&self, model_id: &str) -> Result<AdapterSlot, GatewayError> {
        let key = ModelKey::new(model_id)?;
        let mut slots = self.lock_slots();
        Ok(slots.entry(key).or_default().clone())
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<ModelKey, AdapterSlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ModelGateway for AdapterPool {
    async fn generate(
        &self,
        model_id: &str,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<Generation, GatewayError> {
        let adapter = self.adapter(model_id).await?;
        adapter.generate(request, cancel).await
    }

    async fn stream(
        &self,
        model_id: &str,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<TokenStream, GatewayError> {
        let adapter = self.adapter(model_id).await?;
        adapter.stream(request, cancel).await
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, GatewayError> {
        self.factory.list_models().await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ModelKey(String);

impl ModelKey {
    fn new(id: impl Into<String>) -> Result<Self, GatewayError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "Model id cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }
}

impl Borrow<str> for ModelKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}
