//! The shared client context handed to every command.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::backend::{Backend, Intent, IntentResult};
use crate::service::StreamService;

/// Bundles the single-writer service with the injected request executor.
/// Cheap to clone; commands and push handlers each hold one.
#[derive(Clone)]
pub struct ClientContext {
    service: Arc<Mutex<StreamService>>,
    backend: Arc<dyn Backend>,
}

impl ClientContext {
    pub fn new(service: StreamService, backend: Arc<dyn Backend>) -> Self {
        Self {
            service: Arc::new(Mutex::new(service)),
            backend,
        }
    }

    /// Locks the service. Callers must not hold the guard across an await;
    /// commands lock, mutate, drop, then await.
    pub fn service(&self) -> MutexGuard<'_, StreamService> {
        self.service.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) async fn perform(&self, intent: Intent) -> IntentResult {
        self.backend.perform(intent).await
    }
}
