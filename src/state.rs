use std::sync::Arc;

use crate::auth::AuthProvider;
use crate::engine::account::AccountService;
use crate::engine::progression::ProgressionController;
use crate::engine::queue::PickupQueue;
use crate::error::AppError;
use crate::observability::metrics::Metrics;
use crate::store::DocumentStore;

/// Everything the HTTP layer needs, built once per signed-in session.
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub rider_id: String,
    pub home: Arc<ProgressionController>,
    pub queue: PickupQueue,
    pub account: AccountService,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        auth: Arc<dyn AuthProvider>,
    ) -> Result<Self, AppError> {
        let user = auth.current_user().ok_or(AppError::NotAuthenticated)?;
        let metrics = Metrics::new();

        Ok(Self {
            home: ProgressionController::new(store.clone(), metrics.clone(), user.id.clone()),
            queue: PickupQueue::new(store.clone(), metrics.clone(), user.id.clone()),
            account: AccountService::new(store.clone(), metrics.clone(), user.id.clone()),
            rider_id: user.id,
            store,
            auth,
            metrics,
        })
    }
}
