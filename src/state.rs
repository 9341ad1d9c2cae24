use std::sync::Arc;

use crate::engine::LifecycleEngine;
use crate::observability::metrics::Metrics;
use crate::store::{DataSource, DeliveryGateway};

pub struct AppState {
    pub engine: LifecycleEngine,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self {
            engine: LifecycleEngine::new(DeliveryGateway::new(source)),
            metrics: Metrics::new(),
        }
    }

    pub fn gateway(&self) -> &DeliveryGateway {
        self.engine.gateway()
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        self.gateway().source()
    }
}
