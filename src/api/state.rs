use std::sync::Arc;

use crate::admission::AdmissionGuard;
use crate::config::Config;
use crate::observability::Metrics;
use crate::pipeline::{Orchestrator, PipelineSetupError};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub guard: AdmissionGuard,
    pub orchestrator: Arc<Orchestrator>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Shares the orchestrator's metrics handle
    pub fn new(config: Config, orchestrator: Orchestrator) -> Self {
        let guard = AdmissionGuard::from_config(&config.admission);
        let metrics = Arc::clone(orchestrator.metrics());
        Self {
            config: Arc::new(config),
            guard,
            orchestrator: Arc::new(orchestrator),
            metrics,
        }
    }

    pub fn from_config(config: Config) -> Result<Self, PipelineSetupError> {
        let orchestrator = Orchestrator::from_config(&config, Arc::new(Metrics::new()))?;
        Ok(Self::new(config, orchestrator))
    }
}
