//! Shared application state: an embedded validator context plus the step
//! counter, guarded by a single mutex so a manual trigger never races the
//! background loop.

use std::sync::Arc;

use rand::rngs::StdRng;
use tokio::sync::Mutex;

use validator_core::metrics::MetricsRegistry;
use validator_core::metadata::InMemoryMetadataStore;
use validator_core::orchestrator::{Step, ValidatorContext};

use crate::demo::{DemoChainClient, DemoMetagraph, DemoMinerFabric};

pub type EmbeddedContext = ValidatorContext<DemoChainClient, DemoMinerFabric, InMemoryMetadataStore>;

/// Shared state held by the API and the background step loop.
pub struct AppState {
    pub ctx: EmbeddedContext,
    pub metagraph: DemoMetagraph,
    pub step: Mutex<Step>,
    pub rng: Mutex<StdRng>,
    pub metrics: Arc<MetricsRegistry>,
}

pub type SharedState = Arc<AppState>;
