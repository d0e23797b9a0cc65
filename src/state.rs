use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::services::llm::LlmClient;
use crate::services::sessions::TutorService;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    tutor: Arc<TutorService>,
    llm: Arc<LlmClient>,
    config: Arc<Config>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        llm: Arc<LlmClient>,
        config: &Config,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        let tutor = Arc::new(TutorService::new(
            store.clone(),
            llm.clone(),
            config.adaptive.clone(),
        ));
        Self {
            store,
            tutor,
            llm,
            config: Arc::new(config.clone()),
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn tutor(&self) -> &TutorService {
        &self.tutor
    }

    pub fn llm(&self) -> &Arc<LlmClient> {
        &self.llm
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shutdown_rx(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
