use nw_core::ArticleStore;
use nw_ingest::IngestionRunner;
use std::sync::Arc;

pub struct AppState {
    pub store: Arc<dyn ArticleStore>,
    pub runner: Arc<IngestionRunner>,
}

impl AppState {
    pub fn new(store: Arc<dyn ArticleStore>, runner: Arc<IngestionRunner>) -> Self {
        Self { store, runner }
    }
}
