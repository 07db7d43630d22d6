use std::sync::{Arc, Mutex};

use payrail_store::FileDurableStore;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<FileDurableStore>,
    pub http: reqwest::Client,
    pub rng: Arc<Mutex<StdRng>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let store = Arc::new(FileDurableStore::new(config.data_dir.clone()));
        let rng = Arc::new(Mutex::new(StdRng::seed_from_u64(config.seed)));
        Self {
            config: Arc::new(config),
            store,
            http: reqwest::Client::new(),
            rng,
        }
    }
}
