use crate::server::outputs::OutputStore;
use promptwave::MusicGenerator;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The loaded model. One generation holds the lock at a time.
pub type SharedGenerator = Arc<Mutex<Box<dyn MusicGenerator>>>;

#[derive(Clone)]
pub struct AppState {
    pub generator: SharedGenerator,
    pub outputs: OutputStore,
}

impl AppState {
    pub fn new(generator: Box<dyn MusicGenerator>, outputs: OutputStore) -> Self {
        Self {
            generator: Arc::new(Mutex::new(generator)),
            outputs,
        }
    }
}
