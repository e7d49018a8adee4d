use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::relay::RelayHandle;

/// Shared state handed to every request handler
pub struct AppState {
    pub config: Arc<Config>,
    pub relay: RelayHandle,
    /// Cancelled when the server stops; open relay connections then close
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Arc<Config>, relay: RelayHandle, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self { config, relay, shutdown })
    }
}
