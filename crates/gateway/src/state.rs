use std::{sync::Arc, time::Instant};

#[cfg(feature = "metrics")]
use sigline_metrics::MetricsHandle;

use sigline_mcp::SessionRouter;

/// Everything the HTTP handlers share.
pub struct GatewayState {
    pub router: Arc<SessionRouter>,
    pub version: String,
    pub started_at: Instant,
    #[cfg(feature = "metrics")]
    pub metrics_handle: Option<MetricsHandle>,
}

impl GatewayState {
    pub fn new(router: Arc<SessionRouter>) -> Arc<Self> {
        Arc::new(Self {
            router,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
            #[cfg(feature = "metrics")]
            metrics_handle: None,
        })
    }

    #[cfg(feature = "metrics")]
    pub fn with_metrics(router: Arc<SessionRouter>, metrics_handle: MetricsHandle) -> Arc<Self> {
        Arc::new(Self {
            router,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
            metrics_handle: Some(metrics_handle),
        })
    }

    pub fn session_count(&self) -> usize {
        self.router.session_count()
    }
}
