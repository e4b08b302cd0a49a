use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::audit::{AuditLog, AuditStore};
use crate::services::identity::IdentityEncoder;
use crate::services::print_jobs::PrintOrchestrator;
use crate::services::printer::PrinterBridge;
use crate::services::qr::{CodeRenderer, PngQrRenderer};
use crate::services::store::{JobStore, LabelStore};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub labels: Arc<dyn LabelStore>,
    pub printing: Arc<PrintOrchestrator>,
    pub encoder: Arc<IdentityEncoder>,
    pub renderer: Arc<dyn CodeRenderer>,
    pub audit: Arc<AuditLog>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        labels: Arc<dyn LabelStore>,
        jobs: Arc<dyn JobStore>,
        audit: Arc<dyn AuditStore>,
        bridge: Arc<dyn PrinterBridge>,
    ) -> Self {
        let encoder = IdentityEncoder::new(&config.qr_base_url);
        let printing = PrintOrchestrator::new(
            labels.clone(),
            jobs,
            bridge,
            encoder.clone(),
            config.print_max_retries,
        );
        let renderer = PngQrRenderer::new(config.qr_image_width);

        Self {
            config: Arc::new(config),
            labels,
            printing: Arc::new(printing),
            encoder: Arc::new(encoder),
            renderer: Arc::new(renderer),
            audit: Arc::new(AuditLog::new(audit)),
        }
    }

    pub fn bridge(&self) -> &Arc<dyn PrinterBridge> {
        self.printing.bridge()
    }
}
