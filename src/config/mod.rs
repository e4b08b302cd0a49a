use serde::Deserialize;

use crate::models::job::DEFAULT_MAX_RETRIES;
use crate::services::identity::DEFAULT_BASE_URL;
use crate::services::qr::DEFAULT_IMAGE_WIDTH;

/// Where print documents go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrinterBackend {
    /// Local Browser Print agent over HTTP.
    #[default]
    BrowserPrint,
    /// Raw TCP to the printers in `NETWORK_PRINTERS`.
    Network,
    /// Printing disabled; every attempt fails as unavailable.
    None,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:8080")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string. Unset runs on the in-memory store.
    #[serde(default)]
    pub database_url: Option<String>,

    /// HS256 secret shared with the login service
    pub jwt_secret: String,

    #[serde(default)]
    pub printer_backend: PrinterBackend,

    /// Browser Print agent base URL
    #[serde(default = "default_browser_print_url")]
    pub browser_print_url: String,

    /// `name=host[:port],...` for the network backend
    #[serde(default)]
    pub network_printers: Option<String>,

    #[serde(default = "default_printer_timeout_secs")]
    pub printer_timeout_secs: u64,

    /// Base of the traceability URL encoded in the upper QR code
    #[serde(default = "default_qr_base_url")]
    pub qr_base_url: String,

    /// Pixel width of rendered QR images
    #[serde(default = "default_qr_image_width")]
    pub qr_image_width: u32,

    #[serde(default = "default_print_max_retries")]
    pub print_max_retries: i32,

    /// Largest accepted upload batch
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_browser_print_url() -> String {
    "http://127.0.0.1:9100".to_string()
}

fn default_printer_timeout_secs() -> u64 {
    5
}

fn default_qr_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_qr_image_width() -> u32 {
    DEFAULT_IMAGE_WIDTH
}

fn default_print_max_retries() -> i32 {
    DEFAULT_MAX_RETRIES
}

fn default_max_batch_size() -> usize {
    1000
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Defaults for everything but the secret. Used by tests and tooling.
    pub fn with_secret(jwt_secret: &str) -> Self {
        Self {
            bind_addr: default_bind_addr(),
            database_url: None,
            jwt_secret: jwt_secret.to_string(),
            printer_backend: PrinterBackend::None,
            browser_print_url: default_browser_print_url(),
            network_printers: None,
            printer_timeout_secs: default_printer_timeout_secs(),
            qr_base_url: default_qr_base_url(),
            qr_image_width: default_qr_image_width(),
            print_max_retries: default_print_max_retries(),
            max_batch_size: default_max_batch_size(),
        }
    }
}
