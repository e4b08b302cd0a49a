//! Printer bridges: hand a finished print document to a physical printer.
//!
//! The core never talks to a printer directly. It asks a [`PrinterBridge`]
//! to resolve a target (or the host's default) and send one opaque blob.
//! Host faults come back verbatim; a missing host service is reported as
//! [`BridgeError::Unavailable`] so callers can tell "nobody answered" apart
//! from "the printer said no".

use std::net::Ipv6Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{info, instrument, warn};

use crate::config::{AppConfig, PrinterBackend};

/// Raw-socket port most label printers listen on.
pub const RAW_PRINT_PORT: u16 = 9100;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("print service unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Transmission(String),

    #[error("printer not found: {0}")]
    UnknownPrinter(String),

    #[error("no default printer configured on the print host")]
    NoDefaultPrinter,

    #[error("invalid printer configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeError {
    /// Short machine code recorded alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::Unavailable(_) => "PRINTER_UNAVAILABLE",
            BridgeError::Transmission(_) => "TRANSMISSION_FAILURE",
            BridgeError::UnknownPrinter(_) | BridgeError::NoDefaultPrinter => "PRINTER_NOT_FOUND",
            BridgeError::InvalidConfig(_) => "PRINTER_MISCONFIGURED",
        }
    }
}

/// A printer as the host print service describes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PrinterDevice {
    pub name: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub connection: String,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub manufacturer: String,
}

impl PrinterDevice {
    fn matches(&self, target: &str) -> bool {
        self.name == target || (!self.uid.is_empty() && self.uid == target)
    }
}

#[async_trait]
pub trait PrinterBridge: Send + Sync {
    /// Printers the host can currently reach.
    async fn discover(&self) -> Result<Vec<PrinterDevice>, BridgeError>;

    /// The host's default printer, if one is set.
    async fn default_printer(&self) -> Result<Option<PrinterDevice>, BridgeError>;

    /// Transmit `content` as one blob.
    async fn send(&self, device: &PrinterDevice, content: &str) -> Result<(), BridgeError>;

    /// Cheap liveness check for the health endpoint.
    async fn check(&self) -> Result<(), BridgeError> {
        self.discover().await.map(|_| ())
    }

    fn backend(&self) -> &'static str;

    /// Resolve `target` (or the default printer) and send. Returns the
    /// device that received the content.
    async fn print(
        &self,
        content: &str,
        target: Option<&str>,
    ) -> Result<PrinterDevice, BridgeError> {
        let device = match target {
            Some(name) => self
                .discover()
                .await?
                .into_iter()
                .find(|d| d.matches(name))
                .ok_or_else(|| BridgeError::UnknownPrinter(name.to_string()))?,
            None => self
                .default_printer()
                .await?
                .ok_or(BridgeError::NoDefaultPrinter)?,
        };

        self.send(&device, content).await?;
        Ok(device)
    }
}

/// Build the bridge selected by `PRINTER_BACKEND`.
pub fn build_bridge(config: &AppConfig) -> Result<Arc<dyn PrinterBridge>, BridgeError> {
    let timeout = Duration::from_secs(config.printer_timeout_secs);
    let bridge: Arc<dyn PrinterBridge> = match config.printer_backend {
        PrinterBackend::BrowserPrint => {
            Arc::new(BrowserPrintBridge::new(&config.browser_print_url, timeout)?)
        }
        PrinterBackend::Network => Arc::new(NetworkPrinterBridge::parse(
            config.network_printers.as_deref().unwrap_or_default(),
            timeout,
        )?),
        PrinterBackend::None => Arc::new(DisabledBridge),
    };
    Ok(bridge)
}

// ── Browser Print host service ──────────────────────────────────────

/// Zebra Browser Print style host agent, spoken to over local HTTP.
#[derive(Debug, Clone)]
pub struct BrowserPrintBridge {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct AvailableResponse {
    #[serde(default)]
    printer: Vec<PrinterDevice>,
}

#[derive(Debug, Serialize)]
struct WriteRequest<'a> {
    device: &'a PrinterDevice,
    data: &'a str,
}

impl BrowserPrintBridge {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| BridgeError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Connection-level failures mean the agent is not there at all.
fn request_error(e: reqwest::Error) -> BridgeError {
    if e.is_connect() || e.is_timeout() {
        BridgeError::Unavailable(e.to_string())
    } else {
        BridgeError::Transmission(e.to_string())
    }
}

async fn error_body(response: reqwest::Response) -> BridgeError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if body.trim().is_empty() {
        BridgeError::Transmission(format!("print host returned {status}"))
    } else {
        BridgeError::Transmission(body)
    }
}

#[async_trait]
impl PrinterBridge for BrowserPrintBridge {
    #[instrument(skip(self), fields(host = %self.base_url))]
    async fn discover(&self) -> Result<Vec<PrinterDevice>, BridgeError> {
        let response = self
            .client
            .get(self.url("/available"))
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(error_body(response).await);
        }

        let available: AvailableResponse = response.json().await.map_err(request_error)?;
        Ok(available.printer)
    }

    #[instrument(skip(self), fields(host = %self.base_url))]
    async fn default_printer(&self) -> Result<Option<PrinterDevice>, BridgeError> {
        let response = self
            .client
            .get(self.url("/default"))
            .query(&[("type", "printer")])
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(error_body(response).await);
        }

        // The agent answers with an empty body when no default is set.
        let body = response.text().await.map_err(request_error)?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| BridgeError::Transmission(format!("unreadable default printer: {e}")))
    }

    #[instrument(skip(self, content), fields(host = %self.base_url, printer = %device.name, bytes = content.len()))]
    async fn send(&self, device: &PrinterDevice, content: &str) -> Result<(), BridgeError> {
        let response = self
            .client
            .post(self.url("/write"))
            .json(&WriteRequest {
                device,
                data: content,
            })
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            let err = error_body(response).await;
            warn!(error = %err, "Print host rejected document");
            return Err(err);
        }

        info!("Document handed to print host");
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "browser_print"
    }
}

// ── Raw TCP printers ────────────────────────────────────────────────

/// Printers reached directly on their raw print port.
#[derive(Debug, Clone)]
pub struct NetworkPrinterBridge {
    printers: Vec<PrinterDevice>,
    timeout: Duration,
}

impl NetworkPrinterBridge {
    pub fn new(printers: Vec<PrinterDevice>, timeout: Duration) -> Self {
        Self { printers, timeout }
    }

    /// Parse `name=host[:port],...`. The first entry is the default printer.
    pub fn parse(list: &str, timeout: Duration) -> Result<Self, BridgeError> {
        let mut printers = Vec::new();
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, addr) = entry
                .split_once('=')
                .ok_or_else(|| BridgeError::InvalidConfig(format!("expected name=host:port, got '{entry}'")))?;
            let (name, addr) = (name.trim(), addr.trim());
            if name.is_empty() || addr.is_empty() {
                return Err(BridgeError::InvalidConfig(format!(
                    "expected name=host:port, got '{entry}'"
                )));
            }

            let connection = socket_addr(addr)?;

            printers.push(PrinterDevice {
                name: name.to_string(),
                uid: connection.clone(),
                connection,
                device_type: "printer".to_string(),
                provider: "network".to_string(),
                manufacturer: String::new(),
            });
        }
        Ok(Self::new(printers, timeout))
    }

    async fn connect(&self, addr: &str, timeout: Duration) -> Result<TcpStream, BridgeError> {
        tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| BridgeError::Unavailable(format!("connection timeout: {addr}")))?
            .map_err(|e| BridgeError::Unavailable(format!("{addr}: {e}")))
    }
}

/// `host`, `host:port`, `[v6]` or `[v6]:port`, defaulting to the raw print
/// port. A bare IPv6 literal is refused: its last group would read as a port.
fn socket_addr(addr: &str) -> Result<String, BridgeError> {
    let invalid_port = || BridgeError::InvalidConfig(format!("invalid port in '{addr}'"));

    if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| BridgeError::InvalidConfig(format!("unclosed '[' in '{addr}'")))?;
        if host.parse::<Ipv6Addr>().is_err() {
            return Err(BridgeError::InvalidConfig(format!(
                "invalid IPv6 address in '{addr}'"
            )));
        }
        return match tail {
            "" => Ok(format!("[{host}]:{RAW_PRINT_PORT}")),
            _ => match tail.strip_prefix(':').map(str::parse::<u16>) {
                Some(Ok(port)) => Ok(format!("[{host}]:{port}")),
                _ => Err(invalid_port()),
            },
        };
    }

    match addr.split(':').count() {
        1 => Ok(format!("{addr}:{RAW_PRINT_PORT}")),
        2 => match addr.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(addr.to_string())
            }
            _ => Err(invalid_port()),
        },
        _ => Err(BridgeError::InvalidConfig(format!(
            "IPv6 printer addresses must be written as [addr]:port, got '{addr}'"
        ))),
    }
}

#[async_trait]
impl PrinterBridge for NetworkPrinterBridge {
    async fn discover(&self) -> Result<Vec<PrinterDevice>, BridgeError> {
        Ok(self.printers.clone())
    }

    async fn default_printer(&self) -> Result<Option<PrinterDevice>, BridgeError> {
        Ok(self.printers.first().cloned())
    }

    #[instrument(skip(self, content), fields(addr = %device.connection, bytes = content.len()))]
    async fn send(&self, device: &PrinterDevice, content: &str) -> Result<(), BridgeError> {
        info!("Connecting to printer");
        let mut stream = self.connect(&device.connection, self.timeout).await?;

        stream
            .write_all(content.as_bytes())
            .await
            .map_err(|e| BridgeError::Transmission(format!("write failed: {e}")))?;
        stream
            .flush()
            .await
            .map_err(|e| BridgeError::Transmission(format!("flush failed: {e}")))?;

        info!("Document sent");
        Ok(())
    }

    async fn check(&self) -> Result<(), BridgeError> {
        let device = self
            .printers
            .first()
            .ok_or(BridgeError::NoDefaultPrinter)?;
        self.connect(&device.connection, Duration::from_millis(500))
            .await
            .map(|_| ())
    }

    fn backend(&self) -> &'static str {
        "network"
    }
}

// ── No print service ────────────────────────────────────────────────

/// Used when no print service is configured: every call fails closed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledBridge;

const DISABLED: &str = "no print service configured";

#[async_trait]
impl PrinterBridge for DisabledBridge {
    async fn discover(&self) -> Result<Vec<PrinterDevice>, BridgeError> {
        Err(BridgeError::Unavailable(DISABLED.to_string()))
    }

    async fn default_printer(&self) -> Result<Option<PrinterDevice>, BridgeError> {
        Err(BridgeError::Unavailable(DISABLED.to_string()))
    }

    async fn send(&self, _device: &PrinterDevice, _content: &str) -> Result<(), BridgeError> {
        Err(BridgeError::Unavailable(DISABLED.to_string()))
    }

    fn backend(&self) -> &'static str {
        "none"
    }
}
