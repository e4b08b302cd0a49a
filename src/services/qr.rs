use std::io::Cursor;

use image::{imageops, DynamicImage, GrayImage, ImageFormat, Luma};
use qrcode::types::QrError;
use qrcode::QrCode;

pub const DEFAULT_IMAGE_WIDTH: u32 = 128;

/// Modules of white border around the symbol.
const MARGIN_MODULES: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("payload cannot be encoded: {0}")]
    Payload(#[from] QrError),

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Turns a payload string into image bytes.
pub trait CodeRenderer: Send + Sync {
    fn render(&self, payload: &str) -> Result<Vec<u8>, RenderError>;

    /// Media type of the bytes `render` produces.
    fn content_type(&self) -> &'static str;
}

/// Square PNG QR codes of a fixed pixel width.
#[derive(Debug, Clone)]
pub struct PngQrRenderer {
    width: u32,
}

impl Default for PngQrRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_WIDTH)
    }
}

impl PngQrRenderer {
    pub fn new(width: u32) -> Self {
        Self {
            width: width.max(1),
        }
    }

    fn rasterize(&self, payload: &str) -> Result<GrayImage, QrError> {
        let code = QrCode::new(payload.as_bytes())?;
        let modules = code.width() as u32 + 2 * MARGIN_MODULES;
        let scale = (self.width / modules).max(1);

        let symbol = code
            .render::<Luma<u8>>()
            .quiet_zone(false)
            .module_dimensions(scale, scale)
            .build();

        // Dense payloads can outgrow the requested width at one pixel per
        // module; the canvas grows with them rather than clipping the symbol.
        let side = self.width.max(modules * scale);
        let mut canvas = GrayImage::from_pixel(side, side, Luma([255]));
        let offset = i64::from((side - symbol.width()) / 2);
        imageops::overlay(&mut canvas, &symbol, offset, offset);
        Ok(canvas)
    }
}

impl CodeRenderer for PngQrRenderer {
    fn render(&self, payload: &str) -> Result<Vec<u8>, RenderError> {
        let canvas = self.rasterize(payload)?;
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(canvas).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    fn content_type(&self) -> &'static str {
        "image/png"
    }
}

/// Render two payloads; each result stands on its own.
pub fn render_pair(
    renderer: &dyn CodeRenderer,
    first: &str,
    second: &str,
) -> (Result<Vec<u8>, RenderError>, Result<Vec<u8>, RenderError>) {
    let a = renderer.render(first);
    if let Err(e) = &a {
        tracing::warn!(error = %e, "First code failed to render");
    }
    let b = renderer.render(second);
    if let Err(e) = &b {
        tracing::warn!(error = %e, "Second code failed to render");
    }
    (a, b)
}
