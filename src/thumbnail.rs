use eframe::egui::ColorImage;
use image::imageops::FilterType;
use thiserror::Error;

/// Bounding box of the preview area
pub const PREVIEW_WIDTH: u32 = 320;
pub const PREVIEW_HEIGHT: u32 = 180;

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("thumbnail request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("thumbnail could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
}

/// Downloads a thumbnail and prepares it for display. Blocking; run it off the UI thread.
pub fn fetch_thumbnail(url: &str) -> Result<ColorImage, PreviewError> {
    // Perform a blocking HTTP GET request
    let bytes = reqwest::blocking::get(url)?.error_for_status()?.bytes()?;
    decode_preview(&bytes)
}

/// Decodes image bytes and scales them to fit the preview box, keeping the aspect ratio.
pub fn decode_preview(bytes: &[u8]) -> Result<ColorImage, PreviewError> {
    let img = image::load_from_memory(bytes)?
        .resize(PREVIEW_WIDTH, PREVIEW_HEIGHT, FilterType::Triangle)
        .to_rgba8();
    let size = [img.width() as usize, img.height() as usize];
    Ok(ColorImage::from_rgba_unmultiplied(size, &img))
}
