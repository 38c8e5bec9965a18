use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use shared::DetectionBox;
use std::path::Path;

use crate::error::AnalysisError;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_THICKNESS: u32 = 2;
const TEXT_MARGIN: i32 = 4;

/// Draws detection boxes and their captions onto a copy of the scan.
pub struct Annotator {
    font: Option<FontVec>,
    scale: PxScale,
}

impl Annotator {
    pub fn new(font: Option<FontVec>, font_scale: f32) -> Self {
        Self {
            font,
            scale: PxScale::from(font_scale),
        }
    }

    /// Falls back to box-only output when the font cannot be read.
    pub fn from_font_file(path: &Path, font_scale: f32) -> Self {
        let font = match std::fs::read(path) {
            Ok(bytes) => match FontVec::try_from_vec(bytes) {
                Ok(font) => Some(font),
                Err(e) => {
                    log::warn!("Invalid caption font {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!(
                    "Caption font {} unavailable ({}), boxes will be drawn without labels",
                    path.display(),
                    e
                );
                None
            }
        };
        Self::new(font, font_scale)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn annotate(&self, raster: &RgbImage, detections: &[DetectionBox]) -> RgbImage {
        let mut canvas = raster.clone();
        for detection in detections {
            if detection.area() <= 0.0 {
                log::debug!("Skipping degenerate detection: {:?}", detection);
                continue;
            }
            let Some(rect) = clamp_to_canvas(detection, canvas.width(), canvas.height()) else {
                log::debug!("Skipping detection outside the image: {:?}", detection);
                continue;
            };
            draw_box(&mut canvas, rect);
            if let Some(font) = &self.font {
                self.draw_caption(&mut canvas, font, rect, &detection.caption());
            }
        }
        canvas
    }

    fn draw_caption(&self, canvas: &mut RgbImage, font: &FontVec, rect: Rect, caption: &str) {
        let (_, text_height) = text_size(self.scale, font, caption);
        let above = rect.top() - text_height as i32 - TEXT_MARGIN;
        // Boxes touching the top edge get their caption inside the box.
        let y = if above >= 0 { above } else { rect.top() + TEXT_MARGIN };
        draw_text_mut(canvas, TEXT_COLOR, rect.left(), y, self.scale, font, caption);
    }
}

/// Clamps a box to the canvas; `None` if nothing drawable remains.
fn clamp_to_canvas(detection: &DetectionBox, width: u32, height: u32) -> Option<Rect> {
    if width == 0 || height == 0 {
        return None;
    }
    let max_x = (width - 1) as f32;
    let max_y = (height - 1) as f32;
    let x1 = detection.x1.clamp(0.0, max_x).round() as i32;
    let y1 = detection.y1.clamp(0.0, max_y).round() as i32;
    let x2 = detection.x2.clamp(0.0, max_x).round() as i32;
    let y2 = detection.y2.clamp(0.0, max_y).round() as i32;
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(Rect::at(x1, y1).of_size((x2 - x1 + 1) as u32, (y2 - y1 + 1) as u32))
}

fn draw_box(canvas: &mut RgbImage, rect: Rect) {
    for inset in 0..BOX_THICKNESS {
        let width = rect.width().saturating_sub(2 * inset);
        let height = rect.height().saturating_sub(2 * inset);
        if width == 0 || height == 0 {
            break;
        }
        let inner = Rect::at(rect.left() + inset as i32, rect.top() + inset as i32).of_size(width, height);
        draw_hollow_rect_mut(canvas, inner, BOX_COLOR);
    }
}

pub fn encode_jpeg(raster: &RgbImage, quality: u8) -> Result<Vec<u8>, AnalysisError> {
    let mut bytes = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, quality);
    raster
        .write_with_encoder(encoder)
        .map_err(|e| AnalysisError::Encode(e.to_string()))?;
    Ok(bytes)
}
