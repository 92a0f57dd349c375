//! Off-screen canvas and rasterization.
//!
//! Layouts are written in CSS pixels; the canvas multiplies every
//! coordinate by the pixel scale of the export.

use std::io::Cursor;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{ImageFormat, Rgba, RgbaImage, imageops};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::ExportError;

/// Largest bitmap side, in device pixels, an export may allocate.
const MAX_BITMAP_SIDE: u32 = 1 << 15;

pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Parses `#rrggbb`.
pub const fn rgb(hex: u32) -> Rgba<u8> {
    Rgba([(hex >> 16) as u8, (hex >> 8) as u8, hex as u8, 255])
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    pub scale: f32,
    pub background: Rgba<u8>,
}

impl RenderOptions {
    /// Ticket documents and the grid image.
    pub const SHARP: RenderOptions = RenderOptions {
        scale: 2.0,
        background: WHITE,
    };
    /// Whole-view captures trade detail for size.
    pub const PAGE: RenderOptions = RenderOptions {
        scale: 1.5,
        background: WHITE,
    };
}

/// Something that can paint itself onto a canvas.
pub trait Scene {
    /// Width in CSS pixels.
    fn width(&self) -> f32;

    /// Paints the scene and returns the height it used, in CSS pixels.
    fn paint(&self, canvas: &mut Canvas<'_>) -> Result<f32, ExportError>;
}

pub fn load_font(path: &Path) -> Result<FontVec, ExportError> {
    let data = std::fs::read(path).map_err(|source| ExportError::FontIo {
        path: path.to_path_buf(),
        source,
    })?;
    FontVec::try_from_vec(data).map_err(|_| ExportError::FontInvalid {
        path: path.to_path_buf(),
    })
}

/// Paints `scene` off-screen in two passes: a measuring pass finds the
/// height the scene needs, then the scene is painted on a canvas of
/// exactly that size.
pub fn rasterize(
    scene: &dyn Scene,
    options: &RenderOptions,
    font: &FontVec,
) -> Result<RgbaImage, ExportError> {
    if !(options.scale.is_finite() && options.scale > 0.0) {
        return Err(ExportError::Render(format!("invalid pixel scale {}", options.scale)));
    }
    let width = scene.width();
    let height = scene.paint(&mut Canvas::measuring(options, font))?;

    let (px_width, px_height) = (canvas_len(width, options.scale), canvas_len(height, options.scale));
    if px_width == 0 || px_height == 0 {
        return Err(ExportError::Render("scene painted nothing".to_string()));
    }
    if px_width > MAX_BITMAP_SIDE || px_height > MAX_BITMAP_SIDE {
        return Err(ExportError::Render(format!(
            "scene of {px_width}x{px_height} px exceeds the {MAX_BITMAP_SIDE} px limit"
        )));
    }

    let mut canvas = Canvas::new(width, height, options, font);
    scene.paint(&mut canvas)?;
    Ok(canvas.into_image())
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ExportError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

fn canvas_len(css: f32, scale: f32) -> u32 {
    (css * scale).ceil().max(0.0) as u32
}

/// Drawing surface in CSS pixels. A measuring canvas has no bitmap: it
/// lays text out with the real font but draws nothing.
pub struct Canvas<'a> {
    image: Option<RgbaImage>,
    font: &'a FontVec,
    scale: f32,
}

impl<'a> Canvas<'a> {
    pub fn new(width: f32, height: f32, options: &RenderOptions, font: &'a FontVec) -> Self {
        let image = RgbaImage::from_pixel(
            canvas_len(width, options.scale).max(1),
            canvas_len(height, options.scale).max(1),
            options.background,
        );
        Self {
            image: Some(image),
            font,
            scale: options.scale,
        }
    }

    pub fn measuring(options: &RenderOptions, font: &'a FontVec) -> Self {
        Self {
            image: None,
            font,
            scale: options.scale,
        }
    }

    /// The painted bitmap; empty for a measuring canvas.
    pub fn into_image(self) -> RgbaImage {
        self.image.unwrap_or_else(|| RgbaImage::new(0, 0))
    }

    fn px(&self, css: f32) -> i32 {
        (css * self.scale).round() as i32
    }

    fn font_scale(&self, size: f32) -> PxScale {
        PxScale::from(size * self.scale)
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba<u8>) {
        let (w, h) = (canvas_len(w, self.scale), canvas_len(h, self.scale));
        if w == 0 || h == 0 {
            return;
        }
        let rect = Rect::at(self.px(x), self.px(y)).of_size(w, h);
        if let Some(image) = self.image.as_mut() {
            draw_filled_rect_mut(image, rect, color);
        }
    }

    pub fn stroke_rect(&mut self, x: f32, y: f32, w: f32, h: f32, line: f32, color: Rgba<u8>) {
        self.fill_rect(x, y, w, line, color);
        self.fill_rect(x, y + h - line, w, line, color);
        self.fill_rect(x, y, line, h, color);
        self.fill_rect(x + w - line, y, line, h, color);
    }

    pub fn dashed_rect(&mut self, x: f32, y: f32, w: f32, h: f32, line: f32, color: Rgba<u8>) {
        let dash = line * 3.0;
        let mut offset = 0.0;
        while offset < w {
            let len = dash.min(w - offset);
            self.fill_rect(x + offset, y, len, line, color);
            self.fill_rect(x + offset, y + h - line, len, line, color);
            offset += dash * 2.0;
        }
        let mut offset = 0.0;
        while offset < h {
            let len = dash.min(h - offset);
            self.fill_rect(x, y + offset, line, len, color);
            self.fill_rect(x + w - line, y + offset, line, len, color);
            offset += dash * 2.0;
        }
    }

    pub fn hline(&mut self, x: f32, y: f32, w: f32, color: Rgba<u8>) {
        self.fill_rect(x, y, w, 1.0, color);
    }

    /// Width of `text` at font `size`, in CSS pixels.
    pub fn text_width(&self, size: f32, text: &str) -> f32 {
        let (w, _) = text_size(self.font_scale(size), self.font, text);
        w as f32 / self.scale
    }

    pub fn text(&mut self, x: f32, y: f32, size: f32, color: Rgba<u8>, text: &str) {
        let (px, py, scale) = (self.px(x), self.px(y), self.font_scale(size));
        if let Some(image) = self.image.as_mut() {
            draw_text_mut(image, color, px, py, scale, self.font, text);
        }
    }

    pub fn text_centered(&mut self, center_x: f32, y: f32, size: f32, color: Rgba<u8>, text: &str) {
        let w = self.text_width(size, text);
        self.text(center_x - w / 2.0, y, size, color, text);
    }

    /// Word-wraps `text` into lines no wider than `max_width`, centers each
    /// line, and returns the height used.
    pub fn paragraph_centered(
        &mut self,
        center_x: f32,
        y: f32,
        max_width: f32,
        size: f32,
        color: Rgba<u8>,
        text: &str,
    ) -> f32 {
        let line_height = size * 1.4;
        let lines = self.wrap(size, max_width, text);
        for (i, line) in lines.iter().enumerate() {
            self.text_centered(center_x, y + i as f32 * line_height, size, color, line);
        }
        lines.len() as f32 * line_height
    }

    fn wrap(&self, size: f32, max_width: f32, text: &str) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current = String::new();
        for word in text.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if !current.is_empty() && self.text_width(size, &candidate) > max_width {
                lines.push(std::mem::replace(&mut current, word.to_string()));
            } else {
                current = candidate;
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
        lines
    }

    /// Draws `picture` scaled to fit inside the box, centered ("contain").
    pub fn picture_contained(&mut self, picture: &RgbaImage, x: f32, y: f32, w: f32, h: f32) {
        let (box_w, box_h) = (canvas_len(w, self.scale), canvas_len(h, self.scale));
        let empty = picture.width() == 0 || picture.height() == 0;
        if self.image.is_none() || empty || box_w == 0 || box_h == 0 {
            return;
        }
        let ratio = f64::min(
            f64::from(box_w) / f64::from(picture.width()),
            f64::from(box_h) / f64::from(picture.height()),
        );
        let fit_w = ((f64::from(picture.width()) * ratio).round() as u32).max(1);
        let fit_h = ((f64::from(picture.height()) * ratio).round() as u32).max(1);
        let fitted = imageops::resize(picture, fit_w, fit_h, imageops::FilterType::Triangle);
        let left = i64::from(self.px(x)) + i64::from((box_w - fit_w) / 2);
        let top = i64::from(self.px(y)) + i64::from((box_h - fit_h) / 2);
        if let Some(image) = self.image.as_mut() {
            imageops::overlay(image, &fitted, left, top);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors() {
        assert_eq!(rgb(0x1D4ED8), Rgba([0x1D, 0x4E, 0xD8, 255]));
        assert_eq!(rgb(0xFFFFFF), WHITE);
    }

    #[test]
    fn png_encoding_produces_png_signature() {
        let image = RgbaImage::from_pixel(3, 2, rgb(0x7E22CE));
        let bytes = encode_png(&image).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, image);
    }

    #[test]
    fn missing_font_is_reported() {
        let err = load_font(Path::new("/nonexistent/fonts/none.ttf")).unwrap_err();
        assert!(matches!(err, ExportError::FontIo { .. }));
    }

    #[test]
    fn garbage_font_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        assert!(matches!(load_font(&path), Err(ExportError::FontInvalid { .. })));
    }
}
