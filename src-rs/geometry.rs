use serde::Serialize;
use std::path::PathBuf;

pub const PLACEHOLDER_URL: &str = "https://";

#[derive(Debug, Clone, PartialEq)]
pub struct LinkOverlay {
    pub url: String,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub icon_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeometryRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl GeometryRect {
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

impl LinkOverlay {
    pub fn new(url: impl Into<String>, x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            url: url.into(),
            x,
            y,
            w,
            h,
            icon_path: None,
        }
    }

    pub fn with_icon(mut self, path: impl Into<PathBuf>) -> Self {
        self.icon_path = Some(path.into());
        self
    }

    pub fn is_placeholder(&self) -> bool {
        is_placeholder_url(&self.url)
    }
}

pub fn is_placeholder_url(url: &str) -> bool {
    let trimmed = url.trim();
    trimmed.is_empty() || trimmed == PLACEHOLDER_URL
}

pub fn compute_rect(overlay: &LinkOverlay, media_width: u32, media_height: u32) -> GeometryRect {
    let width = f64::from(media_width);
    let height = f64::from(media_height);
    let px_w = overlay.w * width;
    let px_h = overlay.h * height;
    let left = overlay.x * width - px_w / 2.0;
    let top = overlay.y * height - px_h / 2.0;
    GeometryRect {
        left,
        top,
        right: left + px_w,
        bottom: top + px_h,
    }
}

pub fn icon_target_size(overlay: &LinkOverlay, base_w: u32, base_h: u32) -> (u32, u32) {
    (
        scaled_extent(overlay.w, base_w),
        scaled_extent(overlay.h, base_h),
    )
}

fn scaled_extent(fraction: f64, span: u32) -> u32 {
    let px = (fraction * f64::from(span)).trunc();
    if px.is_finite() && px >= 1.0 {
        px.min(f64::from(u32::MAX)) as u32
    } else {
        1
    }
}

/// May be negative or past the canvas edge; blitting clips.
pub fn paste_origin(
    overlay: &LinkOverlay,
    target: (u32, u32),
    base_w: u32,
    base_h: u32,
) -> (i64, i64) {
    let cx = overlay.x * f64::from(base_w);
    let cy = overlay.y * f64::from(base_h);
    let px = (cx - f64::from(target.0) / 2.0).trunc() as i64;
    let py = (cy - f64::from(target.1) / 2.0).trunc() as i64;
    (px, py)
}
