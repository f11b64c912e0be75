use crate::error::{OverlayError, Result};
use crate::geometry::{icon_target_size, paste_origin, LinkOverlay};
use crate::media::MediaKind;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedOverlay {
    pub url: String,
    pub icon_path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompositeReport {
    pub applied: usize,
    pub skipped: Vec<SkippedOverlay>,
}

impl CompositeReport {
    pub fn record_skip(&mut self, overlay: &LinkOverlay, err: &OverlayError) {
        let icon_path = overlay.icon_path.clone().unwrap_or_default();
        log::warn!("skipping icon for {}: {err}", overlay.url);
        self.skipped.push(SkippedOverlay {
            url: overlay.url.clone(),
            icon_path,
            reason: err.to_string(),
        });
    }
}

pub fn needs_composite<'a>(overlays: impl IntoIterator<Item = &'a LinkOverlay>) -> bool {
    overlays
        .into_iter()
        .any(|o| !o.is_placeholder() && o.icon_path.is_some())
}

pub fn load_icon(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|e| OverlayError::IconLoadFailure {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// The target may not exceed the canvas.
pub fn resize_icon(
    icon: &DynamicImage,
    overlay: &LinkOverlay,
    base_w: u32,
    base_h: u32,
) -> Result<RgbaImage> {
    let (tw, th) = icon_target_size(overlay, base_w, base_h);
    if tw > base_w.max(1) || th > base_h.max(1) {
        return Err(OverlayError::IconLoadFailure {
            path: overlay.icon_path.clone().unwrap_or_default(),
            reason: format!("icon size {tw}x{th} exceeds the {base_w}x{base_h} canvas"),
        });
    }
    Ok(imageops::resize(&icon.to_rgba8(), tw, th, FilterType::Lanczos3))
}

pub fn composite_icon(base: &mut RgbaImage, icon: &DynamicImage, overlay: &LinkOverlay) -> Result<()> {
    let (base_w, base_h) = base.dimensions();
    let resized = resize_icon(icon, overlay, base_w, base_h)?;
    let origin = paste_origin(overlay, resized.dimensions(), base_w, base_h);
    blit_over(base, &resized, origin);
    Ok(())
}

pub fn composite_icons<'a>(
    base: &mut RgbaImage,
    overlays: impl IntoIterator<Item = &'a LinkOverlay>,
) -> CompositeReport {
    let mut report = CompositeReport::default();
    for overlay in overlays {
        if overlay.is_placeholder() {
            continue;
        }
        let Some(icon_path) = overlay.icon_path.as_deref() else {
            continue;
        };
        match load_icon(icon_path).and_then(|icon| composite_icon(base, &icon, overlay)) {
            Ok(()) => report.applied += 1,
            Err(err) => report.record_skip(overlay, &err),
        }
    }
    report
}

pub fn compose_image_file<'a>(
    input: &Path,
    kind: MediaKind,
    overlays: impl IntoIterator<Item = &'a LinkOverlay>,
    dest: &Path,
) -> Result<CompositeReport> {
    let MediaKind::Image(format) = kind else {
        return Err(OverlayError::UnsupportedFormat(format!(
            "{} is not a still image",
            input.display()
        )));
    };
    let base = image::open(input).map_err(|source| OverlayError::Decode {
        path: input.to_path_buf(),
        source,
    })?;
    let mut canvas = base.to_rgba8();
    let report = composite_icons(&mut canvas, overlays);

    let out = if kind.keeps_alpha() {
        DynamicImage::ImageRgba8(canvas)
    } else {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8())
    };
    out.save_with_format(dest, format)
        .map_err(|source| OverlayError::Encode {
            path: dest.to_path_buf(),
            source,
        })?;
    Ok(report)
}

fn blit_over(base: &mut RgbaImage, src: &RgbaImage, origin: (i64, i64)) {
    let (base_w, base_h) = (i64::from(base.width()), i64::from(base.height()));
    let (ox, oy) = origin;
    let x_start = ox.max(0);
    let y_start = oy.max(0);
    let x_end = (ox + i64::from(src.width())).min(base_w);
    let y_end = (oy + i64::from(src.height())).min(base_h);
    for y in y_start..y_end {
        for x in x_start..x_end {
            let src_px = *src.get_pixel((x - ox) as u32, (y - oy) as u32);
            let dst = *base.get_pixel(x as u32, y as u32);
            base.put_pixel(x as u32, y as u32, blend_pixel(dst, src_px));
        }
    }
}

/// Porter-Duff "over" of `src` onto `dst`, straight (non-premultiplied) alpha.
pub(crate) fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = f64::from(src[3]) / 255.0;
    if sa <= 0.0 {
        return dst;
    }
    if sa >= 1.0 {
        return src;
    }
    let da = f64::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let channel = |i: usize| {
        ((f64::from(src[i]) * sa + f64::from(dst[i]) * da * (1.0 - sa)) / out_a)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    Rgba([
        channel(0),
        channel(1),
        channel(2),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}
