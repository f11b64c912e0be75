use crate::compositor::blend_pixel;
use crate::geometry::{compute_rect, GeometryRect};
use crate::spec::ResolvedLink;
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{DynamicImage, Rgba, RgbaImage};

pub const DEFAULT_PREVIEW_MAX: (u32, u32) = (320, 220);

const OUTLINE: Rgba<u8> = Rgba([255, 0, 0, 255]);
const OUTLINE_WIDTH: u32 = 2;

pub fn render_preview(base: &DynamicImage, links: &[ResolvedLink], max: (u32, u32)) -> RgbaImage {
    let (max_w, max_h) = (max.0.max(1), max.1.max(1));
    let mut preview = if base.width() > max_w || base.height() > max_h {
        base.thumbnail(max_w, max_h).to_rgba8()
    } else {
        base.to_rgba8()
    };
    let (w, h) = preview.dimensions();

    for link in links {
        if link.overlay.is_placeholder() {
            continue;
        }
        let rect = compute_rect(&link.overlay, w, h);
        draw_rect_outline(&mut preview, &rect, OUTLINE, OUTLINE_WIDTH);
        draw_bitmap_text(
            &mut preview,
            (rect.left.round() as i64).saturating_add(3),
            (rect.top.round() as i64).saturating_add(3),
            &link.index.to_string(),
            OUTLINE,
        );
    }
    preview
}

fn draw_rect_outline(img: &mut RgbaImage, rect: &GeometryRect, color: Rgba<u8>, thickness: u32) {
    let thickness = i64::from(thickness.max(1));
    // edges further out than `thickness` past the border never reach a visible pixel
    let clamp_x = |v: f64| (v.round() as i64).clamp(-thickness, i64::from(img.width()) + thickness);
    let clamp_y = |v: f64| (v.round() as i64).clamp(-thickness, i64::from(img.height()) + thickness);
    let (x0, x1) = (clamp_x(rect.left), clamp_x(rect.right));
    let (y0, y1) = (clamp_y(rect.top), clamp_y(rect.bottom));
    if x1 <= x0 || y1 <= y0 {
        return;
    }
    for t in 0..thickness {
        let (lx, rx) = (x0 + t, x1 - t);
        let (ty, by) = (y0 + t, y1 - t);
        if rx < lx || by < ty {
            break;
        }
        for x in lx..=rx {
            put_clipped(img, x, ty, color);
            put_clipped(img, x, by, color);
        }
        for y in ty..=by {
            put_clipped(img, lx, y, color);
            put_clipped(img, rx, y, color);
        }
    }
}

fn put_clipped(img: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x >= 0 && y >= 0 && x < i64::from(img.width()) && y < i64::from(img.height()) {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_bitmap_text(img: &mut RgbaImage, x: i64, y: i64, text: &str, color: Rgba<u8>) {
    let mut cursor_x = x;
    for ch in text.chars() {
        let Some(glyph) = BASIC_FONTS.get(ch) else {
            cursor_x += 8;
            continue;
        };
        for (row_idx, row) in glyph.iter().enumerate() {
            for col_idx in 0..8 {
                if (*row >> col_idx) & 1 == 0 {
                    continue;
                }
                let tx = cursor_x + col_idx;
                let ty = y + row_idx as i64;
                if tx >= 0 && ty >= 0 && tx < i64::from(img.width()) && ty < i64::from(img.height()) {
                    let dst = *img.get_pixel(tx as u32, ty as u32);
                    img.put_pixel(tx as u32, ty as u32, blend_pixel(dst, color));
                }
            }
        }
        cursor_x += 8;
    }
}
