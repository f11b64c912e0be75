use crate::error::{OverlayError, Result};
use image::ImageFormat;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image(ImageFormat),
    Video,
}

impl MediaKind {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "jpg" | "jpeg" => Ok(MediaKind::Image(ImageFormat::Jpeg)),
            "png" => Ok(MediaKind::Image(ImageFormat::Png)),
            "webp" => Ok(MediaKind::Image(ImageFormat::WebP)),
            "mp4" => Ok(MediaKind::Video),
            "" => Err(OverlayError::UnsupportedFormat(format!(
                "{} has no extension",
                path.display()
            ))),
            other => Err(OverlayError::UnsupportedFormat(format!(".{other}"))),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::Image(_) => "image",
            MediaKind::Video => "video",
        }
    }

    pub fn output_suffix(&self) -> &'static str {
        match self {
            MediaKind::Image(ImageFormat::Jpeg) => "jpg",
            MediaKind::Image(ImageFormat::WebP) => "webp",
            MediaKind::Image(_) => "png",
            MediaKind::Video => "mp4",
        }
    }

    pub fn keeps_alpha(&self) -> bool {
        !matches!(self, MediaKind::Image(ImageFormat::Jpeg) | MediaKind::Video)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_kinds_case_insensitively() {
        assert_eq!(
            MediaKind::from_path(Path::new("a/b/Story.JPEG")).unwrap(),
            MediaKind::Image(ImageFormat::Jpeg)
        );
        assert_eq!(
            MediaKind::from_path(Path::new("x.png")).unwrap(),
            MediaKind::Image(ImageFormat::Png)
        );
        assert_eq!(MediaKind::from_path(Path::new("clip.Mp4")).unwrap(), MediaKind::Video);
    }

    #[test]
    fn rejects_unknown_extensions() {
        let err = MediaKind::from_path(Path::new("movie.mov")).unwrap_err();
        assert!(matches!(err, OverlayError::UnsupportedFormat(ref s) if s == ".mov"));
        assert!(MediaKind::from_path(Path::new("README")).is_err());
    }

    #[test]
    fn jpeg_outputs_drop_alpha() {
        let jpeg = MediaKind::Image(ImageFormat::Jpeg);
        assert_eq!(jpeg.output_suffix(), "jpg");
        assert!(!jpeg.keeps_alpha());
        assert!(MediaKind::Image(ImageFormat::Png).keeps_alpha());
    }
}
