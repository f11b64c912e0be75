use crate::compositor::{compose_image_file, needs_composite, CompositeReport};
use crate::geometry::LinkOverlay;
use crate::media::MediaKind;
use crate::output::{run_id, scratch_path, PreparedMedia};
use crate::spec::ResolvedLink;
use crate::video::{prepare_icons, FfmpegTools, ScratchDir};
use anyhow::{bail, Context, Result};
use image::DynamicImage;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct PrepareOptions {
    pub out_dir: PathBuf,
    pub tools: FfmpegTools,
}

pub fn prepare_story_media(
    input: &Path,
    links: &[ResolvedLink],
    opts: &PrepareOptions,
) -> Result<(PreparedMedia, CompositeReport)> {
    if !input.exists() {
        bail!("input not found: {}", input.display());
    }
    let kind = MediaKind::from_path(input)?;
    let overlays: Vec<&LinkOverlay> = links.iter().map(|l| &l.overlay).collect();
    if !needs_composite(overlays.iter().copied()) {
        log::debug!("no icons to composite, using {}", input.display());
        return Ok((PreparedMedia::original(input, kind), CompositeReport::default()));
    }

    match kind {
        MediaKind::Image(_) => {
            let dest = scratch_path(&opts.out_dir, "composite", kind.output_suffix())?;
            let media = PreparedMedia::temporary(dest.clone(), kind);
            let report = compose_image_file(input, kind, overlays, &dest)
                .with_context(|| format!("failed to composite {}", input.display()))?;
            Ok((media, report))
        }
        MediaKind::Video => {
            let (frame_w, frame_h) = opts.tools.video_dimensions(input)?;
            let scratch = ScratchDir::create(opts.out_dir.join(format!("icons-{}", run_id())))?;
            let (placed, report) = prepare_icons(overlays, frame_w, frame_h, scratch.path())?;
            if placed.is_empty() {
                return Ok((PreparedMedia::original(input, kind), report));
            }
            let dest = scratch_path(&opts.out_dir, "composite", kind.output_suffix())?;
            let media = PreparedMedia::temporary(dest.clone(), kind);
            opts.tools
                .overlay_icons(input, &placed, &dest)
                .with_context(|| format!("failed to composite {}", input.display()))?;
            Ok((media, report))
        }
    }
}

pub fn media_dimensions(input: &Path, kind: MediaKind, tools: &FfmpegTools) -> Result<(u32, u32)> {
    match kind {
        MediaKind::Image(_) => image::image_dimensions(input)
            .with_context(|| format!("failed to read image header: {}", input.display())),
        MediaKind::Video => Ok(tools.video_dimensions(input)?),
    }
}

pub fn load_preview_frame(input: &Path, kind: MediaKind, opts: &PrepareOptions) -> Result<DynamicImage> {
    match kind {
        MediaKind::Image(_) => image::open(input)
            .with_context(|| format!("failed to open input image: {}", input.display())),
        MediaKind::Video => {
            let scratch = ScratchDir::create(opts.out_dir.join(format!("frame-{}", run_id())))?;
            let frame_path = scratch.path().join("frame.png");
            opts.tools.extract_first_frame(input, &frame_path)?;
            image::open(&frame_path)
                .with_context(|| format!("failed to read extracted frame: {}", frame_path.display()))
        }
    }
}
