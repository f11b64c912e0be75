mod compositor;
mod error;
mod geometry;
mod media;
mod output;
mod prepare;
mod preview;
mod spec;
mod video;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use error::OverlayError;
use geometry::compute_rect;
use image::DynamicImage;
use log::LevelFilter;
use media::MediaKind;
use output::{abs_path, ensure_parent_dir, out_root, scratch_path, timestamp_iso, write_json_pretty};
use prepare::{load_preview_frame, media_dimensions, prepare_story_media, PrepareOptions};
use preview::{render_preview, DEFAULT_PREVIEW_MAX};
use serde_json::{json, Value};
use spec::{load_spec, story_links, SPEC_HELP};
use std::path::PathBuf;
use video::{FfmpegTools, DEFAULT_TIMEOUT_SEC};

#[derive(Parser, Debug)]
#[command(
    name = "story-overlay",
    version,
    about = "Prepare story media: link-sticker geometry, previews, and icon compositing"
)]
struct Cli {
    /// Timeout for each ffmpeg/ffprobe invocation, in seconds
    #[arg(long, global = true, default_value_t = DEFAULT_TIMEOUT_SEC)]
    timeout_sec: u64,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[allow(clippy::enum_variant_names)]
enum Commands {
    /// Print supported commands in JSON
    Commands,
    /// Print the overlay spec schema
    #[command(name = "spec-help")]
    SpecHelp,
    /// Print pixel rects for every link on the given media
    Rects(RectsArgs),
    /// Print the link-sticker payload for the uploader
    Links(LinksArgs),
    /// Render a thumbnail with link outlines
    Preview(PreviewArgs),
    /// Composite link icons onto an image or MP4
    Compose(ComposeArgs),
}

#[derive(Args, Debug)]
struct RectsArgs {
    /// Input media path (used for its dimensions)
    input: Option<PathBuf>,
    /// JSON spec file path (or - for stdin)
    #[arg(long)]
    spec: String,
    /// Media width in pixels, instead of reading the input
    #[arg(long, requires = "height")]
    width: Option<u32>,
    /// Media height in pixels, instead of reading the input
    #[arg(long, requires = "width")]
    height: Option<u32>,
}

#[derive(Args, Debug)]
struct LinksArgs {
    /// JSON spec file path (or - for stdin)
    #[arg(long)]
    spec: String,
}

#[derive(Args, Debug)]
struct PreviewArgs {
    /// Input image or MP4 path
    input: PathBuf,
    /// Output PNG path
    output: PathBuf,
    /// JSON spec file path (or - for stdin)
    #[arg(long)]
    spec: String,
    #[arg(long, default_value_t = DEFAULT_PREVIEW_MAX.0)]
    max_width: u32,
    #[arg(long, default_value_t = DEFAULT_PREVIEW_MAX.1)]
    max_height: u32,
}

#[derive(Args, Debug)]
struct ComposeArgs {
    /// Input image or MP4 path
    input: PathBuf,
    /// JSON spec file path (or - for stdin)
    #[arg(long)]
    spec: String,
    /// Output path (default: a fresh file under the output root)
    #[arg(long)]
    out: Option<PathBuf>,
    /// Path to write the compose report sidecar
    #[arg(long)]
    meta_out: Option<PathBuf>,
    /// Print the compose report JSON to stdout
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

fn main() {
    setup_logger();
    if let Err(err) = run() {
        if let Some(overlay_err) = err.downcast_ref::<OverlayError>() {
            log::debug!("failed with {}", overlay_err.kind());
        }
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn setup_logger() {
    let mut builder = env_logger::Builder::new();
    if std::env::var("RUST_LOG").is_ok() {
        builder.parse_env("RUST_LOG");
    } else if cfg!(debug_assertions) {
        builder.filter(None, LevelFilter::Warn);
        builder.filter(Some("story_overlay"), LevelFilter::Debug);
    } else {
        builder.filter(None, LevelFilter::Warn);
    }
    builder.format_timestamp(None).init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let opts = PrepareOptions {
        out_dir: out_root(),
        tools: FfmpegTools::from_env(cli.timeout_sec),
    };

    match cli.command {
        Commands::Commands => print_commands(),
        Commands::SpecHelp => {
            println!("{}", SPEC_HELP.trim());
            Ok(())
        }
        Commands::Rects(args) => print_json(&rects_payload(&args, &opts.tools)?),
        Commands::Links(args) => print_json(&links_payload(&args)?),
        Commands::Preview(args) => {
            let saved = render_preview_file(&args, &opts)?;
            println!("{}", saved.display());
            Ok(())
        }
        Commands::Compose(args) => {
            let payload = compose_media(&args, &opts)?;
            if args.json {
                print_json(&payload)
            } else {
                println!("{}", payload["media_path"].as_str().unwrap_or_default());
                Ok(())
            }
        }
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_commands() -> Result<()> {
    let rows = vec![
        json!({
            "name": "rects",
            "description": "Compute pixel bounding boxes for link stickers on a media file.",
        }),
        json!({
            "name": "links",
            "description": "Emit the link-sticker payload, skipping placeholder rows.",
        }),
        json!({
            "name": "preview",
            "description": "Render a thumbnail with red outlines for every link.",
        }),
        json!({
            "name": "compose",
            "description": "Burn link icons into an image or MP4 and report skipped icons.",
        }),
        json!({
            "name": "spec-help",
            "description": "Print the overlay spec schema.",
        }),
    ];

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "commands": rows }))?
    );
    Ok(())
}

fn rects_payload(args: &RectsArgs, tools: &FfmpegTools) -> Result<Value> {
    let spec = load_spec(&args.spec)?;
    let links = spec.resolve_strict()?;

    let (width, height) = match (args.width, args.height, args.input.as_deref()) {
        (Some(w), Some(h), _) => (w, h),
        (_, _, Some(input)) => {
            if !input.exists() {
                bail!("input not found: {}", input.display());
            }
            media_dimensions(input, MediaKind::from_path(input)?, tools)?
        }
        _ => bail!("either an input path or --width/--height is required"),
    };

    let rects: Vec<Value> = links
        .iter()
        .map(|link| {
            let rect = compute_rect(&link.overlay, width, height);
            json!({
                "index": link.index,
                "url": link.overlay.url,
                "rect": rect,
                "width": rect.width(),
                "height": rect.height(),
            })
        })
        .collect();

    Ok(json!({
        "size": {"width": width, "height": height, "units": "px"},
        "rects": rects,
    }))
}

fn links_payload(args: &LinksArgs) -> Result<Value> {
    let links = load_spec(&args.spec)?.resolve_strict()?;
    Ok(serde_json::to_value(story_links(&links))?)
}

fn render_preview_file(args: &PreviewArgs, opts: &PrepareOptions) -> Result<PathBuf> {
    if !args.input.exists() {
        bail!("input not found: {}", args.input.display());
    }
    let kind = MediaKind::from_path(&args.input)?;
    let links = load_spec(&args.spec)?.resolve_lenient();

    let frame = load_preview_frame(&args.input, kind, opts)?;
    let rendered = render_preview(&frame, &links, (args.max_width, args.max_height));

    ensure_parent_dir(&args.output)?;
    DynamicImage::ImageRgba8(rendered)
        .save_with_format(&args.output, image::ImageFormat::Png)
        .with_context(|| format!("failed to save preview: {}", args.output.display()))?;
    Ok(abs_path(&args.output))
}

fn compose_media(args: &ComposeArgs, opts: &PrepareOptions) -> Result<Value> {
    let links = load_spec(&args.spec)?.resolve_strict()?;

    let (media, report) = prepare_story_media(&args.input, &links, opts)?;
    log::debug!("prepared {}", media.path().display());
    let kind = media.kind();
    let composited = media.is_temporary();
    let dest = match args.out.clone() {
        Some(path) => path,
        None => scratch_path(&opts.out_dir, "story", kind.output_suffix())?,
    };
    let saved = media.persist(&dest)?;

    let payload = json!({
        "input_path": abs_path(&args.input).display().to_string(),
        "media_path": abs_path(&saved).display().to_string(),
        "media_kind": kind.label(),
        "composited": composited,
        "generated_at": timestamp_iso(),
        "links": story_links(&links),
        "icons": report,
    });

    if let Some(meta_path) = args.meta_out.as_deref() {
        write_json_pretty(meta_path, &payload)?;
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;

    const GRAY: Rgba<u8> = Rgba([90, 90, 90, 255]);

    fn test_opts(out_dir: &Path) -> PrepareOptions {
        PrepareOptions {
            out_dir: out_dir.to_path_buf(),
            tools: FfmpegTools {
                ffmpeg: "story-overlay-no-such-ffmpeg".to_string(),
                ffprobe: "story-overlay-no-such-ffprobe".to_string(),
                timeout: Duration::from_secs(5),
            },
        }
    }

    fn write_spec(dir: &Path, value: Value) -> String {
        let path = dir.join("spec.json");
        fs::write(&path, value.to_string()).unwrap();
        path.display().to_string()
    }

    fn compose_args(input: PathBuf, spec: String) -> ComposeArgs {
        ComposeArgs {
            input,
            spec,
            out: None,
            meta_out: None,
            json: true,
        }
    }

    #[test]
    fn rects_use_explicit_size() {
        let dir = tempdir().unwrap();
        let spec = write_spec(
            dir.path(),
            json!([{"url": "https://a.example", "x": 0.5, "y": 0.5, "w": 0.5, "h": 0.25}, {"url": "https://"}]),
        );
        let args = RectsArgs {
            input: None,
            spec,
            width: Some(1000),
            height: Some(1000),
        };
        let payload = rects_payload(&args, &test_opts(dir.path()).tools).unwrap();
        assert_eq!(payload["size"], json!({"width": 1000, "height": 1000, "units": "px"}));
        let rects = payload["rects"].as_array().unwrap();
        assert_eq!(rects.len(), 1);
        assert_eq!(
            rects[0]["rect"],
            json!({"left": 250.0, "top": 375.0, "right": 750.0, "bottom": 625.0})
        );
        assert_eq!(rects[0]["width"], json!(500.0));
        assert_eq!(rects[0]["index"], json!(1));
    }

    #[test]
    fn rects_read_image_dimensions() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("story.png");
        RgbaImage::from_pixel(200, 100, GRAY).save(&input).unwrap();
        let spec = write_spec(dir.path(), json!([{"url": "https://a.example", "x": 0.5, "y": 0.5, "w": 0.5, "h": 0.5}]));
        let args = RectsArgs {
            input: Some(input),
            spec,
            width: None,
            height: None,
        };
        let payload = rects_payload(&args, &test_opts(dir.path()).tools).unwrap();
        assert_eq!(payload["size"]["width"], json!(200));
        assert_eq!(payload["rects"][0]["rect"]["left"], json!(50.0));
    }

    #[test]
    fn rects_need_input_or_size() {
        let dir = tempdir().unwrap();
        let spec = write_spec(dir.path(), json!([{"url": "https://a.example"}]));
        let args = RectsArgs {
            input: None,
            spec,
            width: None,
            height: None,
        };
        let err = rects_payload(&args, &test_opts(dir.path()).tools).unwrap_err();
        assert!(err.to_string().contains("--width/--height"), "{err}");
    }

    #[test]
    fn links_skip_placeholders() {
        let dir = tempdir().unwrap();
        let spec = write_spec(
            dir.path(),
            json!([{"url": "https://"}, {"url": "https://a.example", "x": 0.1, "y": 0.2, "w": 0.3, "h": 0.4}]),
        );
        let payload = links_payload(&LinksArgs { spec }).unwrap();
        assert_eq!(
            payload,
            json!([{"webUri": "https://a.example", "x": 0.1, "y": 0.2, "width": 0.3, "height": 0.4}])
        );
    }

    #[test]
    fn links_surface_invalid_geometry() {
        let dir = tempdir().unwrap();
        let spec = write_spec(dir.path(), json!([{"url": "https://a.example", "w": 3}]));
        let err = links_payload(&LinksArgs { spec }).unwrap_err();
        let overlay_err = err.downcast_ref::<OverlayError>().unwrap();
        assert_eq!(overlay_err.kind(), "invalid_geometry");
    }

    #[test]
    fn compose_persists_under_out_dir_and_writes_meta() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("story.png");
        RgbaImage::from_pixel(40, 40, GRAY).save(&input).unwrap();
        let icon = dir.path().join("icon.png");
        RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255])).save(&icon).unwrap();
        let spec = write_spec(
            dir.path(),
            json!([
                {"url": "https://a.example", "x": 0.5, "y": 0.5, "w": 0.5, "h": 0.5, "icon": icon},
                {"url": "https://b.example", "icon": dir.path().join("missing.png")},
                {"url": "https://"}
            ]),
        );
        let out_dir = dir.path().join("out");
        let meta = dir.path().join("meta").join("compose.json");
        let mut args = compose_args(input.clone(), spec);
        args.meta_out = Some(meta.clone());

        let payload = compose_media(&args, &test_opts(&out_dir)).unwrap();
        assert_eq!(payload["composited"], json!(true));
        assert_eq!(payload["media_kind"], json!("image"));
        let saved = PathBuf::from(payload["media_path"].as_str().unwrap());
        assert!(saved.starts_with(&out_dir), "{}", saved.display());
        let out = image::open(&saved).unwrap().to_rgba8();
        let center = out.get_pixel(20, 20);
        assert!(center[0] > 200 && center[1] < 40, "{center:?}");
        assert_eq!(*out.get_pixel(2, 2), GRAY);

        let written: Value = serde_json::from_str(&fs::read_to_string(&meta).unwrap()).unwrap();
        assert_eq!(written["links"].as_array().unwrap().len(), 2);
        assert_eq!(written["icons"]["applied"], json!(1));
        assert_eq!(written["icons"]["skipped"].as_array().unwrap().len(), 1);
        assert_eq!(written["icons"]["skipped"][0]["url"], json!("https://b.example"));

        // only the persisted result remains; the temp composite was moved
        let leftovers: Vec<_> = fs::read_dir(&out_dir).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn compose_without_icons_copies_input_to_out() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("story.jpg");
        image::RgbImage::from_pixel(16, 16, image::Rgb([1, 2, 3])).save(&input).unwrap();
        let spec = write_spec(dir.path(), json!([{"url": "https://a.example"}]));
        let dest = dir.path().join("final").join("story.jpg");
        let mut args = compose_args(input.clone(), spec);
        args.out = Some(dest.clone());

        let payload = compose_media(&args, &test_opts(&dir.path().join("out"))).unwrap();
        assert_eq!(payload["composited"], json!(false));
        assert_eq!(payload["media_kind"], json!("image"));
        assert_eq!(PathBuf::from(payload["media_path"].as_str().unwrap()), dest);
        assert_eq!(fs::read(&dest).unwrap(), fs::read(&input).unwrap());
        assert!(input.exists());
    }

    #[test]
    fn compose_rejects_missing_input() {
        let dir = tempdir().unwrap();
        let spec = write_spec(dir.path(), json!([]));
        let args = compose_args(dir.path().join("nope.png"), spec);
        let err = compose_media(&args, &test_opts(dir.path())).unwrap_err();
        assert!(err.to_string().contains("input not found"), "{err}");
    }

    #[test]
    fn preview_writes_outlined_png() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("story.png");
        RgbaImage::from_pixel(100, 100, GRAY).save(&input).unwrap();
        let spec = write_spec(
            dir.path(),
            json!([{"url": "https://a.example", "x": 0.5, "y": 0.5, "w": 0.5, "h": 0.5}, {"url": "https://b.example", "x": "?"}]),
        );
        let output = dir.path().join("previews").join("p.png");
        let args = PreviewArgs {
            input,
            output: output.clone(),
            spec,
            max_width: 100,
            max_height: 100,
        };
        let saved = render_preview_file(&args, &test_opts(dir.path())).unwrap();
        assert_eq!(saved, output);
        let rendered = image::open(&output).unwrap().to_rgba8();
        assert_eq!(*rendered.get_pixel(50, 25), Rgba([255, 0, 0, 255]));
        assert_eq!(*rendered.get_pixel(50, 50), GRAY);
    }
}
