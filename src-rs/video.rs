use crate::compositor::{load_icon, resize_icon, CompositeReport};
use crate::error::{OverlayError, Result};
use crate::geometry::{paste_origin, LinkOverlay};
use serde::Deserialize;
use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use wait_timeout::ChildExt;

pub const DEFAULT_TIMEOUT_SEC: u64 = 300;

#[derive(Debug, Clone)]
pub struct FfmpegTools {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedIcon {
    pub path: PathBuf,
    pub x: i64,
    pub y: i64,
}

#[derive(Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
}

impl FfmpegTools {
    pub fn from_env(timeout_sec: u64) -> Self {
        let pick = |var: &str, fallback: &str| {
            env::var(var)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| fallback.to_string())
        };
        Self {
            ffmpeg: pick("STORY_OVERLAY_FFMPEG", "ffmpeg"),
            ffprobe: pick("STORY_OVERLAY_FFPROBE", "ffprobe"),
            timeout: Duration::from_secs(timeout_sec.max(1)),
        }
    }

    pub fn video_dimensions(&self, input: &Path) -> Result<(u32, u32)> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args(["-v", "error", "-select_streams", "v:0"])
            .args(["-show_entries", "stream=width,height", "-of", "json"])
            .arg(input);
        let stdout = self.run(cmd, "ffprobe")?;
        parse_ffprobe_dimensions(&stdout)
    }

    pub fn extract_first_frame(&self, input: &Path, out_png: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-y", "-loglevel", "error", "-nostats", "-i"])
            .arg(input)
            .args(["-frames:v", "1"])
            .arg(out_png);
        self.run(cmd, "ffmpeg")?;
        Ok(())
    }

    pub fn overlay_icons(&self, input: &Path, icons: &[PlacedIcon], out: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-y", "-loglevel", "error", "-nostats", "-i"]).arg(input);
        for icon in icons {
            cmd.arg("-i").arg(&icon.path);
        }
        cmd.arg("-filter_complex")
            .arg(build_filter_graph(icons))
            .args(["-map", "[vout]", "-map", "0:a?"])
            .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
            .args(["-c:a", "aac", "-movflags", "+faststart"])
            .arg(out);
        self.run(cmd, "ffmpeg")?;
        Ok(())
    }

    fn run(&self, mut cmd: Command, label: &str) -> Result<String> {
        log::debug!("running {cmd:?}");
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| OverlayError::Encoder(format!("failed to start {label}: {e}")))?;

        // a full pipe blocks the child, so both are read while waiting
        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        let status = match child.wait_timeout(self.timeout)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                // readers finish on their own once every writer has closed the pipe
                drop((stdout_reader, stderr_reader));
                return Err(OverlayError::Encoder(format!(
                    "{label} timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        let stdout = collect(stdout_reader, label)?;
        let stderr = collect(stderr_reader, label)?;
        if !status.success() {
            return Err(OverlayError::Encoder(format!(
                "{label} exited with {}: {}",
                status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        Ok(stdout)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn collect(reader: JoinHandle<io::Result<Vec<u8>>>, label: &str) -> Result<String> {
    let bytes = reader
        .join()
        .map_err(|_| OverlayError::Encoder(format!("{label} output reader panicked")))??;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn parse_ffprobe_dimensions(raw: &str) -> Result<(u32, u32)> {
    let parsed: FfprobeOutput = serde_json::from_str(raw)
        .map_err(|e| OverlayError::Encoder(format!("unreadable ffprobe output: {e}")))?;
    parsed
        .streams
        .iter()
        .find_map(|s| match (s.width, s.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        })
        .ok_or_else(|| OverlayError::Encoder("no video stream with dimensions".to_string()))
}

/// Chain one `overlay` filter per icon; input 0 is the clip, icon N is input N.
pub fn build_filter_graph(icons: &[PlacedIcon]) -> String {
    if icons.is_empty() {
        return "[0:v]null[vout]".to_string();
    }
    let mut parts = Vec::with_capacity(icons.len());
    let mut prev = "0:v".to_string();
    for (i, icon) in icons.iter().enumerate() {
        let next = if i + 1 == icons.len() {
            "vout".to_string()
        } else {
            format!("v{}", i + 1)
        };
        parts.push(format!(
            "[{prev}][{}:v]overlay=x={}:y={}[{next}]",
            i + 1,
            icon.x,
            icon.y
        ));
        prev = next;
    }
    parts.join(";")
}

pub fn prepare_icons<'a>(
    overlays: impl IntoIterator<Item = &'a LinkOverlay>,
    frame_w: u32,
    frame_h: u32,
    scratch_dir: &Path,
) -> Result<(Vec<PlacedIcon>, CompositeReport)> {
    fs::create_dir_all(scratch_dir)?;
    let mut placed = Vec::new();
    let mut report = CompositeReport::default();
    for overlay in overlays {
        if overlay.is_placeholder() {
            continue;
        }
        let Some(icon_path) = overlay.icon_path.as_deref() else {
            continue;
        };
        let resized = match load_icon(icon_path)
            .and_then(|icon| resize_icon(&icon, overlay, frame_w, frame_h))
        {
            Ok(resized) => resized,
            Err(err) => {
                report.record_skip(overlay, &err);
                continue;
            }
        };
        let (x, y) = paste_origin(overlay, resized.dimensions(), frame_w, frame_h);
        let path = scratch_dir.join(format!("icon-{}.png", placed.len() + 1));
        resized.save(&path).map_err(|source| OverlayError::Encode {
            path: path.clone(),
            source,
        })?;
        placed.push(PlacedIcon { path, x, y });
        report.applied += 1;
    }
    Ok((placed, report))
}

#[derive(Debug)]
pub struct ScratchDir(PathBuf);

impl ScratchDir {
    pub fn create(path: PathBuf) -> Result<Self> {
        fs::create_dir_all(&path)?;
        Ok(Self(path))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.0) {
            log::debug!("failed to remove scratch dir {}: {err}", self.0.display());
        }
    }
}
