use crate::error::{OverlayError, Result};
use crate::geometry::{is_placeholder_url, LinkOverlay};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read};

pub const SPEC_HELP: &str = r##"Overlay spec JSON schema:
{
  "defaults": {"x": 0.5126011, "y": 0.5168225, "w": 0.50998676, "h": 0.25875},
  "links": [
    {"url": "https://example.com/shop", "x": 0.5, "y": 0.8, "w": 0.4, "h": 0.1, "icon": "icons/shop.png"},
    {"url": "https://example.com/blog", "x": "0.5", "y": "", "w": "0.3", "h": "0.08"}
  ]
}

Notes:
- a bare array of link rows is accepted too; defaults then apply as shown above.
- x/y are the sticker center, w/h its size, all as fractions of media width/height.
- geometry fields accept numbers or numeric strings; an empty string or missing field uses the default.
- x/y must lie in [0, 1] and w/h in (0, 1]; anything else is rejected.
- rows whose url is empty or exactly "https://" are ignored everywhere.
- "icon" is optional; an icon that cannot be loaded is skipped with a warning.
"##;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkGeometry {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Default for LinkGeometry {
    fn default() -> Self {
        Self {
            x: 0.5126011,
            y: 0.5168225,
            w: 0.50998676,
            h: 0.25875,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum GeomField {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LinkRow {
    #[serde(default)]
    pub url: String,
    pub x: Option<GeomField>,
    pub y: Option<GeomField>,
    pub w: Option<GeomField>,
    pub h: Option<GeomField>,
    #[serde(default, alias = "icon_path")]
    pub icon: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SpecDocument {
    Full {
        #[serde(default)]
        defaults: LinkGeometry,
        links: Vec<LinkRow>,
    },
    Rows(Vec<LinkRow>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySpec {
    pub defaults: LinkGeometry,
    pub rows: Vec<LinkRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLink {
    pub index: usize,
    pub overlay: LinkOverlay,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryLink {
    #[serde(rename = "webUri")]
    pub web_uri: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

pub fn load_spec(path: &str) -> Result<OverlaySpec> {
    let raw = if path == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| OverlayError::Spec(format!("failed to read spec from stdin: {e}")))?;
        buf
    } else {
        fs::read_to_string(path)
            .map_err(|e| OverlayError::Spec(format!("failed to read spec file {path}: {e}")))?
    };
    parse_spec(&raw)
}

pub fn parse_spec(raw: &str) -> Result<OverlaySpec> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| OverlayError::Spec(format!("invalid JSON: {e}")))?;
    if !value.is_array() && value.get("links").is_none() {
        return Err(OverlayError::Spec(
            "spec must be a list or an object with 'links'".to_string(),
        ));
    }
    let doc: SpecDocument =
        serde_json::from_value(value).map_err(|e| OverlayError::Spec(e.to_string()))?;
    Ok(match doc {
        SpecDocument::Full { defaults, links } => OverlaySpec {
            defaults,
            rows: links,
        },
        SpecDocument::Rows(rows) => OverlaySpec {
            defaults: LinkGeometry::default(),
            rows,
        },
    })
}

impl OverlaySpec {
    pub fn resolve_strict(&self) -> Result<Vec<ResolvedLink>> {
        let mut out = Vec::new();
        for (idx, row) in self.rows.iter().enumerate() {
            if let Some(link) = resolve_row(idx + 1, row, &self.defaults)? {
                out.push(link);
            }
        }
        Ok(out)
    }

    /// Like [`resolve_strict`](Self::resolve_strict) but rows with bad geometry are dropped.
    pub fn resolve_lenient(&self) -> Vec<ResolvedLink> {
        let mut out = Vec::new();
        for (idx, row) in self.rows.iter().enumerate() {
            match resolve_row(idx + 1, row, &self.defaults) {
                Ok(Some(link)) => out.push(link),
                Ok(None) => {}
                Err(err) => log::debug!("preview skips row: {err}"),
            }
        }
        out
    }
}

fn resolve_row(index: usize, row: &LinkRow, defaults: &LinkGeometry) -> Result<Option<ResolvedLink>> {
    if is_placeholder_url(&row.url) {
        return Ok(None);
    }
    let x = resolve_field(index, "x", row.x.as_ref(), defaults.x, Bound::Position)?;
    let y = resolve_field(index, "y", row.y.as_ref(), defaults.y, Bound::Position)?;
    let w = resolve_field(index, "w", row.w.as_ref(), defaults.w, Bound::Extent)?;
    let h = resolve_field(index, "h", row.h.as_ref(), defaults.h, Bound::Extent)?;

    let mut overlay = LinkOverlay::new(row.url.trim(), x, y, w, h);
    if let Some(icon) = row.icon.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        overlay = overlay.with_icon(icon);
    }
    Ok(Some(ResolvedLink { index, overlay }))
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Position,
    Extent,
}

impl Bound {
    fn contains(self, n: f64) -> bool {
        match self {
            Bound::Position => (0.0..=1.0).contains(&n),
            Bound::Extent => n > 0.0 && n <= 1.0,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Bound::Position => "must be within [0, 1]",
            Bound::Extent => "must be within (0, 1]",
        }
    }
}

fn resolve_field(
    link: usize,
    field: &'static str,
    value: Option<&GeomField>,
    fallback: f64,
    bound: Bound,
) -> Result<f64> {
    let invalid = |value: String, reason: &'static str| OverlayError::InvalidGeometry {
        link,
        field,
        value,
        reason,
    };
    let (n, raw) = match value {
        None => return Ok(fallback),
        Some(GeomField::Number(n)) => (*n, n.to_string()),
        // only a blank entry means "default"; whitespace is a typo like any other
        Some(GeomField::Text(text)) if text.is_empty() => return Ok(fallback),
        Some(GeomField::Text(text)) => match text.trim().parse::<f64>() {
            Ok(n) => (n, text.clone()),
            Err(_) => return Err(invalid(text.clone(), "must be numeric")),
        },
    };
    if !n.is_finite() {
        return Err(invalid(raw, "must be numeric"));
    }
    if !bound.contains(n) {
        return Err(invalid(raw, bound.describe()));
    }
    Ok(n)
}

pub fn story_links(links: &[ResolvedLink]) -> Vec<StoryLink> {
    links
        .iter()
        .map(|link| StoryLink {
            web_uri: link.overlay.url.clone(),
            x: link.overlay.x,
            y: link.overlay.y,
            width: link.overlay.w,
            height: link.overlay.h,
        })
        .collect()
}
