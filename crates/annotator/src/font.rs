//! Best-effort label font loading.
//!
//! Tries an ordered list of well-known system font files, then falls back to
//! scanning the configured font directories for anything loadable. Returning
//! `None` is a degraded mode, not a failure: boxes are still drawn, labels
//! are skipped.

use ab_glyph::FontVec;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// How deep the directory fallback scan descends.
const MAX_SCAN_DEPTH: usize = 3;

/// Well-known font file locations probed in order.
#[must_use]
pub fn default_candidates() -> Vec<PathBuf> {
    [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
        "/System/Library/Fonts/Supplemental/Verdana.ttf",
        "C:\\Windows\\Fonts\\arial.ttf",
        "C:\\Windows\\Fonts\\verdana.ttf",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

/// Directories scanned when none of the candidates exist.
#[must_use]
pub fn default_font_dirs() -> Vec<PathBuf> {
    [
        "/usr/share/fonts",
        "/usr/local/share/fonts",
        "/System/Library/Fonts",
        "C:\\Windows\\Fonts",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

/// Load the first usable font: candidates in order, then a directory scan.
#[must_use]
pub fn load_first_available(candidates: &[PathBuf], font_dirs: &[PathBuf]) -> Option<FontVec> {
    for path in candidates {
        if let Some(font) = try_load(path) {
            info!(path = %path.display(), "loaded label font");
            return Some(font);
        }
    }

    for dir in font_dirs {
        if let Some((path, font)) = scan_dir(dir, MAX_SCAN_DEPTH) {
            info!(path = %path.display(), "loaded fallback label font");
            return Some(font);
        }
    }

    None
}

fn try_load(path: &Path) -> Option<FontVec> {
    let data = std::fs::read(path).ok()?;
    match FontVec::try_from_vec(data) {
        Ok(font) => Some(font),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "unusable font file");
            None
        }
    }
}

fn scan_dir(dir: &Path, depth: usize) -> Option<(PathBuf, FontVec)> {
    if depth == 0 {
        return None;
    }

    let entries = std::fs::read_dir(dir).ok()?;
    let mut subdirs = Vec::new();

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            subdirs.push(path);
            continue;
        }
        let is_font = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("ttf") || ext.eq_ignore_ascii_case("otf"));
        if is_font {
            if let Some(font) = try_load(&path) {
                return Some((path, font));
            }
        }
    }

    for subdir in subdirs {
        if let Some(found) = scan_dir(&subdir, depth - 1) {
            return Some(found);
        }
    }

    None
}
