//! # Directory Resolver
//!
//! Maps a barcode to the local folder holding its photos.
//!
//! Folders under the watch root are named either by the exact barcode or by
//! the raw scanner payload. Lookup tries the exact name first, then compares
//! the normalized name of every immediate subdirectory. Nothing here returns
//! an error: unreadable entries are logged and skipped.

use crate::barcode::normalize;
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// `.jpg` / `.jpeg`, case-insensitive
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Image files directly inside `dir`, sorted by path.
pub fn list_images(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && is_image(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// File name of a path as an owned string; empty for paths without one.
pub fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Immediate subdirectories of `root`, sorted. Unreadable roots yield nothing.
fn subdirectories(root: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(root = %root.display(), error = %e, "Cannot read watch root");
            return Vec::new();
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect();
    dirs.sort();
    dirs
}

/// True when `name` is exactly one plain path component, so that
/// `root.join(name)` stays an immediate child of `root`.
fn is_child_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Photos for `barcode` under `root`.
///
/// 1. `root/barcode` if it exists and holds images. Barcodes that are not a
///    single plain name (`..`, separators, absolute paths) skip this step.
/// 2. Otherwise the first subdirectory (in name order) whose normalized name
///    equals `barcode`.
///
/// Returned paths are rooted at `root`. An empty list means no photos.
pub fn find_photos(root: &Path, barcode: &str) -> Vec<PathBuf> {
    let barcode = barcode.trim();
    if barcode.is_empty() {
        return Vec::new();
    }

    let direct = is_child_name(barcode).then(|| root.join(barcode));
    if let Some(direct) = direct.as_deref().filter(|dir| dir.is_dir()) {
        match list_images(&direct) {
            Ok(images) if !images.is_empty() => {
                debug!(barcode, count = images.len(), "Found photos in exact directory");
                return images;
            }
            Ok(_) => debug!(barcode, "Exact directory has no photos"),
            Err(e) => warn!(dir = %direct.display(), error = %e, "Cannot list directory"),
        }
    } else if direct.is_none() {
        warn!(barcode, "Barcode is not a plain directory name, skipping exact lookup");
    }

    for dir in subdirectories(root) {
        if direct.as_deref() == Some(dir.as_path()) {
            continue;
        }
        let name = basename(&dir);
        if normalize(&name) != barcode {
            continue;
        }
        match list_images(&dir) {
            Ok(images) if !images.is_empty() => {
                debug!(barcode, dir = %name, count = images.len(), "Found photos by normalized name");
                return images;
            }
            Ok(_) => {}
            Err(e) => warn!(dir = %dir.display(), error = %e, "Cannot list directory"),
        }
    }

    Vec::new()
}

/// Immediate subdirectories of `root` modified at or after `since`, sorted.
pub fn recent_directories(root: &Path, since: DateTime<Utc>) -> Vec<PathBuf> {
    subdirectories(root)
        .into_iter()
        .filter(|dir| match fs::metadata(dir).and_then(|m| m.modified()) {
            Ok(modified) => DateTime::<Utc>::from(modified) >= since,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Cannot read modification time");
                false
            }
        })
        .collect()
}
