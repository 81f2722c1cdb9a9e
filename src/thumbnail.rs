//! Thumbnail cache path conventions and the external thumbnail generator
//! collaborator (§4.8). Generation itself is delegated to a child process;
//! this crate never decodes image pixels.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;

use log::{debug, warn};

pub const THUMB_WIDTH: u32 = 160;
pub const THUMB_HEIGHT: u32 = 120;

/// Where cached thumbnails live. Overridable via `PTP_THUMB_CACHE_DIR` so
/// tests don't need root to write under `/var/cache`, mirroring the
/// teacher's `FORGE_IO_THREADS`/`FORGE_DB_POOL_SIZE` env-override convention
/// in `image_processing.rs`/`database.rs`.
pub fn default_cache_dir() -> PathBuf {
    std::env::var_os("PTP_THUMB_CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/var/cache/ptp/thumb/"))
}

/// Path of the cached thumbnail for a source image file name, e.g.
/// `photo.jpg` -> `<cache_dir>/photo.thumb.jpeg`.
pub fn cache_path(cache_dir: &Path, source_filename: &str) -> PathBuf {
    let stem = match source_filename.rfind('.') {
        Some(idx) => &source_filename[..idx],
        None => source_filename,
    };
    cache_dir.join(format!("{stem}.thumb.jpeg"))
}

/// Produces a 160x120 JPEG thumbnail from an external converter process.
/// The spec names this collaborator *ThumbnailMaker*; production code spawns
/// a real child process (grounded on the original's `fork()`+`execlp("convert", ...)`
/// sequence), while tests can substitute a fake that just touches a file.
pub trait ThumbnailMaker: Send + Sync {
    /// Attempts to create `dest` from `source`. Returns `true` on success.
    /// Must not return until any spawned child has exited — a leaked,
    /// unwaited child is a defect regardless of exit status.
    fn generate(&self, source: &Path, dest: &Path) -> bool;
}

/// Shells out to the `convert` tool (ImageMagick), matching the original
/// responder's `execlp("convert", "convert", "-thumbnail", "160x120", ...)`.
pub struct ExternalConverter {
    pub program: String,
}

impl Default for ExternalConverter {
    fn default() -> Self {
        Self {
            program: "convert".to_string(),
        }
    }
}

impl ThumbnailMaker for ExternalConverter {
    fn generate(&self, source: &Path, dest: &Path) -> bool {
        let size = format!("{THUMB_WIDTH}x{THUMB_HEIGHT}");
        let status = Command::new(&self.program)
            .arg("-thumbnail")
            .arg(&size)
            .arg(source)
            .arg(dest)
            .status();

        match status {
            Ok(status) if status.success() => dest.exists(),
            Ok(status) => {
                warn!("thumbnail generation for {} exited with {status}", source.display());
                false
            }
            Err(error) => {
                warn!("failed to spawn {} for {}: {error}", self.program, source.display());
                false
            }
        }
    }
}

/// `true` if `dest` is missing or older than `source`'s mtime.
pub fn is_stale(source_mtime: SystemTime, dest: &Path) -> bool {
    match std::fs::metadata(dest).and_then(|meta| meta.modified()) {
        Ok(thumb_mtime) => thumb_mtime < source_mtime,
        Err(_) => true,
    }
}

/// Ensures a fresh thumbnail exists for `source`, regenerating via `maker`
/// if missing or stale. Returns the thumbnail's byte size on success.
pub fn ensure_fresh(
    maker: &dyn ThumbnailMaker,
    source: &Path,
    source_mtime: SystemTime,
    cache_dir: &Path,
    source_filename: &str,
) -> Option<u64> {
    let dest = cache_path(cache_dir, source_filename);

    if !is_stale(source_mtime, &dest) {
        return std::fs::metadata(&dest).ok().map(|meta| meta.len());
    }

    debug!("regenerating thumbnail for {}", source.display());
    if !maker.generate(source, &dest) {
        return None;
    }

    std::fs::metadata(&dest).ok().map(|meta| meta.len())
}
