//! The object table: a projection of the root image directory onto the PTP
//! object graph (§3, §4.2). Ground: `scanner.rs`'s directory-walk-and-stat
//! loop, generalized from PNG metadata extraction to PTP object-info
//! assembly, and `commands/delete.rs`'s filesystem delete + thumbnail
//! cleanup + index update sequence.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use log::{info, warn};
use walkdir::WalkDir;

use crate::encoding::Encoder;
use crate::ptp_constants::{DataFormat, ResponseCode, HANDLE_MODEL_DIR, HANDLE_ROOT, PARAM_ANY, PARAM_UNUSED};
use crate::thumbnail::{self, ThumbnailMaker};
use crate::wire::{encode_le_u16, encode_le_u32, encode_string};

const FIRST_IMAGE_HANDLE: u32 = 3;
const ROOT_DIR_SIZE_PLACEHOLDER: u64 = 4096;
const ASSOCIATION_TYPE_GENERIC_FOLDER: u16 = 1;

/// One of the two fixed, read-only directory nodes (`/DCIM`, `/DCIM/100LINUX`).
#[derive(Debug, Clone, Copy)]
pub struct AssociationNode {
    pub handle: u32,
    pub parent: u32,
    pub name: &'static str,
}

pub const DCIM: AssociationNode = AssociationNode {
    handle: HANDLE_ROOT,
    parent: 0,
    name: "DCIM",
};

pub const MODEL_DIR: AssociationNode = AssociationNode {
    handle: HANDLE_MODEL_DIR,
    parent: HANDLE_ROOT,
    name: "100LINUX",
};

/// A single backing image file projected as a PTP object.
#[derive(Debug, Clone)]
pub struct ImageObject {
    pub handle: u32,
    pub filename: String,
    pub format: DataFormat,
    pub writable: bool,
    pub compressed_size: u64,
    pub thumb_compressed_size: u64,
    pub capture_date: String,
}

impl ImageObject {
    /// Serializes the fixed `ptp_object_info` fields plus the filename,
    /// capture-date, and two empty (modification-date, keywords) strings.
    fn encode_info(&self, encoder: &dyn Encoder) -> Vec<u8> {
        let mut out = Vec::new();
        encode_le_u32(&mut out, crate::ptp_constants::STORE_ID);
        encode_le_u16(&mut out, self.format as u16);
        encode_le_u16(&mut out, if self.writable { 0 } else { 1 });
        encode_le_u32(&mut out, self.compressed_size as u32);
        encode_le_u16(&mut out, DataFormat::Jfif as u16);
        encode_le_u32(&mut out, self.thumb_compressed_size as u32);
        encode_le_u32(&mut out, thumbnail::THUMB_WIDTH);
        encode_le_u32(&mut out, thumbnail::THUMB_HEIGHT);
        encode_le_u32(&mut out, 0); // image_pix_width: unsupported
        encode_le_u32(&mut out, 0); // image_pix_height: unsupported
        encode_le_u32(&mut out, 0); // image_bit_depth: unsupported
        encode_le_u32(&mut out, HANDLE_MODEL_DIR);
        encode_le_u16(&mut out, 0); // association_type: not an association
        encode_le_u32(&mut out, 0); // association_desc
        encode_le_u32(&mut out, 0); // sequence_number

        encode_string(&mut out, encoder, &self.filename).expect("filename within 255 bytes");
        encode_string(&mut out, encoder, &self.capture_date).expect("capture date within 255 bytes");
        out.push(0); // modification date: empty
        out.push(0); // keywords: empty

        out
    }
}

fn encode_association_info(encoder: &dyn Encoder, node: AssociationNode, size: u64) -> Vec<u8> {
    let mut out = Vec::new();
    encode_le_u32(&mut out, crate::ptp_constants::STORE_ID);
    encode_le_u16(&mut out, DataFormat::Association as u16);
    encode_le_u16(&mut out, 0); // protection_status: read-only
    encode_le_u32(&mut out, size as u32);
    encode_le_u16(&mut out, 0); // thumb_format: none
    encode_le_u32(&mut out, 0); // thumb_compressed_size
    encode_le_u32(&mut out, 0); // thumb_pix_width
    encode_le_u32(&mut out, 0); // thumb_pix_height
    encode_le_u32(&mut out, 0); // image_pix_width
    encode_le_u32(&mut out, 0); // image_pix_height
    encode_le_u32(&mut out, 0); // image_bit_depth
    encode_le_u32(&mut out, node.parent);
    encode_le_u16(&mut out, ASSOCIATION_TYPE_GENERIC_FOLDER);
    encode_le_u32(&mut out, 0); // association_desc
    encode_le_u32(&mut out, 0); // sequence_number

    encode_string(&mut out, encoder, node.name).expect("association name fits");
    out.push(0); // capture date: empty
    out.push(0); // modification date: empty
    out.push(0); // keywords: empty

    out
}

fn format_for_extension(ext: &str) -> Option<DataFormat> {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some(DataFormat::ExifJpeg),
        "tif" | "tiff" => Some(DataFormat::Tiff),
        _ => None,
    }
}

fn capture_date_string(mtime: SystemTime) -> String {
    let datetime: DateTime<Utc> = mtime.into();
    // ISO-8601-ish PTP capture date: YYYYMMDDThhmmss.0Z
    datetime.format("%Y%m%dT%H%M%S.0Z").to_string()
}

#[derive(Debug, Default)]
pub struct DeleteOutcome {
    pub deleted_handles: Vec<u32>,
    pub failures: Vec<(u32, ResponseCode)>,
}

/// In-memory projection of the backing directory plus the two fixed
/// association nodes. Owned exclusively by the bulk worker (§5).
pub struct ObjectTable {
    root: PathBuf,
    thumb_cache_dir: PathBuf,
    encoder: Arc<dyn Encoder>,
    thumbnail_maker: Arc<dyn ThumbnailMaker>,
    images: Vec<ImageObject>,
}

impl ObjectTable {
    pub fn new(root: PathBuf, thumb_cache_dir: PathBuf, encoder: Arc<dyn Encoder>, thumbnail_maker: Arc<dyn ThumbnailMaker>) -> Self {
        Self {
            root,
            thumb_cache_dir,
            encoder,
            thumbnail_maker,
            images: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scans the root directory and (re)builds the object list. Stable
    /// directory-entry order is preserved across calls (as long as the
    /// underlying filesystem returns a stable order), satisfying the
    /// idempotence requirement on repeated `GetObjectHandles` calls.
    pub fn enumerate(&mut self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.thumb_cache_dir)?;

        let mut images = Vec::new();
        let mut handle = FIRST_IMAGE_HANDLE;

        let entries = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file());

        for entry in entries {
            let path = entry.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let Some(format) = format_for_extension(ext) else {
                continue;
            };
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let metadata = match std::fs::metadata(path) {
                Ok(metadata) => metadata,
                Err(error) => {
                    warn!("failed to stat {}: {error}", path.display());
                    continue;
                }
            };

            let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let Some(thumb_size) =
                thumbnail::ensure_fresh(self.thumbnail_maker.as_ref(), path, mtime, &self.thumb_cache_dir, filename)
            else {
                info!("skipping {filename}: thumbnail generation failed");
                continue;
            };

            images.push(ImageObject {
                handle,
                filename: filename.to_string(),
                format,
                writable: metadata.mode() & 0o200 != 0,
                compressed_size: metadata.len(),
                thumb_compressed_size: thumb_size,
                capture_date: capture_date_string(mtime),
            });
            handle += 1;
        }

        self.images = images;
        Ok(())
    }

    pub fn object_number(&self) -> u32 {
        2 + self.images.len() as u32
    }

    pub fn images(&self) -> &[ImageObject] {
        &self.images
    }

    pub fn handle_valid(&self, handle: u32) -> bool {
        handle == HANDLE_ROOT || handle == HANDLE_MODEL_DIR || self.image_by_handle(handle).is_some()
    }

    pub fn image_by_handle(&self, handle: u32) -> Option<&ImageObject> {
        self.images.iter().find(|image| image.handle == handle)
    }

    /// All handles under `association` per the `GetObjectHandles`/`GetNumObjects`
    /// filter rules (§4.3): `ANY` -> `[1]`, `1` -> `[2]`, `2` -> image handles
    /// only, absent/unused (`PARAM_UNUSED`) -> `[1, 2, ...images]`. An
    /// association handle that isn't a valid object at all is
    /// `InvalidObjectHandle`; a valid handle that just isn't one of the two
    /// association nodes is `InvalidParentObject` (ptp.c:1009-1032 checks
    /// `object_handle_valid()` before rejecting on parent-ness).
    pub fn handles_under(&self, association: Option<u32>) -> Result<Vec<u32>, ResponseCode> {
        match association {
            None | Some(PARAM_UNUSED) => {
                let mut handles = vec![HANDLE_ROOT, HANDLE_MODEL_DIR];
                handles.extend(self.images.iter().map(|image| image.handle));
                Ok(handles)
            }
            Some(PARAM_ANY) => Ok(vec![HANDLE_ROOT]),
            Some(HANDLE_ROOT) => Ok(vec![HANDLE_MODEL_DIR]),
            Some(HANDLE_MODEL_DIR) => Ok(self.images.iter().map(|image| image.handle).collect()),
            Some(handle) if !self.handle_valid(handle) => Err(ResponseCode::InvalidObjectHandle),
            Some(_) => Err(ResponseCode::InvalidParentObject),
        }
    }

    /// Count under `association` per `GetNumObjects` (§4.3). Distinct from
    /// `handles_under` because the root-association case counts 1 (just the
    /// `100LINUX` child) rather than returning its handle list semantics.
    /// Error cases mirror `handles_under`.
    pub fn count_under(&self, association: Option<u32>) -> Result<u32, ResponseCode> {
        match association {
            None | Some(PARAM_UNUSED) => Ok(self.object_number()),
            Some(PARAM_ANY) | Some(HANDLE_ROOT) => Ok(1),
            Some(HANDLE_MODEL_DIR) => Ok(self.object_number() - 2),
            Some(handle) if !self.handle_valid(handle) => Err(ResponseCode::InvalidObjectHandle),
            Some(_) => Err(ResponseCode::InvalidParentObject),
        }
    }

    pub fn object_info_bytes(&self, handle: u32) -> Option<Vec<u8>> {
        if handle == HANDLE_ROOT {
            return Some(encode_association_info(self.encoder.as_ref(), DCIM, ROOT_DIR_SIZE_PLACEHOLDER));
        }
        if handle == HANDLE_MODEL_DIR {
            let size = std::fs::metadata(&self.root).map(|m| m.len()).unwrap_or(ROOT_DIR_SIZE_PLACEHOLDER);
            return Some(encode_association_info(self.encoder.as_ref(), MODEL_DIR, size));
        }
        self.image_by_handle(handle).map(|image| image.encode_info(self.encoder.as_ref()))
    }

    pub fn image_path(&self, image: &ImageObject) -> PathBuf {
        self.root.join(&image.filename)
    }

    pub fn thumb_path(&self, image: &ImageObject) -> PathBuf {
        thumbnail::cache_path(&self.thumb_cache_dir, &image.filename)
    }

    /// Deletes a single image: permission check, unlink, best-effort
    /// thumbnail removal, table mutation. Ground: `delete_file()` +
    /// `delete_thumb()` in the original responder, generalized from the
    /// teacher's `commands/delete.rs::remove_thumbnail_cache_file`.
    pub fn delete(&mut self, handle: u32) -> ResponseCode {
        let Some(index) = self.images.iter().position(|image| image.handle == handle) else {
            return ResponseCode::InvalidObjectHandle;
        };

        let path = self.image_path(&self.images[index]);
        let code = delete_file_checked(&path);
        if code != ResponseCode::Ok {
            return code;
        }

        let thumb_path = self.thumb_path(&self.images[index]);
        if thumb_path.exists() {
            if let Err(error) = std::fs::remove_file(&thumb_path) {
                warn!("failed to delete cached thumbnail {}: {error}", thumb_path.display());
            }
        }

        self.images.remove(index);
        ResponseCode::Ok
    }

    /// Deletes every image, per the `handle == ANY` contract of
    /// `DeleteObject`: an empty table, or a table where every delete
    /// succeeds, reports `Ok`; a table with a mix of successes and
    /// failures reports `PartialDeletion` with the specific failures kept.
    pub fn delete_all(&mut self) -> DeleteOutcome {
        let mut outcome = DeleteOutcome::default();
        let handles: Vec<u32> = self.images.iter().map(|image| image.handle).collect();
        for handle in handles {
            let code = self.delete(handle);
            if code == ResponseCode::Ok {
                outcome.deleted_handles.push(handle);
            } else {
                outcome.failures.push((handle, code));
            }
        }
        outcome
    }

    pub fn refresh_free_space(&self) -> std::io::Result<(u64, u64)> {
        filesystem_capacity(&self.root)
    }
}

/// Stat-based permission check matching the original's euid/egid cascade:
/// owner-write if we own the file, else group-write if we're in its group,
/// else other-write.
fn delete_file_checked(path: &Path) -> ResponseCode {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(error) => {
            warn!("cannot stat {}: {error}", path.display());
            return ResponseCode::GeneralError;
        }
    };

    let euid = nix::unistd::geteuid();
    let egid = nix::unistd::getegid();
    let mode = metadata.mode();

    let writable = if euid.as_raw() == metadata.uid() {
        mode & 0o200 != 0
    } else if egid.as_raw() == metadata.gid() {
        mode & 0o020 != 0
    } else {
        mode & 0o002 != 0
    };

    if !writable {
        return ResponseCode::ObjectWriteProtected;
    }

    match std::fs::remove_file(path) {
        Ok(()) => ResponseCode::Ok,
        Err(error) => {
            warn!("cannot delete {}: {error}", path.display());
            ResponseCode::GeneralError
        }
    }
}

pub fn filesystem_capacity(root: &Path) -> std::io::Result<(u64, u64)> {
    let stats = nix::sys::statvfs::statvfs(root)?;
    let block_size = stats.fragment_size().max(1);
    let total = block_size * stats.blocks();
    let free = block_size * stats.blocks_available();
    Ok((total, free))
}
