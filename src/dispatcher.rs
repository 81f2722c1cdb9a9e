//! The per-opcode state machine (§4.1-§4.3): one `dispatch` call per
//! Command container, producing at most one Data-phase payload and exactly
//! one Response. Ground: `process_one_request()`'s big opcode switch in the
//! original responder, its `CHECK_COUNT`/`CHECK_SESSION` macros generalized
//! into [`crate::ptp_constants::OpCode::length_range`] and
//! [`crate::session::Session::require_open`].

use std::io;

use log::warn;

use crate::device_info::{encode_device_info, encode_storage_info};
use crate::encoding::Encoder;
use crate::object_store::ObjectTable;
use crate::ptp_constants::{
    OpCode, ResponseCode, HANDLE_MODEL_DIR, HANDLE_ROOT, HEADER_LEN, PARAM_ANY, PARAM_UNUSED, STORE_ID,
};
use crate::session::Session;
use crate::wire::encode_le_u32;

/// What a dispatched command produced: an optional Data-phase payload and
/// the Response that must always follow it.
pub struct CommandOutcome {
    pub data: Option<Vec<u8>>,
    pub response_code: ResponseCode,
    pub response_params: Vec<u32>,
}

impl CommandOutcome {
    fn response_only(code: ResponseCode) -> Self {
        Self {
            data: None,
            response_code: code,
            response_params: Vec::new(),
        }
    }

    fn response_with_params(code: ResponseCode, params: Vec<u32>) -> Self {
        Self {
            data: None,
            response_code: code,
            response_params: params,
        }
    }

    fn with_data(code: ResponseCode, data: Vec<u8>) -> Self {
        Self {
            data: Some(data),
            response_code: code,
            response_params: Vec::new(),
        }
    }
}

fn encode_u32_array(values: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + values.len() * 4);
    encode_le_u32(&mut out, values.len() as u32);
    for value in values {
        encode_le_u32(&mut out, *value);
    }
    out
}

/// Validates the storage id parameter shared by `GetStorageInfo`,
/// `GetNumObjects`, and `GetObjectHandles`: either the one storage id this
/// responder exposes, or the "any storage" wildcard.
fn storage_id_ok(storage_id: u32) -> bool {
    storage_id == STORE_ID || storage_id == PARAM_ANY
}

/// `GetNumObjects`/`GetObjectHandles` take an optional format filter; this
/// responder doesn't support filtering by format, matching the original's
/// rejection of any format parameter other than "unused".
fn format_filter_ok(format: u32) -> bool {
    format == PARAM_UNUSED || format == PARAM_ANY
}

pub fn dispatch(
    session: &mut Session,
    objects: &mut ObjectTable,
    encoder: &dyn Encoder,
    opcode: OpCode,
    params: &[u32],
) -> CommandOutcome {
    if !matches!(opcode, OpCode::GetDeviceInfo | OpCode::OpenSession) {
        let code = session.require_open();
        if code != ResponseCode::Ok {
            return CommandOutcome::response_only(code);
        }
    }

    match opcode {
        OpCode::GetDeviceInfo => CommandOutcome::with_data(ResponseCode::Ok, encode_device_info(encoder)),

        OpCode::OpenSession => {
            let id = params.first().copied().unwrap_or(0);
            let (code, response_params) = session.open(id);
            CommandOutcome::response_with_params(code, response_params)
        }

        OpCode::CloseSession => {
            session.close();
            CommandOutcome::response_only(ResponseCode::Ok)
        }

        OpCode::GetStorageIds => CommandOutcome::with_data(ResponseCode::Ok, encode_u32_array(&[STORE_ID])),

        OpCode::GetStorageInfo => {
            let storage_id = params.first().copied().unwrap_or(0);
            if !storage_id_ok(storage_id) {
                return CommandOutcome::response_only(ResponseCode::InvalidStorageId);
            }
            match objects.refresh_free_space() {
                Ok((total, free)) => {
                    CommandOutcome::with_data(ResponseCode::Ok, encode_storage_info(encoder, total, free))
                }
                Err(error) => {
                    warn!("failed to stat storage: {error}");
                    CommandOutcome::response_only(ResponseCode::StoreNotAvailable)
                }
            }
        }

        OpCode::GetNumObjects => {
            let storage_id = params.first().copied().unwrap_or(STORE_ID);
            let format = params.get(1).copied().unwrap_or(PARAM_UNUSED);
            let association = params.get(2).copied();
            if !storage_id_ok(storage_id) {
                return CommandOutcome::response_only(ResponseCode::InvalidStorageId);
            }
            if !format_filter_ok(format) {
                return CommandOutcome::response_only(ResponseCode::SpecificationByFormatNotSupported);
            }
            match objects.count_under(association) {
                Ok(count) => CommandOutcome::response_with_params(ResponseCode::Ok, vec![count]),
                Err(code) => CommandOutcome::response_only(code),
            }
        }

        OpCode::GetObjectHandles => {
            let storage_id = params.first().copied().unwrap_or(STORE_ID);
            let format = params.get(1).copied().unwrap_or(PARAM_UNUSED);
            let association = params.get(2).copied();
            if !storage_id_ok(storage_id) {
                return CommandOutcome::response_only(ResponseCode::InvalidStorageId);
            }
            if !format_filter_ok(format) {
                return CommandOutcome::response_only(ResponseCode::SpecificationByFormatNotSupported);
            }
            match objects.handles_under(association) {
                Ok(handles) => CommandOutcome::with_data(ResponseCode::Ok, encode_u32_array(&handles)),
                Err(code) => CommandOutcome::response_only(code),
            }
        }

        OpCode::GetObjectInfo => {
            let handle = params.first().copied().unwrap_or(0);
            match objects.object_info_bytes(handle) {
                Some(bytes) => CommandOutcome::with_data(ResponseCode::Ok, bytes),
                None => CommandOutcome::response_only(ResponseCode::InvalidObjectHandle),
            }
        }

        OpCode::GetObject => {
            let handle = params.first().copied().unwrap_or(0);
            read_image_payload(objects, handle, ImagePayload::Full)
        }

        OpCode::GetThumb => {
            let handle = params.first().copied().unwrap_or(0);
            read_image_payload(objects, handle, ImagePayload::Thumbnail)
        }

        OpCode::DeleteObject => {
            let handle = params.first().copied().unwrap_or(0);
            let format = params.get(1).copied().unwrap_or(PARAM_UNUSED);
            if !format_filter_ok(format) {
                return CommandOutcome::response_only(ResponseCode::SpecificationByFormatNotSupported);
            }
            delete(objects, handle)
        }
    }
}

enum ImagePayload {
    Full,
    Thumbnail,
}

fn read_image_payload(objects: &ObjectTable, handle: u32, which: ImagePayload) -> CommandOutcome {
    if handle == HANDLE_ROOT || handle == HANDLE_MODEL_DIR {
        return CommandOutcome::response_only(ResponseCode::InvalidObjectHandle);
    }
    let Some(image) = objects.image_by_handle(handle) else {
        return CommandOutcome::response_only(ResponseCode::InvalidObjectHandle);
    };

    let path = match which {
        ImagePayload::Full => objects.image_path(image),
        ImagePayload::Thumbnail => objects.thumb_path(image),
    };

    match std::fs::read(&path) {
        Ok(bytes) => CommandOutcome::with_data(ResponseCode::Ok, bytes),
        Err(error) => {
            warn!("failed to read {}: {error}", path.display());
            let code = if error.kind() == io::ErrorKind::NotFound {
                ResponseCode::InvalidObjectHandle
            } else {
                ResponseCode::GeneralError
            };
            CommandOutcome::response_only(code)
        }
    }
}

fn delete(objects: &mut ObjectTable, handle: u32) -> CommandOutcome {
    if handle == HANDLE_ROOT || handle == HANDLE_MODEL_DIR {
        return CommandOutcome::response_only(ResponseCode::ObjectWriteProtected);
    }

    if handle == PARAM_ANY {
        let outcome = objects.delete_all();
        return if outcome.failures.is_empty() {
            CommandOutcome::response_only(ResponseCode::Ok)
        } else {
            CommandOutcome::response_only(ResponseCode::PartialDeletion)
        };
    }

    if !objects.handle_valid(handle) {
        return CommandOutcome::response_only(ResponseCode::InvalidObjectHandle);
    }

    CommandOutcome::response_only(objects.delete(handle))
}

/// The inclusive total-container-length check shared by every opcode,
/// applied by the bulk worker before `dispatch` ever runs a command whose
/// framing doesn't match its parameter count (§4.1). A length inside
/// [min, max] but not 4-byte aligned (parameters are always whole u32s) is
/// still a protocol error.
pub fn length_in_range(opcode: OpCode, length: u32) -> bool {
    let (min, max) = opcode.length_range();
    length % 4 == 0 && length >= min && length <= max
}

/// Unrecognized or explicitly unsupported opcodes (including the
/// historical aliases that collided with `GetObjectHandles`/`DeleteObject`
/// numeric values in the original implementation) are rejected uniformly;
/// this responder never implements an operation outside
/// [`crate::ptp_constants::OpCode::SUPPORTED`].
pub fn unsupported() -> CommandOutcome {
    CommandOutcome::response_only(ResponseCode::OperationNotSupported)
}
