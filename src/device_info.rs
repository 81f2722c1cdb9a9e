//! Serialization of the fixed `GetDeviceInfo` and `GetStorageInfo` records.

use crate::encoding::Encoder;
use crate::ptp_constants::{AccessCapability, DataFormat, FilesystemType, OpCode, StorageType, PARAM_ANY};
use crate::wire::{encode_le_u16, encode_le_u32, encode_le_u64, encode_string};

const MANUFACTURER: &str = "Linux Foundation";
const MODEL: &str = "PTP Gadget";
const STORAGE_DESCRIPTION: &str = "SD/MMC";
const STANDARD_VERSION: u16 = 100;

/// Builds the `GetDeviceInfo` Data-phase payload: fixed fields, the
/// supported-operations array, the supported-image-formats array, and the
/// manufacturer/model strings, all little-endian per §4.3.
pub fn encode_device_info(encoder: &dyn Encoder) -> Vec<u8> {
    let mut out = Vec::new();
    encode_le_u16(&mut out, STANDARD_VERSION);
    encode_le_u32(&mut out, 0); // vendor_ext_id
    encode_le_u16(&mut out, 0); // vendor_ext_ver
    out.push(0); // vendor_ext_desc_len

    encode_le_u16(&mut out, 0); // functional_mode

    encode_le_u32(&mut out, OpCode::SUPPORTED.len() as u32);
    for op in OpCode::SUPPORTED {
        encode_le_u16(&mut out, op as u16);
    }

    encode_le_u32(&mut out, 0); // events_n
    encode_le_u32(&mut out, 0); // device_properties_n
    encode_le_u32(&mut out, 0); // capture_formats_n

    encode_le_u32(&mut out, DataFormat::SUPPORTED.len() as u32);
    for fmt in DataFormat::SUPPORTED {
        encode_le_u16(&mut out, fmt as u16);
    }

    encode_string(&mut out, encoder, MANUFACTURER).expect("manufacturer string fits");
    encode_string(&mut out, encoder, MODEL).expect("model string fits");
    out.push(0); // device_version_len
    out.push(0); // serial_number_len

    out
}

/// Builds the `GetStorageInfo` Data-phase payload given current
/// capacity/free-space figures refreshed from a filesystem stat.
pub fn encode_storage_info(encoder: &dyn Encoder, max_capacity: u64, free_space_bytes: u64) -> Vec<u8> {
    let mut out = Vec::new();
    encode_le_u16(&mut out, StorageType::RemovableRam as u16);
    encode_le_u16(&mut out, FilesystemType::Dcf as u16);
    encode_le_u16(&mut out, AccessCapability::ReadWrite as u16);
    encode_le_u64(&mut out, max_capacity);
    encode_le_u64(&mut out, free_space_bytes);
    encode_le_u32(&mut out, PARAM_ANY); // free_space_in_images: unknown
    encode_string(&mut out, encoder, STORAGE_DESCRIPTION).expect("storage description fits");
    out.push(0); // volume_label_len

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Iso8859ToUcs2Le;

    #[test]
    fn device_info_advertises_eleven_operations() {
        let bytes = encode_device_info(&Iso8859ToUcs2Le);
        // offset of operations_n: 2 (std_ver) + 4 (ext_id) + 2 (ext_ver) + 1 (desc_len) + 2 (func_mode) = 11
        let operations_n = u32::from_le_bytes(bytes[11..15].try_into().unwrap());
        assert_eq!(operations_n, 11);
    }

    #[test]
    fn storage_info_encodes_capacity_fields() {
        let bytes = encode_storage_info(&Iso8859ToUcs2Le, 1_000_000, 500_000);
        let max_capacity = u64::from_le_bytes(bytes[6..14].try_into().unwrap());
        let free_space = u64::from_le_bytes(bytes[14..22].try_into().unwrap());
        assert_eq!(max_capacity, 1_000_000);
        assert_eq!(free_space, 500_000);
    }
}
