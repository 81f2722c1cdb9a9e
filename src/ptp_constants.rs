//! PIMA 15740 numeric constants used by the wire codec and dispatcher.
//!
//! These mirror the standard's assigned values; see the container format
//! description in the crate-level docs for how they're framed on the wire.

pub const STORE_ID: u32 = 0x0001_0001;
pub const PARAM_UNUSED: u32 = 0;
pub const PARAM_ANY: u32 = 0xFFFF_FFFF;

pub const HANDLE_ROOT: u32 = 1;
pub const HANDLE_MODEL_DIR: u32 = 2;

pub const HEADER_LEN: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ContainerType {
    Undefined = 0,
    Command = 1,
    Data = 2,
    Response = 3,
    Event = 4,
}

impl ContainerType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Undefined),
            1 => Some(Self::Command),
            2 => Some(Self::Data),
            3 => Some(Self::Response),
            4 => Some(Self::Event),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum OpCode {
    GetDeviceInfo = 0x1001,
    OpenSession = 0x1002,
    CloseSession = 0x1003,
    GetStorageIds = 0x1004,
    GetStorageInfo = 0x1005,
    GetNumObjects = 0x1006,
    GetObjectHandles = 0x1007,
    GetObjectInfo = 0x1008,
    GetObject = 0x1009,
    GetThumb = 0x100A,
    DeleteObject = 0x100B,
}

impl OpCode {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x1001 => Some(Self::GetDeviceInfo),
            0x1002 => Some(Self::OpenSession),
            0x1003 => Some(Self::CloseSession),
            0x1004 => Some(Self::GetStorageIds),
            0x1005 => Some(Self::GetStorageInfo),
            0x1006 => Some(Self::GetNumObjects),
            0x1007 => Some(Self::GetObjectHandles),
            0x1008 => Some(Self::GetObjectInfo),
            0x1009 => Some(Self::GetObject),
            0x100A => Some(Self::GetThumb),
            0x100B => Some(Self::DeleteObject),
            _ => None,
        }
    }

    /// The set of opcodes advertised in the device-info `operations` array.
    pub const SUPPORTED: [OpCode; 11] = [
        OpCode::GetDeviceInfo,
        OpCode::OpenSession,
        OpCode::CloseSession,
        OpCode::GetStorageIds,
        OpCode::GetStorageInfo,
        OpCode::GetNumObjects,
        OpCode::GetObjectHandles,
        OpCode::GetObjectInfo,
        OpCode::GetObject,
        OpCode::GetThumb,
        OpCode::DeleteObject,
    ];

    /// `(min, max)` inclusive total container length this opcode accepts.
    pub fn length_range(self) -> (u32, u32) {
        let h = HEADER_LEN;
        match self {
            OpCode::GetDeviceInfo => (h, h),
            OpCode::OpenSession => (h + 4, h + 4),
            OpCode::CloseSession => (h, h),
            OpCode::GetStorageIds => (h, h),
            OpCode::GetStorageInfo => (h + 4, h + 4),
            OpCode::GetNumObjects => (h + 4, h + 12),
            OpCode::GetObjectHandles => (h + 4, h + 12),
            OpCode::GetObjectInfo => (h + 4, h + 4),
            OpCode::GetObject => (h + 4, h + 4),
            OpCode::GetThumb => (h + 4, h + 4),
            OpCode::DeleteObject => (h + 4, h + 8),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ResponseCode {
    Ok = 0x2001,
    GeneralError = 0x2002,
    SessionNotOpen = 0x2003,
    OperationNotSupported = 0x2005,
    IncompleteTransfer = 0x2007,
    InvalidStorageId = 0x2008,
    InvalidObjectHandle = 0x2009,
    ObjectWriteProtected = 0x200D,
    PartialDeletion = 0x2012,
    StoreNotAvailable = 0x2013,
    SpecificationByFormatNotSupported = 0x2014,
    InvalidParameter = 0x201D,
    SessionAlreadyOpen = 0x201E,
    InvalidParentObject = 0x201A,
}

impl ResponseCode {
    pub fn code(self) -> u16 {
        self as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum DataFormat {
    Association = 0x3001,
    ExifJpeg = 0x3801,
    TiffEp = 0x3802,
    Jfif = 0x3808,
    Png = 0x380B,
    Tiff = 0x380D,
    TiffIt = 0x380E,
}

impl DataFormat {
    /// Image formats advertised in the device-info `image_formats` array.
    pub const SUPPORTED: [DataFormat; 6] = [
        DataFormat::ExifJpeg,
        DataFormat::TiffEp,
        DataFormat::Jfif,
        DataFormat::Png,
        DataFormat::Tiff,
        DataFormat::TiffIt,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum StorageType {
    RemovableRam = 0x0004,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FilesystemType {
    Dcf = 0x0003,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum AccessCapability {
    ReadWrite = 0x0000,
}
