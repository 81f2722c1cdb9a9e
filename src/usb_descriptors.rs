//! Fixed USB descriptor byte layouts (§6): device, configuration,
//! interface, and endpoint descriptors for the still-image-capture still
//! image class, plus the two capability variants (full-speed and
//! high-speed) the autoconfiguration table distinguishes between.

pub const USB_DT_DEVICE: u8 = 0x01;
pub const USB_DT_CONFIG: u8 = 0x02;
pub const USB_DT_INTERFACE: u8 = 0x04;
pub const USB_DT_ENDPOINT: u8 = 0x05;

pub const USB_CLASS_STILL_IMAGE: u8 = 0x06;
pub const USB_SUBCLASS_STILL_IMAGE: u8 = 0x01;
pub const USB_PROTOCOL_PIMA_15740: u8 = 0x01;

pub const VENDOR_ID: u16 = 0x0525; // Netchip/PLX, the traditional gadgetfs example vendor id
pub const PRODUCT_ID: u16 = 0xa4a2;
pub const DEVICE_RELEASE: u16 = 0x0100;

pub const EP_IN_ADDRESS: u8 = 0x81;
pub const EP_OUT_ADDRESS: u8 = 0x02;

const EP_ATTR_BULK: u8 = 0x02;

/// 18-byte device descriptor.
pub fn device_descriptor() -> [u8; 18] {
    let mut d = [0u8; 18];
    d[0] = 18;
    d[1] = USB_DT_DEVICE;
    d[2..4].copy_from_slice(&0x0200u16.to_le_bytes()); // bcdUSB 2.0
    d[4] = 0; // class/subclass/protocol at the interface level
    d[7] = 64; // bMaxPacketSize0
    d[8..10].copy_from_slice(&VENDOR_ID.to_le_bytes());
    d[10..12].copy_from_slice(&PRODUCT_ID.to_le_bytes());
    d[12..14].copy_from_slice(&DEVICE_RELEASE.to_le_bytes());
    d[17] = 1; // bNumConfigurations
    d
}

/// 9-byte interface descriptor for the single still-image-capture interface.
pub fn interface_descriptor() -> [u8; 9] {
    [
        9,
        USB_DT_INTERFACE,
        0, // bInterfaceNumber
        0, // bAlternateSetting
        2, // bNumEndpoints
        USB_CLASS_STILL_IMAGE,
        USB_SUBCLASS_STILL_IMAGE,
        USB_PROTOCOL_PIMA_15740,
        0, // iInterface
    ]
}

/// 7-byte bulk endpoint descriptor. `max_packet_size` is 64 at full speed,
/// 512 at high speed, selected by the autoconfiguration probe.
pub fn endpoint_descriptor(address: u8, max_packet_size: u16) -> [u8; 7] {
    let mut d = [0u8; 7];
    d[0] = 7;
    d[1] = USB_DT_ENDPOINT;
    d[2] = address;
    d[3] = EP_ATTR_BULK;
    d[4..6].copy_from_slice(&max_packet_size.to_le_bytes());
    d[6] = 0; // bInterval: irrelevant for bulk
    d
}
