//! A PTP (PIMA 15740) responder that projects a directory of JPEG/TIFF
//! images onto a read-mostly USB still-image-capture device, speaking the
//! protocol over a USB gadgetfs bulk/control endpoint triple.

pub mod bulk_worker;
pub mod control;
pub mod device_info;
pub mod dispatcher;
pub mod encoding;
pub mod error;
pub mod object_store;
pub mod ptp_constants;
pub mod reset;
pub mod session;
pub mod thumbnail;
pub mod transport;
pub mod usb_descriptors;
pub mod wire;

pub use error::{PtpError, Result};
