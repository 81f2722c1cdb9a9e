//! Control-endpoint handling: controller autoconfiguration (§4.9) plus the
//! USB Setup/event state machine that brings the gadget in and out of
//! configuration. Ground: the original responder's `autoconfig()` probe
//! table and `handle_control()`'s event switch, generalized so the actual
//! transport is an injected [`ControlTransport`].

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{PtpError, Result};
use crate::reset::ResetCoordinator;
use crate::transport::{ControlEvent, ControlTransport, SetupPacket};
use crate::usb_descriptors::{device_descriptor, endpoint_descriptor, interface_descriptor, EP_IN_ADDRESS, EP_OUT_ADDRESS};

const USB_REQ_GET_DESCRIPTOR: u8 = 0x06;
const USB_REQ_SET_CONFIGURATION: u8 = 0x09;
const USB_REQ_GET_INTERFACE: u8 = 0x0A;
const USB_REQ_SET_INTERFACE: u8 = 0x0B;

/// Which endpoint-naming convention and link speed a probed controller
/// uses, mirroring the original's per-driver table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerProfile {
    pub driver_name: &'static str,
    pub high_speed: bool,
}

/// The fixed, ordered list of known gadget controller drivers the original
/// responder probes for under `/dev/gadget`. Order matters only in that the
/// first match wins; there is no ambiguity in practice since a kernel only
/// ever exposes the one controller node it was built for.
pub const AUTOCONFIG_TABLE: &[ControllerProfile] = &[
    ControllerProfile { driver_name: "net2280", high_speed: true },
    ControllerProfile { driver_name: "dummy_udc", high_speed: true },
    ControllerProfile { driver_name: "pxa2xx_udc", high_speed: false },
    ControllerProfile { driver_name: "goku_udc", high_speed: false },
    ControllerProfile { driver_name: "musb_hdrc", high_speed: true },
    ControllerProfile { driver_name: "at91_udc", high_speed: false },
    ControllerProfile { driver_name: "lh740x_udc", high_speed: false },
    ControllerProfile { driver_name: "atmel_usba_udc", high_speed: true },
    ControllerProfile { driver_name: "fsl-usb2-udc", high_speed: true },
    ControllerProfile { driver_name: "arc_udc", high_speed: true },
];

/// Probes `gadget_dir` for a device node matching one of
/// [`AUTOCONFIG_TABLE`]'s known driver names.
pub fn autoconfigure(gadget_dir: &Path) -> Result<ControllerProfile> {
    for profile in AUTOCONFIG_TABLE {
        if gadget_dir.join(profile.driver_name).exists() {
            info!("detected {} controller", profile.driver_name);
            return Ok(*profile);
        }
    }
    Err(PtpError::NoController(gadget_dir.to_path_buf()))
}

fn max_packet_size(profile: ControllerProfile) -> u16 {
    if profile.high_speed {
        512
    } else {
        64
    }
}

/// Drives the control endpoint: answers descriptor requests, tracks
/// configuration state, and drains connect/disconnect/suspend events,
/// coordinating bulk I/O availability through `reset`.
pub struct ControlHandler<C: ControlTransport> {
    transport: C,
    profile: ControllerProfile,
    reset: ResetCoordinator,
    configured: bool,
}

impl<C: ControlTransport> ControlHandler<C> {
    pub fn new(transport: C, profile: ControllerProfile, reset: ResetCoordinator) -> Self {
        Self {
            transport,
            profile,
            reset,
            configured: false,
        }
    }

    /// Processes events until the transport reports an unrecoverable error.
    pub fn run(&mut self) {
        loop {
            match self.transport.next_event() {
                Ok(event) => self.handle_event(event),
                Err(error) if error.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(error) => {
                    warn!("control transport error: {error}");
                    self.reset.stop_io();
                    return;
                }
            }
        }
    }

    pub fn handle_event(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::Nop => {}
            ControlEvent::Connect => info!("gadget connected"),
            ControlEvent::Disconnect => {
                info!("gadget disconnected, pausing bulk I/O");
                self.configured = false;
                self.reset.stop_io();
            }
            ControlEvent::Suspend => {
                info!("gadget suspended");
                self.reset.stop_io();
            }
            ControlEvent::Setup(setup) => self.handle_setup(setup),
        }
    }

    fn handle_setup(&mut self, setup: SetupPacket) {
        let result = match setup.request {
            USB_REQ_GET_DESCRIPTOR => self.respond_get_descriptor(setup),
            USB_REQ_SET_CONFIGURATION => self.respond_set_configuration(setup),
            USB_REQ_GET_INTERFACE => self.transport.write_response(&[0]),
            USB_REQ_SET_INTERFACE => self.respond_set_configuration(setup),
            _ => {
                warn!("stalling unsupported setup request 0x{:02x}", setup.request);
                self.transport.stall()
            }
        };
        if let Err(error) = result {
            warn!("failed to answer control request: {error}");
        }
    }

    fn respond_get_descriptor(&mut self, setup: SetupPacket) -> std::io::Result<()> {
        let descriptor_type = (setup.value >> 8) as u8;
        match descriptor_type {
            crate::usb_descriptors::USB_DT_DEVICE => self.transport.write_response(&device_descriptor()),
            crate::usb_descriptors::USB_DT_INTERFACE => self.transport.write_response(&interface_descriptor()),
            crate::usb_descriptors::USB_DT_ENDPOINT => {
                let mps = max_packet_size(self.profile);
                let mut both = Vec::with_capacity(14);
                both.extend_from_slice(&endpoint_descriptor(EP_IN_ADDRESS, mps));
                both.extend_from_slice(&endpoint_descriptor(EP_OUT_ADDRESS, mps));
                self.transport.write_response(&both)
            }
            _ => self.transport.stall(),
        }
    }

    fn respond_set_configuration(&mut self, _setup: SetupPacket) -> std::io::Result<()> {
        self.configured = true;
        self.transport.write_response(&[])?;
        self.reset.start_io();
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }
}

/// Default location gadgetfs is mounted at on a Linux USB-gadget host.
pub fn default_gadget_dir() -> PathBuf {
    std::env::var_os("PTP_GADGET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/dev/gadget"))
}
