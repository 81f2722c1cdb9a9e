//! Session bookkeeping (§4.1). A single PTP session slot: at most one
//! session may be open at a time, matching the original responder's
//! single global `session_id`.

use crate::ptp_constants::ResponseCode;

#[derive(Debug, Default)]
pub struct Session {
    id: Option<u32>,
}

impl Session {
    pub fn new() -> Self {
        Self { id: None }
    }

    pub fn is_open(&self) -> bool {
        self.id.is_some()
    }

    pub fn id(&self) -> Option<u32> {
        self.id
    }

    /// Opens the session. If one is already live, reports
    /// `SessionAlreadyOpen` together with the live session's id as the
    /// single response parameter (ptp.c:1627-1631 echoes the existing
    /// `session_id` rather than returning an empty response). Otherwise
    /// `sid == 0` is rejected as `InvalidParameter` per §4.3.
    pub fn open(&mut self, id: u32) -> (ResponseCode, Vec<u32>) {
        if let Some(current) = self.id {
            return (ResponseCode::SessionAlreadyOpen, vec![current]);
        }
        if id == 0 {
            return (ResponseCode::InvalidParameter, Vec::new());
        }
        self.id = Some(id);
        (ResponseCode::Ok, Vec::new())
    }

    pub fn close(&mut self) {
        self.id = None;
    }

    /// Every opcode but `OpenSession`/`GetDeviceInfo` requires an open
    /// session (§4.1).
    pub fn require_open(&self) -> ResponseCode {
        if self.is_open() {
            ResponseCode::Ok
        } else {
            ResponseCode::SessionNotOpen
        }
    }
}
