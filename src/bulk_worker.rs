//! The bulk worker: owns the bulk-IN/OUT transport and the object table
//! exclusively, and runs the read-command / dispatch / write-response loop
//! (§5). Ground: the original responder's `bulk_thread()`, whose
//! `sem_wait`-guarded retry around `read()`/`write()` on `EINTR` is
//! generalized here into [`ResetCoordinator::wait_until_enabled`] so a
//! reset never drops bytes already accumulated mid-transfer.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::dispatcher::{self, CommandOutcome};
use crate::encoding::Encoder;
use crate::object_store::ObjectTable;
use crate::ptp_constants::{ContainerType, OpCode, ResponseCode, HEADER_LEN};
use crate::reset::ResetCoordinator;
use crate::session::Session;
use crate::transport::BulkTransport;
use crate::wire::{decode_header, encode_header, read_le_u32};

/// Matches the buffer size the original responder allocates for its bulk
/// endpoints; Data-phase payloads larger than this are written across
/// multiple bulk writes rather than one oversized one.
pub const BULK_BUFFER_SIZE: usize = 4096;

const RESET_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct BulkWorker<T: BulkTransport> {
    transport: T,
    session: Session,
    objects: ObjectTable,
    encoder: Arc<dyn Encoder>,
    reset: ResetCoordinator,
}

impl<T: BulkTransport> BulkWorker<T> {
    pub fn new(transport: T, objects: ObjectTable, encoder: Arc<dyn Encoder>, reset: ResetCoordinator) -> Self {
        Self {
            transport,
            session: Session::new(),
            objects,
            encoder,
            reset,
        }
    }

    /// Runs until the transport reports a non-recoverable I/O error.
    pub fn run(&mut self) {
        loop {
            if let Err(error) = self.process_one() {
                if error.kind() == io::ErrorKind::UnexpectedEof {
                    info!("bulk transport closed, stopping worker");
                    return;
                }
                warn!("bulk worker I/O error: {error}");
                return;
            }
        }
    }

    /// Reads one Command container, dispatches it, and writes back its
    /// Data (if any) and Response containers. Exposed separately from
    /// [`Self::run`] so tests can drive a handful of transactions.
    pub fn process_one(&mut self) -> io::Result<()> {
        if !self.reset.is_io_enabled() {
            self.reset.wait_until_enabled(RESET_POLL_INTERVAL);
        }

        let header_bytes = self.read_exact_with_reset(HEADER_LEN as usize)?;
        let header = match decode_header(&header_bytes) {
            Ok(header) => header,
            Err(error) => {
                warn!("malformed container header: {error}");
                return Ok(());
            }
        };

        if header.container_type != ContainerType::Command {
            warn!("expected a command container, got {:?}", header.container_type);
            return Ok(());
        }

        let payload_len = header.length as usize - HEADER_LEN as usize;
        let payload = self.read_exact_with_reset(payload_len)?;
        let params: Vec<u32> = (0..payload.len() / 4)
            .map(|i| read_le_u32(&payload, i * 4).unwrap_or(0))
            .collect();

        let outcome = match OpCode::from_u16(header.code) {
            Some(opcode) if dispatcher::length_in_range(opcode, header.length) => {
                dispatcher::dispatch(&mut self.session, &mut self.objects, self.encoder.as_ref(), opcode, &params)
            }
            Some(_) => CommandOutcome {
                data: None,
                response_code: ResponseCode::GeneralError,
                response_params: Vec::new(),
            },
            None => dispatcher::unsupported(),
        };

        self.write_outcome(header.code, header.transaction_id, outcome)
    }

    /// Writes the Data container (if any) followed by the Response.
    /// `operation_code` is the Command's own opcode: the original
    /// responder builds each reply by `memcpy`-ing the incoming command
    /// buffer and overwriting only `type`/`length` (ptp.c:1592,1608-1611),
    /// so a Data container's `code` field echoes the operation, not zero.
    fn write_outcome(&mut self, operation_code: u16, transaction_id: u32, outcome: CommandOutcome) -> io::Result<()> {
        if let Some(data) = outcome.data {
            let mut container = Vec::with_capacity(HEADER_LEN as usize + data.len());
            encode_header(
                &mut container,
                ContainerType::Data,
                operation_code,
                transaction_id,
                (HEADER_LEN as usize + data.len()) as u32,
            );
            container.extend_from_slice(&data);
            self.write_resumable(&container)?;
        }

        let mut response = Vec::with_capacity(HEADER_LEN as usize + outcome.response_params.len() * 4);
        encode_header(
            &mut response,
            ContainerType::Response,
            outcome.response_code.code(),
            transaction_id,
            (HEADER_LEN as usize + outcome.response_params.len() * 4) as u32,
        );
        for param in &outcome.response_params {
            crate::wire::encode_le_u32(&mut response, *param);
        }
        self.write_resumable(&response)
    }

    /// Writes `buf` across as many bulk writes as `BULK_BUFFER_SIZE`
    /// requires, exactly the "streamed across multiple bulk writes" clause
    /// for oversized Data-phase payloads.
    fn write_resumable(&mut self, buf: &[u8]) -> io::Result<()> {
        for chunk in buf.chunks(BULK_BUFFER_SIZE) {
            loop {
                match self.transport.write_all(chunk) {
                    Ok(()) => break,
                    Err(error) if error.kind() == io::ErrorKind::Interrupted => {
                        self.reset.wait_until_enabled(RESET_POLL_INTERVAL);
                    }
                    Err(error) => return Err(error),
                }
            }
        }
        Ok(())
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn objects(&self) -> &ObjectTable {
        &self.objects
    }

    pub fn into_objects(self) -> ObjectTable {
        self.objects
    }

    fn read_exact_with_reset(&mut self, total_len: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; total_len];
        let mut filled = 0;
        while filled < total_len {
            match self.transport.read(&mut buf[filled..]) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "bulk transport closed")),
                Ok(n) => filled += n,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {
                    self.reset.wait_until_enabled(RESET_POLL_INTERVAL);
                }
                Err(error) => return Err(error),
            }
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Iso8859ToUcs2Le;
    use crate::ptp_constants::{HANDLE_ROOT, PARAM_UNUSED};
    use crate::transport::FakeBulkTransport;
    use crate::wire::encode_header;

    struct AlwaysSucceeds;
    impl crate::thumbnail::ThumbnailMaker for AlwaysSucceeds {
        fn generate(&self, _source: &std::path::Path, dest: &std::path::Path) -> bool {
            std::fs::write(dest, b"thumb").is_ok()
        }
    }

    fn worker_with(bytes: &[u8]) -> (tempfile::TempDir, BulkWorker<FakeBulkTransport>) {
        let tmp = tempfile::tempdir().unwrap();
        let cache = tmp.path().join("cache");
        let mut objects = ObjectTable::new(
            tmp.path().to_path_buf(),
            cache,
            Arc::new(Iso8859ToUcs2Le),
            Arc::new(AlwaysSucceeds),
        );
        objects.enumerate().unwrap();
        let transport = FakeBulkTransport::with_inbound(bytes);
        let reset = ResetCoordinator::new();
        reset.start_io();
        (tmp, BulkWorker::new(transport, objects, Arc::new(Iso8859ToUcs2Le), reset))
    }

    fn open_session_command(transaction_id: u32) -> Vec<u8> {
        let mut out = Vec::new();
        encode_header(&mut out, ContainerType::Command, OpCode::OpenSession as u16, transaction_id, HEADER_LEN + 4);
        crate::wire::encode_le_u32(&mut out, 1);
        out
    }

    #[test]
    fn open_session_produces_a_single_ok_response() {
        let command = open_session_command(7);
        let (_tmp, mut worker) = worker_with(&command);
        worker.process_one().unwrap();

        let out = &worker.transport.outbound;
        let header = decode_header(out).unwrap();
        assert_eq!(header.container_type, ContainerType::Response);
        assert_eq!(header.code, ResponseCode::Ok.code());
        assert_eq!(header.transaction_id, 7);
        assert_eq!(out.len(), HEADER_LEN as usize);
    }

    #[test]
    fn unknown_opcode_reports_operation_not_supported() {
        let mut command = Vec::new();
        encode_header(&mut command, ContainerType::Command, 0x9999, 1, HEADER_LEN);
        let (_tmp, mut worker) = worker_with(&command);
        worker.process_one().unwrap();

        let header = decode_header(&worker.transport.outbound).unwrap();
        assert_eq!(header.code, ResponseCode::OperationNotSupported.code());
    }

    #[test]
    fn delete_handle_one_is_write_protected_end_to_end() {
        let mut commands = open_session_command(1);
        let mut delete_cmd = Vec::new();
        encode_header(&mut delete_cmd, ContainerType::Command, OpCode::DeleteObject as u16, 2, HEADER_LEN + 8);
        crate::wire::encode_le_u32(&mut delete_cmd, HANDLE_ROOT);
        crate::wire::encode_le_u32(&mut delete_cmd, PARAM_UNUSED);
        commands.extend_from_slice(&delete_cmd);

        let (_tmp, mut worker) = worker_with(&commands);
        worker.process_one().unwrap();
        worker.transport.outbound.clear();
        worker.process_one().unwrap();

        let header = decode_header(&worker.transport.outbound).unwrap();
        assert_eq!(header.code, ResponseCode::ObjectWriteProtected.code());
    }

    #[test]
    fn an_interrupted_read_resumes_without_losing_partial_header() {
        let command = open_session_command(3);
        let (_tmp, mut worker) = worker_with(&command);
        worker.transport.interrupt_once = true;
        worker.process_one().unwrap();

        let header = decode_header(&worker.transport.outbound).unwrap();
        assert_eq!(header.code, ResponseCode::Ok.code());
    }
}
