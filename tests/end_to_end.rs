//! Wire-level scenarios driven straight through the bulk worker against an
//! in-memory transport, the way the original responder's behavior was
//! exercised against a real USB host: one Command container in, one Data
//! (optional) plus Response container out.

use std::sync::Arc;

use ptp_gadget_responder::bulk_worker::BulkWorker;
use ptp_gadget_responder::encoding::Iso8859ToUcs2Le;
use ptp_gadget_responder::object_store::ObjectTable;
use ptp_gadget_responder::ptp_constants::{
    ContainerType, OpCode, ResponseCode, HANDLE_MODEL_DIR, HANDLE_ROOT, HEADER_LEN, PARAM_ANY, PARAM_UNUSED, STORE_ID,
};
use ptp_gadget_responder::reset::ResetCoordinator;
use ptp_gadget_responder::thumbnail::ThumbnailMaker;
use ptp_gadget_responder::transport::FakeBulkTransport;
use ptp_gadget_responder::wire::{decode_header, encode_header, encode_le_u32, Header};

struct StubThumbnailer;
impl ThumbnailMaker for StubThumbnailer {
    fn generate(&self, _source: &std::path::Path, dest: &std::path::Path) -> bool {
        std::fs::write(dest, b"thumb-bytes").is_ok()
    }
}

fn command(opcode: OpCode, transaction_id: u32, params: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    let length = HEADER_LEN + params.len() as u32 * 4;
    encode_header(&mut out, ContainerType::Command, opcode as u16, transaction_id, length);
    for param in params {
        encode_le_u32(&mut out, *param);
    }
    out
}

fn raw_command(code: u16, transaction_id: u32) -> Vec<u8> {
    let mut out = Vec::new();
    encode_header(&mut out, ContainerType::Command, code, transaction_id, HEADER_LEN);
    out
}

fn build_objects(image_count: usize) -> (tempfile::TempDir, ObjectTable) {
    let tmp = tempfile::tempdir().unwrap();
    for i in 0..image_count {
        std::fs::write(tmp.path().join(format!("img{i}.jpg")), format!("jpeg-bytes-{i}")).unwrap();
    }
    let cache = tmp.path().join("cache");
    let mut objects = ObjectTable::new(
        tmp.path().to_path_buf(),
        cache,
        Arc::new(Iso8859ToUcs2Le),
        Arc::new(StubThumbnailer),
    );
    objects.enumerate().unwrap();
    (tmp, objects)
}

fn new_worker(objects: ObjectTable, bytes: &[u8]) -> BulkWorker<FakeBulkTransport> {
    let reset = ResetCoordinator::new();
    reset.start_io();
    BulkWorker::new(FakeBulkTransport::with_inbound(bytes), objects, Arc::new(Iso8859ToUcs2Le), reset)
}

/// Runs a single command through a fresh worker and returns the raw bytes
/// written back (Data container, if any, followed by the Response) plus
/// the object table afterward.
fn drive_one(objects: ObjectTable, command_bytes: &[u8]) -> (Vec<u8>, ObjectTable) {
    let mut worker = new_worker(objects, command_bytes);
    worker.process_one().unwrap();
    let out = worker.transport_mut().outbound.clone();
    (out, worker.into_objects())
}

fn headers_in(bytes: &[u8]) -> Vec<Header> {
    let mut headers = Vec::new();
    let mut offset = 0;
    while offset + HEADER_LEN as usize <= bytes.len() {
        let header = decode_header(&bytes[offset..]).unwrap();
        offset += header.length as usize;
        headers.push(header);
    }
    headers
}

fn u32_param_at(bytes: &[u8], container_offset: usize, param_index: usize) -> u32 {
    let start = container_offset + HEADER_LEN as usize + param_index * 4;
    u32::from_le_bytes(bytes[start..start + 4].try_into().unwrap())
}

#[test]
fn open_session_ok() {
    let (_tmp, objects) = build_objects(0);
    let (out, _objects) = drive_one(objects, &command(OpCode::OpenSession, 1, &[1]));
    let headers = headers_in(&out);
    assert_eq!(headers.len(), 1);
    assert_eq!(headers[0].container_type, ContainerType::Response);
    assert_eq!(headers[0].code, ResponseCode::Ok.code());
    assert_eq!(headers[0].transaction_id, 1);
}

#[test]
fn open_session_twice_reports_session_already_open() {
    let (_tmp, objects) = build_objects(0);
    let mut commands = command(OpCode::OpenSession, 1, &[1]);
    commands.extend(command(OpCode::OpenSession, 2, &[2]));
    let mut worker = new_worker(objects, &commands);

    worker.process_one().unwrap();
    worker.process_one().unwrap();
    let out = worker.transport_mut().outbound.clone();
    let headers = headers_in(&out);
    assert_eq!(headers[1].code, ResponseCode::SessionAlreadyOpen.code());
}

#[test]
fn get_storage_ids_after_open_lists_the_one_store() {
    let (_tmp, objects) = build_objects(0);
    let (out, _objects) = drive_one(objects, &command(OpCode::GetStorageIds, 5, &[]));
    let headers = headers_in(&out);
    assert_eq!(headers[0].container_type, ContainerType::Data);
    assert_eq!(headers[1].code, ResponseCode::Ok.code());
    let count = u32_param_at(&out, 0, 0);
    let store = u32_param_at(&out, 0, 1);
    assert_eq!(count, 1);
    assert_eq!(store, STORE_ID);
}

#[test]
fn get_object_of_missing_handle_is_invalid_object_handle() {
    let (_tmp, objects) = build_objects(0);
    let (out, _objects) = drive_one(objects, &command(OpCode::GetObject, 9, &[4242]));
    let headers = headers_in(&out);
    assert_eq!(headers.len(), 1);
    assert_eq!(headers[0].code, ResponseCode::InvalidObjectHandle.code());
}

#[test]
fn delete_handle_one_is_object_write_protected() {
    let (_tmp, objects) = build_objects(0);
    let (out, _objects) = drive_one(objects, &command(OpCode::DeleteObject, 3, &[HANDLE_ROOT, PARAM_UNUSED]));
    let headers = headers_in(&out);
    assert_eq!(headers[0].code, ResponseCode::ObjectWriteProtected.code());
}

#[test]
fn unknown_opcode_is_operation_not_supported() {
    let (_tmp, objects) = build_objects(0);
    let (out, _objects) = drive_one(objects, &raw_command(0x9999, 11));
    let headers = headers_in(&out);
    assert_eq!(headers[0].code, ResponseCode::OperationNotSupported.code());
}

#[test]
fn every_command_gets_exactly_one_response() {
    let (_tmp, objects) = build_objects(2);
    let (out, _objects) = drive_one(
        objects,
        &command(OpCode::GetObjectHandles, 4, &[STORE_ID, PARAM_UNUSED, HANDLE_MODEL_DIR]),
    );
    let headers = headers_in(&out);
    let responses = headers.iter().filter(|h| h.container_type == ContainerType::Response).count();
    assert_eq!(responses, 1);
}

#[test]
fn transaction_id_is_echoed_on_every_container() {
    let (_tmp, objects) = build_objects(1);
    let (out, _objects) = drive_one(objects, &command(OpCode::GetDeviceInfo, 77, &[]));
    let headers = headers_in(&out);
    assert!(headers.iter().all(|h| h.transaction_id == 77));
}

#[test]
fn length_out_of_range_is_rejected_without_changing_state() {
    let (_tmp, objects) = build_objects(0);
    // OpenSession requires exactly one 4-byte parameter; send zero.
    let (out, objects) = drive_one(objects, &raw_command(OpCode::OpenSession as u16, 1));
    let headers = headers_in(&out);
    assert_eq!(headers[0].code, ResponseCode::GeneralError.code());

    // The rejected command must not have opened a session: a real
    // OpenSession afterward still succeeds.
    let (out2, _objects) = drive_one(objects, &command(OpCode::OpenSession, 2, &[1]));
    assert_eq!(headers_in(&out2)[0].code, ResponseCode::Ok.code());
}

#[test]
fn get_object_handles_round_trips_through_get_object_info_and_get_object() {
    let (_tmp, objects) = build_objects(1);
    let (handles_out, objects) = drive_one(
        objects,
        &command(OpCode::GetObjectHandles, 1, &[STORE_ID, PARAM_UNUSED, HANDLE_MODEL_DIR]),
    );
    let handle = u32_param_at(&handles_out, 0, 1);

    let (info_out, objects) = drive_one(objects, &command(OpCode::GetObjectInfo, 2, &[handle]));
    assert_eq!(headers_in(&info_out)[1].code, ResponseCode::Ok.code());

    let (object_out, _objects) = drive_one(objects, &command(OpCode::GetObject, 3, &[handle]));
    let object_headers = headers_in(&object_out);
    let object_data_len = (object_headers[0].length - HEADER_LEN) as usize;
    let object_bytes = &object_out[HEADER_LEN as usize..HEADER_LEN as usize + object_data_len];
    assert_eq!(object_bytes, b"jpeg-bytes-0");
}

#[test]
fn get_num_objects_is_idempotent_across_repeated_calls() {
    let (_tmp, objects) = build_objects(3);
    let mut commands = command(OpCode::GetNumObjects, 1, &[STORE_ID, PARAM_UNUSED, PARAM_UNUSED]);
    commands.extend(command(OpCode::GetNumObjects, 2, &[STORE_ID, PARAM_UNUSED, PARAM_UNUSED]));
    let mut worker = new_worker(objects, &commands);
    worker.process_one().unwrap();
    worker.process_one().unwrap();
    let out = worker.transport_mut().outbound.clone();
    let headers = headers_in(&out);
    assert_eq!(headers.len(), 2);
    let first_count = u32_param_at(&out, 0, 0);
    let second_offset = headers[0].length as usize;
    let second_count = u32_param_at(&out, second_offset, 0);
    assert_eq!(first_count, second_count);
    assert_eq!(first_count, 5); // 2 association nodes + 3 images
}

#[test]
fn delete_any_with_only_writable_images_reports_ok_and_empties_the_table() {
    let (_tmp, objects) = build_objects(2);
    let mut commands = command(OpCode::OpenSession, 1, &[1]);
    commands.extend(command(OpCode::DeleteObject, 2, &[PARAM_ANY, PARAM_UNUSED]));
    let mut worker = new_worker(objects, &commands);
    worker.process_one().unwrap();
    worker.process_one().unwrap();
    let out = worker.transport_mut().outbound.clone();
    let headers = headers_in(&out);
    assert_eq!(headers[1].code, ResponseCode::Ok.code());
    let objects = worker.into_objects();
    assert_eq!(objects.object_number(), 2);
}

#[test]
fn reset_mid_transfer_does_not_corrupt_the_next_transaction() {
    let (_tmp, objects) = build_objects(0);
    let command_bytes = command(OpCode::OpenSession, 1, &[1]);
    let reset = ResetCoordinator::new();
    // Start disabled: the worker must wait for `start_io` before it will
    // even attempt to read the pending command.
    let mut worker = BulkWorker::new(FakeBulkTransport::with_inbound(&command_bytes), objects, Arc::new(Iso8859ToUcs2Le), reset.clone());

    let waiter = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(20));
        reset.start_io();
    });
    worker.process_one().unwrap();
    waiter.join().unwrap();

    let out = worker.transport_mut().outbound.clone();
    assert_eq!(headers_in(&out)[0].code, ResponseCode::Ok.code());
}
