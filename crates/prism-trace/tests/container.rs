use prism_trace::{
    BlobKind, Recorder, SubmissionCapture, TraceMeta, TraceReadError, TraceReader, TraceRecord,
    TraceWriteError, TraceWriter, CONTAINER_VERSION, TRACE_FOOTER_SIZE,
};
use std::io::Cursor;

fn meta() -> TraceMeta {
    TraceMeta::new("0.1.0-test", 1)
}

fn two_frame_trace() -> Vec<u8> {
    let mut writer = TraceWriter::new(Vec::<u8>::new(), &meta()).unwrap();
    writer.begin_frame(0).unwrap();
    writer
        .write_submission(SubmissionCapture {
            submit_flags: 0,
            cmd_stream_bytes: b"frame0-stream",
        })
        .unwrap();
    writer.present(0).unwrap();
    writer.begin_frame(1).unwrap();
    writer
        .write_submission(SubmissionCapture {
            submit_flags: 7,
            cmd_stream_bytes: b"frame1-stream",
        })
        .unwrap();
    writer.present(1).unwrap();
    writer.finish().unwrap()
}

#[test]
fn written_trace_opens_with_expected_toc_and_meta() {
    let bytes = two_frame_trace();
    let reader = TraceReader::open(Cursor::new(bytes)).expect("trace must open");

    assert_eq!(reader.header.container_version, CONTAINER_VERSION);
    assert_eq!(reader.header.command_abi_version, 1);
    let meta_json = String::from_utf8(reader.meta_json.clone()).unwrap();
    assert!(meta_json.contains("\"tool_version\":\"0.1.0-test\""));

    let entries = reader.frame_entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].frame_index, 0);
    assert_eq!(entries[1].frame_index, 1);
    assert!(entries[0].start_offset < entries[0].present_offset);
    assert!(entries[0].present_offset < entries[0].end_offset);
    assert_eq!(entries[0].end_offset, entries[1].start_offset);
}

#[test]
fn frame_records_decode_in_order() {
    let bytes = two_frame_trace();
    let mut reader = TraceReader::open(Cursor::new(bytes)).unwrap();
    let entry = reader.frame_entries()[1];
    let records = reader
        .read_records_in_range(entry.start_offset, entry.end_offset)
        .unwrap();

    assert_eq!(records.len(), 4);
    assert_eq!(records[0], TraceRecord::BeginFrame { frame_index: 1 });
    let TraceRecord::Blob {
        blob_id,
        kind,
        ref bytes,
    } = records[1]
    else {
        panic!("expected blob record, got {:?}", records[1]);
    };
    assert_eq!(kind, BlobKind::CmdStream);
    assert_eq!(bytes, b"frame1-stream");
    assert_eq!(
        records[2],
        TraceRecord::Submission {
            record_version: 1,
            submit_flags: 7,
            cmd_stream_blob_id: blob_id,
        }
    );
    assert_eq!(records[3], TraceRecord::Present { frame_index: 1 });
}

#[test]
fn blob_ids_are_unique_across_frames() {
    let bytes = two_frame_trace();
    let mut reader = TraceReader::open(Cursor::new(bytes)).unwrap();
    let mut blob_ids = Vec::new();
    for entry in reader.frame_entries().to_vec() {
        for record in reader
            .read_records_in_range(entry.start_offset, entry.end_offset)
            .unwrap()
        {
            if let TraceRecord::Blob { blob_id, .. } = record {
                blob_ids.push(blob_id);
            }
        }
    }
    blob_ids.sort_unstable();
    blob_ids.dedup();
    assert_eq!(blob_ids.len(), 2);
}

#[test]
fn zero_frame_trace_is_valid() {
    let writer = TraceWriter::new(Vec::<u8>::new(), &meta()).unwrap();
    let bytes = writer.finish().unwrap();
    let reader = TraceReader::open(Cursor::new(bytes)).unwrap();
    assert!(reader.frame_entries().is_empty());
}

#[test]
fn unpresented_frame_keeps_zero_present_offset() {
    let mut writer = TraceWriter::new(Vec::<u8>::new(), &meta()).unwrap();
    writer.begin_frame(0).unwrap();
    writer
        .write_submission(SubmissionCapture {
            submit_flags: 0,
            cmd_stream_bytes: b"tail",
        })
        .unwrap();
    let bytes = writer.finish().unwrap();

    let reader = TraceReader::open(Cursor::new(bytes)).unwrap();
    let entry = reader.frame_entries()[0];
    assert_eq!(entry.present_offset, 0);
    assert!(entry.end_offset > entry.start_offset);
}

#[test]
fn writer_rejects_out_of_frame_writes() {
    let mut writer = TraceWriter::new(Vec::<u8>::new(), &meta()).unwrap();
    let err = writer
        .write_submission(SubmissionCapture {
            submit_flags: 0,
            cmd_stream_bytes: b"x",
        })
        .unwrap_err();
    assert!(matches!(err, TraceWriteError::NoOpenFrame));

    writer.begin_frame(0).unwrap();
    let err = writer.begin_frame(1).unwrap_err();
    assert!(matches!(err, TraceWriteError::FrameAlreadyOpen));
}

#[test]
fn open_rejects_corrupt_header_magic() {
    let mut bytes = two_frame_trace();
    bytes[0] = b'X';
    let err = TraceReader::open(Cursor::new(bytes)).unwrap_err();
    assert!(matches!(err, TraceReadError::InvalidMagic));
}

#[test]
fn open_rejects_unknown_container_version() {
    let mut bytes = two_frame_trace();
    bytes[12..16].copy_from_slice(&99u32.to_le_bytes());
    let err = TraceReader::open(Cursor::new(bytes)).unwrap_err();
    assert!(matches!(err, TraceReadError::UnsupportedContainerVersion(99)));
}

#[test]
fn open_rejects_footer_with_different_version() {
    let mut bytes = two_frame_trace();
    // The footer's container_version lives 12 bytes into the footer.
    let at = bytes.len() - TRACE_FOOTER_SIZE as usize + 12;
    bytes[at..at + 4].copy_from_slice(&2u32.to_le_bytes());
    let err = TraceReader::open(Cursor::new(bytes)).unwrap_err();
    assert!(matches!(err, TraceReadError::UnsupportedContainerVersion(2)));
}

#[test]
fn open_rejects_toc_pointing_outside_file() {
    let mut bytes = two_frame_trace();
    // footer toc_offset at footer + 16
    let at = bytes.len() - TRACE_FOOTER_SIZE as usize + 16;
    bytes[at..at + 8].copy_from_slice(&(u64::MAX / 2).to_le_bytes());
    let err = TraceReader::open(Cursor::new(bytes)).unwrap_err();
    assert!(matches!(err, TraceReadError::TocOutOfBounds));
}

#[test]
fn read_records_rejects_out_of_file_range() {
    let bytes = two_frame_trace();
    let len = bytes.len() as u64;
    let mut reader = TraceReader::open(Cursor::new(bytes)).unwrap();
    let err = reader.read_records_in_range(0, len + 1).unwrap_err();
    assert!(matches!(err, TraceReadError::RecordOutOfBounds));
    let err = reader.read_records_in_range(10, 5).unwrap_err();
    assert!(matches!(err, TraceReadError::RecordOutOfBounds));
}

#[test]
fn recorder_assigns_frame_indices() {
    let mut recorder = Recorder::new(Vec::<u8>::new(), &meta()).unwrap();
    assert_eq!(recorder.begin_frame().unwrap(), 0);
    recorder.submit(b"s0", 0).unwrap();
    recorder.present().unwrap();
    assert_eq!(recorder.begin_frame().unwrap(), 1);
    recorder.submit(b"s1", 0).unwrap();
    recorder.present().unwrap();
    let bytes = recorder.finish().unwrap();

    let reader = TraceReader::open(Cursor::new(bytes)).unwrap();
    let indices: Vec<u32> = reader.frame_entries().iter().map(|e| e.frame_index).collect();
    assert_eq!(indices, vec![0, 1]);
}
