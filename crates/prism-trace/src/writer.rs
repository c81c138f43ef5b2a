use crate::format::{
    BlobKind, FrameTocEntry, RecordType, TraceMeta, CONTAINER_VERSION, FOOTER_MAGIC,
    SUBMISSION_PAYLOAD_SIZE, TOC_ENTRY_SIZE, TOC_HEADER_SIZE, TOC_MAGIC, TOC_VERSION,
    TRACE_BLOB_HEADER_SIZE, TRACE_FOOTER_SIZE, TRACE_HEADER_SIZE, TRACE_MAGIC,
};
use std::io;
use std::io::Write;

#[derive(Debug)]
pub enum TraceWriteError {
    Io(io::Error),
    MetaTooLarge(usize),
    RecordTooLarge(usize),
    /// `begin_frame` while the previous frame is still open.
    FrameAlreadyOpen,
    /// A frame-scoped write (`blob`/`submission`/`present`) outside a frame.
    NoOpenFrame,
}

impl From<io::Error> for TraceWriteError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::fmt::Display for TraceWriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceWriteError::Io(err) => write!(f, "i/o error: {err}"),
            TraceWriteError::MetaTooLarge(len) => {
                write!(f, "meta JSON too large for u32 length: {len} bytes")
            }
            TraceWriteError::RecordTooLarge(len) => {
                write!(f, "record payload too large for u32 length: {len} bytes")
            }
            TraceWriteError::FrameAlreadyOpen => write!(f, "previous frame is still open"),
            TraceWriteError::NoOpenFrame => write!(f, "no open frame"),
        }
    }
}

impl std::error::Error for TraceWriteError {}

/// One captured submission: a command stream plus its submit flags. The
/// writer stores the stream as a blob record and references it from the
/// submission record.
#[derive(Clone, Copy, Debug)]
pub struct SubmissionCapture<'a> {
    pub submit_flags: u32,
    pub cmd_stream_bytes: &'a [u8],
}

/// Append-only container writer. Offsets are tracked internally, so any
/// `Write` sink works (no `Seek` requirement); the TOC and footer are
/// emitted by [`TraceWriter::finish`].
pub struct TraceWriter<W: Write> {
    writer: W,
    offset: u64,
    next_blob_id: u64,
    toc_entries: Vec<FrameTocEntry>,
    open_frame: Option<OpenFrame>,
}

struct OpenFrame {
    frame_index: u32,
    start_offset: u64,
    present_offset: u64,
}

impl<W: Write> TraceWriter<W> {
    pub fn new(mut writer: W, meta: &TraceMeta) -> Result<Self, TraceWriteError> {
        let meta_json = meta.to_json_bytes();
        let meta_len =
            u32::try_from(meta_json.len()).map_err(|_| TraceWriteError::MetaTooLarge(meta_json.len()))?;

        writer.write_all(&TRACE_MAGIC)?;
        write_u32(&mut writer, TRACE_HEADER_SIZE)?;
        write_u32(&mut writer, CONTAINER_VERSION)?;
        write_u32(&mut writer, meta.command_abi_version)?;
        write_u32(&mut writer, 0)?; // flags
        write_u32(&mut writer, meta_len)?;
        write_u32(&mut writer, 0)?; // reserved
        writer.write_all(&meta_json)?;

        Ok(Self {
            writer,
            offset: TRACE_HEADER_SIZE as u64 + meta_json.len() as u64,
            next_blob_id: 1,
            toc_entries: Vec::new(),
            open_frame: None,
        })
    }

    pub fn begin_frame(&mut self, frame_index: u32) -> Result<(), TraceWriteError> {
        if self.open_frame.is_some() {
            return Err(TraceWriteError::FrameAlreadyOpen);
        }
        let start_offset = self.offset;
        self.write_record(RecordType::BeginFrame, &frame_index.to_le_bytes())?;
        self.open_frame = Some(OpenFrame {
            frame_index,
            start_offset,
            present_offset: 0,
        });
        Ok(())
    }

    /// Write a blob record and return its id.
    pub fn write_blob(&mut self, kind: BlobKind, bytes: &[u8]) -> Result<u64, TraceWriteError> {
        if self.open_frame.is_none() {
            return Err(TraceWriteError::NoOpenFrame);
        }
        let blob_id = self.next_blob_id;
        self.next_blob_id += 1;

        let mut payload = Vec::with_capacity(TRACE_BLOB_HEADER_SIZE as usize + bytes.len());
        payload.extend_from_slice(&blob_id.to_le_bytes());
        payload.extend_from_slice(&(kind as u32).to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes()); // reserved
        payload.extend_from_slice(bytes);
        self.write_record(RecordType::Blob, &payload)?;
        Ok(blob_id)
    }

    /// Write a submission: the command stream as a blob, then the submission
    /// record referencing it.
    pub fn write_submission(
        &mut self,
        capture: SubmissionCapture<'_>,
    ) -> Result<(), TraceWriteError> {
        let blob_id = self.write_blob(BlobKind::CmdStream, capture.cmd_stream_bytes)?;

        let mut payload = Vec::with_capacity(SUBMISSION_PAYLOAD_SIZE as usize);
        payload.extend_from_slice(&1u32.to_le_bytes()); // record_version
        payload.extend_from_slice(&capture.submit_flags.to_le_bytes());
        payload.extend_from_slice(&blob_id.to_le_bytes());
        self.write_record(RecordType::Submission, &payload)
    }

    /// Record the frame's present point and close the frame.
    pub fn present(&mut self, frame_index: u32) -> Result<(), TraceWriteError> {
        let Some(frame) = self.open_frame.as_mut() else {
            return Err(TraceWriteError::NoOpenFrame);
        };
        frame.present_offset = self.offset;
        self.write_record(RecordType::Present, &frame_index.to_le_bytes())?;
        self.close_frame();
        Ok(())
    }

    /// Close the current frame without a present (an incomplete capture
    /// tail). The TOC entry keeps `present_offset = 0`.
    pub fn abandon_frame(&mut self) -> Result<(), TraceWriteError> {
        if self.open_frame.is_none() {
            return Err(TraceWriteError::NoOpenFrame);
        }
        self.close_frame();
        Ok(())
    }

    fn close_frame(&mut self) {
        if let Some(frame) = self.open_frame.take() {
            self.toc_entries.push(FrameTocEntry {
                frame_index: frame.frame_index,
                flags: 0,
                start_offset: frame.start_offset,
                present_offset: frame.present_offset,
                end_offset: self.offset,
            });
        }
    }

    /// Emit the TOC and footer, returning the underlying writer.
    pub fn finish(mut self) -> Result<W, TraceWriteError> {
        if self.open_frame.is_some() {
            self.close_frame();
        }

        let toc_offset = self.offset;
        self.writer.write_all(&TOC_MAGIC)?;
        write_u32(&mut self.writer, TOC_VERSION)?;
        write_u32(&mut self.writer, self.toc_entries.len() as u32)?;
        for entry in &self.toc_entries {
            write_u32(&mut self.writer, entry.frame_index)?;
            write_u32(&mut self.writer, entry.flags)?;
            write_u64(&mut self.writer, entry.start_offset)?;
            write_u64(&mut self.writer, entry.present_offset)?;
            write_u64(&mut self.writer, entry.end_offset)?;
        }
        let toc_len = TOC_HEADER_SIZE as u64 + TOC_ENTRY_SIZE as u64 * self.toc_entries.len() as u64;

        self.writer.write_all(&FOOTER_MAGIC)?;
        write_u32(&mut self.writer, TRACE_FOOTER_SIZE)?;
        write_u32(&mut self.writer, CONTAINER_VERSION)?;
        write_u64(&mut self.writer, toc_offset)?;
        write_u64(&mut self.writer, toc_len)?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn write_record(
        &mut self,
        record_type: RecordType,
        payload: &[u8],
    ) -> Result<(), TraceWriteError> {
        let payload_len =
            u32::try_from(payload.len()).map_err(|_| TraceWriteError::RecordTooLarge(payload.len()))?;
        self.writer.write_all(&[record_type as u8, 0])?;
        self.writer.write_all(&0u16.to_le_bytes())?;
        write_u32(&mut self.writer, payload_len)?;
        self.writer.write_all(payload)?;
        self.offset += 8 + payload.len() as u64;
        Ok(())
    }
}

/// Higher-level capture session: frame indices are assigned automatically
/// and every submission lands in the currently open frame.
pub struct Recorder<W: Write> {
    writer: TraceWriter<W>,
    next_frame_index: u32,
}

impl<W: Write> Recorder<W> {
    pub fn new(writer: W, meta: &TraceMeta) -> Result<Self, TraceWriteError> {
        Ok(Self {
            writer: TraceWriter::new(writer, meta)?,
            next_frame_index: 0,
        })
    }

    pub fn begin_frame(&mut self) -> Result<u32, TraceWriteError> {
        let frame_index = self.next_frame_index;
        self.writer.begin_frame(frame_index)?;
        self.next_frame_index += 1;
        Ok(frame_index)
    }

    pub fn submit(&mut self, cmd_stream_bytes: &[u8], submit_flags: u32) -> Result<(), TraceWriteError> {
        self.writer.write_submission(SubmissionCapture {
            submit_flags,
            cmd_stream_bytes,
        })
    }

    pub fn present(&mut self) -> Result<(), TraceWriteError> {
        if self.next_frame_index == 0 {
            return Err(TraceWriteError::NoOpenFrame);
        }
        self.writer.present(self.next_frame_index - 1)
    }

    pub fn finish(self) -> Result<W, TraceWriteError> {
        self.writer.finish()
    }
}

fn write_u32<W: Write>(writer: &mut W, v: u32) -> io::Result<()> {
    writer.write_all(&v.to_le_bytes())
}

fn write_u64<W: Write>(writer: &mut W, v: u64) -> io::Result<()> {
    writer.write_all(&v.to_le_bytes())
}
