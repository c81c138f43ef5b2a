//! Prism capture container.
//!
//! This crate intentionally stays dependency-free and focuses on a stable
//! on-disk format: a fixed header, a meta JSON blob, a stream of
//! length-prefixed records (frames, blobs, submissions), a frame TOC, and a
//! fixed-size footer that locates the TOC.

mod format;
mod reader;
mod writer;

pub use format::{
    BlobKind, FrameTocEntry, RecordType, TraceFooter, TraceHeader, TraceMeta, TraceToc,
    CONTAINER_VERSION, FOOTER_MAGIC, SUBMISSION_PAYLOAD_SIZE, TOC_ENTRY_SIZE, TOC_HEADER_SIZE,
    TOC_MAGIC, TOC_VERSION, TRACE_BLOB_HEADER_SIZE, TRACE_FOOTER_SIZE, TRACE_HEADER_SIZE,
    TRACE_MAGIC, TRACE_RECORD_HEADER_SIZE,
};
pub use reader::{TraceReadError, TraceReader, TraceRecord};
pub use writer::{Recorder, SubmissionCapture, TraceWriteError, TraceWriter};
