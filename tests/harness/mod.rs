//! Shared helpers for the end-to-end capture checks.

#![allow(dead_code)]

use prism::protocol::{
    ClearFlags, CmdWriter, TextureFormat, VertexAttr, VertexBufferBinding, VertexFormat,
    VertexSemantic, COMMAND_ABI_VERSION, USAGE_RENDER_TARGET, USAGE_VERTEX_BUFFER,
};
use prism::replay::ReplayController;
use prism::trace::{Recorder, TraceMeta, TraceReader};
use std::io::Cursor;

pub const RT: u32 = 1;
pub const VB: u32 = 2;
pub const IL: u32 = 3;

pub const OPAQUE_RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];

pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A single-frame capture: a 64x64 framebuffer cleared to black, then one
/// fullscreen red triangle drawn inside a "Scene" marker and presented.
pub fn red_triangle_capture() -> Vec<u8> {
    let mut verts = Vec::new();
    for pos in [[-1.0f32, -1.0, 0.0], [-1.0, 3.0, 0.0], [3.0, -1.0, 0.0]] {
        for v in pos {
            verts.extend_from_slice(&v.to_le_bytes());
        }
        for v in OPAQUE_RED {
            verts.extend_from_slice(&v.to_le_bytes());
        }
    }

    let mut w = CmdWriter::new();
    w.create_texture2d(RT, USAGE_RENDER_TARGET, TextureFormat::R8G8B8A8Unorm, 64, 64);
    w.set_render_targets(&[RT], 0);
    w.set_viewport(0.0, 0.0, 64.0, 64.0, 0.0, 1.0);
    w.clear(ClearFlags::COLOR, [0.0, 0.0, 0.0, 1.0], 1.0);
    w.create_buffer(VB, USAGE_VERTEX_BUFFER, verts.len() as u64);
    w.upload_resource(VB, 0, &verts);
    w.create_input_layout(
        IL,
        &[
            VertexAttr {
                semantic: VertexSemantic::Position,
                format: VertexFormat::F32x3,
                offset_bytes: 0,
            },
            VertexAttr {
                semantic: VertexSemantic::Color,
                format: VertexFormat::F32x4,
                offset_bytes: 12,
            },
        ],
    );
    w.set_input_layout(IL);
    w.set_vertex_buffers(
        0,
        &[VertexBufferBinding {
            buffer: VB,
            stride_bytes: 28,
            offset_bytes: 0,
        }],
    );
    w.begin_marker("Scene");
    w.draw(3, 1, 0);
    w.end_marker();
    w.present(0);
    let stream = w.finish();

    let meta = TraceMeta::new(env!("CARGO_PKG_VERSION"), COMMAND_ABI_VERSION);
    let mut recorder = Recorder::new(Vec::<u8>::new(), &meta).expect("recorder");
    recorder.begin_frame().expect("begin frame");
    recorder.submit(&stream, 0).expect("submit");
    recorder.present().expect("present");
    recorder.finish().expect("finish")
}

pub fn open_capture(bytes: Vec<u8>) -> ReplayController {
    let reader = TraceReader::open(Cursor::new(bytes)).expect("capture must open");
    ReplayController::open(reader).expect("capture must replay-decode")
}
