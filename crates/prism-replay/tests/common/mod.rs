//! Shared helpers for `prism-replay` integration tests.
//!
//! Captures are authored in memory with `CmdWriter` + `Recorder` and opened
//! straight from a cursor, so tests never touch the filesystem.

#![allow(dead_code)]

use prism_protocol::{
    CmdWriter, TextureFormat, VertexAttr, VertexBufferBinding, VertexFormat, VertexSemantic,
    COMMAND_ABI_VERSION, USAGE_DEPTH_STENCIL, USAGE_RENDER_TARGET, USAGE_TEXTURE,
    USAGE_VERTEX_BUFFER,
};
use prism_replay::ReplayController;
use prism_trace::{Recorder, TraceMeta, TraceReader};
use std::io::Cursor;

pub const RT: u32 = 1;
pub const VB: u32 = 2;
pub const IL: u32 = 3;
pub const DEPTH: u32 = 4;
pub const TEX: u32 = 5;
pub const IB: u32 = 6;

pub const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
pub const GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
pub const BLUE: [f32; 4] = [0.0, 0.0, 1.0, 1.0];
pub const BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Wrap one command stream into a single-frame capture and open it.
pub fn single_frame_controller(build: impl FnOnce(&mut CmdWriter)) -> ReplayController {
    multi_frame_controller(vec![Box::new(build)])
}

/// Wrap one command stream per frame into a capture and open it.
pub fn multi_frame_controller(
    frames: Vec<Box<dyn FnOnce(&mut CmdWriter) + '_>>,
) -> ReplayController {
    ReplayController::open(TraceReader::open(Cursor::new(capture_bytes(frames))).unwrap()).unwrap()
}

pub fn capture_bytes(frames: Vec<Box<dyn FnOnce(&mut CmdWriter) + '_>>) -> Vec<u8> {
    let meta = TraceMeta::new("0.1.0-test", COMMAND_ABI_VERSION);
    let mut recorder = Recorder::new(Vec::<u8>::new(), &meta).unwrap();
    for build in frames {
        let mut w = CmdWriter::new();
        build(&mut w);
        recorder.begin_frame().unwrap();
        recorder.submit(&w.finish(), 0).unwrap();
        recorder.present().unwrap();
    }
    recorder.finish().unwrap()
}

pub fn pos_color_layout() -> [VertexAttr; 2] {
    [
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
    ]
}

pub const POS_COLOR_STRIDE: u32 = 28;

/// Vertices covering the whole viewport with one triangle (clockwise in
/// screen space), each `[x, y, z, r, g, b, a]`.
pub fn fullscreen_triangle(z: f32, color: [f32; 4]) -> Vec<u8> {
    triangle_verts(&[[-1.0, -1.0, z], [-1.0, 3.0, z], [3.0, -1.0, z]], color)
}

pub fn triangle_verts(positions: &[[f32; 3]; 3], color: [f32; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(3 * POS_COLOR_STRIDE as usize);
    for pos in positions {
        for v in pos {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in color {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    out
}

/// The standard scene: a 64x64 RGBA8 render target cleared to black, then a
/// fullscreen red triangle drawn inside a marker region.
pub fn emit_red_triangle_scene(w: &mut CmdWriter) {
    emit_target_setup(w, TextureFormat::R8G8B8A8Unorm);
    emit_triangle_draw(w, &fullscreen_triangle(0.0, RED));
}

pub fn emit_target_setup(w: &mut CmdWriter, format: TextureFormat) {
    w.create_texture2d(RT, USAGE_RENDER_TARGET, format, 64, 64);
    w.set_render_targets(&[RT], 0);
    w.set_viewport(0.0, 0.0, 64.0, 64.0, 0.0, 1.0);
    w.clear(prism_protocol::ClearFlags::COLOR, BLACK, 1.0);
}

pub fn emit_triangle_draw(w: &mut CmdWriter, verts: &[u8]) {
    w.create_buffer(VB, USAGE_VERTEX_BUFFER, verts.len() as u64);
    w.upload_resource(VB, 0, verts);
    w.create_input_layout(IL, &pos_color_layout());
    w.set_input_layout(IL);
    w.set_vertex_buffers(
        0,
        &[VertexBufferBinding {
            buffer: VB,
            stride_bytes: POS_COLOR_STRIDE,
            offset_bytes: 0,
        }],
    );
    w.begin_marker("Scene");
    w.draw(3, 1, 0);
    w.end_marker();
    w.present(0);
}

pub fn emit_depth_target(w: &mut CmdWriter) {
    w.create_texture2d(DEPTH, USAGE_DEPTH_STENCIL, TextureFormat::D32Float, 64, 64);
    w.set_render_targets(&[RT], DEPTH);
    w.set_viewport(0.0, 0.0, 64.0, 64.0, 0.0, 1.0);
}

pub fn emit_checker_texture(w: &mut CmdWriter) {
    // 2x2 texture: red, green / blue, white, nearest-sampled by uv.
    let texels: [[u8; 4]; 4] = [
        [255, 0, 0, 255],
        [0, 255, 0, 255],
        [0, 0, 255, 255],
        [255, 255, 255, 255],
    ];
    let mut bytes = Vec::new();
    for t in texels {
        bytes.extend_from_slice(&t);
    }
    w.create_texture2d(TEX, USAGE_TEXTURE, TextureFormat::R8G8B8A8Unorm, 2, 2);
    w.upload_resource(TEX, 0, &bytes);
}
