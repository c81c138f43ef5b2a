use prism_protocol::{
    CmdWriter, TextureFormat, VertexAttr, VertexBufferBinding, VertexFormat, VertexSemantic,
    COMMAND_ABI_VERSION, USAGE_RENDER_TARGET, USAGE_VERTEX_BUFFER,
};
use prism_trace::{Recorder, TraceMeta, TraceWriter};
use prism_trace_replay::{event_tree_to_json, replay_trace};
use std::io::{Cursor, Seek, SeekFrom, Write};

fn triangle_stream(color: [f32; 4]) -> Vec<u8> {
    const RT: u32 = 1;
    const VB: u32 = 2;
    const IL: u32 = 3;

    let mut verts = Vec::new();
    for pos in [[-1.0f32, -1.0, 0.0], [-1.0, 3.0, 0.0], [3.0, -1.0, 0.0]] {
        for v in pos {
            verts.extend_from_slice(&v.to_le_bytes());
        }
        for v in color {
            verts.extend_from_slice(&v.to_le_bytes());
        }
    }

    let mut w = CmdWriter::new();
    w.create_texture2d(RT, USAGE_RENDER_TARGET, TextureFormat::R8G8B8A8Unorm, 32, 32);
    w.set_render_targets(&[RT], 0);
    w.clear(prism_protocol::ClearFlags::COLOR, [0.0, 0.0, 0.0, 1.0], 1.0);
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
    w.finish()
}

fn two_frame_capture() -> Vec<u8> {
    let meta = TraceMeta::new("0.1.0-test", COMMAND_ABI_VERSION);
    let mut recorder = Recorder::new(Vec::<u8>::new(), &meta).unwrap();
    for color in [[1.0, 0.0, 0.0, 1.0], [0.0, 1.0, 0.0, 1.0]] {
        recorder.begin_frame().unwrap();
        recorder.submit(&triangle_stream(color), 0).unwrap();
        recorder.present().unwrap();
    }
    recorder.finish().unwrap()
}

#[test]
fn replay_reports_one_digest_per_presented_frame() {
    let frames = replay_trace(Cursor::new(two_frame_capture())).unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].frame_index, 0);
    assert_eq!(frames[1].frame_index, 1);
    assert_eq!((frames[0].width, frames[0].height), (32, 32));
    // Different colors, different images.
    assert_ne!(frames[0].sha256(), frames[1].sha256());
    assert_eq!(frames[0].sha256().len(), 64);
}

#[test]
fn replay_digests_are_deterministic_across_runs() {
    let bytes = two_frame_capture();
    let first = replay_trace(Cursor::new(bytes.clone())).unwrap();
    let second = replay_trace(Cursor::new(bytes)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn replay_works_from_a_real_file() {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(&two_frame_capture()).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    let frames = replay_trace(file).unwrap();
    assert_eq!(frames.len(), 2);
}

#[test]
fn empty_capture_replays_to_no_frames() {
    let meta = TraceMeta::new("0.1.0-test", COMMAND_ABI_VERSION);
    let writer = TraceWriter::new(Vec::<u8>::new(), &meta).unwrap();
    let bytes = writer.finish().unwrap();
    let frames = replay_trace(Cursor::new(bytes)).unwrap();
    assert!(frames.is_empty());
}

#[test]
fn event_tree_json_carries_markers_and_actions() {
    let controller =
        prism_trace_replay::open_controller(Cursor::new(two_frame_capture())).unwrap();
    let tree = event_tree_to_json(controller.event_tree());
    let nodes = tree.as_array().unwrap();
    // Per frame: Clear root, marker root, Present root.
    assert_eq!(nodes.len(), 6);
    let marker = &nodes[1];
    assert_eq!(marker["type"], "marker");
    assert_eq!(marker["label"], "Scene");
    let children = marker["children"].as_array().unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0]["type"], "action");
    assert_eq!(children[0]["name"], "Draw(3)");
    assert_eq!(children[0]["kind"], "Draw");
}
