mod common;

use common::*;
use prism_protocol::{
    ClearFlags, CompareFunc, CullMode, TextureFormat, VertexBufferBinding,
    USAGE_RENDER_TARGET, USAGE_VERTEX_BUFFER,
};
use prism_replay::{ReplayError, ResourceId};

const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// One scene exercising every rejection path at the probed pixel (32, 32):
/// clear, a passing draw, a scissored draw, a culled draw, a depth-failed
/// draw, and a final passing draw.
fn emit_history_scene(w: &mut prism_protocol::CmdWriter) {
    w.create_texture2d(RT, USAGE_RENDER_TARGET, TextureFormat::R8G8B8A8Unorm, 64, 64);
    emit_depth_target(w);
    w.clear(ClearFlags::COLOR | ClearFlags::DEPTH, BLACK, 1.0);
    w.set_depth_state(true, true, CompareFunc::LessEqual);
    w.create_input_layout(IL, &pos_color_layout());
    w.set_input_layout(IL);

    let draws: [(u32, [f32; 4], f32); 5] = [
        (10, GREEN, 0.3),
        (11, RED, 0.2),
        (12, BLUE, 0.2),
        (13, WHITE, 0.9),
        (14, RED, 0.1),
    ];
    for (handle, color, z) in draws {
        let verts = fullscreen_triangle(z, color);
        w.create_buffer(handle, USAGE_VERTEX_BUFFER, verts.len() as u64);
        w.upload_resource(handle, 0, &verts);
    }

    let bind = |w: &mut prism_protocol::CmdWriter, handle: u32| {
        w.set_vertex_buffers(
            0,
            &[VertexBufferBinding {
                buffer: handle,
                stride_bytes: POS_COLOR_STRIDE,
                offset_bytes: 0,
            }],
        );
    };

    bind(w, 10);
    w.draw(3, 1, 0); // passes

    w.set_rasterizer_state(CullMode::None, false, true);
    w.set_scissor(0, 0, 8, 8);
    bind(w, 11);
    w.draw(3, 1, 0); // scissored away from the probe

    w.set_rasterizer_state(CullMode::Front, false, false);
    bind(w, 12);
    w.draw(3, 1, 0); // culled (clockwise is front while front_ccw=false)

    w.set_rasterizer_state(CullMode::None, false, false);
    bind(w, 13);
    w.draw(3, 1, 0); // fails the depth test (0.9 > 0.3)

    bind(w, 14);
    w.draw(3, 1, 0); // passes

    w.present(0);
}

#[test]
fn history_records_every_touch_with_the_right_rejection_flags() {
    let mut controller = single_frame_controller(emit_history_scene);
    let last = controller.last_event();
    controller.set_frame_event(last, false).unwrap();

    let mods = controller.pixel_history(ResourceId(RT), 32, 32).unwrap();
    assert_eq!(mods.len(), 6, "mods: {mods:#?}");

    // Clear.
    assert!(mods[0].passed());
    assert_eq!(mods[0].shader_out.color, BLACK);
    assert_eq!(mods[0].post_mod.color, BLACK);
    assert_eq!(mods[0].post_mod.depth, 1.0);

    // Passing green draw.
    assert!(mods[1].passed());
    assert_eq!(mods[1].pre_mod.color, BLACK);
    assert_eq!(mods[1].shader_out.color, GREEN);
    assert_eq!(mods[1].post_mod.color, GREEN);
    assert!((mods[1].post_mod.depth - 0.3).abs() < 1e-6);

    // Scissored red draw: no change, flag set.
    assert!(mods[2].scissor_clipped);
    assert!(!mods[2].passed());
    assert_eq!(mods[2].pre_mod.color, mods[2].post_mod.color);
    assert_eq!(mods[2].post_mod.color, GREEN);

    // Culled blue draw.
    assert!(mods[3].backface_culled);
    assert_eq!(mods[3].post_mod.color, GREEN);

    // Depth-failed white draw still shows what the shader produced.
    assert!(mods[4].depth_test_failed);
    assert_eq!(mods[4].shader_out.color, WHITE);
    assert!((mods[4].shader_out.depth - 0.9).abs() < 1e-6);
    assert_eq!(mods[4].post_mod.color, GREEN);

    // Final passing red draw.
    assert!(mods[5].passed());
    assert_eq!(mods[5].post_mod.color, RED);
    assert!((mods[5].post_mod.depth - 0.1).abs() < 1e-6);

    // Event ids are strictly increasing and every flagged event is real.
    for pair in mods.windows(2) {
        assert!(pair[0].event_id < pair[1].event_id);
    }
}

#[test]
fn history_chains_pre_mod_to_the_previous_post_mod() {
    let mut controller = single_frame_controller(emit_history_scene);
    let last = controller.last_event();
    controller.set_frame_event(last, false).unwrap();

    let mods = controller.pixel_history(ResourceId(RT), 32, 32).unwrap();
    for pair in mods.windows(2) {
        assert_eq!(pair[0].post_mod.color, pair[1].pre_mod.color);
    }
}

#[test]
fn history_stops_at_the_current_replay_position() {
    let mut controller = single_frame_controller(emit_history_scene);
    let first_draw = controller.find_draw("Draw(3)").unwrap().event_id;
    controller.set_frame_event(first_draw, false).unwrap();

    let mods = controller.pixel_history(ResourceId(RT), 32, 32).unwrap();
    assert_eq!(mods.len(), 2); // clear + first draw
    assert!(mods.iter().all(|m| m.event_id <= first_draw));
}

#[test]
fn history_leaves_the_replay_position_and_state_alone() {
    let mut controller = single_frame_controller(emit_history_scene);
    let last = controller.last_event();
    controller.set_frame_event(last, false).unwrap();
    let pipe_before = controller.pipeline_state().unwrap().clone();
    let pixel_before = controller.read_pixel(ResourceId(RT), 32, 32).unwrap();

    controller.pixel_history(ResourceId(RT), 32, 32).unwrap();

    assert_eq!(controller.position(), Some(last));
    assert_eq!(controller.pipeline_state().unwrap(), &pipe_before);
    assert_eq!(
        controller.read_pixel(ResourceId(RT), 32, 32).unwrap(),
        pixel_before
    );
}

#[test]
fn history_on_the_depth_target_tracks_depth_writes() {
    let mut controller = single_frame_controller(emit_history_scene);
    let last = controller.last_event();
    controller.set_frame_event(last, false).unwrap();

    let mods = controller.pixel_history(ResourceId(DEPTH), 32, 32).unwrap();
    let passed: Vec<_> = mods.iter().filter(|m| m.passed()).collect();
    // Clear, green draw, final red draw.
    assert_eq!(passed.len(), 3);
    assert!((passed[2].post_mod.depth - 0.1).abs() < 1e-6);
}

#[test]
fn history_requires_a_replay_position_and_valid_coords() {
    let mut controller = single_frame_controller(emit_history_scene);
    assert!(matches!(
        controller.pixel_history(ResourceId(RT), 0, 0),
        Err(ReplayError::NoReplayPosition)
    ));

    let last = controller.last_event();
    controller.set_frame_event(last, false).unwrap();
    assert!(matches!(
        controller.pixel_history(ResourceId(RT), 64, 64),
        Err(ReplayError::PixelOutOfRange { .. })
    ));
    assert!(matches!(
        controller.pixel_history(ResourceId(77), 0, 0),
        Err(ReplayError::UnknownResource(ResourceId(77)))
    ));
}

#[test]
fn history_at_an_untouched_pixel_only_sees_the_clear() {
    let mut controller = single_frame_controller(|w| {
        emit_target_setup(w, TextureFormat::R8G8B8A8Unorm);
        // Tiny triangle in the top-left corner; probe far away.
        let verts = triangle_verts(
            &[[-1.0, 1.0, 0.0], [-0.9, 1.0, 0.0], [-1.0, 0.9, 0.0]],
            RED,
        );
        emit_triangle_draw(w, &verts);
    });
    let last = controller.last_event();
    controller.set_frame_event(last, false).unwrap();
    let mods = controller.pixel_history(ResourceId(RT), 60, 60).unwrap();
    assert_eq!(mods.len(), 1);
    assert!(mods[0].passed());
}
