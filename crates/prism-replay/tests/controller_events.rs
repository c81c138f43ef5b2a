mod common;

use common::*;
use prism_replay::{ActionKind, EventId, EventNode, ReplayError};

#[test]
fn every_command_consumes_an_event_id() {
    let controller = single_frame_controller(emit_red_triangle_scene);
    // 4 target-setup commands + 9 draw-path commands (see common).
    assert_eq!(controller.last_event(), EventId(13));
}

#[test]
fn actions_carry_names_frames_and_marker_paths() {
    let controller = single_frame_controller(emit_red_triangle_scene);
    let actions = controller.actions();
    let names: Vec<&str> = actions.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["Clear(Color)", "Draw(3)", "Present()"]);

    let draw = &actions[1];
    assert_eq!(draw.kind, ActionKind::Draw);
    assert_eq!(draw.frame_index, 0);
    assert_eq!(draw.marker_path, vec!["Scene".to_string()]);
}

#[test]
fn find_draw_matches_by_substring() {
    let controller = single_frame_controller(emit_red_triangle_scene);
    let draw = controller.find_draw("Draw").expect("draw must be found");
    assert_eq!(draw.name, "Draw(3)");
    // Full names match too.
    assert!(controller.find_draw("Draw(3)").is_some());
    assert!(controller.find_draw("Clear").is_some());
}

#[test]
fn find_draw_returns_first_of_duplicate_names() {
    let controller = single_frame_controller(|w| {
        emit_target_setup(w, prism_protocol::TextureFormat::R8G8B8A8Unorm);
        let verts = fullscreen_triangle(0.0, RED);
        w.create_buffer(VB, prism_protocol::USAGE_VERTEX_BUFFER, verts.len() as u64);
        w.upload_resource(VB, 0, &verts);
        w.create_input_layout(IL, &pos_color_layout());
        w.set_input_layout(IL);
        w.set_vertex_buffers(
            0,
            &[prism_protocol::VertexBufferBinding {
                buffer: VB,
                stride_bytes: POS_COLOR_STRIDE,
                offset_bytes: 0,
            }],
        );
        w.draw(3, 1, 0);
        w.draw(3, 1, 0);
        w.present(0);
    });
    let first = controller.find_draw("Draw(3)").unwrap();
    let all: Vec<_> = controller
        .actions()
        .iter()
        .filter(|a| a.name == "Draw(3)")
        .collect();
    assert_eq!(all.len(), 2);
    assert_eq!(first.event_id, all[0].event_id);
    assert!(all[0].event_id < all[1].event_id);
}

#[test]
fn find_draw_is_case_sensitive_and_absent_is_none() {
    let controller = single_frame_controller(emit_red_triangle_scene);
    assert!(controller.find_draw("draw").is_none());
    assert!(controller.find_draw("NoSuchLabel").is_none());
}

#[test]
fn event_tree_groups_actions_under_markers() {
    let controller = single_frame_controller(emit_red_triangle_scene);
    let tree = controller.event_tree();
    // Clear(Color) root, "Scene" marker root, Present() root.
    assert_eq!(tree.len(), 3);
    let EventNode::Marker {
        label, children, ..
    } = &tree[1]
    else {
        panic!("expected a marker node, got {:?}", tree[1]);
    };
    assert_eq!(label, "Scene");
    assert_eq!(children.len(), 1);
    assert!(matches!(
        &children[0],
        EventNode::Action { name, .. } if name == "Draw(3)"
    ));
}

#[test]
fn event_ids_continue_across_frames() {
    let controller = multi_frame_controller(vec![
        Box::new(emit_red_triangle_scene),
        Box::new(emit_red_triangle_scene),
    ]);
    let presents: Vec<_> = controller
        .actions()
        .iter()
        .filter(|a| a.kind == ActionKind::Present)
        .collect();
    assert_eq!(presents.len(), 2);
    assert_eq!(presents[0].frame_index, 0);
    assert_eq!(presents[1].frame_index, 1);
    assert!(presents[0].event_id < presents[1].event_id);
    assert_eq!(controller.last_event(), EventId(26));
}

#[test]
fn set_frame_event_rejects_ids_outside_the_capture() {
    let mut controller = single_frame_controller(emit_red_triangle_scene);
    let err = controller.set_frame_event(EventId(0), false).unwrap_err();
    assert!(matches!(err, ReplayError::UnknownEvent(EventId(0))));
    let err = controller.set_frame_event(EventId(99), false).unwrap_err();
    assert!(matches!(err, ReplayError::UnknownEvent(EventId(99))));
}

#[test]
fn duplicate_create_handle_fails_replay_at_the_offending_event() {
    let mut controller = single_frame_controller(|w| {
        w.create_buffer(VB, 0, 16);
        w.create_buffer(VB, 0, 16);
        w.nop();
    });
    let err = controller.set_frame_event(EventId(3), false).unwrap_err();
    let ReplayError::Exec { event, .. } = err else {
        panic!("expected exec error, got {err:?}");
    };
    assert_eq!(event, EventId(2));

    // The failed seek cleared the position; seeking to the healthy prefix
    // starts over and succeeds.
    assert_eq!(controller.position(), None);
    controller.set_frame_event(EventId(1), false).unwrap();
    assert_eq!(controller.position(), Some(EventId(1)));
}
