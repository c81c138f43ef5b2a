//! Library entry points for the trace-replay CLI: whole-capture replay with
//! per-frame digests, plus JSON projections of events and pixel history.

use prism_replay::{
    EventNode, ModValue, PixelModification, ReplayController, ReplayError,
};
use prism_trace::{TraceReadError, TraceReader};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::io::{Read, Seek};

#[derive(Debug, thiserror::Error)]
pub enum ReplayTraceError {
    #[error(transparent)]
    Trace(#[from] TraceReadError),

    #[error(transparent)]
    Replay(#[from] ReplayError),
}

/// One presented frame of a replayed capture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayedFrame {
    pub frame_index: u32,
    pub width: u32,
    pub height: u32,
    pub rgba8: Vec<u8>,
}

impl ReplayedFrame {
    /// Hex SHA-256 digest over the frame extent and RGBA8 contents.
    pub fn sha256(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.width.to_le_bytes());
        hasher.update(self.height.to_le_bytes());
        hasher.update(&self.rgba8);
        let digest = hasher.finalize();
        let mut out = String::with_capacity(64);
        for byte in digest {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}

/// Replay every frame of a capture and return the presented images.
pub fn replay_trace<R: Read + Seek>(reader: R) -> Result<Vec<ReplayedFrame>, ReplayTraceError> {
    let mut controller = open_controller(reader)?;
    let last = controller.last_event();
    if last.0 == 0 {
        return Ok(Vec::new());
    }
    controller.set_frame_event(last, false)?;
    Ok(controller
        .presented_frames()
        .iter()
        .map(|f| ReplayedFrame {
            frame_index: f.frame_index,
            width: f.width,
            height: f.height,
            rgba8: f.rgba8.clone(),
        })
        .collect())
}

pub fn open_controller<R: Read + Seek>(reader: R) -> Result<ReplayController, ReplayTraceError> {
    let reader = TraceReader::open(reader)?;
    Ok(ReplayController::open(reader)?)
}

/// Event tree as JSON, one object per marker/action node.
pub fn event_tree_to_json(nodes: &[EventNode]) -> Value {
    Value::Array(nodes.iter().map(event_node_to_json).collect())
}

fn event_node_to_json(node: &EventNode) -> Value {
    match node {
        EventNode::Marker {
            event_id,
            label,
            children,
        } => json!({
            "event_id": event_id.0,
            "type": "marker",
            "label": label,
            "children": event_tree_to_json(children),
        }),
        EventNode::Action {
            event_id,
            name,
            kind,
        } => json!({
            "event_id": event_id.0,
            "type": "action",
            "kind": format!("{kind:?}"),
            "name": name,
        }),
    }
}

pub fn history_to_json(mods: &[PixelModification]) -> Value {
    Value::Array(
        mods.iter()
            .map(|m| {
                json!({
                    "event_id": m.event_id.0,
                    "passed": m.passed(),
                    "backface_culled": m.backface_culled,
                    "scissor_clipped": m.scissor_clipped,
                    "depth_test_failed": m.depth_test_failed,
                    "pre_mod": mod_value_to_json(&m.pre_mod),
                    "shader_out": mod_value_to_json(&m.shader_out),
                    "post_mod": mod_value_to_json(&m.post_mod),
                })
            })
            .collect(),
    )
}

fn mod_value_to_json(value: &ModValue) -> Value {
    json!({ "color": value.color, "depth": value.depth })
}
