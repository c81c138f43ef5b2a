//! Pipeline-state snapshot types.
//!
//! A [`PipeState`] is a read-only projection of the bindings active at one
//! event, recomputed whenever the replay position changes. It resolves raw
//! command-stream handles into [`ResourceId`]s plus enough metadata (format,
//! extent) for callers to drive readback without touching the executor.

use crate::events::EventId;
use crate::resources::ResourceId;
use prism_protocol::{
    BlendFactor, CompareFunc, CullMode, IndexFormat, PrimitiveTopology, TextureFormat, VertexAttr,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputTarget {
    pub resource: ResourceId,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl ScissorRect {
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlendState {
    pub enable: bool,
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            enable: false,
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::Zero,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthState {
    pub depth_enable: bool,
    pub depth_write: bool,
    pub depth_func: CompareFunc,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            depth_enable: false,
            depth_write: false,
            depth_func: CompareFunc::LessEqual,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RasterState {
    pub cull_mode: CullMode,
    pub front_ccw: bool,
    pub scissor_enable: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexStream {
    pub buffer: ResourceId,
    pub stride_bytes: u32,
    pub offset_bytes: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexBinding {
    pub buffer: ResourceId,
    pub format: IndexFormat,
    pub offset_bytes: u32,
}

/// Snapshot of the GPU bindings active immediately after one event.
#[derive(Clone, Debug, PartialEq)]
pub struct PipeState {
    pub event_id: EventId,
    pub(crate) color_targets: Vec<OutputTarget>,
    pub depth_target: Option<OutputTarget>,
    pub viewport: Option<Viewport>,
    pub scissor: Option<ScissorRect>,
    pub topology: PrimitiveTopology,
    pub input_layout: Option<Vec<VertexAttr>>,
    pub vertex_streams: Vec<Option<VertexStream>>,
    pub index_buffer: Option<IndexBinding>,
    /// Texture bound to sampler slot 0, if any.
    pub texture: Option<ResourceId>,
    pub blend: BlendState,
    pub depth: DepthState,
    pub raster: RasterState,
}

impl PipeState {
    /// Ordered color output targets; index 0 is the first bound target.
    pub fn output_targets(&self) -> &[OutputTarget] {
        &self.color_targets
    }
}
