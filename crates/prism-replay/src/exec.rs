//! Deterministic CPU executor for the command stream.
//!
//! Host-side state machine in front of the rasterizer: resource tables keyed
//! by capture handles, bind state, and per-command validation with typed
//! errors. Replaying the same command prefix always reproduces bit-identical
//! resource contents.

use crate::events::EventId;
use crate::history::{ModValue, PixelModification, PixelProbe};
use crate::raster::{
    facing, rasterize_line, rasterize_point, rasterize_triangle, to_screen, triangle_covers_pixel,
    Facing, Fragment, ScreenVertex,
};
use crate::resources::{Buffer, Resource, ResourceId, Texture2d};
use crate::state::{
    BlendState, DepthState, IndexBinding, OutputTarget, PipeState, RasterState, ScissorRect,
    VertexStream, Viewport,
};
use prism_protocol::{
    BlendFactor, ClearFlags, Cmd, CompareFunc, Handle, IndexFormat, PrimitiveTopology,
    VertexAttr, VertexFormat, VertexSemantic, USAGE_DEPTH_STENCIL, USAGE_RENDER_TARGET,
};
use std::collections::HashMap;
use tracing::debug;

/// Caps on untrusted creation sizes, so a corrupt capture cannot ask the
/// replay for absurd allocations.
const MAX_BUFFER_BYTES: u64 = 256 << 20;
const MAX_TEXTURE_DIM: u32 = 16384;

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("null resource handle")]
    NullHandle,

    #[error("resource handle {handle:#x} already in use")]
    HandleInUse { handle: Handle },

    #[error("unknown resource handle {handle:#x}")]
    UnknownResource { handle: Handle },

    #[error("resource {handle:#x} is not a buffer")]
    NotABuffer { handle: Handle },

    #[error("resource {handle:#x} is not a texture")]
    NotATexture { handle: Handle },

    #[error("buffer {handle:#x} size {size_bytes} exceeds the {MAX_BUFFER_BYTES} byte cap")]
    BufferTooLarge { handle: Handle, size_bytes: u64 },

    #[error("texture {handle:#x} extent {width}x{height} is zero or exceeds {MAX_TEXTURE_DIM}")]
    InvalidTextureExtent {
        handle: Handle,
        width: u32,
        height: u32,
    },

    #[error("upload to {handle:#x} out of bounds: offset {offset_bytes} + {len} > {size}")]
    UploadOutOfBounds {
        handle: Handle,
        offset_bytes: u64,
        len: usize,
        size: usize,
    },

    #[error("input layout handle {handle:#x} already in use")]
    InputLayoutInUse { handle: Handle },

    #[error("unknown input layout {handle:#x}")]
    UnknownInputLayout { handle: Handle },

    #[error("target {handle:#x} lacks the usage flag required for this binding")]
    TargetUsageMismatch { handle: Handle },

    #[error("target {handle:#x} format does not match its binding point")]
    TargetFormatMismatch { handle: Handle },

    #[error("bound render targets disagree on extent")]
    TargetExtentMismatch,

    #[error("no render target bound")]
    MissingRenderTarget,

    #[error("depth clear requested with no depth target bound")]
    MissingDepthTarget,

    #[error("draw issued with no input layout bound")]
    MissingInputLayout,

    #[error("input layout has no position attribute")]
    MissingPositionAttribute,

    #[error("position attribute has non-float format")]
    UnsupportedPositionFormat,

    #[error("draw issued with no vertex buffer bound to slot {slot}")]
    MissingVertexStream { slot: u32 },

    #[error("draw issued with zero vertex stride")]
    ZeroVertexStride,

    #[error("draw issued with no index buffer bound")]
    MissingIndexBuffer,

    #[error("vertex {index} read out of bounds in buffer {handle:#x}")]
    VertexFetchOutOfBounds { handle: Handle, index: u64 },

    #[error("index {index} read out of bounds in buffer {handle:#x}")]
    IndexFetchOutOfBounds { handle: Handle, index: u64 },

    #[error("index underflowed base_vertex {base_vertex}")]
    NegativeVertexIndex { base_vertex: i32 },

    #[error("instance_count {count} is not supported (expected 1)")]
    UnsupportedInstanceCount { count: u32 },
}

/// RGBA8 copy of color target 0 taken at a `Present` command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PresentedFrame {
    pub event_id: EventId,
    pub frame_index: u32,
    pub width: u32,
    pub height: u32,
    pub rgba8: Vec<u8>,
}

#[derive(Clone, Copy, Debug)]
struct RawStream {
    buffer: Handle,
    stride_bytes: u32,
    offset_bytes: u32,
}

#[derive(Clone, Copy, Debug)]
struct RawIndexBinding {
    buffer: Handle,
    format: IndexFormat,
    offset_bytes: u32,
}

#[derive(Clone, Debug)]
struct BindState {
    color_targets: Vec<Handle>,
    depth_target: Option<Handle>,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    topology: PrimitiveTopology,
    input_layout: Option<Handle>,
    vertex_streams: Vec<Option<RawStream>>,
    index_buffer: Option<RawIndexBinding>,
    textures: HashMap<u32, Handle>,
    blend: BlendState,
    depth: DepthState,
    raster: RasterState,
}

impl Default for BindState {
    fn default() -> Self {
        Self {
            color_targets: Vec::new(),
            depth_target: None,
            viewport: None,
            scissor: None,
            topology: PrimitiveTopology::TriangleList,
            input_layout: None,
            vertex_streams: Vec::new(),
            index_buffer: None,
            textures: HashMap::new(),
            blend: BlendState::default(),
            depth: DepthState::default(),
            raster: RasterState::default(),
        }
    }
}

/// Assembled vertex in NDC, pre-viewport.
#[derive(Clone, Copy, Debug)]
struct AssembledVertex {
    pos: [f32; 3],
    color: [f32; 4],
    uv: [f32; 2],
}

/// Pixel-space clip region: viewport intersected with the target extent.
/// Geometry is rasterized over the full target and clipped per-pixel here,
/// which matches viewport clipping for the passthrough vertex pipeline.
#[derive(Clone, Copy, Debug)]
struct ClipRect {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl ClipRect {
    fn from_viewport(vp: &Viewport, width: u32, height: u32) -> Self {
        let x0 = vp.x.max(0.0).floor() as u32;
        let y0 = vp.y.max(0.0).floor() as u32;
        let x1 = ((vp.x + vp.width).max(0.0).ceil() as u32).min(width);
        let y1 = ((vp.y + vp.height).max(0.0).ceil() as u32).min(height);
        Self { x0, y0, x1, y1 }
    }

    fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x0 && y >= self.y0 && x < self.x1 && y < self.y1
    }
}

#[derive(Debug, Default)]
pub struct Executor {
    resources: HashMap<Handle, Resource>,
    input_layouts: HashMap<Handle, Vec<VertexAttr>>,
    bind: BindState,
    presented: Vec<PresentedFrame>,
    probe: Option<PixelProbe>,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn presented_frames(&self) -> &[PresentedFrame] {
        &self.presented
    }

    pub fn resource(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(&id.0)
    }

    pub fn texture(&self, id: ResourceId) -> Option<&Texture2d> {
        match self.resources.get(&id.0) {
            Some(Resource::Texture2d(tex)) => Some(tex),
            _ => None,
        }
    }

    pub(crate) fn set_probe(&mut self, probe: PixelProbe) {
        self.probe = Some(probe);
    }

    pub(crate) fn take_probe(&mut self) -> Option<PixelProbe> {
        self.probe.take()
    }

    /// Pipeline-state snapshot for the bindings as of now.
    pub fn snapshot(&self, event_id: EventId) -> PipeState {
        let color_targets = self
            .bind
            .color_targets
            .iter()
            .filter_map(|&h| self.resolve_target(h))
            .collect();
        PipeState {
            event_id,
            color_targets,
            depth_target: self.bind.depth_target.and_then(|h| self.resolve_target(h)),
            viewport: self.bind.viewport,
            scissor: self.bind.scissor,
            topology: self.bind.topology,
            input_layout: self
                .bind
                .input_layout
                .and_then(|h| self.input_layouts.get(&h).cloned()),
            vertex_streams: self
                .bind
                .vertex_streams
                .iter()
                .map(|s| {
                    s.map(|s| VertexStream {
                        buffer: ResourceId(s.buffer),
                        stride_bytes: s.stride_bytes,
                        offset_bytes: s.offset_bytes,
                    })
                })
                .collect(),
            index_buffer: self.bind.index_buffer.map(|ib| IndexBinding {
                buffer: ResourceId(ib.buffer),
                format: ib.format,
                offset_bytes: ib.offset_bytes,
            }),
            texture: self.bind.textures.get(&0).map(|&h| ResourceId(h)),
            blend: self.bind.blend,
            depth: self.bind.depth,
            raster: self.bind.raster,
        }
    }

    fn resolve_target(&self, handle: Handle) -> Option<OutputTarget> {
        match self.resources.get(&handle) {
            Some(Resource::Texture2d(tex)) => Some(OutputTarget {
                resource: ResourceId(handle),
                format: tex.format,
                width: tex.width,
                height: tex.height,
            }),
            _ => None,
        }
    }

    pub fn execute(
        &mut self,
        cmd: &Cmd,
        event_id: EventId,
        frame_index: u32,
    ) -> Result<(), ExecError> {
        match cmd {
            Cmd::Nop | Cmd::BeginMarker { .. } | Cmd::EndMarker => Ok(()),
            Cmd::CreateBuffer {
                handle,
                usage_flags,
                size_bytes,
            } => self.create_buffer(*handle, *usage_flags, *size_bytes),
            Cmd::CreateTexture2d {
                handle,
                usage_flags,
                format,
                width,
                height,
            } => self.create_texture(*handle, *usage_flags, *format, *width, *height),
            Cmd::DestroyResource { handle } => self.destroy_resource(*handle),
            Cmd::UploadResource {
                handle,
                offset_bytes,
                data,
            } => self.upload_resource(*handle, *offset_bytes, data),
            Cmd::CreateInputLayout { handle, attrs } => {
                if *handle == 0 {
                    return Err(ExecError::NullHandle);
                }
                if self.input_layouts.contains_key(handle) {
                    return Err(ExecError::InputLayoutInUse { handle: *handle });
                }
                self.input_layouts.insert(*handle, attrs.clone());
                Ok(())
            }
            Cmd::SetInputLayout { handle } => {
                if !self.input_layouts.contains_key(handle) {
                    return Err(ExecError::UnknownInputLayout { handle: *handle });
                }
                self.bind.input_layout = Some(*handle);
                Ok(())
            }
            Cmd::SetBlendState {
                enable,
                src_factor,
                dst_factor,
            } => {
                self.bind.blend = BlendState {
                    enable: *enable,
                    src_factor: *src_factor,
                    dst_factor: *dst_factor,
                };
                Ok(())
            }
            Cmd::SetDepthState {
                depth_enable,
                depth_write,
                depth_func,
            } => {
                self.bind.depth = DepthState {
                    depth_enable: *depth_enable,
                    depth_write: *depth_write,
                    depth_func: *depth_func,
                };
                Ok(())
            }
            Cmd::SetRasterizerState {
                cull_mode,
                front_ccw,
                scissor_enable,
            } => {
                self.bind.raster = RasterState {
                    cull_mode: *cull_mode,
                    front_ccw: *front_ccw,
                    scissor_enable: *scissor_enable,
                };
                Ok(())
            }
            Cmd::SetRenderTargets { colors, depth } => self.set_render_targets(colors, *depth),
            Cmd::SetViewport {
                x,
                y,
                width,
                height,
                min_depth,
                max_depth,
            } => {
                self.bind.viewport = Some(Viewport {
                    x: *x,
                    y: *y,
                    width: *width,
                    height: *height,
                    min_depth: *min_depth,
                    max_depth: *max_depth,
                });
                Ok(())
            }
            Cmd::SetScissor {
                x,
                y,
                width,
                height,
            } => {
                self.bind.scissor = Some(ScissorRect {
                    x: *x,
                    y: *y,
                    width: *width,
                    height: *height,
                });
                Ok(())
            }
            Cmd::SetVertexBuffers {
                start_slot,
                bindings,
            } => {
                for (i, binding) in bindings.iter().enumerate() {
                    self.require_buffer(binding.buffer)?;
                    let slot = *start_slot as usize + i;
                    if self.bind.vertex_streams.len() <= slot {
                        self.bind.vertex_streams.resize(slot + 1, None);
                    }
                    self.bind.vertex_streams[slot] = Some(RawStream {
                        buffer: binding.buffer,
                        stride_bytes: binding.stride_bytes,
                        offset_bytes: binding.offset_bytes,
                    });
                }
                Ok(())
            }
            Cmd::SetIndexBuffer {
                buffer,
                format,
                offset_bytes,
            } => {
                self.require_buffer(*buffer)?;
                self.bind.index_buffer = Some(RawIndexBinding {
                    buffer: *buffer,
                    format: *format,
                    offset_bytes: *offset_bytes,
                });
                Ok(())
            }
            Cmd::SetPrimitiveTopology { topology } => {
                self.bind.topology = *topology;
                Ok(())
            }
            Cmd::SetTexture { slot, texture } => {
                if *texture == 0 {
                    self.bind.textures.remove(slot);
                    return Ok(());
                }
                match self.resources.get(texture) {
                    Some(Resource::Texture2d(_)) => {
                        self.bind.textures.insert(*slot, *texture);
                        Ok(())
                    }
                    Some(_) => Err(ExecError::NotATexture { handle: *texture }),
                    None => Err(ExecError::UnknownResource { handle: *texture }),
                }
            }
            Cmd::Clear {
                flags,
                color,
                depth,
            } => self.clear(*flags, *color, *depth, event_id),
            Cmd::Draw {
                vertex_count,
                instance_count,
                first_vertex,
            } => {
                if *instance_count != 1 {
                    return Err(ExecError::UnsupportedInstanceCount {
                        count: *instance_count,
                    });
                }
                let indices: Vec<u64> = (0..*vertex_count as u64)
                    .map(|i| *first_vertex as u64 + i)
                    .collect();
                self.draw_assembled(&indices, event_id)
            }
            Cmd::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                base_vertex,
            } => {
                if *instance_count != 1 {
                    return Err(ExecError::UnsupportedInstanceCount {
                        count: *instance_count,
                    });
                }
                let indices = self.fetch_indices(*index_count, *first_index, *base_vertex)?;
                self.draw_assembled(&indices, event_id)
            }
            Cmd::Present { .. } => self.present(event_id, frame_index),
        }
    }

    fn create_buffer(
        &mut self,
        handle: Handle,
        usage_flags: u32,
        size_bytes: u64,
    ) -> Result<(), ExecError> {
        if handle == 0 {
            return Err(ExecError::NullHandle);
        }
        if self.resources.contains_key(&handle) {
            return Err(ExecError::HandleInUse { handle });
        }
        if size_bytes > MAX_BUFFER_BYTES {
            return Err(ExecError::BufferTooLarge { handle, size_bytes });
        }
        debug!(handle, size_bytes, "create buffer");
        self.resources.insert(
            handle,
            Resource::Buffer(Buffer {
                usage_flags,
                bytes: vec![0u8; size_bytes as usize],
            }),
        );
        Ok(())
    }

    fn create_texture(
        &mut self,
        handle: Handle,
        usage_flags: u32,
        format: prism_protocol::TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<(), ExecError> {
        if handle == 0 {
            return Err(ExecError::NullHandle);
        }
        if self.resources.contains_key(&handle) {
            return Err(ExecError::HandleInUse { handle });
        }
        let size_bytes = width as u64 * height as u64 * format.bytes_per_texel() as u64;
        if width == 0
            || height == 0
            || width > MAX_TEXTURE_DIM
            || height > MAX_TEXTURE_DIM
            || size_bytes > MAX_BUFFER_BYTES
        {
            return Err(ExecError::InvalidTextureExtent {
                handle,
                width,
                height,
            });
        }
        debug!(handle, ?format, width, height, "create texture");
        self.resources.insert(
            handle,
            Resource::Texture2d(Texture2d::new(usage_flags, format, width, height)),
        );
        Ok(())
    }

    fn destroy_resource(&mut self, handle: Handle) -> Result<(), ExecError> {
        if self.resources.remove(&handle).is_none() {
            return Err(ExecError::UnknownResource { handle });
        }
        // Scrub bindings that referenced the destroyed handle.
        self.bind.color_targets.retain(|&h| h != handle);
        if self.bind.depth_target == Some(handle) {
            self.bind.depth_target = None;
        }
        for stream in &mut self.bind.vertex_streams {
            if stream.map(|s| s.buffer) == Some(handle) {
                *stream = None;
            }
        }
        if self.bind.index_buffer.map(|ib| ib.buffer) == Some(handle) {
            self.bind.index_buffer = None;
        }
        self.bind.textures.retain(|_, &mut h| h != handle);
        Ok(())
    }

    fn upload_resource(
        &mut self,
        handle: Handle,
        offset_bytes: u64,
        data: &[u8],
    ) -> Result<(), ExecError> {
        let resource = self
            .resources
            .get_mut(&handle)
            .ok_or(ExecError::UnknownResource { handle })?;
        let dst = match resource {
            Resource::Buffer(buffer) => &mut buffer.bytes,
            Resource::Texture2d(tex) => &mut tex.texels,
        };
        let offset = usize::try_from(offset_bytes).map_err(|_| ExecError::UploadOutOfBounds {
            handle,
            offset_bytes,
            len: data.len(),
            size: dst.len(),
        })?;
        let end = offset.checked_add(data.len()).filter(|&end| end <= dst.len());
        let Some(end) = end else {
            return Err(ExecError::UploadOutOfBounds {
                handle,
                offset_bytes,
                len: data.len(),
                size: dst.len(),
            });
        };
        dst[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn require_buffer(&self, handle: Handle) -> Result<(), ExecError> {
        match self.resources.get(&handle) {
            Some(Resource::Buffer(_)) => Ok(()),
            Some(_) => Err(ExecError::NotABuffer { handle }),
            None => Err(ExecError::UnknownResource { handle }),
        }
    }

    fn set_render_targets(
        &mut self,
        colors: &[Handle],
        depth: Option<Handle>,
    ) -> Result<(), ExecError> {
        let mut extent: Option<(u32, u32)> = None;
        for &handle in colors {
            let tex = self.require_texture(handle)?;
            if tex.usage_flags & USAGE_RENDER_TARGET == 0 {
                return Err(ExecError::TargetUsageMismatch { handle });
            }
            if tex.format.is_depth() {
                return Err(ExecError::TargetFormatMismatch { handle });
            }
            check_extent(&mut extent, tex)?;
        }
        if let Some(handle) = depth {
            let tex = self.require_texture(handle)?;
            if tex.usage_flags & USAGE_DEPTH_STENCIL == 0 {
                return Err(ExecError::TargetUsageMismatch { handle });
            }
            if !tex.format.is_depth() {
                return Err(ExecError::TargetFormatMismatch { handle });
            }
            check_extent(&mut extent, tex)?;
        }

        self.bind.color_targets = colors.to_vec();
        self.bind.depth_target = depth;
        // Binding targets resets the viewport to the full target extent.
        if let Some((w, h)) = extent {
            self.bind.viewport = Some(Viewport {
                x: 0.0,
                y: 0.0,
                width: w as f32,
                height: h as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            });
        }
        Ok(())
    }

    fn require_texture(&self, handle: Handle) -> Result<&Texture2d, ExecError> {
        match self.resources.get(&handle) {
            Some(Resource::Texture2d(tex)) => Ok(tex),
            Some(_) => Err(ExecError::NotATexture { handle }),
            None => Err(ExecError::UnknownResource { handle }),
        }
    }

    fn target_extent(&self) -> Option<(u32, u32)> {
        for &handle in &self.bind.color_targets {
            if let Some(Resource::Texture2d(tex)) = self.resources.get(&handle) {
                return Some((tex.width, tex.height));
            }
        }
        if let Some(Resource::Texture2d(tex)) =
            self.bind.depth_target.and_then(|h| self.resources.get(&h))
        {
            return Some((tex.width, tex.height));
        }
        None
    }

    fn clear(
        &mut self,
        flags: ClearFlags,
        color: [f32; 4],
        depth: f32,
        event_id: EventId,
    ) -> Result<(), ExecError> {
        if flags.color() && self.bind.color_targets.is_empty() {
            return Err(ExecError::MissingRenderTarget);
        }
        if flags.depth() && self.bind.depth_target.is_none() {
            return Err(ExecError::MissingDepthTarget);
        }

        let scissor = self
            .bind
            .raster
            .scissor_enable
            .then_some(self.bind.scissor)
            .flatten();

        let mut probe = self.probe.take();
        let pre = probe
            .as_ref()
            .map(|p| self.read_probe_value(p));

        if flags.color() {
            for &handle in &self.bind.color_targets.clone() {
                if let Some(Resource::Texture2d(tex)) = self.resources.get_mut(&handle) {
                    fill_texture(tex, color, scissor);
                }
            }
        }
        if flags.depth() {
            if let Some(handle) = self.bind.depth_target {
                if let Some(Resource::Texture2d(tex)) = self.resources.get_mut(&handle) {
                    fill_texture(tex, [depth, 0.0, 0.0, 0.0], scissor);
                }
            }
        }

        if let (Some(probe_ref), Some(pre)) = (probe.as_mut(), pre) {
            let touched = (flags.color()
                && self.bind.color_targets.contains(&probe_ref.target))
                || (flags.depth() && self.bind.depth_target == Some(probe_ref.target));
            let in_region = scissor
                .map(|s| s.contains(probe_ref.x as i32, probe_ref.y as i32))
                .unwrap_or(true);
            if touched && in_region && self.probe_in_bounds(probe_ref) {
                let shader_out = ModValue {
                    color,
                    depth,
                };
                let post = self.read_probe_value(probe_ref);
                probe_ref.mods.push(PixelModification {
                    event_id,
                    pre_mod: pre,
                    shader_out,
                    post_mod: post,
                    backface_culled: false,
                    scissor_clipped: false,
                    depth_test_failed: false,
                });
            }
        }
        self.probe = probe;
        Ok(())
    }

    fn fetch_indices(
        &self,
        index_count: u32,
        first_index: u32,
        base_vertex: i32,
    ) -> Result<Vec<u64>, ExecError> {
        let ib = self.bind.index_buffer.ok_or(ExecError::MissingIndexBuffer)?;
        let Some(Resource::Buffer(buffer)) = self.resources.get(&ib.buffer) else {
            return Err(ExecError::UnknownResource { handle: ib.buffer });
        };
        let index_size = match ib.format {
            IndexFormat::Uint16 => 2u64,
            IndexFormat::Uint32 => 4u64,
        };
        let mut out = Vec::with_capacity(index_count as usize);
        for i in 0..index_count as u64 {
            let at = ib.offset_bytes as u64 + (first_index as u64 + i) * index_size;
            let end = at + index_size;
            if end > buffer.bytes.len() as u64 {
                return Err(ExecError::IndexFetchOutOfBounds {
                    handle: ib.buffer,
                    index: first_index as u64 + i,
                });
            }
            let at = at as usize;
            let raw = match ib.format {
                IndexFormat::Uint16 => {
                    u16::from_le_bytes(buffer.bytes[at..at + 2].try_into().unwrap()) as i64
                }
                IndexFormat::Uint32 => {
                    u32::from_le_bytes(buffer.bytes[at..at + 4].try_into().unwrap()) as i64
                }
            };
            let vertex = raw + base_vertex as i64;
            if vertex < 0 {
                return Err(ExecError::NegativeVertexIndex { base_vertex });
            }
            out.push(vertex as u64);
        }
        Ok(out)
    }

    fn draw_assembled(&mut self, vertex_indices: &[u64], event_id: EventId) -> Result<(), ExecError> {
        if self.bind.color_targets.is_empty() && self.bind.depth_target.is_none() {
            return Err(ExecError::MissingRenderTarget);
        }
        let layout_handle = self.bind.input_layout.ok_or(ExecError::MissingInputLayout)?;
        let attrs = self
            .input_layouts
            .get(&layout_handle)
            .ok_or(ExecError::UnknownInputLayout {
                handle: layout_handle,
            })?
            .clone();
        if !attrs.iter().any(|a| a.semantic == VertexSemantic::Position) {
            return Err(ExecError::MissingPositionAttribute);
        }

        let stream = self
            .bind
            .vertex_streams
            .first()
            .copied()
            .flatten()
            .ok_or(ExecError::MissingVertexStream { slot: 0 })?;
        if stream.stride_bytes == 0 {
            return Err(ExecError::ZeroVertexStride);
        }
        let Some(Resource::Buffer(vb)) = self.resources.get(&stream.buffer) else {
            return Err(ExecError::UnknownResource {
                handle: stream.buffer,
            });
        };

        let mut vertices = Vec::with_capacity(vertex_indices.len());
        for &index in vertex_indices {
            vertices.push(fetch_vertex(vb, &stream, &attrs, index)?);
        }

        let (width, height) = self.target_extent().ok_or(ExecError::MissingRenderTarget)?;
        let viewport = self.bind.viewport.unwrap_or(Viewport {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });

        let screen: Vec<ScreenVertex> = vertices
            .iter()
            .map(|v| to_screen(v.pos, v.color, v.uv, &viewport))
            .collect();
        let clip = ClipRect::from_viewport(&viewport, width, height);

        debug!(
            event = event_id.0,
            vertices = screen.len(),
            topology = ?self.bind.topology,
            "draw"
        );

        let mut probe = self.probe.take();
        self.emit_primitives(&screen, width, height, clip, event_id, &mut probe);
        self.probe = probe;
        Ok(())
    }

    fn emit_primitives(
        &mut self,
        screen: &[ScreenVertex],
        width: u32,
        height: u32,
        clip: ClipRect,
        event_id: EventId,
        probe: &mut Option<PixelProbe>,
    ) {
        match self.bind.topology {
            PrimitiveTopology::TriangleList => {
                for tri in screen.chunks_exact(3) {
                    self.shade_triangle(
                        &[tri[0], tri[1], tri[2]],
                        width,
                        height,
                        clip,
                        event_id,
                        probe,
                    );
                }
            }
            PrimitiveTopology::TriangleStrip => {
                for (i, win) in screen.windows(3).enumerate() {
                    // Strips alternate winding; flip odd triangles back.
                    let tri = if i % 2 == 0 {
                        [win[0], win[1], win[2]]
                    } else {
                        [win[1], win[0], win[2]]
                    };
                    self.shade_triangle(&tri, width, height, clip, event_id, probe);
                }
            }
            PrimitiveTopology::TriangleFan => {
                if screen.len() >= 3 {
                    for i in 1..screen.len() - 1 {
                        self.shade_triangle(
                            &[screen[0], screen[i], screen[i + 1]],
                            width,
                            height,
                            clip,
                            event_id,
                            probe,
                        );
                    }
                }
            }
            PrimitiveTopology::PointList => {
                for v in screen {
                    let mut frags = Vec::new();
                    rasterize_point(v, width, height, |f| frags.push(f));
                    self.shade_fragments(&frags, clip, event_id, probe);
                }
            }
            PrimitiveTopology::LineList => {
                for pair in screen.chunks_exact(2) {
                    let mut frags = Vec::new();
                    rasterize_line(&pair[0], &pair[1], width, height, |f| frags.push(f));
                    self.shade_fragments(&frags, clip, event_id, probe);
                }
            }
            PrimitiveTopology::LineStrip => {
                for pair in screen.windows(2) {
                    let mut frags = Vec::new();
                    rasterize_line(&pair[0], &pair[1], width, height, |f| frags.push(f));
                    self.shade_fragments(&frags, clip, event_id, probe);
                }
            }
        }
    }

    fn shade_triangle(
        &mut self,
        tri: &[ScreenVertex; 3],
        width: u32,
        height: u32,
        clip: ClipRect,
        event_id: EventId,
        probe: &mut Option<PixelProbe>,
    ) {
        let Some(face) = facing(tri, self.bind.raster.front_ccw) else {
            return; // degenerate
        };
        let culled = match self.bind.raster.cull_mode {
            prism_protocol::CullMode::None => false,
            prism_protocol::CullMode::Front => face == Facing::Front,
            prism_protocol::CullMode::Back => face == Facing::Back,
        };
        if culled {
            if let Some(p) = probe.as_mut() {
                if self.probe_targets_bound(p)
                    && self.probe_in_bounds(p)
                    && clip.contains(p.x, p.y)
                    && triangle_covers_pixel(tri, p.x, p.y)
                {
                    let value = self.read_probe_value(p);
                    p.mods.push(PixelModification {
                        event_id,
                        pre_mod: value,
                        shader_out: ModValue::default(),
                        post_mod: value,
                        backface_culled: true,
                        scissor_clipped: false,
                        depth_test_failed: false,
                    });
                }
            }
            return;
        }
        let mut frags = Vec::new();
        rasterize_triangle(tri, width, height, |f| frags.push(f));
        self.shade_fragments(&frags, clip, event_id, probe);
    }

    fn shade_fragments(
        &mut self,
        frags: &[Fragment],
        clip: ClipRect,
        event_id: EventId,
        probe: &mut Option<PixelProbe>,
    ) {
        let scissor = self
            .bind
            .raster
            .scissor_enable
            .then_some(self.bind.scissor)
            .flatten();
        // Snapshot the bound texture so sampling stays stable even when a
        // draw renders into its own sampled texture.
        let texture = self
            .bind
            .textures
            .get(&0)
            .and_then(|&h| match self.resources.get(&h) {
                Some(Resource::Texture2d(tex)) => Some(tex.clone()),
                _ => None,
            });
        let color_targets = self.bind.color_targets.clone();
        let depth_state = self.bind.depth;
        let depth_target = self.bind.depth_target;
        let blend = self.bind.blend;

        for frag in frags {
            if !clip.contains(frag.x, frag.y) {
                continue;
            }
            let probe_hit = probe.as_ref().map_or(false, |p| {
                p.x == frag.x && p.y == frag.y && self.probe_targets_bound(p)
            });

            // Scissor test.
            if let Some(rect) = scissor {
                if !rect.contains(frag.x as i32, frag.y as i32) {
                    if probe_hit {
                        if let Some(p) = probe.as_mut() {
                            let value = self.read_probe_value(p);
                            p.mods.push(PixelModification {
                                event_id,
                                pre_mod: value,
                                shader_out: ModValue::default(),
                                post_mod: value,
                                backface_culled: false,
                                scissor_clipped: true,
                                depth_test_failed: false,
                            });
                        }
                    }
                    continue;
                }
            }

            // Shade: vertex color modulated by the slot-0 texture.
            let mut src = frag.color;
            if let Some(tex) = &texture {
                let sample = tex.sample_nearest(frag.uv[0], frag.uv[1]);
                for c in 0..4 {
                    src[c] *= sample[c];
                }
            }

            // Depth test.
            let mut stored_depth = None;
            if depth_state.depth_enable {
                if let Some(Resource::Texture2d(tex)) =
                    depth_target.and_then(|h| self.resources.get(&h))
                {
                    stored_depth = tex.read_pixel(frag.x, frag.y).map(|v| v[0]);
                }
            }
            if let Some(stored) = stored_depth {
                if !compare(depth_state.depth_func, frag.z, stored) {
                    if probe_hit {
                        if let Some(p) = probe.as_mut() {
                            let value = self.read_probe_value(p);
                            p.mods.push(PixelModification {
                                event_id,
                                pre_mod: value,
                                shader_out: ModValue {
                                    color: src,
                                    depth: frag.z,
                                },
                                post_mod: value,
                                backface_culled: false,
                                scissor_clipped: false,
                                depth_test_failed: true,
                            });
                        }
                    }
                    continue;
                }
            }

            let pre = if probe_hit {
                probe.as_ref().map(|p| self.read_probe_value(p))
            } else {
                None
            };

            // Blend and write color targets.
            for &handle in &color_targets {
                if let Some(Resource::Texture2d(tex)) = self.resources.get_mut(&handle) {
                    if !tex.in_bounds(frag.x, frag.y) {
                        continue;
                    }
                    let out = if blend.enable {
                        let dst = tex.read_pixel(frag.x, frag.y).unwrap_or([0.0; 4]);
                        blend_color(src, dst, blend.src_factor, blend.dst_factor)
                    } else {
                        src
                    };
                    tex.write_pixel(frag.x, frag.y, out);
                }
            }

            // Depth write.
            if depth_state.depth_enable && depth_state.depth_write {
                if let Some(Resource::Texture2d(tex)) =
                    depth_target.and_then(|h| self.resources.get_mut(&h))
                {
                    if tex.in_bounds(frag.x, frag.y) {
                        tex.write_pixel(frag.x, frag.y, [frag.z, 0.0, 0.0, 0.0]);
                    }
                }
            }

            if let (Some(p), Some(pre)) = (probe.as_mut(), pre) {
                if self.probe_in_bounds(p) {
                    let post = self.read_probe_value(p);
                    p.mods.push(PixelModification {
                        event_id,
                        pre_mod: pre,
                        shader_out: ModValue {
                            color: src,
                            depth: frag.z,
                        },
                        post_mod: post,
                        backface_culled: false,
                        scissor_clipped: false,
                        depth_test_failed: false,
                    });
                }
            }
        }
    }

    fn probe_targets_bound(&self, probe: &PixelProbe) -> bool {
        self.bind.color_targets.contains(&probe.target)
            || self.bind.depth_target == Some(probe.target)
    }

    fn probe_in_bounds(&self, probe: &PixelProbe) -> bool {
        match self.resources.get(&probe.target) {
            Some(Resource::Texture2d(tex)) => tex.in_bounds(probe.x, probe.y),
            _ => false,
        }
    }

    /// Current value of the probed pixel plus the bound depth buffer value.
    fn read_probe_value(&self, probe: &PixelProbe) -> ModValue {
        let color = match self.resources.get(&probe.target) {
            Some(Resource::Texture2d(tex)) => {
                tex.read_pixel(probe.x, probe.y).unwrap_or([0.0; 4])
            }
            _ => [0.0; 4],
        };
        let depth = self
            .bind
            .depth_target
            .and_then(|h| match self.resources.get(&h) {
                Some(Resource::Texture2d(tex)) => tex.read_pixel(probe.x, probe.y).map(|v| v[0]),
                _ => None,
            })
            .unwrap_or(0.0);
        ModValue { color, depth }
    }

    fn present(&mut self, event_id: EventId, frame_index: u32) -> Result<(), ExecError> {
        let &handle = self
            .bind
            .color_targets
            .first()
            .ok_or(ExecError::MissingRenderTarget)?;
        let tex = self.require_texture(handle)?;
        debug!(event = event_id.0, frame_index, "present");
        let frame = PresentedFrame {
            event_id,
            frame_index,
            width: tex.width,
            height: tex.height,
            rgba8: tex.to_rgba8(),
        };
        self.presented.push(frame);
        Ok(())
    }
}

fn check_extent(extent: &mut Option<(u32, u32)>, tex: &Texture2d) -> Result<(), ExecError> {
    match extent {
        None => {
            *extent = Some((tex.width, tex.height));
            Ok(())
        }
        Some((w, h)) if *w == tex.width && *h == tex.height => Ok(()),
        Some(_) => Err(ExecError::TargetExtentMismatch),
    }
}

fn fill_texture(tex: &mut Texture2d, value: [f32; 4], scissor: Option<ScissorRect>) {
    for y in 0..tex.height {
        for x in 0..tex.width {
            if let Some(rect) = scissor {
                if !rect.contains(x as i32, y as i32) {
                    continue;
                }
            }
            tex.write_pixel(x, y, value);
        }
    }
}

fn compare(func: CompareFunc, new: f32, old: f32) -> bool {
    match func {
        CompareFunc::Never => false,
        CompareFunc::Less => new < old,
        CompareFunc::Equal => new == old,
        CompareFunc::LessEqual => new <= old,
        CompareFunc::Greater => new > old,
        CompareFunc::NotEqual => new != old,
        CompareFunc::GreaterEqual => new >= old,
        CompareFunc::Always => true,
    }
}

fn blend_color(src: [f32; 4], dst: [f32; 4], sf: BlendFactor, df: BlendFactor) -> [f32; 4] {
    let s = factor(sf, src);
    let d = factor(df, src);
    [
        src[0] * s + dst[0] * d,
        src[1] * s + dst[1] * d,
        src[2] * s + dst[2] * d,
        src[3] * s + dst[3] * d,
    ]
}

fn factor(f: BlendFactor, src: [f32; 4]) -> f32 {
    match f {
        BlendFactor::Zero => 0.0,
        BlendFactor::One => 1.0,
        BlendFactor::SrcAlpha => src[3],
        BlendFactor::InvSrcAlpha => 1.0 - src[3],
    }
}

fn fetch_vertex(
    vb: &Buffer,
    stream: &RawStream,
    attrs: &[VertexAttr],
    index: u64,
) -> Result<AssembledVertex, ExecError> {
    let base = stream.offset_bytes as u64 + index * stream.stride_bytes as u64;

    let mut pos = None;
    let mut color = [1.0, 1.0, 1.0, 1.0];
    let mut uv = [0.0, 0.0];
    for attr in attrs {
        let at = base + attr.offset_bytes as u64;
        let end = at + attr.format.size_bytes() as u64;
        if end > vb.bytes.len() as u64 {
            return Err(ExecError::VertexFetchOutOfBounds {
                handle: stream.buffer,
                index,
            });
        }
        let bytes = &vb.bytes[at as usize..end as usize];
        match attr.semantic {
            VertexSemantic::Position => {
                let v = read_attr_f32(bytes, attr.format)
                    .ok_or(ExecError::UnsupportedPositionFormat)?;
                pos = Some([v[0], v[1], v[2]]);
            }
            VertexSemantic::Color => {
                color = read_attr_any(bytes, attr.format);
            }
            VertexSemantic::TexCoord => {
                let v = read_attr_any(bytes, attr.format);
                uv = [v[0], v[1]];
            }
        }
    }

    let pos = pos.ok_or(ExecError::MissingPositionAttribute)?;
    Ok(AssembledVertex { pos, color, uv })
}

/// Float-only read: position data must be float-typed.
fn read_attr_f32(bytes: &[u8], format: VertexFormat) -> Option<[f32; 4]> {
    match format {
        VertexFormat::Unorm8x4 => None,
        _ => Some(read_attr_any(bytes, format)),
    }
}

/// Any-format read with the usual defaults (z = 0, w = 1).
fn read_attr_any(bytes: &[u8], format: VertexFormat) -> [f32; 4] {
    let mut out = [0.0, 0.0, 0.0, 1.0];
    match format {
        VertexFormat::F32x2 | VertexFormat::F32x3 | VertexFormat::F32x4 => {
            let count = format.size_bytes() / 4;
            for (i, slot) in out.iter_mut().take(count).enumerate() {
                *slot = f32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
            }
        }
        VertexFormat::Unorm8x4 => {
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = bytes[i] as f32 / 255.0;
            }
        }
    }
    out
}
