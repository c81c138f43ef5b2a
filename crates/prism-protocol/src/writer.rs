//! Safe command stream builder.
//!
//! Intended for tests/fixtures and host-side tooling that needs to emit
//! canonical command streams (correct packet `size_bytes`, padding/alignment,
//! and stream header bookkeeping).

use crate::cmd::{
    BlendFactor, CompareFunc, CullMode, Handle, IndexFormat, Opcode, PrimitiveTopology,
    TextureFormat, VertexAttr, VertexBufferBinding, CMD_STREAM_HEADER_SIZE, CMD_STREAM_MAGIC,
    COMMAND_ABI_VERSION, MAX_COLOR_TARGETS,
};

fn align_up(v: usize, a: usize) -> usize {
    debug_assert!(a.is_power_of_two());
    (v + (a - 1)) & !(a - 1)
}

#[derive(Debug, Default, Clone)]
pub struct CmdWriter {
    buf: Vec<u8>,
}

impl CmdWriter {
    pub fn new() -> Self {
        let mut w = Self { buf: Vec::new() };
        w.reset();
        w
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.buf.resize(CMD_STREAM_HEADER_SIZE, 0);
        self.write_u32_at(0, CMD_STREAM_MAGIC);
        self.write_u32_at(4, COMMAND_ABI_VERSION);
        self.write_u32_at(8, CMD_STREAM_HEADER_SIZE as u32);
    }

    pub fn finish(mut self) -> Vec<u8> {
        assert!(
            self.buf.len() <= u32::MAX as usize,
            "command stream too large for u32 size_bytes"
        );
        self.write_u32_at(8, self.buf.len() as u32);
        self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.len() <= CMD_STREAM_HEADER_SIZE
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    fn write_u32_at(&mut self, offset: usize, v: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
    }

    fn write_u64_at(&mut self, offset: usize, v: u64) {
        self.buf[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
    }

    fn write_f32_at(&mut self, offset: usize, v: f32) {
        self.buf[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
    }

    fn append_raw(&mut self, opcode: Opcode, payload_bytes: usize) -> usize {
        let unpadded = 8 + payload_bytes;
        let aligned = align_up(unpadded, 4);
        assert!(
            aligned <= u32::MAX as usize,
            "command packet too large for u32 size_bytes"
        );
        let offset = self.buf.len();
        self.buf.resize(offset + aligned, 0);
        self.write_u32_at(offset, opcode as u32);
        self.write_u32_at(offset + 4, aligned as u32);
        offset + 8
    }

    pub fn nop(&mut self) {
        self.append_raw(Opcode::Nop, 0);
    }

    pub fn begin_marker(&mut self, label: &str) {
        let bytes = label.as_bytes();
        let base = self.append_raw(Opcode::BeginMarker, 4 + bytes.len());
        self.write_u32_at(base, bytes.len() as u32);
        self.buf[base + 4..base + 4 + bytes.len()].copy_from_slice(bytes);
    }

    pub fn end_marker(&mut self) {
        self.append_raw(Opcode::EndMarker, 0);
    }

    pub fn create_buffer(&mut self, handle: Handle, usage_flags: u32, size_bytes: u64) {
        let base = self.append_raw(Opcode::CreateBuffer, 16);
        self.write_u32_at(base, handle);
        self.write_u32_at(base + 4, usage_flags);
        self.write_u64_at(base + 8, size_bytes);
    }

    pub fn create_texture2d(
        &mut self,
        handle: Handle,
        usage_flags: u32,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) {
        let base = self.append_raw(Opcode::CreateTexture2d, 24);
        self.write_u32_at(base, handle);
        self.write_u32_at(base + 4, usage_flags);
        self.write_u32_at(base + 8, format as u32);
        self.write_u32_at(base + 12, width);
        self.write_u32_at(base + 16, height);
    }

    pub fn destroy_resource(&mut self, handle: Handle) {
        let base = self.append_raw(Opcode::DestroyResource, 8);
        self.write_u32_at(base, handle);
    }

    pub fn upload_resource(&mut self, handle: Handle, offset_bytes: u64, data: &[u8]) {
        let base = self.append_raw(Opcode::UploadResource, 24 + data.len());
        self.write_u32_at(base, handle);
        self.write_u64_at(base + 8, offset_bytes);
        self.write_u64_at(base + 16, data.len() as u64);
        self.buf[base + 24..base + 24 + data.len()].copy_from_slice(data);
    }

    pub fn create_input_layout(&mut self, handle: Handle, attrs: &[VertexAttr]) {
        let base = self.append_raw(Opcode::CreateInputLayout, 8 + attrs.len() * 12);
        self.write_u32_at(base, handle);
        self.write_u32_at(base + 4, attrs.len() as u32);
        for (i, attr) in attrs.iter().enumerate() {
            let at = base + 8 + i * 12;
            self.write_u32_at(at, attr.semantic as u32);
            self.write_u32_at(at + 4, attr.format as u32);
            self.write_u32_at(at + 8, attr.offset_bytes);
        }
    }

    pub fn set_input_layout(&mut self, handle: Handle) {
        let base = self.append_raw(Opcode::SetInputLayout, 8);
        self.write_u32_at(base, handle);
    }

    pub fn set_blend_state(&mut self, enable: bool, src_factor: BlendFactor, dst_factor: BlendFactor) {
        let base = self.append_raw(Opcode::SetBlendState, 16);
        self.write_u32_at(base, enable as u32);
        self.write_u32_at(base + 4, src_factor as u32);
        self.write_u32_at(base + 8, dst_factor as u32);
    }

    pub fn set_depth_state(&mut self, depth_enable: bool, depth_write: bool, depth_func: CompareFunc) {
        let base = self.append_raw(Opcode::SetDepthState, 16);
        self.write_u32_at(base, depth_enable as u32);
        self.write_u32_at(base + 4, depth_write as u32);
        self.write_u32_at(base + 8, depth_func as u32);
    }

    pub fn set_rasterizer_state(&mut self, cull_mode: CullMode, front_ccw: bool, scissor_enable: bool) {
        let base = self.append_raw(Opcode::SetRasterizerState, 16);
        self.write_u32_at(base, cull_mode as u32);
        self.write_u32_at(base + 4, front_ccw as u32);
        self.write_u32_at(base + 8, scissor_enable as u32);
    }

    /// `depth = 0` means no depth target.
    pub fn set_render_targets(&mut self, colors: &[Handle], depth: Handle) {
        assert!(colors.len() <= MAX_COLOR_TARGETS, "too many color targets");
        let base = self.append_raw(Opcode::SetRenderTargets, 8 + MAX_COLOR_TARGETS * 4);
        self.write_u32_at(base, colors.len() as u32);
        self.write_u32_at(base + 4, depth);
        for (i, &handle) in colors.iter().enumerate() {
            self.write_u32_at(base + 8 + i * 4, handle);
        }
    }

    pub fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32, min_depth: f32, max_depth: f32) {
        let base = self.append_raw(Opcode::SetViewport, 24);
        self.write_f32_at(base, x);
        self.write_f32_at(base + 4, y);
        self.write_f32_at(base + 8, width);
        self.write_f32_at(base + 12, height);
        self.write_f32_at(base + 16, min_depth);
        self.write_f32_at(base + 20, max_depth);
    }

    pub fn set_scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        let base = self.append_raw(Opcode::SetScissor, 16);
        self.write_u32_at(base, x as u32);
        self.write_u32_at(base + 4, y as u32);
        self.write_u32_at(base + 8, width as u32);
        self.write_u32_at(base + 12, height as u32);
    }

    pub fn set_vertex_buffers(&mut self, start_slot: u32, bindings: &[VertexBufferBinding]) {
        let base = self.append_raw(Opcode::SetVertexBuffers, 8 + bindings.len() * 16);
        self.write_u32_at(base, start_slot);
        self.write_u32_at(base + 4, bindings.len() as u32);
        for (i, binding) in bindings.iter().enumerate() {
            let at = base + 8 + i * 16;
            self.write_u32_at(at, binding.buffer);
            self.write_u32_at(at + 4, binding.stride_bytes);
            self.write_u32_at(at + 8, binding.offset_bytes);
        }
    }

    pub fn set_index_buffer(&mut self, buffer: Handle, format: IndexFormat, offset_bytes: u32) {
        let base = self.append_raw(Opcode::SetIndexBuffer, 16);
        self.write_u32_at(base, buffer);
        self.write_u32_at(base + 4, format as u32);
        self.write_u32_at(base + 8, offset_bytes);
    }

    pub fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        let base = self.append_raw(Opcode::SetPrimitiveTopology, 8);
        self.write_u32_at(base, topology as u32);
    }

    pub fn set_texture(&mut self, slot: u32, texture: Handle) {
        let base = self.append_raw(Opcode::SetTexture, 8);
        self.write_u32_at(base, slot);
        self.write_u32_at(base + 4, texture);
    }

    pub fn clear(&mut self, flags: u32, color: [f32; 4], depth: f32) {
        let base = self.append_raw(Opcode::Clear, 28);
        self.write_u32_at(base, flags);
        for (i, c) in color.iter().enumerate() {
            self.write_f32_at(base + 4 + i * 4, *c);
        }
        self.write_f32_at(base + 20, depth);
    }

    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32) {
        let base = self.append_raw(Opcode::Draw, 16);
        self.write_u32_at(base, vertex_count);
        self.write_u32_at(base + 4, instance_count);
        self.write_u32_at(base + 8, first_vertex);
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
    ) {
        let base = self.append_raw(Opcode::DrawIndexed, 16);
        self.write_u32_at(base, index_count);
        self.write_u32_at(base + 4, instance_count);
        self.write_u32_at(base + 8, first_index);
        self.write_u32_at(base + 12, base_vertex as u32);
    }

    pub fn present(&mut self, flags: u32) {
        let base = self.append_raw(Opcode::Present, 8);
        self.write_u32_at(base, flags);
    }
}
