//! Command stream wire layout and decoder.
//!
//! Stream layout:
//!
//! ```text
//! stream header (24 bytes): magic "PCMD" | abi_version | size_bytes | flags | reserved x2
//! packet:                   opcode: u32 | size_bytes: u32 | payload (padded to 4 bytes)
//! ```
//!
//! `size_bytes` in the stream header covers the whole stream including the
//! header itself; packet `size_bytes` covers the packet header plus padded
//! payload. All fields are little-endian.

use std::fmt;

pub type Handle = u32;

pub const CMD_STREAM_MAGIC: u32 = u32::from_le_bytes(*b"PCMD");
pub const COMMAND_ABI_VERSION: u32 = 1;
pub const CMD_STREAM_HEADER_SIZE: usize = 24;
pub const CMD_PACKET_HEADER_SIZE: usize = 8;
pub const MAX_COLOR_TARGETS: usize = 8;

pub const USAGE_VERTEX_BUFFER: u32 = 1 << 0;
pub const USAGE_INDEX_BUFFER: u32 = 1 << 1;
pub const USAGE_TEXTURE: u32 = 1 << 2;
pub const USAGE_RENDER_TARGET: u32 = 1 << 3;
pub const USAGE_DEPTH_STENCIL: u32 = 1 << 4;

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    Nop = 0,
    BeginMarker = 1,
    EndMarker = 2,

    CreateBuffer = 0x100,
    CreateTexture2d = 0x101,
    DestroyResource = 0x102,
    UploadResource = 0x104,

    CreateInputLayout = 0x200,
    SetInputLayout = 0x201,

    SetBlendState = 0x300,
    SetDepthState = 0x301,
    SetRasterizerState = 0x302,

    SetRenderTargets = 0x400,
    SetViewport = 0x401,
    SetScissor = 0x402,

    SetVertexBuffers = 0x500,
    SetIndexBuffer = 0x501,
    SetPrimitiveTopology = 0x502,
    SetTexture = 0x510,

    Clear = 0x600,
    Draw = 0x601,
    DrawIndexed = 0x602,

    Present = 0x700,
}

impl Opcode {
    pub const fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Nop),
            1 => Some(Self::BeginMarker),
            2 => Some(Self::EndMarker),
            0x100 => Some(Self::CreateBuffer),
            0x101 => Some(Self::CreateTexture2d),
            0x102 => Some(Self::DestroyResource),
            0x104 => Some(Self::UploadResource),
            0x200 => Some(Self::CreateInputLayout),
            0x201 => Some(Self::SetInputLayout),
            0x300 => Some(Self::SetBlendState),
            0x301 => Some(Self::SetDepthState),
            0x302 => Some(Self::SetRasterizerState),
            0x400 => Some(Self::SetRenderTargets),
            0x401 => Some(Self::SetViewport),
            0x402 => Some(Self::SetScissor),
            0x500 => Some(Self::SetVertexBuffers),
            0x501 => Some(Self::SetIndexBuffer),
            0x502 => Some(Self::SetPrimitiveTopology),
            0x510 => Some(Self::SetTexture),
            0x600 => Some(Self::Clear),
            0x601 => Some(Self::Draw),
            0x602 => Some(Self::DrawIndexed),
            0x700 => Some(Self::Present),
            _ => None,
        }
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureFormat {
    R8G8B8A8Unorm = 1,
    B8G8R8A8Unorm = 2,
    R32G32B32A32Float = 3,
    D32Float = 16,
}

impl TextureFormat {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            1 => Self::R8G8B8A8Unorm,
            2 => Self::B8G8R8A8Unorm,
            3 => Self::R32G32B32A32Float,
            16 => Self::D32Float,
            _ => return None,
        })
    }

    pub fn bytes_per_texel(self) -> usize {
        match self {
            Self::R8G8B8A8Unorm | Self::B8G8R8A8Unorm | Self::D32Float => 4,
            Self::R32G32B32A32Float => 16,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, Self::D32Float)
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveTopology {
    PointList = 1,
    LineList = 2,
    LineStrip = 3,
    TriangleList = 4,
    TriangleStrip = 5,
    TriangleFan = 6,
}

impl PrimitiveTopology {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            1 => Self::PointList,
            2 => Self::LineList,
            3 => Self::LineStrip,
            4 => Self::TriangleList,
            5 => Self::TriangleStrip,
            6 => Self::TriangleFan,
            _ => return None,
        })
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16 = 0,
    Uint32 = 1,
}

impl IndexFormat {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => Self::Uint16,
            1 => Self::Uint32,
            _ => return None,
        })
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexSemantic {
    Position = 0,
    Color = 1,
    TexCoord = 2,
}

impl VertexSemantic {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => Self::Position,
            1 => Self::Color,
            2 => Self::TexCoord,
            _ => return None,
        })
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexFormat {
    F32x2 = 0,
    F32x3 = 1,
    F32x4 = 2,
    Unorm8x4 = 3,
}

impl VertexFormat {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => Self::F32x2,
            1 => Self::F32x3,
            2 => Self::F32x4,
            3 => Self::Unorm8x4,
            _ => return None,
        })
    }

    pub fn size_bytes(self) -> usize {
        match self {
            Self::F32x2 => 8,
            Self::F32x3 => 12,
            Self::F32x4 => 16,
            Self::Unorm8x4 => 4,
        }
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    #[default]
    None = 0,
    Front = 1,
    Back = 2,
}

impl CullMode {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => Self::None,
            1 => Self::Front,
            2 => Self::Back,
            _ => return None,
        })
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareFunc {
    Never = 0,
    Less = 1,
    Equal = 2,
    LessEqual = 3,
    Greater = 4,
    NotEqual = 5,
    GreaterEqual = 6,
    Always = 7,
}

impl CompareFunc {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => Self::Never,
            1 => Self::Less,
            2 => Self::Equal,
            3 => Self::LessEqual,
            4 => Self::Greater,
            5 => Self::NotEqual,
            6 => Self::GreaterEqual,
            7 => Self::Always,
            _ => return None,
        })
    }
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendFactor {
    Zero = 0,
    One = 1,
    SrcAlpha = 2,
    InvSrcAlpha = 3,
}

impl BlendFactor {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => Self::Zero,
            1 => Self::One,
            2 => Self::SrcAlpha,
            3 => Self::InvSrcAlpha,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClearFlags(pub u32);

impl ClearFlags {
    pub const COLOR: u32 = 1 << 0;
    pub const DEPTH: u32 = 1 << 1;

    pub fn color(self) -> bool {
        self.0 & Self::COLOR != 0
    }

    pub fn depth(self) -> bool {
        self.0 & Self::DEPTH != 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VertexAttr {
    pub semantic: VertexSemantic,
    pub format: VertexFormat,
    pub offset_bytes: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexBufferBinding {
    pub buffer: Handle,
    pub stride_bytes: u32,
    pub offset_bytes: u32,
}

/// One decoded command. Variable-length payloads (labels, upload data,
/// attribute tables) are owned so a parsed stream can outlive its bytes.
#[derive(Clone, Debug, PartialEq)]
pub enum Cmd {
    Nop,
    BeginMarker {
        label: String,
    },
    EndMarker,
    CreateBuffer {
        handle: Handle,
        usage_flags: u32,
        size_bytes: u64,
    },
    CreateTexture2d {
        handle: Handle,
        usage_flags: u32,
        format: TextureFormat,
        width: u32,
        height: u32,
    },
    DestroyResource {
        handle: Handle,
    },
    UploadResource {
        handle: Handle,
        offset_bytes: u64,
        data: Vec<u8>,
    },
    CreateInputLayout {
        handle: Handle,
        attrs: Vec<VertexAttr>,
    },
    SetInputLayout {
        handle: Handle,
    },
    SetBlendState {
        enable: bool,
        src_factor: BlendFactor,
        dst_factor: BlendFactor,
    },
    SetDepthState {
        depth_enable: bool,
        depth_write: bool,
        depth_func: CompareFunc,
    },
    SetRasterizerState {
        cull_mode: CullMode,
        front_ccw: bool,
        scissor_enable: bool,
    },
    SetRenderTargets {
        colors: Vec<Handle>,
        depth: Option<Handle>,
    },
    SetViewport {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    },
    SetScissor {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    SetVertexBuffers {
        start_slot: u32,
        bindings: Vec<VertexBufferBinding>,
    },
    SetIndexBuffer {
        buffer: Handle,
        format: IndexFormat,
        offset_bytes: u32,
    },
    SetPrimitiveTopology {
        topology: PrimitiveTopology,
    },
    SetTexture {
        slot: u32,
        texture: Handle,
    },
    Clear {
        flags: ClearFlags,
        color: [f32; 4],
        depth: f32,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
    },
    Present {
        flags: u32,
    },
}

impl Cmd {
    pub fn opcode(&self) -> Opcode {
        match self {
            Cmd::Nop => Opcode::Nop,
            Cmd::BeginMarker { .. } => Opcode::BeginMarker,
            Cmd::EndMarker => Opcode::EndMarker,
            Cmd::CreateBuffer { .. } => Opcode::CreateBuffer,
            Cmd::CreateTexture2d { .. } => Opcode::CreateTexture2d,
            Cmd::DestroyResource { .. } => Opcode::DestroyResource,
            Cmd::UploadResource { .. } => Opcode::UploadResource,
            Cmd::CreateInputLayout { .. } => Opcode::CreateInputLayout,
            Cmd::SetInputLayout { .. } => Opcode::SetInputLayout,
            Cmd::SetBlendState { .. } => Opcode::SetBlendState,
            Cmd::SetDepthState { .. } => Opcode::SetDepthState,
            Cmd::SetRasterizerState { .. } => Opcode::SetRasterizerState,
            Cmd::SetRenderTargets { .. } => Opcode::SetRenderTargets,
            Cmd::SetViewport { .. } => Opcode::SetViewport,
            Cmd::SetScissor { .. } => Opcode::SetScissor,
            Cmd::SetVertexBuffers { .. } => Opcode::SetVertexBuffers,
            Cmd::SetIndexBuffer { .. } => Opcode::SetIndexBuffer,
            Cmd::SetPrimitiveTopology { .. } => Opcode::SetPrimitiveTopology,
            Cmd::SetTexture { .. } => Opcode::SetTexture,
            Cmd::Clear { .. } => Opcode::Clear,
            Cmd::Draw { .. } => Opcode::Draw,
            Cmd::DrawIndexed { .. } => Opcode::DrawIndexed,
            Cmd::Present { .. } => Opcode::Present,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CmdDecodeError {
    TruncatedStream {
        need: usize,
        got: usize,
    },
    BadMagic(u32),
    UnsupportedAbiVersion(u32),
    /// The header's `size_bytes` disagrees with the byte slice handed to the decoder.
    StreamSizeMismatch {
        header: u32,
        actual: usize,
    },
    TruncatedPacket {
        offset: usize,
    },
    /// Packet `size_bytes` is below the header size or not 4-byte aligned.
    InvalidPacketSize {
        offset: usize,
        size_bytes: u32,
    },
    UnknownOpcode {
        offset: usize,
        opcode: u32,
    },
    PayloadTooSmall {
        offset: usize,
        opcode: Opcode,
        need: usize,
        got: usize,
    },
    InvalidEnum {
        offset: usize,
        what: &'static str,
        value: u32,
    },
    InvalidMarkerLabel {
        offset: usize,
    },
    TooManyColorTargets {
        offset: usize,
        count: u32,
    },
}

impl fmt::Display for CmdDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmdDecodeError::TruncatedStream { need, got } => {
                write!(f, "stream too short for header: need {need} bytes, got {got}")
            }
            CmdDecodeError::BadMagic(v) => write!(f, "bad stream magic 0x{v:08X}"),
            CmdDecodeError::UnsupportedAbiVersion(v) => {
                write!(f, "unsupported command ABI version {v}")
            }
            CmdDecodeError::StreamSizeMismatch { header, actual } => write!(
                f,
                "stream header size_bytes={header} does not match slice length {actual}"
            ),
            CmdDecodeError::TruncatedPacket { offset } => {
                write!(f, "truncated packet at offset {offset}")
            }
            CmdDecodeError::InvalidPacketSize { offset, size_bytes } => {
                write!(f, "invalid packet size_bytes={size_bytes} at offset {offset}")
            }
            CmdDecodeError::UnknownOpcode { offset, opcode } => {
                write!(f, "unknown opcode 0x{opcode:X} at offset {offset}")
            }
            CmdDecodeError::PayloadTooSmall {
                offset,
                opcode,
                need,
                got,
            } => write!(
                f,
                "packet at offset {offset} ({opcode:?}) too small: need >= {need} payload bytes, got {got}"
            ),
            CmdDecodeError::InvalidEnum {
                offset,
                what,
                value,
            } => write!(f, "invalid {what} value {value} at offset {offset}"),
            CmdDecodeError::InvalidMarkerLabel { offset } => {
                write!(f, "marker label at offset {offset} is not valid UTF-8")
            }
            CmdDecodeError::TooManyColorTargets { offset, count } => {
                write!(f, "SetRenderTargets at offset {offset} binds {count} color targets")
            }
        }
    }
}

impl std::error::Error for CmdDecodeError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CmdStreamHeader {
    pub magic: u32,
    pub abi_version: u32,
    pub size_bytes: u32,
    pub flags: u32,
}

pub fn decode_cmd_stream_header_le(bytes: &[u8]) -> Result<CmdStreamHeader, CmdDecodeError> {
    if bytes.len() < CMD_STREAM_HEADER_SIZE {
        return Err(CmdDecodeError::TruncatedStream {
            need: CMD_STREAM_HEADER_SIZE,
            got: bytes.len(),
        });
    }
    let magic = read_u32(bytes, 0);
    if magic != CMD_STREAM_MAGIC {
        return Err(CmdDecodeError::BadMagic(magic));
    }
    let abi_version = read_u32(bytes, 4);
    if abi_version != COMMAND_ABI_VERSION {
        return Err(CmdDecodeError::UnsupportedAbiVersion(abi_version));
    }
    Ok(CmdStreamHeader {
        magic,
        abi_version,
        size_bytes: read_u32(bytes, 8),
        flags: read_u32(bytes, 12),
    })
}

/// A raw packet: header plus (padded) payload, with the packet's byte offset
/// from the start of the stream.
#[derive(Clone, Copy, Debug)]
pub struct CmdPacket<'a> {
    pub offset: usize,
    pub opcode_raw: u32,
    pub size_bytes: u32,
    pub payload: &'a [u8],
}

/// Validating packet iterator over a command stream.
pub struct CmdStreamIter<'a> {
    bytes: &'a [u8],
    cursor: usize,
    failed: bool,
}

impl<'a> CmdStreamIter<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self, CmdDecodeError> {
        let header = decode_cmd_stream_header_le(bytes)?;
        if header.size_bytes as usize != bytes.len() {
            return Err(CmdDecodeError::StreamSizeMismatch {
                header: header.size_bytes,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            bytes,
            cursor: CMD_STREAM_HEADER_SIZE,
            failed: false,
        })
    }
}

impl<'a> Iterator for CmdStreamIter<'a> {
    type Item = Result<CmdPacket<'a>, CmdDecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor >= self.bytes.len() {
            return None;
        }
        let offset = self.cursor;
        if self.bytes.len() - offset < CMD_PACKET_HEADER_SIZE {
            self.failed = true;
            return Some(Err(CmdDecodeError::TruncatedPacket { offset }));
        }
        let opcode_raw = read_u32(self.bytes, offset);
        let size_bytes = read_u32(self.bytes, offset + 4);
        if (size_bytes as usize) < CMD_PACKET_HEADER_SIZE || size_bytes % 4 != 0 {
            self.failed = true;
            return Some(Err(CmdDecodeError::InvalidPacketSize { offset, size_bytes }));
        }
        let end = match offset.checked_add(size_bytes as usize) {
            Some(end) if end <= self.bytes.len() => end,
            _ => {
                self.failed = true;
                return Some(Err(CmdDecodeError::TruncatedPacket { offset }));
            }
        };
        self.cursor = end;
        Some(Ok(CmdPacket {
            offset,
            opcode_raw,
            size_bytes,
            payload: &self.bytes[offset + CMD_PACKET_HEADER_SIZE..end],
        }))
    }
}

/// Decode a whole stream into typed commands paired with packet offsets.
pub fn parse_cmd_stream(bytes: &[u8]) -> Result<Vec<(usize, Cmd)>, CmdDecodeError> {
    let iter = CmdStreamIter::new(bytes)?;
    let mut out = Vec::new();
    for packet in iter {
        let packet = packet?;
        out.push((packet.offset, decode_packet(&packet)?));
    }
    Ok(out)
}

fn decode_packet(packet: &CmdPacket<'_>) -> Result<Cmd, CmdDecodeError> {
    let offset = packet.offset;
    let opcode = Opcode::from_u32(packet.opcode_raw).ok_or(CmdDecodeError::UnknownOpcode {
        offset,
        opcode: packet.opcode_raw,
    })?;
    let p = packet.payload;

    let need = |need: usize| -> Result<(), CmdDecodeError> {
        if p.len() < need {
            Err(CmdDecodeError::PayloadTooSmall {
                offset,
                opcode,
                need,
                got: p.len(),
            })
        } else {
            Ok(())
        }
    };

    let cmd = match opcode {
        Opcode::Nop => Cmd::Nop,
        Opcode::BeginMarker => {
            need(4)?;
            let label_len = read_u32(p, 0) as usize;
            need(4 + label_len)?;
            let label = std::str::from_utf8(&p[4..4 + label_len])
                .map_err(|_| CmdDecodeError::InvalidMarkerLabel { offset })?
                .to_string();
            Cmd::BeginMarker { label }
        }
        Opcode::EndMarker => Cmd::EndMarker,
        Opcode::CreateBuffer => {
            need(16)?;
            Cmd::CreateBuffer {
                handle: read_u32(p, 0),
                usage_flags: read_u32(p, 4),
                size_bytes: read_u64(p, 8),
            }
        }
        Opcode::CreateTexture2d => {
            need(24)?;
            let format_raw = read_u32(p, 8);
            Cmd::CreateTexture2d {
                handle: read_u32(p, 0),
                usage_flags: read_u32(p, 4),
                format: TextureFormat::from_u32(format_raw).ok_or(CmdDecodeError::InvalidEnum {
                    offset,
                    what: "texture format",
                    value: format_raw,
                })?,
                width: read_u32(p, 12),
                height: read_u32(p, 16),
            }
        }
        Opcode::DestroyResource => {
            need(8)?;
            Cmd::DestroyResource {
                handle: read_u32(p, 0),
            }
        }
        Opcode::UploadResource => {
            need(24)?;
            let size = usize::try_from(read_u64(p, 16))
                .map_err(|_| CmdDecodeError::TruncatedPacket { offset })?;
            let total = 24usize
                .checked_add(size)
                .ok_or(CmdDecodeError::TruncatedPacket { offset })?;
            need(total)?;
            Cmd::UploadResource {
                handle: read_u32(p, 0),
                offset_bytes: read_u64(p, 8),
                data: p[24..24 + size].to_vec(),
            }
        }
        Opcode::CreateInputLayout => {
            need(8)?;
            let count = read_u32(p, 4) as usize;
            let table_len = count
                .checked_mul(12)
                .ok_or(CmdDecodeError::TruncatedPacket { offset })?;
            need(8 + table_len)?;
            let mut attrs = Vec::with_capacity(count);
            for i in 0..count {
                let base = 8 + i * 12;
                let semantic_raw = read_u32(p, base);
                let format_raw = read_u32(p, base + 4);
                attrs.push(VertexAttr {
                    semantic: VertexSemantic::from_u32(semantic_raw).ok_or(
                        CmdDecodeError::InvalidEnum {
                            offset,
                            what: "vertex semantic",
                            value: semantic_raw,
                        },
                    )?,
                    format: VertexFormat::from_u32(format_raw).ok_or(
                        CmdDecodeError::InvalidEnum {
                            offset,
                            what: "vertex format",
                            value: format_raw,
                        },
                    )?,
                    offset_bytes: read_u32(p, base + 8),
                });
            }
            Cmd::CreateInputLayout {
                handle: read_u32(p, 0),
                attrs,
            }
        }
        Opcode::SetInputLayout => {
            need(8)?;
            Cmd::SetInputLayout {
                handle: read_u32(p, 0),
            }
        }
        Opcode::SetBlendState => {
            need(16)?;
            let src_raw = read_u32(p, 4);
            let dst_raw = read_u32(p, 8);
            Cmd::SetBlendState {
                enable: read_u32(p, 0) != 0,
                src_factor: BlendFactor::from_u32(src_raw).ok_or(CmdDecodeError::InvalidEnum {
                    offset,
                    what: "blend factor",
                    value: src_raw,
                })?,
                dst_factor: BlendFactor::from_u32(dst_raw).ok_or(CmdDecodeError::InvalidEnum {
                    offset,
                    what: "blend factor",
                    value: dst_raw,
                })?,
            }
        }
        Opcode::SetDepthState => {
            need(16)?;
            let func_raw = read_u32(p, 8);
            Cmd::SetDepthState {
                depth_enable: read_u32(p, 0) != 0,
                depth_write: read_u32(p, 4) != 0,
                depth_func: CompareFunc::from_u32(func_raw).ok_or(CmdDecodeError::InvalidEnum {
                    offset,
                    what: "compare func",
                    value: func_raw,
                })?,
            }
        }
        Opcode::SetRasterizerState => {
            need(16)?;
            let cull_raw = read_u32(p, 0);
            Cmd::SetRasterizerState {
                cull_mode: CullMode::from_u32(cull_raw).ok_or(CmdDecodeError::InvalidEnum {
                    offset,
                    what: "cull mode",
                    value: cull_raw,
                })?,
                front_ccw: read_u32(p, 4) != 0,
                scissor_enable: read_u32(p, 8) != 0,
            }
        }
        Opcode::SetRenderTargets => {
            need(8 + MAX_COLOR_TARGETS * 4)?;
            let count = read_u32(p, 0);
            if count as usize > MAX_COLOR_TARGETS {
                return Err(CmdDecodeError::TooManyColorTargets { offset, count });
            }
            let depth_raw = read_u32(p, 4);
            let mut colors = Vec::with_capacity(count as usize);
            for i in 0..count as usize {
                colors.push(read_u32(p, 8 + i * 4));
            }
            Cmd::SetRenderTargets {
                colors,
                depth: (depth_raw != 0).then_some(depth_raw),
            }
        }
        Opcode::SetViewport => {
            need(24)?;
            Cmd::SetViewport {
                x: read_f32(p, 0),
                y: read_f32(p, 4),
                width: read_f32(p, 8),
                height: read_f32(p, 12),
                min_depth: read_f32(p, 16),
                max_depth: read_f32(p, 20),
            }
        }
        Opcode::SetScissor => {
            need(16)?;
            Cmd::SetScissor {
                x: read_u32(p, 0) as i32,
                y: read_u32(p, 4) as i32,
                width: read_u32(p, 8) as i32,
                height: read_u32(p, 12) as i32,
            }
        }
        Opcode::SetVertexBuffers => {
            need(8)?;
            let count = read_u32(p, 4) as usize;
            let table_len = count
                .checked_mul(16)
                .ok_or(CmdDecodeError::TruncatedPacket { offset })?;
            need(8 + table_len)?;
            let mut bindings = Vec::with_capacity(count);
            for i in 0..count {
                let base = 8 + i * 16;
                bindings.push(VertexBufferBinding {
                    buffer: read_u32(p, base),
                    stride_bytes: read_u32(p, base + 4),
                    offset_bytes: read_u32(p, base + 8),
                });
            }
            Cmd::SetVertexBuffers {
                start_slot: read_u32(p, 0),
                bindings,
            }
        }
        Opcode::SetIndexBuffer => {
            need(16)?;
            let format_raw = read_u32(p, 4);
            Cmd::SetIndexBuffer {
                buffer: read_u32(p, 0),
                format: IndexFormat::from_u32(format_raw).ok_or(CmdDecodeError::InvalidEnum {
                    offset,
                    what: "index format",
                    value: format_raw,
                })?,
                offset_bytes: read_u32(p, 8),
            }
        }
        Opcode::SetPrimitiveTopology => {
            need(8)?;
            let topo_raw = read_u32(p, 0);
            Cmd::SetPrimitiveTopology {
                topology: PrimitiveTopology::from_u32(topo_raw).ok_or(
                    CmdDecodeError::InvalidEnum {
                        offset,
                        what: "primitive topology",
                        value: topo_raw,
                    },
                )?,
            }
        }
        Opcode::SetTexture => {
            need(8)?;
            Cmd::SetTexture {
                slot: read_u32(p, 0),
                texture: read_u32(p, 4),
            }
        }
        Opcode::Clear => {
            need(28)?;
            Cmd::Clear {
                flags: ClearFlags(read_u32(p, 0)),
                color: [
                    read_f32(p, 4),
                    read_f32(p, 8),
                    read_f32(p, 12),
                    read_f32(p, 16),
                ],
                depth: read_f32(p, 20),
            }
        }
        Opcode::Draw => {
            need(16)?;
            Cmd::Draw {
                vertex_count: read_u32(p, 0),
                instance_count: read_u32(p, 4),
                first_vertex: read_u32(p, 8),
            }
        }
        Opcode::DrawIndexed => {
            need(16)?;
            Cmd::DrawIndexed {
                index_count: read_u32(p, 0),
                instance_count: read_u32(p, 4),
                first_index: read_u32(p, 8),
                base_vertex: read_u32(p, 12) as i32,
            }
        }
        Opcode::Present => {
            need(8)?;
            Cmd::Present {
                flags: read_u32(p, 0),
            }
        }
    };
    Ok(cmd)
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
}

fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}
