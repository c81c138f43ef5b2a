//! Prism command stream layouts.
//!
//! A capture replays a byte-exact command stream: a fixed stream header
//! followed by length-prefixed, 4-byte-aligned packets. This crate owns the
//! wire layout, a validating decoder, and a safe builder, and intentionally
//! stays dependency-free so every other crate can embed it.

mod cmd;
mod writer;

pub use cmd::{
    decode_cmd_stream_header_le, parse_cmd_stream, BlendFactor, ClearFlags, Cmd, CmdDecodeError,
    CmdPacket, CmdStreamHeader, CmdStreamIter, CompareFunc, CullMode, Handle, IndexFormat, Opcode,
    PrimitiveTopology, TextureFormat, VertexAttr, VertexBufferBinding, VertexFormat,
    VertexSemantic, CMD_PACKET_HEADER_SIZE, CMD_STREAM_HEADER_SIZE, CMD_STREAM_MAGIC,
    COMMAND_ABI_VERSION, MAX_COLOR_TARGETS, USAGE_DEPTH_STENCIL, USAGE_INDEX_BUFFER,
    USAGE_RENDER_TARGET, USAGE_TEXTURE, USAGE_VERTEX_BUFFER,
};
pub use writer::CmdWriter;
