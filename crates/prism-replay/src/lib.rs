//! Deterministic replay engine for prism captures.
//!
//! Opening a capture decodes every frame's command streams and assigns each
//! command an event id. The [`ReplayController`] then exposes the debugging
//! contract: find draws by name, reposition replay to an event, inspect the
//! pipeline state bound there, read pixels back from render targets, and
//! reconstruct the modification history of a single pixel.
//!
//! Execution is a CPU rasterizer, so replaying the same capture always
//! produces bit-identical results; there is no GPU, driver, or adapter
//! dependence anywhere in the engine.

mod check;
mod controller;
mod events;
mod exec;
mod history;
mod raster;
mod resources;
mod state;

pub use check::{check, check_pixel_value, check_pixel_value_eps, CheckError, PIXEL_EPS};
pub use controller::{PixelValue, ReplayController, ReplayError};
pub use events::{ActionEvent, ActionKind, EventId, EventNode};
pub use exec::{ExecError, Executor, PresentedFrame};
pub use history::{ModValue, PixelModification};
pub use resources::{Buffer, Resource, ResourceId, Texture2d};
pub use state::{
    BlendState, DepthState, IndexBinding, OutputTarget, PipeState, RasterState, ScissorRect,
    VertexStream, Viewport,
};
