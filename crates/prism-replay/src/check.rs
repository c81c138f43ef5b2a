//! Assertion helpers for capture-checking tests.
//!
//! Every violated check is fatal to its test case; there is no retry or
//! degraded mode. `check_pixel_value` accepts fractional coordinates in
//! `[0, 1)` which scale by the target extent, so `(0.5, 0.5)` samples the
//! center texel; coordinates `>= 1.0` are used as integer texel coordinates.

use crate::controller::{PixelValue, ReplayController, ReplayError};
use crate::resources::ResourceId;

/// Default per-channel tolerance for pixel comparisons.
pub const PIXEL_EPS: f32 = 2.0 / 255.0;

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("check failed: {0}")]
    Failed(String),

    #[error(
        "pixel ({x}, {y}) of {resource:?}: expected {expected:?}, got {got:?} (eps {eps})"
    )]
    PixelMismatch {
        resource: ResourceId,
        x: u32,
        y: u32,
        expected: PixelValue,
        got: PixelValue,
        eps: f32,
    },

    #[error(transparent)]
    Replay(#[from] ReplayError),
}

/// Hard assertion: `cond` must hold or the test case fails.
pub fn check(cond: bool, msg: impl Into<String>) -> Result<(), CheckError> {
    if cond {
        Ok(())
    } else {
        Err(CheckError::Failed(msg.into()))
    }
}

pub fn check_pixel_value(
    controller: &ReplayController,
    resource: ResourceId,
    x: f32,
    y: f32,
    expected: PixelValue,
) -> Result<(), CheckError> {
    check_pixel_value_eps(controller, resource, x, y, expected, PIXEL_EPS)
}

pub fn check_pixel_value_eps(
    controller: &ReplayController,
    resource: ResourceId,
    x: f32,
    y: f32,
    expected: PixelValue,
    eps: f32,
) -> Result<(), CheckError> {
    let (width, height) = controller.texture_extent(resource)?;
    let px = resolve_coord(x, width);
    let py = resolve_coord(y, height);
    let got = controller.read_pixel(resource, px, py)?;
    let matches = got
        .iter()
        .zip(expected.iter())
        .all(|(g, e)| (g - e).abs() <= eps);
    if matches {
        Ok(())
    } else {
        Err(CheckError::PixelMismatch {
            resource,
            x: px,
            y: py,
            expected,
            got,
            eps,
        })
    }
}

fn resolve_coord(v: f32, extent: u32) -> u32 {
    if v < 1.0 {
        (v.max(0.0) * extent as f32) as u32
    } else {
        v as u32
    }
}
