//! The replay controller: event lookup, replay positioning, pipeline-state
//! snapshots, pixel readback and pixel history over one loaded capture.

use crate::events::{build_event_index, ActionEvent, EventId, EventNode};
use crate::exec::{ExecError, Executor, PresentedFrame};
use crate::history::{PixelModification, PixelProbe};
use crate::resources::{Resource, ResourceId};
use crate::state::PipeState;
use prism_protocol::{parse_cmd_stream, Cmd, CmdDecodeError};
use prism_trace::{BlobKind, TraceReadError, TraceReader, TraceRecord};
use std::collections::HashMap;
use std::io::{Read, Seek};
use tracing::debug;

/// Normalized 4-component color sample.
pub type PixelValue = [f32; 4];

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("trace read error: {0}")]
    Trace(#[from] TraceReadError),

    #[error("command stream decode error: {0}")]
    Decode(#[from] CmdDecodeError),

    #[error("frame {frame_index} submission references unknown command blob {blob_id}")]
    UnknownBlob { frame_index: u32, blob_id: u64 },

    #[error("unknown event id {0}")]
    UnknownEvent(EventId),

    #[error("replay position not set; call set_frame_event first")]
    NoReplayPosition,

    #[error("unknown resource {0:?}")]
    UnknownResource(ResourceId),

    #[error("resource {0:?} is not a texture")]
    NotATexture(ResourceId),

    #[error("pixel ({x}, {y}) out of range for {resource:?} ({width}x{height})")]
    PixelOutOfRange {
        resource: ResourceId,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    #[error("replay failed at event {event}: {source}")]
    Exec {
        event: EventId,
        #[source]
        source: ExecError,
    },
}

struct ReplayStep {
    event_id: EventId,
    frame_index: u32,
    cmd: Cmd,
}

/// Owns the decoded capture and one executor, and exposes the replay
/// contract: events and draws are read-only projections of the capture;
/// pipeline state and pixel values are valid only for the event set by the
/// latest [`set_frame_event`](Self::set_frame_event).
pub struct ReplayController {
    steps: Vec<ReplayStep>,
    actions: Vec<ActionEvent>,
    tree: Vec<EventNode>,
    last_event: u32,
    exec: Executor,
    position: Option<EventId>,
    pipe: Option<PipeState>,
}

impl ReplayController {
    /// Decode every frame of the capture up front and build the event list.
    pub fn open<R: Read + Seek>(mut reader: TraceReader<R>) -> Result<Self, ReplayError> {
        let entries = reader.frame_entries().to_vec();
        let mut steps: Vec<(u32, Cmd)> = Vec::new();

        for entry in entries {
            let records = reader.read_records_in_range(entry.start_offset, entry.end_offset)?;
            // Blob ids resolve within their frame; submissions must
            // reference a blob recorded earlier in the same frame.
            let mut blobs: HashMap<u64, Vec<u8>> = HashMap::new();
            for record in records {
                match record {
                    TraceRecord::BeginFrame { .. } | TraceRecord::Present { .. } => {}
                    TraceRecord::Blob {
                        blob_id,
                        kind: BlobKind::CmdStream,
                        bytes,
                    } => {
                        blobs.insert(blob_id, bytes);
                    }
                    TraceRecord::Submission {
                        cmd_stream_blob_id, ..
                    } => {
                        let bytes = blobs.get(&cmd_stream_blob_id).ok_or(
                            ReplayError::UnknownBlob {
                                frame_index: entry.frame_index,
                                blob_id: cmd_stream_blob_id,
                            },
                        )?;
                        for (_, cmd) in parse_cmd_stream(bytes)? {
                            steps.push((entry.frame_index, cmd));
                        }
                    }
                }
            }
        }

        let index = build_event_index(steps.iter().map(|(frame, cmd)| (*frame, cmd)));
        let steps = steps
            .into_iter()
            .enumerate()
            .map(|(i, (frame_index, cmd))| ReplayStep {
                event_id: EventId(i as u32 + 1),
                frame_index,
                cmd,
            })
            .collect();

        Ok(Self {
            steps,
            actions: index.actions,
            tree: index.tree,
            last_event: index.last_event,
            exec: Executor::new(),
            position: None,
            pipe: None,
        })
    }

    /// Action events of the whole capture, in event order.
    pub fn actions(&self) -> &[ActionEvent] {
        &self.actions
    }

    /// Marker/action tree for browsing.
    pub fn event_tree(&self) -> &[EventNode] {
        &self.tree
    }

    /// Highest event id in the capture; 0 when the capture has no commands.
    pub fn last_event(&self) -> EventId {
        EventId(self.last_event)
    }

    /// First action whose name contains `name` (case-sensitive), in event
    /// order. Duplicate names resolve to the first; no match is `None`.
    pub fn find_draw(&self, name: &str) -> Option<&ActionEvent> {
        self.actions.iter().find(|a| a.name.contains(name))
    }

    /// Current replay position, if one has been set.
    pub fn position(&self) -> Option<EventId> {
        self.position
    }

    /// Reposition replay to immediately after `event_id`.
    ///
    /// Moving forward replays only the delta; an equal target with
    /// `force_reload = false` is a no-op. Moving backwards, or passing
    /// `force_reload = true`, rebuilds state from the start of the capture.
    /// Observable state is identical either way.
    ///
    /// On a replay failure the position is cleared; the capture stays
    /// loaded and the next seek starts from scratch.
    pub fn set_frame_event(
        &mut self,
        event_id: EventId,
        force_reload: bool,
    ) -> Result<(), ReplayError> {
        if event_id.0 == 0 || event_id.0 > self.last_event {
            return Err(ReplayError::UnknownEvent(event_id));
        }
        if !force_reload && self.position == Some(event_id) {
            return Ok(());
        }

        let resume_from = match self.position {
            Some(current) if !force_reload && event_id > current => current.0 + 1,
            _ => {
                self.exec.reset();
                1
            }
        };
        debug!(
            target_event = event_id.0,
            resume_from, force_reload, "set_frame_event"
        );

        let exec = &mut self.exec;
        for step in &self.steps[(resume_from - 1) as usize..event_id.0 as usize] {
            if let Err(source) = exec.execute(&step.cmd, step.event_id, step.frame_index) {
                // A half-replayed executor must not be resumed from; drop the
                // position so the next seek rebuilds from the start.
                exec.reset();
                self.position = None;
                self.pipe = None;
                return Err(ReplayError::Exec {
                    event: step.event_id,
                    source,
                });
            }
        }

        self.pipe = Some(self.exec.snapshot(event_id));
        self.position = Some(event_id);
        Ok(())
    }

    /// Pipeline state bound immediately after the current event.
    pub fn pipeline_state(&self) -> Result<&PipeState, ReplayError> {
        self.pipe.as_ref().ok_or(ReplayError::NoReplayPosition)
    }

    /// Sample a texture resource at integer coordinates, as of the current
    /// replay position.
    pub fn read_pixel(
        &self,
        resource: ResourceId,
        x: u32,
        y: u32,
    ) -> Result<PixelValue, ReplayError> {
        if self.position.is_none() {
            return Err(ReplayError::NoReplayPosition);
        }
        let tex = self.require_texture(resource)?;
        tex.read_pixel(x, y).ok_or(ReplayError::PixelOutOfRange {
            resource,
            x,
            y,
            width: tex.width,
            height: tex.height,
        })
    }

    /// Extent of a texture resource as of the current replay position.
    pub fn texture_extent(&self, resource: ResourceId) -> Result<(u32, u32), ReplayError> {
        if self.position.is_none() {
            return Err(ReplayError::NoReplayPosition);
        }
        let tex = self.require_texture(resource)?;
        Ok((tex.width, tex.height))
    }

    /// Modifications of one pixel across every action event up to and
    /// including the current replay position.
    ///
    /// Runs on a scratch executor; the incremental replay cache and the
    /// current position are untouched.
    pub fn pixel_history(
        &mut self,
        resource: ResourceId,
        x: u32,
        y: u32,
    ) -> Result<Vec<PixelModification>, ReplayError> {
        let Some(position) = self.position else {
            return Err(ReplayError::NoReplayPosition);
        };
        // Validate target and coordinates against current state first.
        let tex = self.require_texture(resource)?;
        if !tex.in_bounds(x, y) {
            return Err(ReplayError::PixelOutOfRange {
                resource,
                x,
                y,
                width: tex.width,
                height: tex.height,
            });
        }
        debug!(?resource, x, y, through_event = position.0, "pixel history");

        let mut scratch = Executor::new();
        scratch.set_probe(PixelProbe {
            target: resource.0,
            x,
            y,
            mods: Vec::new(),
        });
        for step in &self.steps[..position.0 as usize] {
            scratch
                .execute(&step.cmd, step.event_id, step.frame_index)
                .map_err(|source| ReplayError::Exec {
                    event: step.event_id,
                    source,
                })?;
        }
        Ok(scratch.take_probe().map(|p| p.mods).unwrap_or_default())
    }

    /// Frames presented during replay up to the current position.
    pub fn presented_frames(&self) -> &[PresentedFrame] {
        self.exec.presented_frames()
    }

    fn require_texture(
        &self,
        resource: ResourceId,
    ) -> Result<&crate::resources::Texture2d, ReplayError> {
        match self.exec.resource(resource) {
            Some(Resource::Texture2d(tex)) => Ok(tex),
            Some(_) => Err(ReplayError::NotATexture(resource)),
            None => Err(ReplayError::UnknownResource(resource)),
        }
    }
}
