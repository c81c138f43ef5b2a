//! Event numbering and draw lookup.
//!
//! Every decoded command in the capture gets a monotonically increasing
//! [`EventId`] starting at 1, assigned across all frames in submission
//! order. `Clear`/`Draw`/`DrawIndexed`/`Present` are *action* events and get
//! API-call-like names; `BeginMarker`/`EndMarker` delimit labeled regions
//! that group actions into a tree.

use prism_protocol::{ClearFlags, Cmd};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u32);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    Clear,
    Draw,
    DrawIndexed,
    Present,
}

/// One action event, addressable by id and name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionEvent {
    pub event_id: EventId,
    pub name: String,
    pub kind: ActionKind,
    pub frame_index: u32,
    /// Labels of enclosing markers, outermost first.
    pub marker_path: Vec<String>,
}

/// Browser-style event tree: markers with children, actions as leaves.
/// State-setting commands consume event ids but do not appear here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventNode {
    Marker {
        event_id: EventId,
        label: String,
        children: Vec<EventNode>,
    },
    Action {
        event_id: EventId,
        name: String,
        kind: ActionKind,
    },
}

#[derive(Debug, Default)]
pub(crate) struct EventIndex {
    pub actions: Vec<ActionEvent>,
    pub tree: Vec<EventNode>,
    pub last_event: u32,
}

pub(crate) fn action_kind(cmd: &Cmd) -> Option<ActionKind> {
    match cmd {
        Cmd::Clear { .. } => Some(ActionKind::Clear),
        Cmd::Draw { .. } => Some(ActionKind::Draw),
        Cmd::DrawIndexed { .. } => Some(ActionKind::DrawIndexed),
        Cmd::Present { .. } => Some(ActionKind::Present),
        _ => None,
    }
}

pub(crate) fn action_name(cmd: &Cmd) -> Option<String> {
    Some(match cmd {
        Cmd::Clear { flags, .. } => format!("Clear({})", clear_suffix(*flags)),
        Cmd::Draw { vertex_count, .. } => format!("Draw({vertex_count})"),
        Cmd::DrawIndexed { index_count, .. } => format!("DrawIndexed({index_count})"),
        Cmd::Present { .. } => "Present()".to_string(),
        _ => return None,
    })
}

fn clear_suffix(flags: ClearFlags) -> &'static str {
    match (flags.color(), flags.depth()) {
        (true, true) => "Color|Depth",
        (true, false) => "Color",
        (false, true) => "Depth",
        (false, false) => "",
    }
}

/// Assigns event ids and builds the action list + marker tree.
/// `cmds` is the flattened per-frame command sequence.
pub(crate) fn build_event_index<'a, I>(cmds: I) -> EventIndex
where
    I: IntoIterator<Item = (u32, &'a Cmd)>,
{
    let mut index = EventIndex::default();
    // Stack of open marker nodes; the bottom collects completed roots.
    let mut stack: Vec<EventNode> = Vec::new();
    let mut roots: Vec<EventNode> = Vec::new();
    let mut marker_path: Vec<String> = Vec::new();
    let mut next_event = 1u32;

    for (frame_index, cmd) in cmds {
        let event_id = EventId(next_event);
        next_event += 1;

        match cmd {
            Cmd::BeginMarker { label } => {
                marker_path.push(label.clone());
                stack.push(EventNode::Marker {
                    event_id,
                    label: label.clone(),
                    children: Vec::new(),
                });
            }
            Cmd::EndMarker => {
                // Unbalanced EndMarker is tolerated, like a capture whose
                // frame boundary split a marker region.
                if let Some(done) = stack.pop() {
                    marker_path.pop();
                    attach(&mut stack, &mut roots, done);
                }
            }
            _ => {
                if let (Some(kind), Some(name)) = (action_kind(cmd), action_name(cmd)) {
                    index.actions.push(ActionEvent {
                        event_id,
                        name: name.clone(),
                        kind,
                        frame_index,
                        marker_path: marker_path.clone(),
                    });
                    attach(
                        &mut stack,
                        &mut roots,
                        EventNode::Action {
                            event_id,
                            name,
                            kind,
                        },
                    );
                }
            }
        }
    }

    // Close any markers left open at the end of the capture.
    while let Some(done) = stack.pop() {
        attach(&mut stack, &mut roots, done);
    }

    index.tree = roots;
    index.last_event = next_event - 1;
    index
}

fn attach(stack: &mut [EventNode], roots: &mut Vec<EventNode>, node: EventNode) {
    match stack.last_mut() {
        Some(EventNode::Marker { children, .. }) => children.push(node),
        _ => roots.push(node),
    }
}
