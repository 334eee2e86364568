//! View host boundary.
//!
//! The engine never owns an editor. It sees each open view through
//! [`SandboxView`] and learns about view activity through [`ViewEvent`]s.

use sandbox_types::{GroupId, ViewHandle};
use std::fmt;
use std::sync::Arc;

/// One open view of a sandbox, as exposed by the host.
pub trait SandboxView: Send + Sync {
    /// The view's handle. Must be stable for the life of the view.
    fn handle(&self) -> ViewHandle;

    /// The view's current buffer.
    fn content(&self) -> String;

    /// Replaces the view's buffer. Must not emit a content-changed event
    /// back into the engine.
    fn set_content(&self, content: &str);
}

/// Activity reported by the view host.
#[derive(Clone)]
pub enum ViewEvent {
    /// A view of `group_id` was opened.
    Opened {
        group_id: GroupId,
        view: Arc<dyn SandboxView>,
    },

    /// A view is closing. `abortable` is true when the host can keep the
    /// view open if the user cancels.
    Closed {
        group_id: GroupId,
        handle: ViewHandle,
        abortable: bool,
    },

    /// The user edited `source`'s buffer.
    ContentChanged {
        group_id: GroupId,
        content: String,
        source: ViewHandle,
    },
}

impl ViewEvent {
    /// The group this event concerns.
    pub fn group_id(&self) -> &GroupId {
        match self {
            Self::Opened { group_id, .. }
            | Self::Closed { group_id, .. }
            | Self::ContentChanged { group_id, .. } => group_id,
        }
    }
}

impl fmt::Debug for ViewEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opened { group_id, view } => f
                .debug_struct("Opened")
                .field("group_id", group_id)
                .field("view", &view.handle())
                .finish(),
            Self::Closed {
                group_id,
                handle,
                abortable,
            } => f
                .debug_struct("Closed")
                .field("group_id", group_id)
                .field("handle", handle)
                .field("abortable", abortable)
                .finish(),
            Self::ContentChanged {
                group_id,
                content,
                source,
            } => f
                .debug_struct("ContentChanged")
                .field("group_id", group_id)
                .field("len", &content.len())
                .field("source", source)
                .finish(),
        }
    }
}
