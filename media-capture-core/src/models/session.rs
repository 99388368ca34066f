use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::device::{Device, MediaKind};

/// A data output attached to the capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutputKind {
    VideoData,
    AudioData,
}

impl OutputKind {
    pub fn media_kind(&self) -> MediaKind {
        match self {
            Self::VideoData => MediaKind::Video,
            Self::AudioData => MediaKind::Audio,
        }
    }

    pub fn for_kind(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Video => Self::VideoData,
            MediaKind::Audio => Self::AudioData,
        }
    }
}

/// Inputs and outputs wired into a capture session.
///
/// Holds one slot per media kind, so two active inputs of the same kind
/// cannot be represented.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionWiring {
    pub video_input: Option<Device>,
    pub audio_input: Option<Device>,
    pub outputs: BTreeSet<OutputKind>,
}

impl SessionWiring {
    pub fn input(&self, kind: MediaKind) -> Option<&Device> {
        match kind {
            MediaKind::Video => self.video_input.as_ref(),
            MediaKind::Audio => self.audio_input.as_ref(),
        }
    }

    pub(crate) fn input_slot(&mut self, kind: MediaKind) -> &mut Option<Device> {
        match kind {
            MediaKind::Video => &mut self.video_input,
            MediaKind::Audio => &mut self.audio_input,
        }
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Device> {
        self.video_input.iter().chain(self.audio_input.iter())
    }

    pub fn has_output(&self, kind: OutputKind) -> bool {
        self.outputs.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.video_input.is_none() && self.audio_input.is_none() && self.outputs.is_empty()
    }
}

/// Lifecycle status of a capture session.
///
/// ```text
/// idle → running ⇄ stopped
///          ↓
///     interrupted → reconnecting → running
///                        ↓
///                      failed
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Running,
    Stopped,
    Interrupted { reason: String },
    Reconnecting { attempt: u32 },
    Failed { message: String },
}

impl SessionStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}
