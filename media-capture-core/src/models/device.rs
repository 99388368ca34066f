use serde::{Deserialize, Serialize};

/// Media type of a device, output or sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video => f.write_str("video"),
            Self::Audio => f.write_str("audio"),
        }
    }
}

/// Physical placement of a capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePosition {
    Front,
    Back,
    External,
    #[default]
    Unspecified,
}

/// A capture device as reported by the OS catalog.
///
/// Devices are rediscovered on every enumeration; identity is the stable
/// `id`, so two `Device` values compare equal whenever their ids match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub kind: MediaKind,
    pub display_name: String,
    pub is_connected: bool,
    #[serde(default)]
    pub position: DevicePosition,
    #[serde(default)]
    pub is_default: bool,
}

impl Device {
    pub fn new(id: impl Into<String>, kind: MediaKind, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            display_name: display_name.into(),
            is_connected: true,
            position: DevicePosition::Unspecified,
            is_default: false,
        }
    }

    pub fn with_position(mut self, position: DevicePosition) -> Self {
        self.position = position;
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Device {}

impl std::hash::Hash for Device {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
