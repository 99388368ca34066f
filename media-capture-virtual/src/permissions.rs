//! Scriptable permission gate.
//!
//! Everything starts authorized. Tests can deny access or leave it
//! undetermined; a request on an undetermined access resolves it to the
//! configured prompt answer, the way a user clicking through an OS dialog
//! would.

use std::collections::HashMap;

use parking_lot::RwLock;

use media_capture_core::models::error::MediaAccess;
use media_capture_core::traits::permission_gate::{AuthorizationStatus, PermissionGate};

pub struct VirtualPermissions {
    statuses: RwLock<HashMap<MediaAccess, AuthorizationStatus>>,
    prompt_answer: AuthorizationStatus,
}

impl VirtualPermissions {
    pub fn new() -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
            prompt_answer: AuthorizationStatus::Authorized,
        }
    }

    /// The status an undetermined access resolves to when requested.
    pub fn with_prompt_answer(mut self, answer: AuthorizationStatus) -> Self {
        self.prompt_answer = answer;
        self
    }

    pub fn set(&self, access: MediaAccess, status: AuthorizationStatus) {
        self.statuses.write().insert(access, status);
    }
}

impl Default for VirtualPermissions {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionGate for VirtualPermissions {
    fn status(&self, access: MediaAccess) -> AuthorizationStatus {
        self.statuses
            .read()
            .get(&access)
            .copied()
            .unwrap_or(AuthorizationStatus::Authorized)
    }

    fn request(&self, access: MediaAccess) -> AuthorizationStatus {
        let mut statuses = self.statuses.write();
        let status = statuses.entry(access).or_insert(AuthorizationStatus::Authorized);
        if *status == AuthorizationStatus::NotDetermined {
            *status = self.prompt_answer;
            log::info!("{} access prompt answered: {:?}", access, status);
        }
        *status
    }
}
