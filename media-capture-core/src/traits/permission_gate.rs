use crate::models::error::{CaptureError, MediaAccess};

/// OS authorization state for one kind of media access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorizationStatus {
    Authorized,
    Denied,
    Restricted,
    NotDetermined,
}

/// Camera / microphone / screen-recording permission check.
pub trait PermissionGate: Send + Sync {
    /// Current authorization, without prompting.
    fn status(&self, access: MediaAccess) -> AuthorizationStatus;

    /// Prompt the user if undetermined and return the resulting status.
    fn request(&self, access: MediaAccess) -> AuthorizationStatus;
}

/// Gate a capture attempt on `access` being authorized.
///
/// Denied and restricted map to `PermissionDenied`; an undetermined state is
/// reported separately so callers can prompt instead of failing.
pub fn ensure_authorized(gate: &dyn PermissionGate, access: MediaAccess) -> Result<(), CaptureError> {
    match gate.status(access) {
        AuthorizationStatus::Authorized => Ok(()),
        AuthorizationStatus::Denied | AuthorizationStatus::Restricted => {
            log::warn!("{} access denied", access);
            Err(CaptureError::PermissionDenied(access))
        }
        AuthorizationStatus::NotDetermined => Err(CaptureError::PermissionNotDetermined(access)),
    }
}

/// A gate that authorizes everything. Useful for headless tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionGate for AllowAll {
    fn status(&self, _access: MediaAccess) -> AuthorizationStatus {
        AuthorizationStatus::Authorized
    }

    fn request(&self, _access: MediaAccess) -> AuthorizationStatus {
        AuthorizationStatus::Authorized
    }
}
