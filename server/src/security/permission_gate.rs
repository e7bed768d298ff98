use crate::database::users::User;
use crate::database::{Database, permissions};
use crate::error::ApiError;
use crate::security::authenticator::Identity;

/// What a route demands of its caller. Each level implies the ones before
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Authenticated,
    Activated,
    Permission(&'static str),
}

/// Authorization checks, always applied in the same order: authenticated,
/// then activated, then holding the permission code.
#[derive(Debug, Clone)]
pub struct PermissionGate {
    db: Database,
}

impl PermissionGate {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn require_authenticated<'a>(&self, identity: &'a Identity) -> Result<&'a User, ApiError> {
        identity.user().ok_or(ApiError::AuthenticationRequired)
    }

    pub fn require_activated<'a>(&self, identity: &'a Identity) -> Result<&'a User, ApiError> {
        let user = self.require_authenticated(identity)?;
        if !user.activated {
            return Err(ApiError::AccountInactive);
        }
        Ok(user)
    }

    /// Permissions are read fresh on every call, so grants and revocations
    /// take effect on the next request.
    pub async fn authorize<'a>(&self, identity: &'a Identity, code: &str) -> Result<&'a User, ApiError> {
        let user = self.require_activated(identity)?;
        let held = permissions::get_all_for_user(&self.db, user.id).await?;
        if !held.include(code) {
            return Err(ApiError::PermissionDenied);
        }
        Ok(user)
    }

    pub async fn enforce<'a>(
        &self,
        identity: &'a Identity,
        requirement: Requirement,
    ) -> Result<&'a User, ApiError> {
        match requirement {
            Requirement::Authenticated => self.require_authenticated(identity),
            Requirement::Activated => self.require_activated(identity),
            Requirement::Permission(code) => self.authorize(identity, code).await,
        }
    }
}
