use uuid::Uuid;

use heirloom_types::models::{Profile, Relationship};

use crate::backend::{Backend, BackendError};
use crate::visibility;

/// Why a signed-in user cannot browse stories yet.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("profile setup required")]
    ProfileMissing,

    #[error("relationship not set on profile")]
    RelationshipUnset,

    #[error("profile awaiting family verification")]
    Unverified,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// The viewer a request acts on behalf of. Built once per request and passed
/// to every feed function instead of being read from ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerContext {
    pub user_id: Uuid,
    pub relationship: Relationship,
    allowed: Vec<Relationship>,
}

impl ViewerContext {
    pub fn new(user_id: Uuid, relationship: Relationship) -> Self {
        Self {
            user_id,
            relationship,
            allowed: visibility::allowed_categories(relationship),
        }
    }

    /// Only a verified profile with a relationship may browse.
    pub fn from_profile(profile: Option<&Profile>) -> Result<Self, AccessError> {
        let profile = profile.ok_or(AccessError::ProfileMissing)?;
        let relationship = profile.relationship.ok_or(AccessError::RelationshipUnset)?;
        if !profile.is_verified {
            return Err(AccessError::Unverified);
        }
        Ok(Self::new(profile.id, relationship))
    }

    pub fn resolve<B: Backend + ?Sized>(backend: &B, user_id: Uuid) -> Result<Self, AccessError> {
        let profile = backend.profile(user_id)?;
        Self::from_profile(profile.as_ref())
    }

    pub fn allowed_categories(&self) -> &[Relationship] {
        &self.allowed
    }

    pub fn can_view(&self, owner_id: Uuid, story_categories: &[Relationship]) -> bool {
        visibility::may_view(self.user_id, &self.allowed, owner_id, story_categories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn profile(relationship: Option<Relationship>, verified: bool) -> Profile {
        Profile {
            id: Uuid::new_v4(),
            full_name: "Nasreen".into(),
            email: "nasreen@example.com".into(),
            relationship,
            bio: None,
            avatar_key: None,
            is_verified: verified,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn missing_profile_is_denied() {
        assert!(matches!(ViewerContext::from_profile(None), Err(AccessError::ProfileMissing)));
    }

    #[test]
    fn unset_relationship_is_denied() {
        let p = profile(None, true);
        assert!(matches!(
            ViewerContext::from_profile(Some(&p)),
            Err(AccessError::RelationshipUnset)
        ));
    }

    #[test]
    fn unverified_is_denied() {
        let p = profile(Some(Relationship::Relative), false);
        assert!(matches!(ViewerContext::from_profile(Some(&p)), Err(AccessError::Unverified)));
    }

    #[test]
    fn verified_viewer_carries_gate() {
        let p = profile(Some(Relationship::ParentOrSibling), true);
        let viewer = ViewerContext::from_profile(Some(&p)).unwrap();
        assert_eq!(viewer.user_id, p.id);
        assert_eq!(
            viewer.allowed_categories(),
            &[Relationship::ParentOrSibling, Relationship::Relative]
        );
    }
}
