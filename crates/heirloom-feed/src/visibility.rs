use uuid::Uuid;

use heirloom_types::models::Relationship;

/// Visibility categories a viewer with `relationship` may see.
///
/// Closer relations see more: a spouse or child sees everything published to
/// parents/siblings and relatives as well. Friends see only friend stories.
pub fn allowed_categories(relationship: Relationship) -> Vec<Relationship> {
    match relationship {
        Relationship::SpouseOrChild => vec![
            Relationship::SpouseOrChild,
            Relationship::ParentOrSibling,
            Relationship::Relative,
        ],
        Relationship::ParentOrSibling => {
            vec![Relationship::ParentOrSibling, Relationship::Relative]
        }
        other => vec![other],
    }
}

/// A story with no visibility rows matches nothing.
pub fn intersects(story_categories: &[Relationship], allowed: &[Relationship]) -> bool {
    story_categories.iter().any(|c| allowed.contains(c))
}

/// Owners always reach their own stories; everyone else goes through the gate.
pub fn may_view(
    viewer_id: Uuid,
    allowed: &[Relationship],
    owner_id: Uuid,
    story_categories: &[Relationship],
) -> bool {
    viewer_id == owner_id || intersects(story_categories, allowed)
}
