use serde::{Deserialize, Serialize};

/// A named currency within the points economy (e.g. "gold").
///
/// The identifier is stable and immutable; the name is the human-facing
/// handle resolved by the registry. Timestamps are Unix epoch seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointType {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
    pub created_at: i64,
}

impl PointType {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Partial update for a point type; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PointTypeUpdate {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
}
