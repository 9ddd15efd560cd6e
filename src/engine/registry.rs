use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::errors::{PointsError, Result};
use crate::models::{PointType, PointTypeUpdate};
use crate::stores::PointTypeStore;

/// Reference data for point types.
///
/// Every other component resolves a human-facing name to a stable id
/// here before touching the ledger or the ranking index; name lookups
/// never cross into those components directly.
pub struct PointTypeRegistry {
    store: Arc<dyn PointTypeStore>,
}

impl PointTypeRegistry {
    pub fn new(store: Arc<dyn PointTypeStore>) -> Self {
        Self { store }
    }

    /// Register a new point type and return its id.
    pub async fn create(
        &self,
        name: &str,
        display_name: &str,
        description: &str,
    ) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PointsError::InvalidInput("name cannot be empty".into()));
        }

        let id = self
            .store
            .create(&PointType {
                id: String::new(),
                name: name.to_string(),
                display_name: display_name.trim().to_string(),
                description: description.trim().to_string(),
                enabled: true,
                deleted_at: None,
                created_at: 0,
            })
            .await?;

        info!(point_type_id = %id, name = %name, "created point type");
        Ok(id)
    }

    /// Apply a partial update; absent fields are left untouched.
    pub async fn update(&self, id: &str, updates: PointTypeUpdate) -> Result<()> {
        let mut existing = self
            .store
            .get_by_id(id)
            .await?
            .filter(|pt| !pt.is_deleted())
            .ok_or(PointsError::PointTypeNotFound)?;

        if let Some(display_name) = updates.display_name {
            existing.display_name = display_name;
        }
        if let Some(description) = updates.description {
            existing.description = description;
        }
        if let Some(enabled) = updates.enabled {
            existing.enabled = enabled;
        }

        self.store.update(&existing).await
    }

    /// Soft-delete a point type by name.
    ///
    /// A type with any referencing balance row is never deleted; a second
    /// delete of the same type reports `PointTypeAlreadyDeleted`.
    pub async fn soft_delete(&self, name: &str) -> Result<()> {
        let existing = self
            .store
            .get_by_name(name)
            .await?
            .ok_or(PointsError::PointTypeNotFound)?;

        if existing.is_deleted() {
            return Err(PointsError::PointTypeAlreadyDeleted);
        }

        if self.store.has_balances(&existing.id).await? {
            return Err(PointsError::PointTypeInUse);
        }

        self.store
            .soft_delete(name, Utc::now().timestamp())
            .await?;

        info!(point_type_id = %existing.id, name = %name, "soft-deleted point type");
        Ok(())
    }

    /// Look up by id; soft-deleted types are invisible here.
    pub async fn get_by_id(&self, id: &str) -> Result<PointType> {
        match self.store.get_by_id(id).await? {
            Some(pt) if !pt.is_deleted() => Ok(pt),
            _ => Err(PointsError::PointTypeNotFound),
        }
    }

    /// Look up by name; soft-deleted types are invisible here.
    pub async fn get_by_name(&self, name: &str) -> Result<PointType> {
        match self.store.get_by_name(name).await? {
            Some(pt) if !pt.is_deleted() => Ok(pt),
            _ => Err(PointsError::PointTypeNotFound),
        }
    }

    /// List point types ordered by creation time descending.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<PointType>> {
        let limit = if limit <= 0 { 100 } else { limit };
        self.store.list(limit, offset.max(0)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::MemoryBackend;

    fn registry() -> (PointTypeRegistry, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (PointTypeRegistry::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn create_rejects_duplicate_name() {
        let (registry, _) = registry();
        registry.create("gold", "Gold", "").await.unwrap();

        let err = registry.create("gold", "Gold again", "").await.unwrap_err();
        assert!(matches!(err, PointsError::DuplicatePointTypeName));
    }

    #[tokio::test]
    async fn create_rejects_empty_name() {
        let (registry, _) = registry();
        let err = registry.create("   ", "Blank", "").await.unwrap_err();
        assert!(matches!(err, PointsError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn update_applies_only_provided_fields() {
        let (registry, _) = registry();
        let id = registry.create("gold", "Gold", "shiny").await.unwrap();

        registry
            .update(
                &id,
                PointTypeUpdate {
                    display_name: Some("Gold Coins".to_string()),
                    description: None,
                    enabled: Some(false),
                },
            )
            .await
            .unwrap();

        let pt = registry.get_by_id(&id).await.unwrap();
        assert_eq!(pt.display_name, "Gold Coins");
        assert_eq!(pt.description, "shiny");
        assert!(!pt.enabled);
    }

    #[tokio::test]
    async fn update_soft_deleted_type_is_not_found() {
        let (registry, _) = registry();
        let id = registry.create("gold", "Gold", "").await.unwrap();
        registry.soft_delete("gold").await.unwrap();

        let err = registry
            .update(
                &id,
                PointTypeUpdate {
                    display_name: Some("Gold Coins".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PointsError::PointTypeNotFound));
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let (registry, _) = registry();
        let err = registry
            .update("missing", PointTypeUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PointsError::PointTypeNotFound));
    }

    #[tokio::test]
    async fn soft_delete_twice_reports_already_deleted() {
        let (registry, _) = registry();
        registry.create("gold", "Gold", "").await.unwrap();

        registry.soft_delete("gold").await.unwrap();
        let err = registry.soft_delete("gold").await.unwrap_err();
        assert!(matches!(err, PointsError::PointTypeAlreadyDeleted));
    }

    #[tokio::test]
    async fn soft_deleted_type_is_invisible_to_lookups() {
        let (registry, _) = registry();
        let id = registry.create("gold", "Gold", "").await.unwrap();
        registry.soft_delete("gold").await.unwrap();

        assert!(matches!(
            registry.get_by_id(&id).await.unwrap_err(),
            PointsError::PointTypeNotFound
        ));
        assert!(matches!(
            registry.get_by_name("gold").await.unwrap_err(),
            PointsError::PointTypeNotFound
        ));
    }

    #[tokio::test]
    async fn list_returns_newest_first() {
        let (registry, _) = registry();
        registry.create("gold", "Gold", "").await.unwrap();
        registry.create("silver", "Silver", "").await.unwrap();

        let types = registry.list(10, 0).await.unwrap();
        assert_eq!(types.len(), 2);
        assert_eq!(types[0].name, "silver");
        assert_eq!(types[1].name, "gold");
    }
}
