//! Categories, links and inventory, plus the shared status transition.

use crate::error::MetadataResult;
use crate::models::{CategoryRow, ContentTable, InventoryRow, LinkRow};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for portal directory content.
#[async_trait]
pub trait ContentRepo: Send + Sync {
    /// Create a category. Duplicate names are rejected with `AlreadyExists`.
    async fn create_category(&self, category: &CategoryRow) -> MetadataResult<()>;

    /// Get a category by ID.
    async fn get_category(&self, category_id: Uuid) -> MetadataResult<Option<CategoryRow>>;

    /// List categories ordered by position then name.
    async fn list_categories(&self, status: Option<&str>) -> MetadataResult<Vec<CategoryRow>>;

    /// Delete a category. Links and announcements referencing it are detached.
    async fn delete_category(&self, category_id: Uuid) -> MetadataResult<()>;

    /// Create a link.
    async fn create_link(&self, link: &LinkRow) -> MetadataResult<()>;

    /// Get a link by ID.
    async fn get_link(&self, link_id: Uuid) -> MetadataResult<Option<LinkRow>>;

    /// List links ordered by title.
    async fn list_links(
        &self,
        status: Option<&str>,
        category_id: Option<Uuid>,
    ) -> MetadataResult<Vec<LinkRow>>;

    /// Delete a link.
    async fn delete_link(&self, link_id: Uuid) -> MetadataResult<()>;

    /// Create an inventory item. Duplicate hostnames are rejected with
    /// `AlreadyExists`.
    async fn create_inventory_item(&self, item: &InventoryRow) -> MetadataResult<()>;

    /// Get an inventory item by ID.
    async fn get_inventory_item(&self, item_id: Uuid) -> MetadataResult<Option<InventoryRow>>;

    /// List inventory items ordered by hostname.
    async fn list_inventory(
        &self,
        status: Option<&str>,
        item_type: Option<&str>,
    ) -> MetadataResult<Vec<InventoryRow>>;

    /// Delete an inventory item.
    async fn delete_inventory_item(&self, item_id: Uuid) -> MetadataResult<()>;

    /// Compare-and-set status change on any content table.
    ///
    /// Returns `NotFound` when the row does not exist and
    /// `InvalidStateTransition` when its current status is not `from`.
    /// Announcements get `published_at` stamped on first publication.
    async fn transition_status(
        &self,
        table: ContentTable,
        id: Uuid,
        from: &str,
        to: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;
}
