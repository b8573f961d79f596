//! Side effects of creating or committing a resource
//!
//! Everything here is best-effort: failures are logged and never fail the
//! merge that triggered them.

use std::sync::Arc;

use fleetinv_api::InventoryStatus;
use tracing::{debug, warn};

use crate::model::Resource;
use crate::traits::{AlertTemplates, GroupMembership, ProductVersions};

pub struct PostMergeActions {
    alert_templates: Arc<dyn AlertTemplates>,
    product_versions: Arc<dyn ProductVersions>,
    groups: Arc<dyn GroupMembership>,
}

impl PostMergeActions {
    pub fn new(
        alert_templates: Arc<dyn AlertTemplates>,
        product_versions: Arc<dyn ProductVersions>,
        groups: Arc<dyn GroupMembership>,
    ) -> Self {
        Self {
            alert_templates,
            product_versions,
            groups,
        }
    }

    /// Link the resource to the product version record for its version string
    ///
    /// Clears the link when the version is empty.
    pub async fn link_product_version(&self, resource: &mut Resource) {
        let version = match resource.version.as_deref() {
            Some(v) if !v.is_empty() => v,
            _ => {
                resource.product_version_id = None;
                return;
            }
        };

        match self
            .product_versions
            .add_product_version(&resource.resource_type, version)
            .await
        {
            Ok(id) => resource.product_version_id = Some(id),
            Err(e) => {
                warn!(
                    resource = %resource,
                    version,
                    error = %e,
                    "failed to record product version"
                );
            }
        }
    }

    /// Run after a brand-new resource has been committed
    pub async fn on_created(&self, resource: &Resource) {
        if resource.inventory_status == InventoryStatus::Committed {
            self.on_committed(resource).await;
        }

        if resource.parent_id.is_some()
            && let Err(e) = self.groups.update_implicit_membership(resource).await
        {
            warn!(
                resource_id = resource.id,
                error = %e,
                "failed to update implicit group membership"
            );
        }
    }

    /// Run after a resource entered `COMMITTED`
    pub async fn on_committed(&self, resource: &Resource) {
        match self
            .alert_templates
            .instantiate_for(resource.id, resource.resource_type.id)
            .await
        {
            Ok(0) => {}
            Ok(count) => debug!(resource_id = resource.id, count, "alert templates applied"),
            Err(e) => {
                warn!(
                    resource_id = resource.id,
                    type_id = resource.resource_type.id,
                    error = %e,
                    "failed to apply alert templates"
                );
            }
        }
    }
}
