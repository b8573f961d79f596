//! Merging agent inventory reports into the inventory graph
//!
//! A report is validated up front in full, its types are resolved against
//! the catalog, and then each root is merged in its own unit of work. The
//! tree walk uses an explicit stack of `(parent frame, reported node)`
//! pairs; a node is persisted before its children are pushed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use fleetinv_api::events::InventoryEvent;
use fleetinv_api::{
    FailedRoot, InventoryReport, InventoryReportResponse, InventoryStatus, ROOT_ID,
    ReportedResource, ResourceCategory, ResourceId, ResourceTypeRef,
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{CoreError, StoreError, ValidationRule};
use crate::identity::{IdentityResolver, Lookup, Matched};
use crate::model::{Agent, AgentId, Resource, ResourceType};
use crate::post_merge::PostMergeActions;
use crate::status::{ParentStatus, Rereport, StatusTransitionPolicy};
use crate::store::{InventoryStore, InventoryTx};
use crate::traits::ResourceTypeCatalog;

/// Server-side types for every type reference in a report
#[derive(Debug, Clone, Default)]
pub struct ResolvedTypes(HashMap<ResourceTypeRef, ResourceType>);

impl ResolvedTypes {
    /// Server-side type of a reported resource
    pub fn get(&self, reported: &ReportedResource) -> Result<&ResourceType, CoreError> {
        let type_ref = reported
            .resource_type
            .as_ref()
            .ok_or_else(|| CoreError::invalid(ValidationRule::MissingType, reported))?;
        self.0.get(type_ref).ok_or_else(|| CoreError::StaleType {
            type_name: type_ref.name.clone(),
            plugin: type_ref.plugin.clone(),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Reject reports that violate a structural rule anywhere in the tree
pub fn validate_report(report: &InventoryReport) -> Result<(), CoreError> {
    let mut stack: Vec<&ReportedResource> = report.roots.iter().collect();
    let mut seen = HashSet::new();

    while let Some(node) = stack.pop() {
        if !seen.insert(node.uuid) {
            return Err(CoreError::invalid(ValidationRule::DuplicateUuid, node));
        }
        if node.resource_type.is_none() {
            return Err(CoreError::invalid(ValidationRule::MissingType, node));
        }
        if node.resource_key.as_deref().is_none_or(str::is_empty) {
            return Err(CoreError::invalid(ValidationRule::MissingKey, node));
        }
        if node.inventory_status == InventoryStatus::Deleted {
            return Err(CoreError::invalid(ValidationRule::DeletedStatus, node));
        }
        stack.extend(node.children.iter());
    }

    Ok(())
}

/// Resolve every type reference in the report, failing on unknown or deleted types
pub async fn resolve_types(
    catalog: &dyn ResourceTypeCatalog,
    report: &InventoryReport,
) -> Result<ResolvedTypes, CoreError> {
    let mut types = HashMap::new();
    let mut stack: Vec<&ReportedResource> = report.roots.iter().collect();

    while let Some(node) = stack.pop() {
        stack.extend(node.children.iter());

        let Some(type_ref) = &node.resource_type else {
            return Err(CoreError::invalid(ValidationRule::MissingType, node));
        };
        if types.contains_key(type_ref) {
            continue;
        }

        match catalog.lookup(&type_ref.name, &type_ref.plugin).await {
            Some(resource_type) if !resource_type.deleted => {
                types.insert(type_ref.clone(), resource_type);
            }
            _ => {
                return Err(CoreError::StaleType {
                    type_name: type_ref.name.clone(),
                    plugin: type_ref.plugin.clone(),
                });
            }
        }
    }

    Ok(ResolvedTypes(types))
}

/// The resolved parent of the nodes being merged
#[derive(Debug)]
struct Frame {
    id: ResourceId,
    status: InventoryStatus,
    category: ResourceCategory,
    /// Children of this parent as they were before the merge
    children: Vec<Resource>,
}

impl Frame {
    fn from_resource(resource: &Resource, children: Vec<Resource>) -> Arc<Self> {
        Arc::new(Self {
            id: resource.id,
            status: resource.inventory_status,
            category: resource.category(),
            children,
        })
    }

    fn parent_status(&self) -> ParentStatus {
        ParentStatus {
            status: self.status,
            category: self.category,
        }
    }
}

/// What one root contributed to the report
#[derive(Debug, Default)]
struct RootOutcome {
    mappings: Vec<(Uuid, ResourceId)>,
    created: Vec<Resource>,
    revived: Vec<Resource>,
    skipped: usize,
}

/// Merges inventory reports into the inventory graph
pub struct MergeEngine {
    store: Arc<dyn InventoryStore>,
    post_merge: Arc<PostMergeActions>,
    resolver: IdentityResolver,
    system_user: String,
    event_tx: broadcast::Sender<InventoryEvent>,
}

impl MergeEngine {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        post_merge: Arc<PostMergeActions>,
        system_user: impl Into<String>,
        event_tx: broadcast::Sender<InventoryEvent>,
    ) -> Self {
        Self {
            store,
            post_merge,
            resolver: IdentityResolver,
            system_user: system_user.into(),
            event_tx,
        }
    }

    /// Merge a validated report whose types are already resolved
    ///
    /// Roots are merged in order, each in its own unit of work. A root that
    /// fails is recorded in `failed_roots` and does not affect the others.
    pub async fn merge(
        &self,
        agent: &Agent,
        report: InventoryReport,
        types: &ResolvedTypes,
    ) -> InventoryReportResponse {
        let start = Instant::now();
        let mut response = InventoryReportResponse::default();

        for root in report.roots {
            let uuid = root.uuid;
            let name = root.name.clone();
            let root_start = Instant::now();

            match self.merge_root(agent, root, types).await {
                Ok(outcome) => {
                    info!(
                        agent = %agent.name,
                        root = %uuid,
                        merged = outcome.mappings.len(),
                        created = outcome.created.len(),
                        skipped = outcome.skipped,
                        elapsed_ms = root_start.elapsed().as_millis() as u64,
                        "root merged"
                    );
                    response.mappings.extend(outcome.mappings);
                    self.after_commit(outcome.created, outcome.revived).await;
                }
                Err(e) => {
                    error!(
                        agent = %agent.name,
                        root = %uuid,
                        name = %name,
                        error = %e,
                        "failed to merge root, continuing with next root"
                    );
                    response.failed_roots.push(FailedRoot {
                        uuid,
                        name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        response.platform_id = self.agent_platform(agent).await;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            agent = %agent.name,
            merged = response.mappings.len(),
            failed_roots = response.failed_roots.len(),
            elapsed_ms,
            "inventory report merged"
        );
        let _ = self.event_tx.send(InventoryEvent::ReportMerged {
            agent: agent.name.clone(),
            merged: response.mappings.len(),
            failed_roots: response.failed_roots.len(),
            elapsed_ms,
        });

        response
    }

    async fn merge_root(
        &self,
        agent: &Agent,
        root: ReportedResource,
        types: &ResolvedTypes,
    ) -> Result<RootOutcome, CoreError> {
        let mut tx = self.store.begin().await?;
        let now = Utc::now();

        let parent = if root.parent_id == ROOT_ID {
            None
        } else {
            let parent = tx
                .find(root.parent_id)
                .await?
                .ok_or(CoreError::ResourceNotFound(root.parent_id))?;
            let children = tx.children(parent.id).await?;
            Some(Frame::from_resource(&parent, children))
        };

        let mut outcome = RootOutcome::default();
        let mut stack = vec![(parent, root)];

        while let Some((frame, mut node)) = stack.pop() {
            let resource_type = types.get(&node)?;
            let lookup = Lookup {
                parent: frame.as_ref().map(|f| f.id),
                resource_type,
                known_siblings: frame.as_ref().map(|f| f.children.as_slice()),
            };

            let matched = self.resolver.resolve(tx.as_mut(), &mut node, lookup).await?;
            let children = std::mem::take(&mut node.children);

            let next = match matched {
                Some(matched) => {
                    match self
                        .merge_existing(tx.as_mut(), matched, &node, now, &mut outcome)
                        .await?
                    {
                        Some(frame) => frame,
                        None => {
                            outcome.skipped += 1 + children.iter().map(ReportedResource::subtree_len).sum::<usize>();
                            continue;
                        }
                    }
                }
                None => {
                    let resource = self
                        .create(tx.as_mut(), agent.id, frame.as_deref(), resource_type, &node, now)
                        .await?;
                    let frame = Frame::from_resource(&resource, Vec::new());
                    outcome.created.push(resource);
                    frame
                }
            };

            outcome.mappings.push((node.uuid, next.id));
            stack.extend(children.into_iter().map(|child| (Some(Arc::clone(&next)), child)));
        }

        tx.commit().await?;
        Ok(outcome)
    }

    /// Apply a re-report to an existing resource
    ///
    /// Returns `None` when the resource and its reported subtree are skipped.
    async fn merge_existing(
        &self,
        tx: &mut dyn InventoryTx,
        matched: Matched,
        node: &ReportedResource,
        now: DateTime<Utc>,
        outcome: &mut RootOutcome,
    ) -> Result<Option<Arc<Frame>>, CoreError> {
        let Matched {
            resource: mut existing,
            children,
        } = matched;
        let mut dirty = false;

        match StatusTransitionPolicy::on_rereport(existing.inventory_status) {
            Rereport::Skip => {
                debug!(resource = %existing, "resource is being uninventoried, skipping subtree");
                return Ok(None);
            }
            Rereport::Revive => {
                warn!(
                    resource = %existing,
                    "agent reported a deleted resource, resetting it to NEW"
                );
                existing.set_status(InventoryStatus::New, now);
                existing.plugin_configuration = node.plugin_configuration.clone();
                outcome.revived.push(existing.clone());
                dirty = true;
            }
            Rereport::Keep(_) => {}
        }

        let reported_key = node.resource_key.as_deref().unwrap_or_default();
        if existing.resource_key != reported_key || existing.name != node.name {
            warn!(
                resource = %existing,
                reported_key,
                reported_name = %node.name,
                "reported resource diverges from the inventoried one"
            );
        }

        if existing.description.as_deref().is_none_or(str::is_empty)
            && let Some(description) = node.description.as_deref().filter(|d| !d.is_empty())
        {
            existing.description = Some(description.to_string());
            dirty = true;
        }

        if normalized(&existing.version) != normalized(&node.version) {
            debug!(
                resource_id = existing.id,
                from = ?existing.version,
                to = ?node.version,
                "resource version changed"
            );
            existing.version = normalized(&node.version).map(str::to_string);
            self.post_merge.link_product_version(&mut existing).await;
            dirty = true;
        }

        if dirty {
            existing.mtime = now;
            tx.update(&existing).await?;
        }

        debug!(resource = %existing, uuid = %node.uuid, "matched existing resource");
        Ok(Some(Frame::from_resource(&existing, children)))
    }

    async fn create(
        &self,
        tx: &mut dyn InventoryTx,
        agent_id: AgentId,
        parent: Option<&Frame>,
        resource_type: &ResourceType,
        node: &ReportedResource,
        now: DateTime<Utc>,
    ) -> Result<Resource, CoreError> {
        let status = StatusTransitionPolicy::initial_status(
            parent.map(Frame::parent_status),
            resource_type.category,
        );

        let mut resource = Resource {
            id: ROOT_ID,
            uuid: node.uuid,
            resource_key: node.resource_key.clone().unwrap_or_default(),
            name: node.name.clone(),
            resource_type: resource_type.clone(),
            parent_id: parent.map(|p| p.id),
            agent_id: Some(agent_id),
            inventory_status: status,
            version: normalized(&node.version).map(str::to_string),
            product_version_id: None,
            description: node.description.clone(),
            plugin_configuration: node.plugin_configuration.clone(),
            ctime: now,
            itime: now,
            mtime: now,
            modified_by: self.system_user.clone(),
        };
        self.post_merge.link_product_version(&mut resource).await;

        resource.id = tx.insert(resource.clone()).await?;
        debug!(resource = %resource, uuid = %node.uuid, "created resource");
        Ok(resource)
    }

    async fn after_commit(&self, created: Vec<Resource>, revived: Vec<Resource>) {
        for resource in created {
            self.post_merge.on_created(&resource).await;
            let _ = self.event_tx.send(InventoryEvent::ResourceAdded {
                resource_id: resource.id,
                name: resource.name,
                status: resource.inventory_status,
            });
        }

        for resource in revived {
            let _ = self.event_tx.send(InventoryEvent::ResourceRevived {
                resource_id: resource.id,
                name: resource.name,
            });
        }
    }

    async fn agent_platform(&self, agent: &Agent) -> Option<ResourceId> {
        match self.find_platform(agent.id).await {
            Ok(platform) => platform.map(|p| p.id),
            Err(e) => {
                warn!(agent = %agent.name, error = %e, "failed to look up agent platform");
                None
            }
        }
    }

    async fn find_platform(&self, agent: AgentId) -> Result<Option<Resource>, StoreError> {
        let mut tx = self.store.begin().await?;
        tx.platform_for_agent(agent).await
    }
}

/// Empty and missing version strings are the same
fn normalized(version: &Option<String>) -> Option<&str> {
    version.as_deref().filter(|v| !v.is_empty())
}
