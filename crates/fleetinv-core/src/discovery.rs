//! Discovery service: the inbound operations of the inventory engine
//!
//! Agents submit inventory reports, add manually discovered resources and
//! push upgrades; operators work the discovery queue.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use fleetinv_api::events::InventoryEvent;
use fleetinv_api::responses::{QueuedPlatform, ResourceSummary};
use fleetinv_api::{
    InventoryReport, InventoryReportResponse, InventoryStatus, MergeResourceResponse, ROOT_ID,
    ReportedResource, ResourceCategory, ResourceId, ResourceTypeRef, ResourceUpgradeRequest,
    ResourceUpgradeResponse,
};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::config::InventoryConfig;
use crate::error::{CoreError, ValidationRule};
use crate::identity::{IdentityResolver, Lookup};
use crate::merge::{MergeEngine, resolve_types, validate_report};
use crate::model::{AgentId, Resource};
use crate::post_merge::PostMergeActions;
use crate::serializer::{ReportPermit, ReportSerializer};
use crate::status::StatusTransitionPolicy;
use crate::store::{InventoryStore, InventoryTx};
use crate::sync::{SyncDispatcher, SyncReport};
use crate::traits::{
    AgentDirectory, AlertTemplates, GroupMembership, ProductVersions, ResourceTypeCatalog,
};

/// Collaborators and settings for a [`DiscoveryService`]
pub struct DiscoveryServiceArgs {
    pub store: Arc<dyn InventoryStore>,
    pub catalog: Arc<dyn ResourceTypeCatalog>,
    pub agents: Arc<dyn AgentDirectory>,
    pub alert_templates: Arc<dyn AlertTemplates>,
    pub product_versions: Arc<dyn ProductVersions>,
    pub groups: Arc<dyn GroupMembership>,
    pub config: InventoryConfig,
    pub event_tx: broadcast::Sender<InventoryEvent>,
}

/// Entry point for inventory reports and discovery queue operations
pub struct DiscoveryService {
    store: Arc<dyn InventoryStore>,
    catalog: Arc<dyn ResourceTypeCatalog>,
    agents: Arc<dyn AgentDirectory>,
    post_merge: Arc<PostMergeActions>,
    merge: MergeEngine,
    sync: SyncDispatcher,
    serializer: ReportSerializer,
    config: InventoryConfig,
    event_tx: broadcast::Sender<InventoryEvent>,
}

impl DiscoveryService {
    pub fn new(args: DiscoveryServiceArgs) -> Self {
        let post_merge = Arc::new(PostMergeActions::new(
            args.alert_templates,
            args.product_versions,
            args.groups,
        ));
        let merge = MergeEngine::new(
            Arc::clone(&args.store),
            Arc::clone(&post_merge),
            args.config.system_user.clone(),
            args.event_tx.clone(),
        );
        let sync = SyncDispatcher::new(Arc::clone(&args.agents), args.event_tx.clone());

        Self {
            store: args.store,
            catalog: args.catalog,
            agents: args.agents,
            post_merge,
            merge,
            sync,
            serializer: ReportSerializer::new(),
            config: args.config,
            event_tx: args.event_tx,
        }
    }

    /// Get an inventory event receiver
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<InventoryEvent> {
        self.event_tx.subscribe()
    }

    #[must_use]
    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    // ========================================================================
    // Agent-facing operations
    // ========================================================================

    /// Merge an agent's inventory report
    ///
    /// Structural violations, unknown agents and stale types reject the whole
    /// report before anything is written. Otherwise every root is merged on
    /// its own and failures are listed in `failed_roots`.
    #[instrument(skip(self, report), fields(agent = %report.agent.name, resources = report.resource_count()))]
    pub async fn merge_inventory_report(
        &self,
        report: InventoryReport,
    ) -> Result<InventoryReportResponse, CoreError> {
        if let Err(e) = validate_report(&report) {
            warn!(error = %e, "rejecting invalid inventory report");
            return Err(e);
        }

        let agent = self
            .agents
            .find_by_name(&report.agent.name)
            .await?
            .ok_or_else(|| CoreError::invalid(ValidationRule::UnknownAgent, &report.agent.name))?;

        let types = match resolve_types(self.catalog.as_ref(), &report).await {
            Ok(types) => types,
            Err(e) => {
                warn!(error = %e, "inventory report references a stale type");
                return Err(e);
            }
        };

        let _permit = self.serializer.acquire(&agent.name).await;
        debug!(types = types.len(), "merging inventory report");
        Ok(self.merge.merge(&agent, report, &types).await)
    }

    /// Add a single resource reported by an agent on an operator's behalf
    ///
    /// The resource is committed immediately and owned by its parent's agent.
    #[instrument(skip(self, resource), fields(resource = %resource, parent_id = resource.parent_id))]
    pub async fn add_resource(
        &self,
        mut resource: ReportedResource,
        creator: &str,
    ) -> Result<MergeResourceResponse, CoreError> {
        let report = InventoryReport::new(creator, vec![resource.clone()]);
        validate_report(&report)?;
        let types = resolve_types(self.catalog.as_ref(), &report).await?;
        let resource_type = types.get(&resource)?.clone();

        if resource.parent_id == ROOT_ID {
            return Err(CoreError::InvalidStatusChange(
                "manually added resources need a parent".to_string(),
            ));
        }
        if !resource.children.is_empty() {
            warn!(
                children = resource.children.len(),
                "ignoring children of manually added resource"
            );
        }

        let _permits = self.lock_owners(&[resource.parent_id]).await?;

        let mut tx = self.store.begin().await?;
        let parent = tx
            .find(resource.parent_id)
            .await?
            .ok_or(CoreError::ResourceNotFound(resource.parent_id))?;
        let agent_id = parent
            .agent_id
            .ok_or_else(|| CoreError::AgentNotFound(format!("owner of resource {}", parent.id)))?;
        if self.agents.find_by_id(agent_id).await?.is_none() {
            return Err(CoreError::AgentNotFound(agent_id.to_string()));
        }

        let lookup = Lookup {
            parent: Some(parent.id),
            resource_type: &resource_type,
            known_siblings: None,
        };
        if let Some(existing) = IdentityResolver
            .resolve(tx.as_mut(), &mut resource, lookup)
            .await?
        {
            debug!(resource_id = existing.resource.id, "manually added resource already exists");
            return Ok(MergeResourceResponse {
                resource_id: existing.resource.id,
                already_existed: true,
            });
        }

        let now = Utc::now();
        let mut created = Resource {
            id: ROOT_ID,
            uuid: resource.uuid,
            resource_key: resource.resource_key.clone().unwrap_or_default(),
            name: resource.name.clone(),
            resource_type,
            parent_id: Some(parent.id),
            agent_id: Some(agent_id),
            inventory_status: InventoryStatus::Committed,
            version: resource.version.clone().filter(|v| !v.is_empty()),
            product_version_id: None,
            description: resource.description.clone(),
            plugin_configuration: resource.plugin_configuration.clone(),
            ctime: now,
            itime: now,
            mtime: now,
            modified_by: creator.to_string(),
        };
        self.post_merge.link_product_version(&mut created).await;
        created.id = tx.insert(created.clone()).await?;
        tx.commit().await?;

        info!(resource = %created, creator, "manually added resource");
        self.post_merge.on_created(&created).await;
        let _ = self.event_tx.send(InventoryEvent::ResourceAdded {
            resource_id: created.id,
            name: created.name.clone(),
            status: created.inventory_status,
        });

        Ok(MergeResourceResponse {
            resource_id: created.id,
            already_existed: false,
        })
    }

    /// Record a new version string for a resource
    ///
    /// Returns `false` when the resource does not exist.
    pub async fn update_resource_version(
        &self,
        resource_id: ResourceId,
        version: &str,
    ) -> Result<bool, CoreError> {
        let _permits = self.lock_owners(&[resource_id]).await?;
        let mut tx = self.store.begin().await?;
        let Some(mut resource) = tx.find(resource_id).await? else {
            return Ok(false);
        };

        let old = resource.version.as_deref().unwrap_or_default();
        if old != version {
            info!(resource = %resource, from = old, to = version, "resource changed its version");
            resource.version = Some(version.to_string()).filter(|v| !v.is_empty());
            self.post_merge.link_product_version(&mut resource).await;
            resource.mtime = Utc::now();
            tx.update(&resource).await?;
            tx.commit().await?;
        }

        Ok(true)
    }

    /// Apply agent-side upgrades to existing resources
    ///
    /// The resource key is always upgraded; name and description only when
    /// generic property upgrades are allowed. Unknown resources and failed
    /// upgrades produce no response entry.
    #[instrument(skip(self, requests), fields(requests = requests.len()))]
    pub async fn upgrade_resources(
        &self,
        requests: Vec<ResourceUpgradeRequest>,
    ) -> Result<Vec<ResourceUpgradeResponse>, CoreError> {
        let allow_generic = self.config.allow_generic_properties_upgrade;
        let ids: Vec<_> = requests.iter().map(|r| r.resource_id).collect();
        let _permits = self.lock_owners(&ids).await?;
        let mut tx = self.store.begin().await?;
        let mut responses = Vec::with_capacity(requests.len());

        for request in requests {
            let Some(mut resource) = tx.find(request.resource_id).await? else {
                debug!(resource_id = request.resource_id, "upgrade for unknown resource");
                continue;
            };

            if let Some(error) = &request.upgrade_error {
                warn!(resource = %resource, error = %error, "agent failed to upgrade resource");
                continue;
            }

            let mut upgraded = Vec::new();
            if request.new_resource_key.as_deref() == Some("") {
                warn!(resource = %resource, "agent proposed an empty resource key, keeping the old one");
            } else if let Some(key) = needs_upgrade(Some(&resource.resource_key), &request.new_resource_key) {
                resource.resource_key = key.to_string();
                upgraded.push("resource_key");
            }
            if allow_generic
                && let Some(name) = needs_upgrade(Some(&resource.name), &request.new_name)
            {
                resource.name = name.to_string();
                upgraded.push("name");
            }
            if allow_generic
                && let Some(description) =
                    needs_upgrade(resource.description.as_ref(), &request.new_description)
            {
                resource.description = Some(description.to_string());
                upgraded.push("description");
            }

            if !upgraded.is_empty() {
                resource.mtime = Utc::now();
                if let Err(e) = tx.update(&resource).await {
                    warn!(resource = %resource, error = %e, "rejecting resource upgrade");
                    continue;
                }
                info!(resource = %resource, upgraded = ?upgraded, "resource upgraded");
            }

            responses.push(ResourceUpgradeResponse {
                resource_id: resource.id,
                resource_key: resource.resource_key,
                name: resource.name,
                description: resource.description,
            });
        }

        tx.commit().await?;
        Ok(responses)
    }

    /// Take the report permits of every agent owning one of the resources
    ///
    /// Permits are acquired in name order. Unknown resources and owners are
    /// skipped here and reported by the caller's own lookups.
    async fn lock_owners(&self, ids: &[ResourceId]) -> Result<Vec<ReportPermit>, CoreError> {
        let owners: BTreeSet<AgentId> = {
            let mut tx = self.store.begin().await?;
            let mut owners = BTreeSet::new();
            for &id in ids {
                if let Some(agent) = tx.find(id).await?.and_then(|r| r.agent_id) {
                    owners.insert(agent);
                }
            }
            owners
        };

        let mut names = BTreeSet::new();
        for agent in owners {
            if let Some(agent) = self.agents.find_by_id(agent).await? {
                names.insert(agent.name);
            }
        }

        let mut permits = Vec::with_capacity(names.len());
        for name in &names {
            permits.push(self.serializer.acquire(name).await);
        }
        Ok(permits)
    }

    // ========================================================================
    // Operator operations
    // ========================================================================

    /// Change the inventory status of platforms and servers, then ask their
    /// agents to resynchronize
    ///
    /// The status change is committed before any agent is contacted; agent
    /// failures only show up in the returned [`SyncReport`].
    #[instrument(skip(self, platforms, servers), fields(platforms = platforms.len(), servers = servers.len()))]
    pub async fn update_inventory_status(
        &self,
        user: &str,
        platforms: &[ResourceId],
        servers: &[ResourceId],
        status: InventoryStatus,
    ) -> Result<SyncReport, CoreError> {
        let start = Instant::now();
        let permits = self.lock_owners(&[platforms, servers].concat()).await?;
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let platforms = load_all(tx.as_mut(), platforms).await?;
        let servers = load_all(tx.as_mut(), servers).await?;
        require_category(&platforms, ResourceCategory::Platform)?;
        require_category(&servers, ResourceCategory::Server)?;

        let mut changed = Vec::new();
        for platform in &platforms {
            set_status(tx.as_mut(), platform.id, status, user, now, Cascade::Services, &mut changed).await?;
        }
        for server in &servers {
            set_status(tx.as_mut(), server.id, status, user, now, Cascade::Descendants, &mut changed).await?;
        }
        tx.commit().await?;
        drop(permits);

        for (from, resource) in &changed {
            let _ = self.event_tx.send(InventoryEvent::StatusChanged {
                resource_id: resource.id,
                from: *from,
                to: resource.inventory_status,
            });
            if resource.inventory_status == InventoryStatus::Committed {
                self.post_merge.on_committed(resource).await;
            }
        }

        let targets = SyncDispatcher::plan(&platforms, &servers, status);
        let report = self.sync.dispatch(targets).await;

        info!(
            user,
            %status,
            changed = changed.len(),
            synced = report.dispatched,
            sync_failures = report.failed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "inventory status updated"
        );
        Ok(report)
    }

    /// Commit `NEW` resources
    pub async fn import_resources(&self, user: &str, resource_ids: &[ResourceId]) -> Result<SyncReport, CoreError> {
        self.change_queued_status(user, resource_ids, InventoryStatus::Committed, &[InventoryStatus::New])
            .await
    }

    /// Ignore `NEW` resources
    pub async fn ignore_resources(&self, user: &str, resource_ids: &[ResourceId]) -> Result<SyncReport, CoreError> {
        self.change_queued_status(user, resource_ids, InventoryStatus::Ignored, &[InventoryStatus::New])
            .await
    }

    /// Return `IGNORED` resources to the discovery queue
    pub async fn unignore_resources(&self, user: &str, resource_ids: &[ResourceId]) -> Result<SyncReport, CoreError> {
        self.change_queued_status(user, resource_ids, InventoryStatus::New, &[InventoryStatus::Ignored])
            .await
    }

    async fn change_queued_status(
        &self,
        user: &str,
        resource_ids: &[ResourceId],
        target: InventoryStatus,
        expected: &[InventoryStatus],
    ) -> Result<SyncReport, CoreError> {
        if resource_ids.is_empty() {
            return Ok(SyncReport::default());
        }

        let resources = {
            let mut tx = self.store.begin().await?;
            load_all(tx.as_mut(), resource_ids).await?
        };

        if let Some(wrong) = resources.iter().find(|r| !expected.contains(&r.inventory_status)) {
            return Err(CoreError::InvalidStatusChange(format!(
                "can only change resources with status {expected:?} to {target}, resource {} is {}",
                wrong.id, wrong.inventory_status
            )));
        }

        let mut platforms = Vec::new();
        let mut servers = Vec::new();
        for resource in &resources {
            match resource.category() {
                ResourceCategory::Platform => platforms.push(resource.id),
                ResourceCategory::Server => servers.push(resource.id),
                ResourceCategory::Service => {
                    return Err(CoreError::InvalidStatusChange(format!(
                        "can not directly change the inventory status of service {}",
                        resource.id
                    )));
                }
            }
        }

        self.update_inventory_status(user, &platforms, &servers, target)
            .await
    }

    /// Platforms in any of the given statuses, newest first, with their
    /// child servers in those statuses
    pub async fn queued_platforms_and_servers(
        &self,
        statuses: &[InventoryStatus],
    ) -> Result<Vec<QueuedPlatform>, CoreError> {
        let mut tx = self.store.begin().await?;
        let mut platforms = tx
            .find_by_status(Some(ResourceCategory::Platform), statuses)
            .await?;
        platforms.sort_by(|a, b| b.ctime.cmp(&a.ctime).then(b.id.cmp(&a.id)));

        let mut names = AgentNames::new(self.agents.as_ref());
        let mut queue = Vec::with_capacity(platforms.len());

        for platform in platforms {
            let mut servers = Vec::new();
            for child in tx.children(platform.id).await? {
                if child.category() == ResourceCategory::Server
                    && statuses.contains(&child.inventory_status)
                {
                    let agent = names.name(child.agent_id).await;
                    servers.push(child.summary(agent));
                }
            }

            let agent = names.name(platform.agent_id).await;
            queue.push(QueuedPlatform {
                platform: platform.summary(agent),
                servers,
            });
        }

        Ok(queue)
    }

    /// Look up a single resource
    pub async fn resource(&self, resource_id: ResourceId) -> Result<ResourceSummary, CoreError> {
        let mut tx = self.store.begin().await?;
        let resource = tx
            .find(resource_id)
            .await?
            .ok_or(CoreError::ResourceNotFound(resource_id))?;

        let agent = AgentNames::new(self.agents.as_ref())
            .name(resource.agent_id)
            .await;
        Ok(resource.summary(agent))
    }

    /// Ask the parent's agent to discover a resource the operator described
    ///
    /// The agent reports the resource back through [`Self::add_resource`].
    #[instrument(skip(self, plugin_configuration))]
    pub async fn manually_add_resource(
        &self,
        user: &str,
        resource_type: ResourceTypeRef,
        parent_id: ResourceId,
        plugin_configuration: serde_json::Value,
    ) -> Result<MergeResourceResponse, CoreError> {
        match self.catalog.lookup(&resource_type.name, &resource_type.plugin).await {
            Some(t) if !t.deleted => {}
            _ => {
                return Err(CoreError::StaleType {
                    type_name: resource_type.name,
                    plugin: resource_type.plugin,
                });
            }
        }

        let parent = {
            let mut tx = self.store.begin().await?;
            tx.find(parent_id)
                .await?
                .ok_or(CoreError::ResourceNotFound(parent_id))?
        };
        let agent = parent
            .agent_id
            .ok_or_else(|| CoreError::AgentNotFound(format!("owner of resource {parent_id}")))?;

        let response = self
            .agents
            .manually_add_resource(agent, resource_type, parent_id, plugin_configuration, user.to_string())
            .await?;

        info!(
            resource_id = response.resource_id,
            already_existed = response.already_existed,
            "manual add completed"
        );
        Ok(response)
    }
}

/// How far a status change spreads below the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cascade {
    /// Direct service children only
    Services,
    /// Every descendant
    Descendants,
}

async fn load_all(tx: &mut dyn InventoryTx, ids: &[ResourceId]) -> Result<Vec<Resource>, CoreError> {
    let mut resources = Vec::with_capacity(ids.len());
    for &id in ids {
        let resource = tx.find(id).await?.ok_or(CoreError::ResourceNotFound(id))?;
        resources.push(resource);
    }
    Ok(resources)
}

fn require_category(resources: &[Resource], category: ResourceCategory) -> Result<(), CoreError> {
    match resources.iter().find(|r| r.category() != category) {
        Some(r) => Err(CoreError::InvalidStatusChange(format!(
            "resource {} is a {}, expected a {category}",
            r.id,
            r.category()
        ))),
        None => Ok(()),
    }
}

/// Change a resource's status and cascade it
///
/// The resource itself must make a legal transition; cascaded resources
/// that cannot make it are left alone.
async fn set_status(
    tx: &mut dyn InventoryTx,
    id: ResourceId,
    status: InventoryStatus,
    user: &str,
    now: DateTime<Utc>,
    cascade: Cascade,
    changed: &mut Vec<(InventoryStatus, Resource)>,
) -> Result<(), CoreError> {
    let mut resource = tx.find(id).await?.ok_or(CoreError::ResourceNotFound(id))?;

    if status == InventoryStatus::Committed
        && let Some(parent_id) = resource.parent_id
    {
        let parent = tx
            .find(parent_id)
            .await?
            .ok_or(CoreError::ResourceNotFound(parent_id))?;
        if parent.inventory_status != InventoryStatus::Committed {
            return Err(CoreError::ParentNotCommitted {
                resource: id,
                parent: parent_id,
            });
        }
    }

    StatusTransitionPolicy::check(resource.inventory_status, status)?;
    apply_status(tx, &mut resource, status, user, now, changed).await?;

    let mut stack: Vec<Resource> = match cascade {
        Cascade::Services => tx
            .children(id)
            .await?
            .into_iter()
            .filter(|c| c.category() == ResourceCategory::Service)
            .collect(),
        Cascade::Descendants => tx.children(id).await?,
    };

    while let Some(mut child) = stack.pop() {
        if cascade == Cascade::Descendants {
            stack.extend(tx.children(child.id).await?);
        }
        if child.inventory_status == status {
            continue;
        }
        if !StatusTransitionPolicy::can_transition_to(child.inventory_status, status) {
            debug!(
                resource_id = child.id,
                from = %child.inventory_status,
                to = %status,
                "not cascading status change"
            );
            continue;
        }
        apply_status(tx, &mut child, status, user, now, changed).await?;
    }

    Ok(())
}

async fn apply_status(
    tx: &mut dyn InventoryTx,
    resource: &mut Resource,
    status: InventoryStatus,
    user: &str,
    now: DateTime<Utc>,
    changed: &mut Vec<(InventoryStatus, Resource)>,
) -> Result<(), CoreError> {
    let from = resource.inventory_status;
    if from == status {
        return Ok(());
    }

    resource.set_status(status, now);
    resource.modified_by = user.to_string();
    tx.update(resource).await?;
    changed.push((from, resource.clone()));
    Ok(())
}

/// `new` if it is present and differs from `old`
fn needs_upgrade<'a>(old: Option<&String>, new: &'a Option<String>) -> Option<&'a str> {
    match new {
        Some(new) if old != Some(new) => Some(new.as_str()),
        _ => None,
    }
}

/// Agent name cache for building summaries
struct AgentNames<'a> {
    agents: &'a dyn AgentDirectory,
    names: HashMap<AgentId, Option<String>>,
}

impl<'a> AgentNames<'a> {
    fn new(agents: &'a dyn AgentDirectory) -> Self {
        Self {
            agents,
            names: HashMap::new(),
        }
    }

    async fn name(&mut self, agent: Option<AgentId>) -> Option<String> {
        let id = agent?;
        if let Some(name) = self.names.get(&id) {
            return name.clone();
        }

        let name = match self.agents.find_by_id(id).await {
            Ok(found) => found.map(|a| a.name),
            Err(e) => {
                warn!(agent_id = id, error = %e, "failed to resolve agent name");
                None
            }
        };
        self.names.insert(id, name.clone());
        name
    }
}
