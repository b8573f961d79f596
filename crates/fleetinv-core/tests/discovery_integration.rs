mod common;

use std::time::Duration;

use fleetinv_api::events::InventoryEvent;
use fleetinv_api::{
    InventoryReport, InventoryStatus, ReportedResource, ResourceId, ResourceTypeRef,
    ResourceUpgradeRequest, SyncSet, SyncType,
};

use common::{AGENT, Harness, USER, platform, server, service};
use fleetinv_core::{CoreError, InventoryConfig, InventoryStore, InventoryTx, StoreError};

/// Merge a platform with two servers and a platform service, all in NEW
async fn seed(h: &Harness) -> (ResourceId, ResourceId, ResourceId, ResourceId) {
    let host = platform("host1");
    let srv1 = server("srv1").with_child(service("ctx"));
    let srv2 = server("srv2");
    let cpu = service("cpu");
    let uuids = (host.uuid, srv1.uuid, srv2.uuid, cpu.uuid);

    let response = h
        .service
        .merge_inventory_report(InventoryReport::new(
            AGENT,
            vec![host.with_child(srv1).with_child(srv2).with_child(cpu)],
        ))
        .await
        .unwrap();

    (
        response.id_for(&uuids.0).unwrap(),
        response.id_for(&uuids.1).unwrap(),
        response.id_for(&uuids.2).unwrap(),
        response.id_for(&uuids.3).unwrap(),
    )
}

#[tokio::test]
async fn test_commit_platform_syncs_schedules_and_uncovered_servers() {
    let h = Harness::new().await;
    let (host, srv1, _, cpu) = seed(&h).await;

    // a server on another platform, already imported there
    let other = platform("host2").with_child(server("srv9"));
    let other_uuid = other.uuid;
    let other_srv_uuid = other.children[0].uuid;
    let response = h
        .service
        .merge_inventory_report(InventoryReport::new(AGENT, vec![other]))
        .await
        .unwrap();
    let other_host = response.id_for(&other_uuid).unwrap();
    let other_srv = response.id_for(&other_srv_uuid).unwrap();
    h.service
        .update_inventory_status(USER, &[other_host], &[], InventoryStatus::Committed)
        .await
        .unwrap();
    h.client.syncs.lock().unwrap().clear();

    let report = h
        .service
        .update_inventory_status(USER, &[host], &[srv1, other_srv], InventoryStatus::Committed)
        .await
        .unwrap();

    assert_eq!(h.status_of(host).await, InventoryStatus::Committed);
    assert_eq!(h.status_of(srv1).await, InventoryStatus::Committed);
    // platform services follow the platform
    assert_eq!(h.status_of(cpu).await, InventoryStatus::Committed);

    assert_eq!(report.dispatched, 2);
    assert_eq!(report.failed, 0);
    let syncs = h.client.syncs();
    assert_eq!(
        syncs,
        vec![
            (host, SyncSet::from([SyncType::Status, SyncType::MeasurementSchedules])),
            (other_srv, SyncSet::from([SyncType::Status])),
        ]
    );
}

#[tokio::test]
async fn test_server_status_cascades_to_descendants() {
    let h = Harness::new().await;
    let (host, srv1, srv2, _) = seed(&h).await;
    h.service.import_resources(USER, &[host]).await.unwrap();

    h.service.import_resources(USER, &[srv1]).await.unwrap();

    let children = {
        let mut tx = h.store.begin().await.unwrap();
        tx.children(srv1).await.unwrap()
    };
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].inventory_status, InventoryStatus::Committed);
    assert_eq!(children[0].modified_by, USER);
    assert_eq!(h.status_of(srv2).await, InventoryStatus::New);
}

#[tokio::test]
async fn test_commit_requires_committed_parent() {
    let h = Harness::new().await;
    let (host, srv1, _, _) = seed(&h).await;

    let err = h
        .service
        .update_inventory_status(USER, &[], &[srv1], InventoryStatus::Committed)
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::ParentNotCommitted { resource, parent } if resource == srv1 && parent == host));
    assert_eq!(h.status_of(srv1).await, InventoryStatus::New);
}

#[tokio::test]
async fn test_illegal_transition_rejected() {
    let h = Harness::new().await;
    let (host, _, _, _) = seed(&h).await;
    h.service.import_resources(USER, &[host]).await.unwrap();

    let err = h
        .service
        .update_inventory_status(USER, &[host], &[], InventoryStatus::Ignored)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::InvalidTransition {
            from: InventoryStatus::Committed,
            to: InventoryStatus::Ignored
        }
    ));
}

#[tokio::test]
async fn test_ignore_and_unignore() {
    let h = Harness::new().await;
    let (host, _, _, _) = seed(&h).await;

    h.service.ignore_resources(USER, &[host]).await.unwrap();
    assert_eq!(h.status_of(host).await, InventoryStatus::Ignored);

    // only NEW resources can be ignored
    let err = h.service.ignore_resources(USER, &[host]).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidStatusChange(_)));

    h.service.unignore_resources(USER, &[host]).await.unwrap();
    assert_eq!(h.status_of(host).await, InventoryStatus::New);

    let synced = h.client.syncs();
    assert!(synced.iter().all(|(_, sync)| *sync == SyncSet::from([SyncType::Status])));
}

#[tokio::test]
async fn test_services_cannot_be_imported_directly() {
    let h = Harness::new().await;
    let (_, _, _, cpu) = seed(&h).await;

    let err = h.service.import_resources(USER, &[cpu]).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidStatusChange(_)));
}

#[tokio::test]
async fn test_empty_import_is_noop() {
    let h = Harness::new().await;
    let report = h.service.import_resources(USER, &[]).await.unwrap();
    assert_eq!(report.dispatched, 0);
}

#[tokio::test]
async fn test_import_unknown_resource() {
    let h = Harness::new().await;
    let err = h.service.import_resources(USER, &[4242]).await.unwrap_err();
    assert!(matches!(err, CoreError::ResourceNotFound(4242)));
}

#[tokio::test]
async fn test_commit_instantiates_alert_templates() {
    let h = Harness::new().await;
    let (host, srv1, _, cpu) = seed(&h).await;

    h.service.import_resources(USER, &[host]).await.unwrap();
    h.service.import_resources(USER, &[srv1]).await.unwrap();

    let alerted = h.alerts.instantiated();
    assert!(alerted.contains(&host));
    assert!(alerted.contains(&cpu));
    assert!(alerted.contains(&srv1));
}

#[tokio::test]
async fn test_sync_failure_does_not_roll_back() {
    let mut h = Harness::builder().failing_sync().build().await;
    let (host, _, _, _) = seed(&h).await;
    h.drain_events();

    let report = h.service.import_resources(USER, &[host]).await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(h.status_of(host).await, InventoryStatus::Committed);
    assert!(h.drain_events().iter().any(|e| matches!(
        e,
        InventoryEvent::AgentSyncFailed { agent, resource_id, .. } if agent == AGENT && *resource_id == host
    )));
}

#[tokio::test]
async fn test_sync_timeout_is_a_failure() {
    let config = InventoryConfig {
        sync_timeout_secs: 1,
        ..InventoryConfig::default()
    };
    let h = Harness::builder()
        .slow_sync(Duration::from_secs(5))
        .config(config)
        .build()
        .await;
    let (host, _, _, _) = seed(&h).await;

    let report = h.service.import_resources(USER, &[host]).await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(h.status_of(host).await, InventoryStatus::Committed);
}

#[tokio::test]
async fn test_queue_lists_new_platforms_with_servers() {
    let h = Harness::new().await;
    let (host, srv1, srv2, _) = seed(&h).await;
    let late = platform("host2");
    let late_uuid = late.uuid;
    let late = h
        .service
        .merge_inventory_report(InventoryReport::new(AGENT, vec![late]))
        .await
        .unwrap()
        .id_for(&late_uuid)
        .unwrap();
    h.service.ignore_resources(USER, &[srv2]).await.unwrap();

    let queue = h
        .service
        .queued_platforms_and_servers(&[InventoryStatus::New])
        .await
        .unwrap();

    assert_eq!(queue.len(), 2);
    // newest first
    assert_eq!(queue[0].platform.id, late);
    assert_eq!(queue[1].platform.id, host);
    let entry = queue.iter().find(|q| q.platform.id == host).unwrap();
    assert_eq!(entry.platform.agent.as_deref(), Some(AGENT));
    let servers: Vec<_> = entry.servers.iter().map(|s| s.id).collect();
    assert_eq!(servers, vec![srv1]);

    let both = h
        .service
        .queued_platforms_and_servers(&[InventoryStatus::New, InventoryStatus::Ignored])
        .await
        .unwrap();
    let entry = both.iter().find(|q| q.platform.id == host).unwrap();
    assert_eq!(entry.servers.len(), 2);
}

#[tokio::test]
async fn test_manually_add_resource_round_trip() {
    let mut h = Harness::new().await;
    let (host, srv1, _, _) = seed(&h).await;
    h.service.import_resources(USER, &[host]).await.unwrap();
    h.service.import_resources(USER, &[srv1]).await.unwrap();
    h.drain_events();

    let response = h
        .service
        .manually_add_resource(
            USER,
            ResourceTypeRef::new("Context", "tomcat"),
            srv1,
            serde_json::json!({ "key": "/manager" }),
        )
        .await
        .unwrap();

    assert!(!response.already_existed);
    let added = h.store.get(response.resource_id).await.unwrap();
    assert_eq!(added.inventory_status, InventoryStatus::Committed);
    assert_eq!(added.parent_id, Some(srv1));
    assert_eq!(added.modified_by, USER);
    assert_eq!(added.agent_id, h.store.get(srv1).await.unwrap().agent_id);
    assert!(h.alerts.instantiated().contains(&response.resource_id));

    // adding it again finds the existing resource
    let again = h
        .service
        .manually_add_resource(
            USER,
            ResourceTypeRef::new("Context", "tomcat"),
            srv1,
            serde_json::json!({ "key": "/manager" }),
        )
        .await
        .unwrap();
    assert!(again.already_existed);
    assert_eq!(again.resource_id, response.resource_id);
}

#[tokio::test]
async fn test_manually_add_unknown_type() {
    let h = Harness::new().await;
    let (host, _, _, _) = seed(&h).await;

    let err = h
        .service
        .manually_add_resource(USER, ResourceTypeRef::new("Nope", "none"), host, serde_json::Value::Null)
        .await
        .unwrap_err();
    assert!(err.is_stale_type());
}

#[tokio::test]
async fn test_add_resource_requires_parent() {
    let h = Harness::new().await;
    let orphan = ReportedResource::new("x", "x", ResourceTypeRef::new("Tomcat", "tomcat")).with_parent(777);

    let err = h.service.add_resource(orphan, USER).await.unwrap_err();
    assert!(matches!(err, CoreError::ResourceNotFound(777)));
}

#[tokio::test]
async fn test_add_resource_racing_report_creates_one_resource() {
    let h = Harness::new().await;
    let (host, _, _, _) = seed(&h).await;
    let added = server("srv3").with_parent(host);
    let rereport = InventoryReport::new(AGENT, vec![platform("host1").with_child(server("srv3"))]);

    let (added, merged) = tokio::join!(
        h.service.add_resource(added, USER),
        h.service.merge_inventory_report(rereport),
    );

    added.unwrap();
    assert!(merged.unwrap().failed_roots.is_empty());
    let copies = h
        .store
        .snapshot()
        .await
        .into_iter()
        .filter(|r| r.parent_id == Some(host) && r.resource_key == "srv3")
        .count();
    assert_eq!(copies, 1);
}

#[tokio::test]
async fn test_update_resource_version() {
    let h = Harness::new().await;
    let (_, srv1, _, _) = seed(&h).await;

    assert!(h.service.update_resource_version(srv1, "2.0").await.unwrap());
    let updated = h.store.get(srv1).await.unwrap();
    assert_eq!(updated.version.as_deref(), Some("2.0"));
    assert!(updated.product_version_id.is_some());

    // clearing the version drops the product version
    assert!(h.service.update_resource_version(srv1, "").await.unwrap());
    let cleared = h.store.get(srv1).await.unwrap();
    assert_eq!(cleared.version, None);
    assert_eq!(cleared.product_version_id, None);

    assert!(!h.service.update_resource_version(9999, "1.0").await.unwrap());
}

fn upgrade(resource_id: ResourceId) -> ResourceUpgradeRequest {
    ResourceUpgradeRequest {
        resource_id,
        new_resource_key: Some("srv1-upgraded".to_string()),
        new_name: Some("Tomcat (srv1)".to_string()),
        new_description: Some("upgraded".to_string()),
        upgrade_error: None,
    }
}

#[tokio::test]
async fn test_upgrade_only_key_by_default() {
    let h = Harness::new().await;
    let (_, srv1, srv2, _) = seed(&h).await;
    let mut failed = upgrade(srv2);
    failed.upgrade_error = Some("plugin crashed".to_string());

    let responses = h
        .service
        .upgrade_resources(vec![upgrade(srv1), failed, upgrade(5555)])
        .await
        .unwrap();

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].resource_key, "srv1-upgraded");
    assert_eq!(responses[0].name, "srv1");

    let stored = h.store.get(srv1).await.unwrap();
    assert_eq!(stored.resource_key, "srv1-upgraded");
    assert_eq!(stored.name, "srv1");
    assert_eq!(h.store.get(srv2).await.unwrap().resource_key, "srv2");
}

#[tokio::test]
async fn test_upgrade_refuses_sibling_key() {
    let h = Harness::new().await;
    let (_, srv1, srv2, _) = seed(&h).await;
    let mut request = upgrade(srv1);
    request.new_resource_key = Some("srv2".to_string());

    let responses = h.service.upgrade_resources(vec![request]).await.unwrap();

    assert!(responses.is_empty());
    assert_eq!(h.store.get(srv1).await.unwrap().resource_key, "srv1");
    assert_eq!(h.store.get(srv2).await.unwrap().resource_key, "srv2");
}

#[tokio::test]
async fn test_upgrade_keeps_key_when_proposed_key_is_empty() {
    let h = Harness::new().await;
    let (_, _, srv2, _) = seed(&h).await;
    let mut request = upgrade(srv2);
    request.new_resource_key = Some(String::new());

    let responses = h.service.upgrade_resources(vec![request]).await.unwrap();

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].resource_key, "srv2");
    assert_eq!(h.store.get(srv2).await.unwrap().resource_key, "srv2");
}

#[tokio::test]
async fn test_import_is_not_undone_by_stale_merge_write() {
    let h = Harness::new().await;
    let (host, _, _, _) = seed(&h).await;

    // a merge that read the platform before the import and writes it after
    let mut merge_tx = h.store.begin().await.unwrap();
    let mut stale = merge_tx.find(host).await.unwrap().unwrap();
    stale.version = Some("2.0".to_string());
    merge_tx.update(&stale).await.unwrap();

    h.service.import_resources(USER, &[host]).await.unwrap();

    let err = merge_tx.commit().await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(id) if id == host));
    assert_eq!(h.status_of(host).await, InventoryStatus::Committed);
}

#[tokio::test]
async fn test_rereport_racing_import_keeps_both_changes() {
    let h = Harness::new().await;
    let (host, _, _, _) = seed(&h).await;
    let rereport = InventoryReport::new(AGENT, vec![platform("host1").with_version("2.0")]);

    let hosts = [host];
    let (merged, imported) = tokio::join!(
        h.service.merge_inventory_report(rereport),
        h.service.import_resources(USER, &hosts),
    );

    let merged = merged.unwrap();
    assert!(merged.failed_roots.is_empty());
    imported.unwrap();

    let stored = h.store.get(host).await.unwrap();
    assert_eq!(stored.inventory_status, InventoryStatus::Committed);
    assert_eq!(stored.version.as_deref(), Some("2.0"));
}

#[tokio::test]
async fn test_upgrade_generic_properties_when_allowed() {
    let config = InventoryConfig {
        allow_generic_properties_upgrade: true,
        ..InventoryConfig::default()
    };
    let h = Harness::builder().config(config).build().await;
    let (_, srv1, _, _) = seed(&h).await;

    let responses = h.service.upgrade_resources(vec![upgrade(srv1)]).await.unwrap();

    assert_eq!(responses[0].name, "Tomcat (srv1)");
    assert_eq!(responses[0].description.as_deref(), Some("upgraded"));
}
