mod common;

use common::{admin_ctx, backend, orchestrator, orchestrator_with, request, user_ctx, APP, DEVICE};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use syncgate_core::memory::MemoryBackend;
use syncgate_core::{Channel, FailurePolicy, GatewayConfig, GatewayError, RequestContext};
use syncgate_types::{ApplicationId, Capability, ContextId, ObjectId, Principal};

async fn journal_index(backend: &MemoryBackend, call: &str) -> usize {
    backend
        .journal
        .position(call)
        .await
        .unwrap_or_else(|| panic!("{call} was never called"))
}

fn strict_tracking() -> GatewayConfig {
    GatewayConfig {
        failure_policy: FailurePolicy {
            strict_tracking: true,
            ..FailurePolicy::default()
        },
        ..GatewayConfig::default()
    }
}

// ── Request validation ───────────────────────────────────────────

#[tokio::test]
async fn missing_context_is_rejected_before_any_collaborator_call() {
    let backend = backend().await;
    let orch = orchestrator(&backend);
    let ctx = user_ctx();
    let body = request(json!({"id": 1, "model": "comment", "patch": [{"op": "replace", "path": "text", "value": "x"}]}));

    let errors = vec![
        orch.subscribe(&ctx, &body).await.unwrap_err(),
        orch.unsubscribe(&ctx, &body).await.unwrap_err(),
        orch.update(&ctx, &body).await.unwrap_err(),
        orch.delete(&ctx, &body).await.unwrap_err(),
        orch.count(&ctx, &body).await.unwrap_err(),
    ];

    for err in errors {
        assert!(matches!(err, GatewayError::MissingContext), "{err:?}");
        assert_eq!(err.status_code(), 400);
    }
    assert!(backend.journal.is_empty().await);
}

#[tokio::test]
async fn blank_context_counts_as_missing() {
    let backend = backend().await;
    let orch = orchestrator(&backend);

    let err = orch
        .subscribe(&user_ctx(), &request(json!({"context": "  ", "model": "event"})))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::MissingContext));
    assert!(backend.journal.is_empty().await);
}

#[tokio::test]
async fn missing_principal_is_unauthenticated() {
    let backend = backend().await;
    let orch = orchestrator(&backend);
    let ctx = RequestContext::new(APP).with_device(DEVICE);

    let err = orch
        .create(&ctx, &request(json!({"model": "event", "content": {}})))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 401);
    assert!(backend.journal.is_empty().await);
}

#[tokio::test]
async fn subscribe_without_device_is_rejected() {
    let backend = backend().await;
    let orch = orchestrator(&backend);
    let ctx = RequestContext::new(APP).with_principal(Principal::user(common::USER_EMAIL));

    let err = orch
        .subscribe(&ctx, &request(json!({"context": "c", "model": "event"})))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert!(backend.journal.is_empty().await);
}

#[tokio::test]
async fn malformed_patch_is_rejected_before_any_collaborator_call() {
    let backend = backend().await;
    let orch = orchestrator(&backend);

    for patch in [json!({"op": "replace"}), json!([]), json!([{"op": "rename", "path": "a"}])] {
        let body = request(json!({"id": 1, "context": "c", "model": "event", "patch": patch}));
        let err = orch.update(&user_ctx(), &body).await.unwrap_err();
        assert_eq!(err.status_code(), 400, "{patch}");
    }
    assert!(backend.journal.is_empty().await);
}

#[tokio::test]
async fn update_and_delete_require_an_id() {
    let backend = backend().await;
    let orch = orchestrator(&backend);
    let body = request(json!({"context": "c", "model": "event", "patch": [{"op": "remove", "path": "a"}]}));

    assert_eq!(orch.update(&user_ctx(), &body).await.unwrap_err().status_code(), 400);
    assert_eq!(orch.delete(&user_ctx(), &body).await.unwrap_err().status_code(), 400);
    assert!(backend.journal.is_empty().await);
}

#[tokio::test]
async fn unknown_model_is_a_client_error() {
    let backend = backend().await;
    let orch = orchestrator(&backend);

    let err = orch
        .count(&user_ctx(), &request(json!({"context": "c", "model": "ghost"})))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert!(backend.bus.messages().await.is_empty());
}

// ── ACL ──────────────────────────────────────────────────────────

#[tokio::test]
async fn denied_subscribe_has_no_side_effects() {
    let backend = backend().await;
    backend.access.deny(Capability::Read, "comment").await;
    let orch = orchestrator(&backend);

    let err = orch
        .subscribe(&user_ctx(), &request(json!({"id": 1, "context": 1, "model": "comment"})))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 403);
    assert!(backend.registry.subscriptions().await.is_empty());
    assert!(backend.bus.messages().await.is_empty());
    assert_eq!(backend.journal.position("registry.get_device").await, None);
}

#[tokio::test]
async fn count_needs_meta_read() {
    let backend = backend().await;
    backend.access.deny(Capability::MetaRead, "event").await;
    let orch = orchestrator(&backend);

    let err = orch
        .count(&user_ctx(), &request(json!({"context": "c", "model": "event"})))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::PermissionDenied { capability: Capability::MetaRead, .. }));
}

// ── Subscribe ────────────────────────────────────────────────────

#[tokio::test]
async fn subscribe_by_id_returns_the_object_and_registers_first() {
    let backend = backend().await;
    backend.store.insert(APP, "comment", "1", 1u64, json!({"text": "first"})).await;
    let orch = orchestrator(&backend);

    let completed = orch
        .subscribe(&user_ctx(), &request(json!({"id": 1, "context": 1, "model": "comment"})))
        .await
        .unwrap();

    assert!(completed.is_clean());
    assert_eq!(
        serde_json::to_value(&completed.output.objects).unwrap(),
        json!({"1": {"text": "first"}})
    );
    assert_eq!(completed.output.count, 1);

    let subscriptions = backend.registry.subscriptions().await;
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(
        subscriptions[0].channel,
        Channel::Object {
            model: "comments".into(),
            id: ObjectId::new("1"),
        }
    );

    let tracked = backend.bus.events_on("track").await;
    assert_eq!(tracked.len(), 1);
    assert_eq!(
        tracked[0],
        json!({
            "op": "sub",
            "object": {
                "id": "1",
                "context": "1",
                "device_id": DEVICE,
                "user_id": common::USER_EMAIL,
                "filters": null,
            },
            "applicationId": APP,
        })
    );
    assert!(backend.bus.events_on("aggregation").await.is_empty());

    let registered = journal_index(&backend, "registry.add_subscription").await;
    let published = journal_index(&backend, "bus.send:track").await;
    assert!(registered < published);
}

#[tokio::test]
async fn subscribe_runs_its_steps_in_order() {
    let backend = backend().await;
    let orch = orchestrator(&backend);

    orch.subscribe(&user_ctx(), &request(json!({"context": "c", "model": "event"})))
        .await
        .unwrap();

    assert_eq!(
        backend.journal.calls().await,
        vec![
            "schemas.load",
            "access.check",
            "registry.get_device",
            "registry.add_subscription",
            "store.get_all",
            "bus.send:track",
            "registry.set_object_count",
        ]
    );
}

#[tokio::test]
async fn subscribe_records_the_full_parent_count() {
    let backend = backend().await;
    for i in 0..37 {
        backend
            .store
            .insert(APP, "comment", "c", format!("k{i:02}"), json!({"event_id": "e1"}))
            .await;
    }
    let orch = orchestrator(&backend);

    let completed = orch
        .subscribe(
            &user_ctx(),
            &request(json!({"context": "c", "model": "comment", "filters": {"event_id": "e1"}})),
        )
        .await
        .unwrap();

    assert_eq!(completed.output.objects.len(), 10);
    assert_eq!(completed.output.count, 37);

    let subscription = &backend.registry.subscriptions().await[0];
    let stored = backend
        .registry
        .stored_count(&subscription.application_id, &subscription.context, &subscription.channel)
        .await;
    assert_eq!(stored, Some(37));
}

#[tokio::test]
async fn subscribe_from_unknown_device_is_not_found() {
    let backend = backend().await;
    let orch = orchestrator(&backend);
    let ctx = RequestContext::new(APP)
        .with_device("stranger")
        .with_principal(Principal::user(common::USER_EMAIL));

    let err = orch
        .subscribe(&ctx, &request(json!({"context": "c", "model": "event"})))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::DeviceNotRegistered));
    assert_eq!(err.status_code(), 404);
    assert!(backend.registry.subscriptions().await.is_empty());
}

#[tokio::test]
async fn subscribe_to_missing_object_fails_after_registering() {
    let backend = backend().await;
    let orch = orchestrator(&backend);

    let err = orch
        .subscribe(&user_ctx(), &request(json!({"id": 9, "context": 1, "model": "comment"})))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 404);
    assert_eq!(backend.registry.subscriptions().await.len(), 1);
    assert!(backend.bus.messages().await.is_empty());
}

#[tokio::test]
async fn registry_failure_aborts_subscribe() {
    let backend = backend().await;
    backend.registry.set_subscriptions_failing(true);
    let orch = orchestrator(&backend);

    let err = orch
        .subscribe(&user_ctx(), &request(json!({"context": "c", "model": "event"})))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 500);
    assert_eq!(backend.journal.position("store.get_all").await, None);
}

#[tokio::test]
async fn count_update_failure_is_soft_by_default() {
    let backend = backend().await;
    backend.registry.set_counts_failing(true);
    let orch = orchestrator(&backend);

    let completed = orch
        .subscribe(&user_ctx(), &request(json!({"context": "c", "model": "event"})))
        .await
        .unwrap();

    assert_eq!(completed.warnings.len(), 1);
    assert_eq!(completed.warnings[0].step, "record_count");
}

#[tokio::test]
async fn count_update_failure_is_fatal_when_strict() {
    let backend = backend().await;
    backend.registry.set_counts_failing(true);
    let config = GatewayConfig {
        failure_policy: FailurePolicy::strict(),
        ..GatewayConfig::default()
    };
    let orch = orchestrator_with(&backend, config);

    let err = orch
        .subscribe(&user_ctx(), &request(json!({"context": "c", "model": "event"})))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn duplicate_subscribe_is_idempotent() {
    let backend = backend().await;
    let orch = orchestrator(&backend);
    let body = request(json!({"context": "c", "model": "event", "filters": {"user": "user-1"}}));

    orch.subscribe(&user_ctx(), &body).await.unwrap();
    orch.subscribe(&user_ctx(), &body).await.unwrap();

    assert_eq!(backend.registry.subscriptions().await.len(), 1);
    assert_eq!(backend.bus.events_on("track").await.len(), 2);
}

#[tokio::test]
async fn user_filter_limits_delivered_objects_and_recorded_count() {
    let backend = backend().await;
    backend.store.insert(APP, "event", "c", "e1", json!({"user_id": "user-1"})).await;
    backend.store.insert(APP, "event", "c", "e2", json!({"user_id": "someone-else"})).await;
    let orch = orchestrator(&backend);
    let body = request(json!({"context": "c", "model": "event", "filters": {"user": "user-1"}}));

    let completed = orch.subscribe(&user_ctx(), &body).await.unwrap();

    assert_eq!(
        completed.output.objects.keys().cloned().collect::<Vec<_>>(),
        vec![ObjectId::new("e1")]
    );
    assert_eq!(completed.output.count, 1);
    assert_eq!(orch.count(&user_ctx(), &body).await.unwrap(), 1);
}

#[tokio::test]
async fn backend_without_history_serves_requests_but_keeps_nothing() {
    let backend = common::seed(MemoryBackend::without_history()).await;
    backend.store.insert(APP, "event", "c", "e1", json!({})).await;
    let orch = orchestrator(&backend);

    let completed = orch
        .subscribe(&user_ctx(), &request(json!({"context": "c", "model": "event"})))
        .await
        .unwrap();
    assert_eq!(completed.output.count, 1);
    orch.subscribe(
        &user_ctx(),
        &request(json!({"context": "c", "model": "event", "filters": {"query": {"a": 1}}})),
    )
    .await
    .unwrap();
    orch.create(&user_ctx(), &request(json!({"model": "event", "content": {}})))
        .await
        .unwrap();

    assert!(!backend.journal.is_enabled());
    assert!(backend.journal.is_empty().await);
    assert!(backend.bus.messages().await.is_empty());
    assert!(backend.search.queries().await.is_empty());
}

// ── Unsubscribe ──────────────────────────────────────────────────

#[tokio::test]
async fn unsubscribe_without_subscription_is_not_found_and_silent() {
    let backend = backend().await;
    let orch = orchestrator(&backend);

    let err = orch
        .unsubscribe(&user_ctx(), &request(json!({"id": 1, "context": 1, "model": "comment"})))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::SubscriptionNotFound));
    assert_eq!(err.status_code(), 404);
    assert!(backend.bus.messages().await.is_empty());
}

#[tokio::test]
async fn subscribe_then_unsubscribe_leaves_no_subscription() {
    let backend = backend().await;
    backend.store.insert(APP, "comment", "1", 1u64, json!({"text": "first"})).await;
    let orch = orchestrator(&backend);
    let body = request(json!({"id": 1, "context": 1, "model": "comment"}));

    let before = backend.registry.subscriptions().await;
    orch.subscribe(&user_ctx(), &body).await.unwrap();
    orch.unsubscribe(&user_ctx(), &body).await.unwrap();

    assert_eq!(backend.registry.subscriptions().await, before);

    let tracked = backend.bus.events_on("track").await;
    assert_eq!(tracked.len(), 2);
    assert_eq!(tracked[1]["op"], "unsub");
    assert_eq!(
        tracked[1]["object"],
        json!({"id": "1", "context": "1", "device_id": DEVICE, "filters": null})
    );
}

#[tokio::test]
async fn unsubscribe_tracking_failure_is_soft() {
    let backend = backend().await;
    let orch = orchestrator(&backend);
    let body = request(json!({"context": "c", "model": "event"}));
    orch.subscribe(&user_ctx(), &body).await.unwrap();
    backend.bus.fail_topic("track").await;

    let completed = orch.unsubscribe(&user_ctx(), &body).await.unwrap();

    assert!(!completed.is_clean());
    assert!(backend.registry.subscriptions().await.is_empty());
}

// ── Create ───────────────────────────────────────────────────────

#[tokio::test]
async fn create_publishes_the_stamped_object_to_both_topics() {
    let backend = backend().await;
    let orch = orchestrator(&backend);

    let completed = orch
        .create(
            &user_ctx(),
            &request(json!({"context": "c", "model": "event", "content": {"title": "Launch"}})),
        )
        .await
        .unwrap();

    let expected_object = json!({
        "title": "Launch",
        "type": "event",
        "context_id": "c",
        "user_id": "user-1",
    });
    assert_eq!(completed.output, expected_object);

    let messages = backend.bus.messages().await;
    let topics: Vec<&str> = messages.iter().map(|(topic, _)| topic.as_str()).collect();
    assert_eq!(topics, vec!["aggregation", "track"]);

    let added: Value = serde_json::from_str(&messages[0].1).unwrap();
    assert_eq!(
        added,
        json!({
            "op": "add",
            "object": expected_object,
            "applicationId": APP,
            "isAdmin": false,
        })
    );
    assert_eq!(backend.journal.position("accounts.find_user").await, Some(2));
}

#[tokio::test]
async fn admin_create_resolves_the_admin_account() {
    let backend = backend().await;
    let orch = orchestrator(&backend);

    let completed = orch
        .create(&admin_ctx(), &request(json!({"model": "event", "content": {}})))
        .await
        .unwrap();

    assert_eq!(completed.output["user_id"], "admin-1");
    assert!(completed.output.get("context_id").is_none());
    assert_eq!(backend.bus.events_on("aggregation").await[0]["isAdmin"], true);
}

#[tokio::test]
async fn create_without_account_is_not_found() {
    let backend = backend().await;
    let orch = orchestrator(&backend);
    let ctx = RequestContext::new(APP).with_principal(Principal::user("nobody@example.com"));

    let err = orch
        .create(&ctx, &request(json!({"model": "event", "content": {}})))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::AccountNotFound(ref email) if email == "nobody@example.com"));
    assert!(backend.bus.messages().await.is_empty());
}

#[tokio::test]
async fn create_child_without_parent_id_never_reaches_the_bus() {
    let backend = backend().await;
    let orch = orchestrator(&backend);

    let err = orch
        .create(
            &user_ctx(),
            &request(json!({"context": "c", "model": "comment", "content": {"text": "orphan"}})),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 400);
    assert!(err.to_string().contains("event_id"));
    assert!(backend.bus.messages().await.is_empty());
    assert_eq!(backend.journal.position("accounts.find_user").await, None);
}

#[tokio::test]
async fn create_child_with_empty_parent_id_is_rejected() {
    let backend = backend().await;
    let orch = orchestrator(&backend);

    for parent_id in [json!(""), json!("   "), json!(0), json!(0.0), json!(false), json!(null)] {
        let err = orch
            .create(
                &user_ctx(),
                &request(json!({"model": "comment", "content": {"event_id": parent_id}})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400, "{parent_id}");
    }
    assert!(backend.bus.messages().await.is_empty());

    orch.create(
        &user_ctx(),
        &request(json!({"model": "comment", "content": {"event_id": 12}})),
    )
    .await
    .unwrap();
    assert_eq!(backend.bus.events_on("aggregation").await.len(), 1);
}

#[tokio::test]
async fn update_and_delete_warnings_name_their_workflow() {
    let backend = backend().await;
    backend.bus.fail_topic("track").await;
    let orch = orchestrator(&backend);

    let updated = orch
        .update(
            &user_ctx(),
            &request(json!({
                "id": "e1",
                "context": "c",
                "model": "event",
                "patch": [{"op": "remove", "path": "title"}],
            })),
        )
        .await
        .unwrap();
    let deleted = orch
        .delete(&user_ctx(), &request(json!({"id": "e1", "context": "c", "model": "event"})))
        .await
        .unwrap();

    assert_eq!(
        (updated.warnings[0].workflow, updated.warnings[0].step),
        ("update", "publish_track")
    );
    assert_eq!(
        (deleted.warnings[0].workflow, deleted.warnings[0].step),
        ("delete", "publish_track")
    );
}

#[tokio::test]
async fn create_content_must_be_an_object() {
    let backend = backend().await;
    let orch = orchestrator(&backend);

    let err = orch
        .create(&user_ctx(), &request(json!({"model": "event", "content": [1]})))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert!(backend.journal.is_empty().await);
}

#[tokio::test]
async fn mutation_publish_failure_is_fatal_and_skips_tracking() {
    let backend = backend().await;
    backend.bus.fail_topic("aggregation").await;
    let orch = orchestrator(&backend);

    let err = orch
        .create(
            &user_ctx(),
            &request(json!({"model": "comment", "content": {"event_id": "e1"}})),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 500);
    assert_eq!(backend.journal.position("bus.send:track").await, None);
}

#[tokio::test]
async fn create_tracking_failure_is_soft_by_default() {
    let backend = backend().await;
    backend.bus.fail_topic("track").await;
    let orch = orchestrator(&backend);

    let completed = orch
        .create(&user_ctx(), &request(json!({"model": "event", "content": {}})))
        .await
        .unwrap();

    assert_eq!(completed.warnings.len(), 1);
    assert_eq!(completed.warnings[0].step, "publish_track");
    assert_eq!(backend.bus.events_on("aggregation").await.len(), 1);
}

#[tokio::test]
async fn create_tracking_failure_is_fatal_when_strict() {
    let backend = backend().await;
    backend.bus.fail_topic("track").await;
    let orch = orchestrator_with(&backend, strict_tracking());

    let err = orch
        .create(&user_ctx(), &request(json!({"model": "event", "content": {}})))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Publish { .. }));
    assert_eq!(backend.bus.events_on("aggregation").await.len(), 1);
}

// ── Update and delete ────────────────────────────────────────────

#[tokio::test]
async fn update_sends_the_same_edit_to_both_topics() {
    let backend = backend().await;
    let orch = orchestrator(&backend);
    let patch = json!([
        {"op": "replace", "path": "title", "value": "Renamed"},
        {"op": "increment", "path": "views", "value": 1},
    ]);

    orch.update(
        &user_ctx(),
        &request(json!({"id": "e1", "context": "c", "model": "event", "patch": patch})),
    )
    .await
    .unwrap();

    let messages = backend.bus.messages().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].0, "aggregation");
    assert_eq!(messages[1].0, "track");
    assert_eq!(messages[0].1, messages[1].1);

    let edit: Value = serde_json::from_str(&messages[0].1).unwrap();
    assert_eq!(
        edit,
        json!({
            "op": "edit",
            "id": "e1",
            "context": "c",
            "type": "event",
            "object": patch,
            "applicationId": APP,
        })
    );
}

#[tokio::test]
async fn update_tracking_failure_is_soft() {
    let backend = backend().await;
    backend.bus.fail_topic("track").await;
    let orch = orchestrator(&backend);
    let body = request(json!({
        "id": "e1",
        "context": "c",
        "model": "event",
        "patch": [{"op": "remove", "path": "title"}],
    }));

    let completed = orch.update(&user_ctx(), &body).await.unwrap();
    assert_eq!(completed.warnings.len(), 1);
}

#[tokio::test]
async fn delete_sends_removal_descriptors_in_order() {
    let backend = backend().await;
    let orch = orchestrator(&backend);

    let completed = orch
        .delete(&user_ctx(), &request(json!({"id": 5, "context": "c", "model": "comment"})))
        .await
        .unwrap();
    assert!(completed.is_clean());

    assert_eq!(
        backend.bus.events_on("aggregation").await,
        vec![json!({
            "op": "delete",
            "object": {"id": "5", "type": "comment", "context": "c"},
            "applicationId": APP,
        })]
    );
    assert_eq!(
        backend.bus.events_on("track").await,
        vec![json!({
            "op": "delete",
            "object": {"op": "remove", "path": "comment/5"},
            "applicationId": APP,
        })]
    );

    let mutation = journal_index(&backend, "bus.send:aggregation").await;
    let track = journal_index(&backend, "bus.send:track").await;
    assert!(mutation < track);
}

#[tokio::test]
async fn write_operations_need_write_capability() {
    let backend = backend().await;
    backend.access.deny(Capability::Write, "event").await;
    let orch = orchestrator(&backend);

    let err = orch
        .delete(&user_ctx(), &request(json!({"id": 5, "context": "c", "model": "event"})))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 403);
    assert!(backend.bus.messages().await.is_empty());
}

// ── Count ────────────────────────────────────────────────────────

#[tokio::test]
async fn count_reads_what_subscribe_recorded() {
    let backend = backend().await;
    for i in 0..3u64 {
        backend.store.insert(APP, "event", "c", i, json!({})).await;
    }
    let orch = orchestrator(&backend);
    let body = request(json!({"context": "c", "model": "event"}));

    assert_eq!(orch.count(&user_ctx(), &body).await.unwrap(), 0);
    orch.subscribe(&user_ctx(), &body).await.unwrap();
    assert_eq!(orch.count(&user_ctx(), &body).await.unwrap(), 3);
}

#[tokio::test]
async fn count_never_publishes() {
    let backend = backend().await;
    let orch = orchestrator(&backend);

    orch.count(&user_ctx(), &request(json!({"context": "c", "model": "event"})))
        .await
        .unwrap();
    assert!(backend.bus.messages().await.is_empty());
}

#[tokio::test]
async fn count_registry_failure_is_a_server_error() {
    let backend = backend().await;
    backend.registry.set_counts_failing(true);
    let orch = orchestrator(&backend);

    let err = orch
        .count(&user_ctx(), &request(json!({"context": "c", "model": "event"})))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 500);
}

// ── Schema cache integration ─────────────────────────────────────

#[tokio::test]
async fn schema_is_loaded_once_across_requests() {
    let backend = backend().await;
    let orch = orchestrator(&backend);
    let body = request(json!({"context": "c", "model": "event"}));

    for _ in 0..3 {
        orch.count(&user_ctx(), &body).await.unwrap();
    }

    assert_eq!(backend.schemas.loads(), 1);
    assert!(orch.schema_cache().contains(&ApplicationId::new(APP)).await);
}

#[tokio::test]
async fn unavailable_schema_aborts_the_request() {
    let backend = backend().await;
    backend.schemas.set_failing(true);
    let orch = orchestrator(&backend);

    let err = orch
        .subscribe(&user_ctx(), &request(json!({"context": "c", "model": "event"})))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Schema { .. }));
    assert_eq!(backend.journal.position("access.check").await, None);
    assert!(backend.registry.subscriptions().await.is_empty());
}

#[tokio::test]
async fn subscription_carries_the_request_scope() {
    let backend = backend().await;
    let orch = orchestrator(&backend);

    orch.subscribe(
        &user_ctx(),
        &request(json!({"context": "ctx-9", "model": "event", "filters": {"user": "user-1"}})),
    )
    .await
    .unwrap();

    let subscription = &backend.registry.subscriptions().await[0];
    assert_eq!(subscription.application_id, ApplicationId::new(APP));
    assert_eq!(subscription.context, ContextId::new("ctx-9"));
    assert_eq!(subscription.device_id.as_str(), DEVICE);
    assert_eq!(subscription.user_filter().map(|u| u.as_str()), Some("user-1"));
    assert_eq!(subscription.parent_filter(), None);
}
