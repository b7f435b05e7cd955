mod common;

use appflow_cloud::{
    ActionType, CloudError, ConstructOptions, DeclaredBody, ProfileCredentialResolver,
    RemovalPolicyEngine, ResourceRecord, RunErrorKind, RunExecutor, RunResult, RunStatus,
    StateManager, StateStore, StaticCredentialStore, SuffixStrategy, Teardown, body_fn,
};
use async_trait::async_trait;
use std::collections::BTreeSet;
use appflow_core::{RawAppSpec, RawProvider, RemovalPolicy, ResourceDecl};
use common::{Harness, empty_resolver, sst_dev_resolver};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn test_app(policy: &str) -> RawAppSpec {
    RawAppSpec::new("test")
        .with_region("us-east-1")
        .with_removal_policy(policy)
        .with_provider(RawProvider::new("aws").with_profile("sst-dev"))
}

fn queues(names: &[&str]) -> DeclaredBody {
    DeclaredBody::new(names.iter().map(|n| ResourceDecl::new("queue", *n)).collect())
}

/// test / us-east-1 / sst-dev でキューを1つ作成し、削除まで通す
#[tokio::test]
async fn test_single_queue_scenario() {
    let harness = Harness::new();
    let executor = RunExecutor::new(sst_dev_resolver(), harness.catalog(harness.queue()));

    let result = executor
        .execute(
            test_app("remove"),
            body_fn(|ctx| {
                Box::pin(async move {
                    ctx.construct("queue", "queue", ConstructOptions::new().name_prefix("d"))
                        .await?;
                    Ok(())
                })
            }),
        )
        .await;

    assert_eq!(result.status, RunStatus::Success, "{:?}", result.errors);
    assert_eq!(result.resources.len(), 1);
    let queue = &result.resources[0];
    assert_eq!(queue.type_tag, "queue");
    assert_eq!(queue.name_prefix.as_deref(), Some("d"));
    assert!(queue.effective_name.starts_with('d'));
    assert_eq!(queue.provider.as_deref(), Some("aws"));
    // the credential handed to the constructor came from the sst-dev profile
    assert_eq!(
        queue.get_output::<String>("arn"),
        Some(format!("arn:aws:queue:us-east-1:sst-dev:{}", queue.effective_name))
    );

    let descriptor = result.descriptor.as_ref().unwrap();
    assert_eq!(descriptor.name(), "test");
    assert_eq!(descriptor.region(), "us-east-1");
    assert_eq!(descriptor.removal_policy(), RemovalPolicy::Remove);

    let teardown = Teardown::new(sst_dev_resolver(), harness.catalog(harness.queue()));
    let removed = teardown.teardown(&result).await.unwrap();

    assert_eq!(removed.status, RunStatus::Success);
    assert_eq!(harness.deletions(), vec![queue.effective_name.clone()]);
    assert_eq!(removed.deleted, vec![queue.key()]);
}

#[tokio::test]
async fn test_resources_in_construction_order() {
    let harness = Harness::new();
    let executor = RunExecutor::new(sst_dev_resolver(), harness.catalog(harness.queue()));

    let result = executor
        .execute(test_app("retain"), queues(&["a", "b", "c", "d"]))
        .await;

    assert_eq!(result.status, RunStatus::Success);
    let names: Vec<_> = result.resources.iter().map(|r| r.logical_name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c", "d"]);
    let ordinals: Vec<_> = result.resources.iter().map(|r| r.ordinal).collect();
    assert_eq!(ordinals, vec![1, 2, 3, 4]);
}

/// 3つ中2つ目の構築に失敗した場合、`?` で中断すると1つ目だけが残る
#[tokio::test]
async fn test_second_of_three_fails() {
    let harness = Harness::new();
    let executor = RunExecutor::new(
        sst_dev_resolver(),
        harness.catalog(harness.queue().failing_create("second")),
    );

    let result = executor
        .execute(
            test_app("remove"),
            body_fn(|ctx| {
                Box::pin(async move {
                    for name in ["first", "second", "third"] {
                        ctx.construct("queue", name, ConstructOptions::new()).await?;
                    }
                    Ok(())
                })
            }),
        )
        .await;

    assert_eq!(result.status, RunStatus::PartialFailure);
    let names: Vec<_> = result.resources.iter().map(|r| r.logical_name.as_str()).collect();
    assert_eq!(names, vec!["first"]);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].is_for("queue", "second"));
    assert_eq!(result.errors[0].kind, RunErrorKind::Construction);
}

#[tokio::test]
async fn test_declared_body_continues_after_failure() {
    let harness = Harness::new();
    let executor = RunExecutor::new(
        sst_dev_resolver(),
        harness.catalog(harness.queue().failing_create("second")),
    );

    let result = executor
        .execute(test_app("remove"), queues(&["first", "second", "third"]))
        .await;

    assert_eq!(result.status, RunStatus::PartialFailure);
    let names: Vec<_> = result.resources.iter().map(|r| r.logical_name.as_str()).collect();
    assert_eq!(names, vec!["first", "third"]);
    assert!(result.errors[0].is_for("queue", "second"));
}

#[tokio::test]
async fn test_invalid_spec_has_no_side_effects() {
    let harness = Harness::new();
    let invoked = Arc::new(AtomicBool::new(false));
    let executor = RunExecutor::new(sst_dev_resolver(), harness.catalog(harness.queue()));

    let flag = invoked.clone();
    let result = executor
        .execute(
            RawAppSpec::new("1-bad").with_removal_policy("destroy"),
            body_fn(move |_ctx| {
                Box::pin(async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                })
            }),
        )
        .await;

    assert_eq!(result.status, RunStatus::Failure);
    assert!(result.descriptor.is_none());
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, RunErrorKind::InvalidAppSpec);
    // every violation is listed at once
    for field in ["name", "region", "removalPolicy"] {
        assert!(result.errors[0].message.contains(field), "{}", result.errors[0].message);
    }
    assert!(!invoked.load(Ordering::SeqCst));
    assert!(harness.events().is_empty());
}

#[tokio::test]
async fn test_duplicate_provider() {
    let harness = Harness::new();
    let executor = RunExecutor::new(sst_dev_resolver(), harness.catalog(harness.queue()));

    let spec = test_app("remove").with_provider(RawProvider::new("aws"));
    let result = executor.execute(spec, queues(&["a"])).await;

    assert_eq!(result.status, RunStatus::Failure);
    assert_eq!(result.errors[0].kind, RunErrorKind::DuplicateProvider);
    assert!(harness.events().is_empty());
}

#[tokio::test]
async fn test_credential_failure_is_fail_closed() {
    let harness = Harness::new();
    let invoked = Arc::new(AtomicBool::new(false));
    let executor = RunExecutor::new(empty_resolver(), harness.catalog(harness.queue()));

    let spec = test_app("remove").with_provider(RawProvider::new("cloudflare"));
    let flag = invoked.clone();
    let result = executor
        .execute(
            spec,
            body_fn(move |_ctx| {
                Box::pin(async move {
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                })
            }),
        )
        .await;

    assert_eq!(result.status, RunStatus::Failure);
    assert!(!invoked.load(Ordering::SeqCst));
    let mut providers: Vec<_> = result
        .errors
        .iter()
        .map(|e| {
            assert_eq!(e.kind, RunErrorKind::CredentialResolution);
            e.provider.clone().unwrap()
        })
        .collect();
    providers.sort();
    assert_eq!(providers, vec!["aws", "cloudflare"]);
}

#[tokio::test]
async fn test_forced_collision_is_recorded() {
    let harness = Harness::new();
    let executor = RunExecutor::new(sst_dev_resolver(), harness.catalog(harness.queue()))
        .with_suffix_strategy(SuffixStrategy::Fixed("1".to_string()));

    let result = executor
        .execute(
            test_app("remove"),
            body_fn(|ctx| {
                Box::pin(async move {
                    let first = ctx
                        .construct("queue", "a", ConstructOptions::new().name_prefix("d"))
                        .await?;
                    assert_eq!(first.effective_name(), "d1");
                    let second = ctx
                        .construct("queue", "b", ConstructOptions::new().name_prefix("d"))
                        .await;
                    assert!(second.is_err());
                    Ok(())
                })
            }),
        )
        .await;

    assert_eq!(result.status, RunStatus::PartialFailure);
    assert_eq!(result.resources.len(), 1);
    assert_eq!(result.errors[0].kind, RunErrorKind::DuplicateResource);
    assert!(result.errors[0].is_for("queue", "b"));
    // the colliding resource was never provisioned
    assert_eq!(harness.events(), vec!["create:d1"]);
}

#[tokio::test]
async fn test_remove_deletes_in_reverse_order() {
    let harness = Harness::new();
    let executor = RunExecutor::new(sst_dev_resolver(), harness.catalog(harness.queue()));
    let result = executor
        .execute(test_app("remove"), queues(&["a", "b", "c"]))
        .await;

    let teardown = Teardown::new(sst_dev_resolver(), harness.catalog(harness.queue()));
    let removed = teardown.teardown(&result).await.unwrap();

    assert_eq!(harness.deletions(), vec!["c", "b", "a"]);
    assert_eq!(removed.deleted.len(), 3);
    assert!(removed.retained.is_empty());
}

#[tokio::test]
async fn test_failed_deletion_does_not_stop_teardown() {
    let harness = Harness::new();
    let executor = RunExecutor::new(sst_dev_resolver(), harness.catalog(harness.queue()));
    let result = executor
        .execute(test_app("remove"), queues(&["a", "b", "c"]))
        .await;

    let teardown = Teardown::new(
        sst_dev_resolver(),
        harness.catalog(harness.queue().failing_delete("b")),
    );
    let removed = teardown.teardown(&result).await.unwrap();

    assert_eq!(harness.deletions(), vec!["c", "a"]);
    assert_eq!(removed.status, RunStatus::PartialFailure);
    assert_eq!(removed.failures.len(), 1);
    assert_eq!(removed.failures[0].effective_name, "b");
    assert!(matches!(
        removed.ensure_success(),
        Err(CloudError::Teardown { failed: 1, total: 3 })
    ));
}

#[tokio::test]
async fn test_teardown_without_credentials_fails_each_deletion() {
    let harness = Harness::new();
    let executor = RunExecutor::new(sst_dev_resolver(), harness.catalog(harness.queue()));
    let result = executor
        .execute(test_app("remove"), queues(&["a", "b"]))
        .await;

    let teardown = Teardown::new(empty_resolver(), harness.catalog(harness.queue()));
    let removed = teardown.teardown(&result).await.unwrap();

    assert!(harness.deletions().is_empty());
    assert_eq!(removed.status, RunStatus::Failure);
    let failed: Vec<_> = removed.failures.iter().map(|f| f.effective_name.as_str()).collect();
    assert_eq!(failed, vec!["b", "a"]);
    assert!(removed.failures[0].message.contains("sst-dev"));
    assert!(matches!(
        removed.ensure_success(),
        Err(CloudError::Teardown { failed: 2, total: 2 })
    ));
}

/// 認証情報が解決できないプロバイダーがあっても、他のプロバイダーの削除は続く
#[tokio::test]
async fn test_unresolved_provider_does_not_block_others() {
    let harness = Harness::new();
    let both = Arc::new(ProfileCredentialResolver::new(
        StaticCredentialStore::new()
            .with_entry("aws", Some("sst-dev"), "sst-dev-secret")
            .with_entry("cloudflare", None, "cf-token"),
    ));
    let executor = RunExecutor::new(both, harness.catalog(harness.queue()));
    let spec = test_app("remove").with_provider(RawProvider::new("cf").with_kind("cloudflare"));
    let result = executor
        .execute(
            spec,
            body_fn(|ctx| {
                Box::pin(async move {
                    ctx.construct("queue", "a", ConstructOptions::new()).await?;
                    ctx.construct("queue", "b", ConstructOptions::new().provider("cf"))
                        .await?;
                    Ok(())
                })
            }),
        )
        .await;
    assert_eq!(result.status, RunStatus::Success, "{:?}", result.errors);

    // only the aws profile is known at teardown time
    let teardown = Teardown::new(sst_dev_resolver(), harness.catalog(harness.queue()));
    let removed = teardown.teardown(&result).await.unwrap();

    assert_eq!(harness.deletions(), vec!["a"]);
    assert_eq!(removed.deleted, vec!["queue:a"]);
    assert_eq!(removed.failures.len(), 1);
    assert_eq!(removed.failures[0].effective_name, "b");
    assert!(removed.failures[0].message.contains("cf"));
    assert_eq!(removed.status, RunStatus::PartialFailure);
}

/// 状態ストアが `forget` に失敗する
struct LockedForget {
    inner: StateManager,
}

#[async_trait]
impl StateStore for LockedForget {
    async fn record_run(&self, run: &RunResult) -> appflow_cloud::Result<()> {
        self.inner.record_run(run).await
    }

    async fn last_run(&self) -> appflow_cloud::Result<Option<RunResult>> {
        self.inner.last_run().await
    }

    async fn pinned(&self) -> appflow_cloud::Result<BTreeSet<String>> {
        self.inner.pinned().await
    }

    async fn pin(&self, records: &[ResourceRecord]) -> appflow_cloud::Result<()> {
        self.inner.pin(records).await
    }

    async fn forget(&self, _keys: &[String]) -> appflow_cloud::Result<()> {
        Err(CloudError::LockError("state is locked".to_string()))
    }
}

#[tokio::test]
async fn test_state_failure_keeps_deletions_in_result() {
    let temp_dir = tempdir().unwrap();
    let state = Arc::new(LockedForget {
        inner: StateManager::new(temp_dir.path()),
    });
    let harness = Harness::new();
    let executor = RunExecutor::new(sst_dev_resolver(), harness.catalog(harness.queue()));
    let result = executor.execute(test_app("remove"), queues(&["a"])).await;
    state.record_run(&result).await.unwrap();

    let teardown =
        Teardown::new(sst_dev_resolver(), harness.catalog(harness.queue())).with_state(state);
    let removed = teardown.teardown(&result).await.unwrap();

    assert_eq!(harness.deletions(), vec!["a"]);
    assert_eq!(removed.deleted, vec!["queue:a"]);
    assert_eq!(removed.state_errors.len(), 1);
    assert!(removed.state_errors[0].contains("state is locked"));
    assert_eq!(removed.status, RunStatus::PartialFailure);
    assert!(matches!(removed.ensure_success(), Err(CloudError::StateError(_))));
}

#[tokio::test]
async fn test_retain_issues_no_deletions() {
    let harness = Harness::new();
    let executor = RunExecutor::new(sst_dev_resolver(), harness.catalog(harness.queue()));
    let result = executor.execute(test_app("retain"), queues(&["a", "b"])).await;

    // no credentials are needed when nothing is deleted
    let teardown = Teardown::new(empty_resolver(), harness.catalog(harness.queue()));
    let removed = teardown.teardown(&result).await.unwrap();

    assert!(harness.deletions().is_empty());
    assert_eq!(removed.retained, vec!["queue:b", "queue:a"]);
    assert!(removed.pinned.is_empty());
    assert_eq!(removed.status, RunStatus::Success);
}

#[tokio::test]
async fn test_retain_all_pins_in_state() {
    let temp_dir = tempdir().unwrap();
    let state = Arc::new(StateManager::new(temp_dir.path()));
    let harness = Harness::new();
    let executor = RunExecutor::new(sst_dev_resolver(), harness.catalog(harness.queue()));
    let result = executor
        .execute(test_app("retainAll"), queues(&["a", "b"]))
        .await;
    state.record_run(&result).await.unwrap();

    let teardown = Teardown::new(sst_dev_resolver(), harness.catalog(harness.queue()))
        .with_state(state.clone());
    let removed = teardown.teardown(&result).await.unwrap();
    assert_eq!(removed.pinned.len(), 2);
    assert_eq!(state.pinned().await.unwrap().len(), 2);

    // a later teardown of the same state leaves pinned records alone,
    // whatever the policy says now
    let mut later = state.last_run().await.unwrap().unwrap();
    later.descriptor = executor
        .execute(test_app("remove"), queues(&[]))
        .await
        .descriptor;
    let plan = teardown.plan(&later).await.unwrap();
    assert_eq!(plan.actions_by_type(ActionType::Pinned).len(), 2);

    let again = teardown.apply(&later, &plan).await.unwrap();
    assert!(harness.deletions().is_empty());
    assert_eq!(again.pinned.len(), 2);
}

#[tokio::test]
async fn test_remove_forgets_deleted_records() {
    let temp_dir = tempdir().unwrap();
    let state = Arc::new(StateManager::new(temp_dir.path()));
    let harness = Harness::new();
    let executor = RunExecutor::new(sst_dev_resolver(), harness.catalog(harness.queue()));
    let result = executor
        .execute(test_app("remove"), queues(&["a", "b"]))
        .await;
    state.record_run(&result).await.unwrap();

    let teardown = Teardown::new(
        sst_dev_resolver(),
        harness.catalog(harness.queue().failing_delete("a")),
    )
    .with_state(state.clone());
    teardown.teardown(&result).await.unwrap();

    // only the record whose deletion failed is still tracked
    let remaining = state.last_run().await.unwrap().unwrap();
    let names: Vec<_> = remaining.resources.iter().map(|r| r.effective_name.as_str()).collect();
    assert_eq!(names, vec!["a"]);
}

/// 中断後も作成済みのリソースは結果に残る
#[tokio::test]
async fn test_cancellation_keeps_created_resources() {
    let harness = Harness::new();
    let token = CancellationToken::new();
    let executor = RunExecutor::new(sst_dev_resolver(), harness.catalog(harness.queue()))
        .with_cancellation(token.clone());

    let result = executor
        .execute(
            test_app("remove"),
            body_fn(move |ctx| {
                Box::pin(async move {
                    ctx.construct("queue", "a", ConstructOptions::new()).await?;
                    token.cancel();
                    ctx.construct("queue", "b", ConstructOptions::new()).await?;
                    Ok(())
                })
            }),
        )
        .await;

    assert_eq!(result.status, RunStatus::PartialFailure);
    assert!(result.was_cancelled());
    assert_eq!(result.resources.len(), 1);
    assert_eq!(harness.events(), vec!["create:a"]);

    // the surviving record is still torn down normally
    let plan = RemovalPolicyEngine::plan(&result);
    assert_eq!(plan.deletions().len(), 1);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let harness = Harness::new();
    let token = CancellationToken::new();
    token.cancel();
    let executor = RunExecutor::new(sst_dev_resolver(), harness.catalog(harness.queue()))
        .with_cancellation(token);

    let result = executor.execute(test_app("remove"), queues(&["a", "b"])).await;

    assert_eq!(result.status, RunStatus::Failure);
    assert!(result.was_cancelled());
    // nothing after the cancellation is attempted
    assert_eq!(result.errors.len(), 1);
    assert!(harness.events().is_empty());
}

#[tokio::test]
async fn test_run_result_serializes() {
    let harness = Harness::new();
    let executor = RunExecutor::new(
        sst_dev_resolver(),
        harness.catalog(harness.queue().failing_create("b")),
    );
    let result = executor.execute(test_app("remove"), queues(&["a", "b"])).await;

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["status"], "partial-failure");
    assert_eq!(json["descriptor"]["removalPolicy"], "remove");
    assert_eq!(json["errors"][0]["resource"]["logical_name"], "b");
    assert!(json.to_string().find("sst-dev-secret").is_none());
}
