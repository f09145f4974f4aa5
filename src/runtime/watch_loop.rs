//! # Watch Loop
//!
//! Builds the `kube_runtime` controller behind one control loop and keeps it
//! running until shutdown.
//!
//! The controller watches the operator resource plus whichever secondary
//! inputs the reconciler declares. Every secondary change the reconciler
//! wants maps to the operator resource. A controller whose streams end is
//! started again after a delay.

use crate::constants::{INFRASTRUCTURE_NAME, OPERATOR_CR_NAME, TARGET_NAME};
use crate::controller::base::{reconcile_operator, BaseController, Reconcile};
use crate::controller::events::{ClusterEvent, ResourceKind};
use crate::crd::{CSISnapshotController, ClusterOperator, Infrastructure};
use crate::runtime::error_policy::handle_reconciliation_error;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Node;
use kube::api::Api;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::{self, Controller};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Watch configuration selecting one object by name
#[must_use]
pub fn by_name(name: &str) -> watcher::Config {
    watcher::Config::default().fields(&format!("metadata.name={name}"))
}

/// Map a changed object onto the operator resource when the reconciler wants the change
pub fn trigger<K, R>(
    reconciler: Arc<R>,
    kind: ResourceKind,
) -> impl Fn(K) -> Option<ObjectRef<CSISnapshotController>> + Send + Sync + 'static
where
    K: Resource,
    R: Reconcile,
{
    move |object: K| {
        let event = ClusterEvent::new(kind, object.name_any());
        reconciler
            .wants(&event)
            .then(|| ObjectRef::new(OPERATOR_CR_NAME))
    }
}

/// Controller over the operator resource with the reconciler's secondary watches
pub fn build_controller<R: Reconcile>(
    base: &BaseController<R>,
    workers: usize,
    cancel: &CancellationToken,
) -> Controller<CSISnapshotController> {
    let client = &base.client;
    let reconciler = base.context.reconciler();
    let config = controller::Config::default()
        .concurrency(u16::try_from(workers).unwrap_or(u16::MAX));
    let mut controller = Controller::new(
        Api::<CSISnapshotController>::all(client.clone()),
        by_name(OPERATOR_CR_NAME),
    )
    .with_config(config);

    for &kind in reconciler.watches() {
        let reconciler = Arc::clone(reconciler);
        controller = match kind {
            ResourceKind::Deployment => controller.watches(
                Api::<Deployment>::namespaced(client.clone(), &base.namespace),
                watcher::Config::default(),
                trigger(reconciler, kind),
            ),
            ResourceKind::Node => controller.watches(
                Api::<Node>::all(client.clone()),
                watcher::Config::default(),
                trigger(reconciler, kind),
            ),
            ResourceKind::Infrastructure => controller.watches(
                Api::<Infrastructure>::all(client.clone()),
                by_name(INFRASTRUCTURE_NAME),
                trigger(reconciler, kind),
            ),
            ResourceKind::ClusterOperator => controller.watches(
                Api::<ClusterOperator>::all(client.clone()),
                by_name(TARGET_NAME),
                trigger(reconciler, kind),
            ),
        };
    }

    if let Some(versions) = &base.versions {
        controller = controller.reconcile_all_on(versions.subscribe());
    }
    controller.graceful_shutdown_on(cancel.clone().cancelled_owned())
}

/// Run the controller of `base` until `cancel` fires
pub async fn run_watch_loop<R: Reconcile>(
    base: &BaseController<R>,
    workers: usize,
    cancel: CancellationToken,
) {
    let name = base.context.reconciler().name();
    loop {
        info!(controller = name, workers = workers, "starting controller watch loop");
        build_controller(base, workers, &cancel)
            .run(
                reconcile_operator::<R>,
                handle_reconciliation_error::<R>,
                Arc::clone(&base.context),
            )
            .for_each(|result| {
                match result {
                    Ok((object, action)) => {
                        debug!(controller = name, key = %object.name, action = ?action, "watch.event.reconciled");
                    }
                    Err(controller::Error::ReconcilerFailed(failure, object)) => {
                        debug!(controller = name, key = %object.name, error = %failure, "watch.event.reconciliation_failed");
                    }
                    Err(e) => {
                        warn!(controller = name, error = %e, "controller watch error");
                    }
                }
                futures::future::ready(())
            })
            .await;

        if cancel.is_cancelled() {
            break;
        }
        warn!(
            controller = name,
            delay_secs = base.restart_delay.as_secs(),
            "controller watch stream ended, restarting"
        );
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(base.restart_delay) => {}
        }
    }
    info!(controller = name, "controller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::offline_client;
    use crate::controller::base::{DriverSettings, SyncError};
    use crate::controller::version::VersionGetter;
    use async_trait::async_trait;
    use kube::core::ObjectMeta;
    use std::time::Duration;

    struct Watching(&'static [ResourceKind]);

    #[async_trait]
    impl Reconcile for Watching {
        fn name(&self) -> &str {
            "Watching"
        }

        fn watches(&self) -> &[ResourceKind] {
            self.0
        }

        async fn reconcile(&self, _name: &str) -> Result<(), SyncError> {
            Ok(())
        }
    }

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            ..ObjectMeta::default()
        }
    }

    fn settings() -> DriverSettings {
        DriverSettings {
            namespace: "test-ns".to_string(),
            resync: Duration::from_secs(3600),
            requeue_min: Duration::from_secs(1),
            requeue_max: Duration::from_secs(10),
            restart_delay: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_wanted_changes_map_to_operator_resource() {
        let reconciler = Arc::new(Watching(&[ResourceKind::Node]));
        let map = trigger::<Node, _>(reconciler, ResourceKind::Node);
        let node = Node {
            metadata: meta("worker-0"),
            ..Node::default()
        };
        assert_eq!(map(node), Some(ObjectRef::new(OPERATOR_CR_NAME)));
    }

    #[test]
    fn test_unwanted_changes_are_dropped() {
        let reconciler = Arc::new(Watching(&[ResourceKind::Node]));
        let map = trigger::<Deployment, _>(reconciler, ResourceKind::Deployment);
        let deployment = Deployment {
            metadata: meta("csi-snapshot-controller"),
            ..Deployment::default()
        };
        assert_eq!(map(deployment), None);
    }

    #[test]
    fn test_by_name_selects_one_object() {
        let config = by_name("cluster");
        assert_eq!(config.field_selector.as_deref(), Some("metadata.name=cluster"));
    }

    #[tokio::test]
    async fn test_controller_builds_with_every_watch() {
        let base = BaseController::new(
            Watching(&[
                ResourceKind::Deployment,
                ResourceKind::Node,
                ResourceKind::Infrastructure,
                ResourceKind::ClusterOperator,
            ]),
            offline_client(),
            &settings(),
        )
        .with_version_trigger(Arc::new(VersionGetter::new()));
        let cancel = CancellationToken::new();
        let _controller = build_controller(&base, 4, &cancel);
        assert_eq!(base.versions.as_ref().map(|v| v.subscriber_count()), Some(1));
    }

    #[tokio::test]
    async fn test_cancelled_loop_returns() {
        let base = BaseController::new(Watching(&[]), offline_client(), &settings());
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(30), run_watch_loop(&base, 1, cancel))
            .await
            .unwrap();
    }
}
