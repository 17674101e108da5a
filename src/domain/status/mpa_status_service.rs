use tracing::{debug, error};

use crate::core::client::object_store::MpaObjectStore;
use crate::core::crd::mpa_crd::{MultidimPodAutoscaler, MultidimPodAutoscalerStatus};
use crate::core::state::runtime::mpa::mpa_runtime_state_manager::{MpaRuntimeStateManager, PendingStatus};
use crate::core::state::runtime::mpa::mpa_runtime_state_repository_trait::MpaRuntimeStateRepositoryTrait;
use crate::errors::RecommenderError;

/// Publish `new` only when it differs from `old`. A missing old status counts
/// as the empty status. Returns the updated object when a write happened.
pub async fn update_mpa_status_if_needed<S>(
    store: &S,
    namespace: &str,
    name: &str,
    new: &MultidimPodAutoscalerStatus,
    old: Option<&MultidimPodAutoscalerStatus>,
) -> Result<Option<MultidimPodAutoscaler>, RecommenderError>
where
    S: MpaObjectStore + ?Sized,
{
    let unchanged = match old {
        Some(old) => old == new,
        None => *new == MultidimPodAutoscalerStatus::default(),
    };
    if unchanged {
        return Ok(None);
    }

    store
        .patch_mpa_status(namespace, name, new)
        .await
        .map(Some)
        .map_err(|source| RecommenderError::StatusUpdate {
            mpa: format!("{}/{}", namespace, name),
            source: Box::new(source),
        })
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatusPublishOutcome {
    pub written: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Publish the statuses of a recommendation pass. Failures are logged and
/// retried on the next pass.
pub async fn publish_statuses<S, R>(
    store: &S,
    manager: &MpaRuntimeStateManager<R>,
    pending: Vec<PendingStatus>,
) -> StatusPublishOutcome
where
    S: MpaObjectStore + ?Sized,
    R: MpaRuntimeStateRepositoryTrait,
{
    let mut outcome = StatusPublishOutcome::default();
    for item in pending {
        match update_mpa_status_if_needed(store, &item.id.namespace, &item.id.name, &item.new, item.old.as_ref()).await
        {
            Ok(Some(updated)) => {
                outcome.written += 1;
                manager
                    .record_published_status(&item.id, updated.status.unwrap_or(item.new))
                    .await;
            }
            Ok(None) => outcome.unchanged += 1,
            Err(e) => {
                outcome.failed += 1;
                error!("{}", e);
            }
        }
    }
    debug!(
        written = outcome.written,
        unchanged = outcome.unchanged,
        failed = outcome.failed,
        "MPA statuses published"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::crd::mpa_crd::MpaConditionDto;
    use crate::core::model::mpa::MpaId;
    use crate::core::state::runtime::mpa::mpa_runtime_state_repository::MpaRuntimeStateRepository;
    use crate::domain::checkpoint::checkpoint_service::tests::{Call, MockObjectStore};

    fn status_with_condition(reason: &str) -> MultidimPodAutoscalerStatus {
        MultidimPodAutoscalerStatus {
            conditions: vec![MpaConditionDto {
                condition_type: "RecommendationProvided".into(),
                status: "True".into(),
                last_transition_time: None,
                reason: reason.into(),
                message: String::new(),
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn equal_status_is_not_written() {
        let store = MockObjectStore::default();
        let status = status_with_condition("");

        let result = update_mpa_status_if_needed(&store, "default", "hamster-mpa", &status, Some(&status.clone()))
            .await
            .unwrap();
        assert!(result.is_none());

        let empty = MultidimPodAutoscalerStatus::default();
        let result = update_mpa_status_if_needed(&store, "default", "hamster-mpa", &empty, None)
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn changed_status_is_written_once() {
        let store = MockObjectStore::default();
        let old = status_with_condition("");
        let new = status_with_condition("Changed");

        let result = update_mpa_status_if_needed(&store, "default", "hamster-mpa", &new, Some(&old))
            .await
            .unwrap();
        assert_eq!(result.unwrap().status, Some(new));
        assert_eq!(store.calls(), vec![Call::PatchStatus("hamster-mpa".into())]);
    }

    #[tokio::test]
    async fn publish_counts_outcomes() {
        let store = MockObjectStore {
            failing: vec!["broken".into()],
            ..Default::default()
        };
        let manager = MpaRuntimeStateManager::new(MpaRuntimeStateRepository::new().shared());
        let same = status_with_condition("");

        let pending = vec![
            PendingStatus {
                id: MpaId::new("default", "fresh"),
                new: status_with_condition("New"),
                old: None,
            },
            PendingStatus {
                id: MpaId::new("default", "steady"),
                new: same.clone(),
                old: Some(same),
            },
            PendingStatus {
                id: MpaId::new("default", "broken"),
                new: status_with_condition("New"),
                old: None,
            },
        ];

        let outcome = publish_statuses(&store, &manager, pending).await;
        assert_eq!(
            outcome,
            StatusPublishOutcome {
                written: 1,
                unchanged: 1,
                failed: 1
            }
        );
    }
}
