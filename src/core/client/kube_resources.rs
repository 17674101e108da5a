//! Kubernetes resource types used by the recommender, re-exported so
//! callers share one import path.

pub use k8s_openapi::api::core::v1::{Pod, ReplicationController};

pub use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};

pub use k8s_openapi::api::batch::v1::Job;

pub use k8s_openapi::api::autoscaling::v1::CrossVersionObjectReference;

pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

pub use crate::core::crd::mpa_checkpoint_crd::MultidimPodAutoscalerCheckpoint;
pub use crate::core::crd::mpa_crd::MultidimPodAutoscaler;
