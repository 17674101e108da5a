pub mod kube_client;
pub mod kube_resources;
pub mod object_store;
pub mod pod_metrics;
pub mod scale_targets;
pub mod store;
