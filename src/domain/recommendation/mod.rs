pub mod estimator;
pub mod pod_resource_recommender;
pub mod resource_policy;
