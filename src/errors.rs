use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecommenderError {
    /// Patch payload could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The addressed object does not exist in the cluster.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("K8s API error: {0}")]
    K8sApi(String),

    #[error("Cannot save checkpoint for mpa {mpa} container {container}. Reason: {source}")]
    CheckpointSave {
        mpa: String,
        container: String,
        #[source]
        source: Box<RecommenderError>,
    },

    #[error("Cannot update status of mpa {mpa}. Reason: {source}")]
    StatusUpdate {
        mpa: String,
        #[source]
        source: Box<RecommenderError>,
    },

    #[error("Invalid checkpoint: {0}")]
    InvalidCheckpoint(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
}

impl RecommenderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RecommenderError::NotFound(_))
    }
}

/// Map kube errors, keeping 404 responses distinguishable from other failures.
impl From<kube::Error> for RecommenderError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ref response) if response.code == 404 => {
                RecommenderError::NotFound(response.message.clone())
            }
            other => RecommenderError::K8sApi(other.to_string()),
        }
    }
}
