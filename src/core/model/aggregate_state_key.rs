use std::collections::BTreeMap;
use std::fmt;

use crate::core::model::label_selector::PodSelector;

/// Identity of one aggregation: a container name within pods sharing a label set
/// in a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AggregateStateKey {
    namespace: String,
    container_name: String,
    labels: BTreeMap<String, String>,
}

impl AggregateStateKey {
    pub fn new(
        namespace: impl Into<String>,
        container_name: impl Into<String>,
        labels: BTreeMap<String, String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            container_name: container_name.into(),
            labels,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// True iff the namespaces are equal and a selector is present and matches
    /// the key labels. A missing selector matches nothing.
    pub fn matches(&self, namespace: &str, selector: Option<&PodSelector>) -> bool {
        if self.namespace != namespace {
            return false;
        }
        selector.is_some_and(|s| s.matches(&self.labels))
    }
}

impl fmt::Display for AggregateStateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels = self
            .labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{}/{}{{{}}}", self.namespace, self.container_name, labels)
    }
}
