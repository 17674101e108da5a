use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use crate::errors::RecommenderError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorRequirement {
    In(String, Vec<String>),
    NotIn(String, Vec<String>),
    Exists(String),
    DoesNotExist(String),
}

impl SelectorRequirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            SelectorRequirement::In(key, values) => labels.get(key).is_some_and(|v| values.contains(v)),
            SelectorRequirement::NotIn(key, values) => labels.get(key).is_none_or(|v| !values.contains(v)),
            SelectorRequirement::Exists(key) => labels.contains_key(key),
            SelectorRequirement::DoesNotExist(key) => !labels.contains_key(key),
        }
    }
}

/// Parsed pod label selector. An empty selector matches every label set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodSelector {
    requirements: Vec<SelectorRequirement>,
}

impl PodSelector {
    pub fn from_match_labels(labels: BTreeMap<String, String>) -> Self {
        Self {
            requirements: labels
                .into_iter()
                .map(|(k, v)| SelectorRequirement::In(k, vec![v]))
                .collect(),
        }
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

impl TryFrom<&LabelSelector> for PodSelector {
    type Error = RecommenderError;

    fn try_from(selector: &LabelSelector) -> Result<Self, Self::Error> {
        let mut requirements = Vec::new();

        if let Some(match_labels) = &selector.match_labels {
            for (k, v) in match_labels {
                requirements.push(SelectorRequirement::In(k.clone(), vec![v.clone()]));
            }
        }

        for expr in selector.match_expressions.iter().flatten() {
            let values = expr.values.clone().unwrap_or_default();
            let requirement = match expr.operator.as_str() {
                "In" | "NotIn" if values.is_empty() => {
                    return Err(RecommenderError::InvalidSelector(format!(
                        "operator {} on key {} requires values",
                        expr.operator, expr.key
                    )));
                }
                "Exists" | "DoesNotExist" if !values.is_empty() => {
                    return Err(RecommenderError::InvalidSelector(format!(
                        "operator {} on key {} takes no values",
                        expr.operator, expr.key
                    )));
                }
                "In" => SelectorRequirement::In(expr.key.clone(), values),
                "NotIn" => SelectorRequirement::NotIn(expr.key.clone(), values),
                "Exists" => SelectorRequirement::Exists(expr.key.clone()),
                "DoesNotExist" => SelectorRequirement::DoesNotExist(expr.key.clone()),
                other => {
                    return Err(RecommenderError::InvalidSelector(format!(
                        "unknown operator {} on key {}",
                        other, expr.key
                    )));
                }
            };
            requirements.push(requirement);
        }

        Ok(Self { requirements })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn match_labels_require_every_pair() {
        let selector = PodSelector::from_match_labels(labels(&[("app", "hamster"), ("tier", "web")]));
        assert!(selector.matches(&labels(&[("app", "hamster"), ("tier", "web"), ("x", "y")])));
        assert!(!selector.matches(&labels(&[("app", "hamster")])));
    }

    #[test]
    fn empty_selector_matches_everything() {
        let selector = PodSelector::default();
        assert!(selector.is_empty());
        assert!(selector.matches(&labels(&[])));
        assert!(selector.matches(&labels(&[("app", "any")])));
    }

    #[test]
    fn match_expressions_are_converted() {
        let raw = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![
                LabelSelectorRequirement {
                    key: "env".into(),
                    operator: "NotIn".into(),
                    values: Some(vec!["dev".into()]),
                },
                LabelSelectorRequirement {
                    key: "app".into(),
                    operator: "Exists".into(),
                    values: None,
                },
            ]),
        };
        let selector = PodSelector::try_from(&raw).unwrap();
        assert!(selector.matches(&labels(&[("app", "a"), ("env", "prod")])));
        assert!(selector.matches(&labels(&[("app", "a")])));
        assert!(!selector.matches(&labels(&[("app", "a"), ("env", "dev")])));
        assert!(!selector.matches(&labels(&[("env", "prod")])));
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let raw = LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "app".into(),
                operator: "Gt".into(),
                values: Some(vec!["1".into()]),
            }]),
        };
        assert!(PodSelector::try_from(&raw).is_err());
    }

    #[test]
    fn existence_operators_reject_values() {
        for operator in ["Exists", "DoesNotExist"] {
            let raw = LabelSelector {
                match_labels: None,
                match_expressions: Some(vec![LabelSelectorRequirement {
                    key: "app".into(),
                    operator: operator.into(),
                    values: Some(vec!["hamster".into()]),
                }]),
            };
            let err = PodSelector::try_from(&raw).unwrap_err();
            assert!(matches!(err, RecommenderError::InvalidSelector(_)));
        }
    }
}
