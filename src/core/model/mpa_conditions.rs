use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::core::crd::mpa_crd::MpaConditionDto;

/// Closed set of MPA health signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MpaConditionType {
    RecommendationProvided,
    LowConfidence,
    NoPodsMatched,
    FetchingHistory,
    ConfigDeprecated,
    ConfigUnsupported,
}

impl MpaConditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MpaConditionType::RecommendationProvided => "RecommendationProvided",
            MpaConditionType::LowConfidence => "LowConfidence",
            MpaConditionType::NoPodsMatched => "NoPodsMatched",
            MpaConditionType::FetchingHistory => "FetchingHistory",
            MpaConditionType::ConfigDeprecated => "ConfigDeprecated",
            MpaConditionType::ConfigUnsupported => "ConfigUnsupported",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RecommendationProvided" => Some(MpaConditionType::RecommendationProvided),
            "LowConfidence" => Some(MpaConditionType::LowConfidence),
            "NoPodsMatched" => Some(MpaConditionType::NoPodsMatched),
            "FetchingHistory" => Some(MpaConditionType::FetchingHistory),
            "ConfigDeprecated" => Some(MpaConditionType::ConfigDeprecated),
            "ConfigUnsupported" => Some(MpaConditionType::ConfigUnsupported),
            _ => None,
        }
    }
}

impl fmt::Display for MpaConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "True" => ConditionStatus::True,
            "False" => ConditionStatus::False,
            _ => ConditionStatus::Unknown,
        }
    }
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpaCondition {
    pub condition_type: MpaConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl MpaCondition {
    pub fn to_dto(&self) -> MpaConditionDto {
        MpaConditionDto {
            condition_type: self.condition_type.as_str().to_string(),
            status: self.status.as_str().to_string(),
            last_transition_time: Some(self.last_transition_time),
            reason: self.reason.clone(),
            message: self.message.clone(),
        }
    }

    /// Conditions of unknown type are dropped.
    pub fn from_dto(dto: &MpaConditionDto, fallback_time: DateTime<Utc>) -> Option<Self> {
        Some(Self {
            condition_type: MpaConditionType::parse(&dto.condition_type)?,
            status: ConditionStatus::parse(&dto.status),
            reason: dto.reason.clone(),
            message: dto.message.clone(),
            last_transition_time: dto.last_transition_time.unwrap_or(fallback_time),
        })
    }
}

/// Conditions of one MPA, at most one per type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MpaConditionsMap {
    conditions: BTreeMap<MpaConditionType, MpaCondition>,
}

impl MpaConditionsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        condition_type: MpaConditionType,
        status: bool,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> &mut Self {
        self.set_at(condition_type, status, reason, message, Utc::now())
    }

    /// Upsert a condition. The previous transition time is kept when the status
    /// does not change.
    pub fn set_at(
        &mut self,
        condition_type: MpaConditionType,
        status: bool,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> &mut Self {
        let status = ConditionStatus::from(status);
        let last_transition_time = match self.conditions.get(&condition_type) {
            Some(old) if old.status == status => old.last_transition_time,
            _ => now,
        };

        self.conditions.insert(
            condition_type,
            MpaCondition {
                condition_type,
                status,
                reason: reason.into(),
                message: message.into(),
                last_transition_time,
            },
        );
        self
    }

    pub fn get(&self, condition_type: MpaConditionType) -> Option<&MpaCondition> {
        self.conditions.get(&condition_type)
    }

    pub fn is_true(&self, condition_type: MpaConditionType) -> bool {
        self.get(condition_type)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    pub fn remove(&mut self, condition_type: MpaConditionType) -> Option<MpaCondition> {
        self.conditions.remove(&condition_type)
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Seed from a published status so transition times survive restarts.
    pub fn load_from_status(&mut self, conditions: &[MpaConditionDto], now: DateTime<Utc>) {
        for dto in conditions {
            if let Some(condition) = MpaCondition::from_dto(dto, now) {
                self.conditions.insert(condition.condition_type, condition);
            }
        }
    }

    /// Status form, ordered by type so equal maps produce equal lists.
    pub fn as_status_conditions(&self) -> Vec<MpaConditionDto> {
        self.conditions.values().map(MpaCondition::to_dto).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn unchanged_status_preserves_transition_time() {
        let mut conditions = MpaConditionsMap::new();
        conditions.set_at(MpaConditionType::LowConfidence, true, "a", "first", t0());
        conditions.set_at(
            MpaConditionType::LowConfidence,
            true,
            "b",
            "second",
            t0() + Duration::minutes(5),
        );

        let condition = conditions.get(MpaConditionType::LowConfidence).unwrap();
        assert_eq!(condition.last_transition_time, t0());
        assert_eq!(condition.reason, "b");
        assert_eq!(condition.message, "second");
    }

    #[test]
    fn changed_status_stamps_new_transition_time() {
        let mut conditions = MpaConditionsMap::new();
        let later = t0() + Duration::minutes(5);
        conditions
            .set_at(MpaConditionType::NoPodsMatched, true, "", "", t0())
            .set_at(MpaConditionType::NoPodsMatched, false, "", "", later);

        let condition = conditions.get(MpaConditionType::NoPodsMatched).unwrap();
        assert_eq!(condition.status, ConditionStatus::False);
        assert_eq!(condition.last_transition_time, later);
        assert_eq!(conditions.len(), 1);
    }

    #[test]
    fn untouched_types_are_retained() {
        let mut conditions = MpaConditionsMap::new();
        conditions.set_at(MpaConditionType::ConfigDeprecated, true, "", "", t0());
        conditions.set_at(MpaConditionType::RecommendationProvided, true, "", "", t0());
        assert!(conditions.is_true(MpaConditionType::ConfigDeprecated));
        assert_eq!(conditions.len(), 2);
    }

    #[test]
    fn status_round_trip_keeps_transition_time() {
        let mut conditions = MpaConditionsMap::new();
        conditions.set_at(MpaConditionType::FetchingHistory, false, "", "done", t0());
        let dtos = conditions.as_status_conditions();

        let mut restored = MpaConditionsMap::new();
        restored.load_from_status(&dtos, t0() + Duration::hours(1));
        assert_eq!(restored, conditions);
    }

    #[test]
    fn unknown_condition_types_are_ignored() {
        let dto = MpaConditionDto {
            condition_type: "Bogus".into(),
            status: "True".into(),
            last_transition_time: None,
            reason: String::new(),
            message: String::new(),
        };
        let mut conditions = MpaConditionsMap::new();
        conditions.load_from_status(&[dto], t0());
        assert!(conditions.is_empty());
    }
}
