//! Append-only condition history

use chrono::{DateTime, SecondsFormat, Utc};
use support_api::v1alpha1::{Condition, ConditionStatus, ConditionType};

/// Latest entry of a condition type
pub fn latest(conditions: &[Condition], condition_type: ConditionType) -> Option<&Condition> {
    conditions
        .iter()
        .rev()
        .find(|c| c.condition_type == condition_type)
}

/// Whether the latest entry of a condition type is True
pub fn is_true(conditions: &[Condition], condition_type: ConditionType) -> bool {
    latest(conditions, condition_type).is_some_and(|c| c.status == ConditionStatus::True)
}

/// Parsed transition time of a condition
pub fn transition_time(condition: &Condition) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&condition.last_transition_time)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Records conditions into a status history.
///
/// Recording the same type, status and reason as the latest entry of that type
/// only refreshes its message. A new status appends a transition stamped with
/// `now`; a new reason under the same status appends an entry that keeps the
/// previous transition time.
pub struct ConditionTracker<'a> {
    conditions: &'a mut Vec<Condition>,
    now: String,
}

impl<'a> ConditionTracker<'a> {
    pub fn new(conditions: &'a mut Vec<Condition>, now: DateTime<Utc>) -> Self {
        Self {
            conditions,
            now: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    pub fn latest(&self, condition_type: ConditionType) -> Option<&Condition> {
        latest(self.conditions.as_slice(), condition_type)
    }

    pub fn is_true(&self, condition_type: ConditionType) -> bool {
        is_true(self.conditions.as_slice(), condition_type)
    }

    /// Record a condition. Returns whether the history changed.
    pub fn record(
        &mut self,
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
    ) -> bool {
        let message = message.into();
        let previous = self
            .conditions
            .iter_mut()
            .rev()
            .find(|c| c.condition_type == condition_type);

        let last_transition_time = match previous {
            Some(existing) if existing.status == status && existing.reason == reason => {
                if existing.message == message {
                    return false;
                }
                existing.message = message;
                return true;
            }
            Some(existing) if existing.status == status => existing.last_transition_time.clone(),
            _ => self.now.clone(),
        };

        self.conditions.push(Condition {
            condition_type,
            status,
            reason: reason.to_string(),
            message,
            last_transition_time,
        });
        true
    }

    pub fn set_true(
        &mut self,
        condition_type: ConditionType,
        reason: &str,
        message: impl Into<String>,
    ) -> bool {
        self.record(condition_type, ConditionStatus::True, reason, message)
    }

    /// Flip a condition to False, but only when it is currently True
    pub fn resolve(
        &mut self,
        condition_type: ConditionType,
        reason: &str,
        message: impl Into<String>,
    ) -> bool {
        if !self.is_true(condition_type) {
            return false;
        }
        self.record(condition_type, ConditionStatus::False, reason, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn track(conditions: &mut Vec<Condition>, secs: i64) -> ConditionTracker<'_> {
        ConditionTracker::new(conditions, at(secs))
    }

    #[test]
    fn test_first_record_appends() {
        let mut conditions = Vec::new();
        let mut tracker = track(&mut conditions, 0);
        assert!(tracker.set_true(ConditionType::WaitingOnInfra, "InfraNotReady", "broker"));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, ConditionStatus::True);
        assert_eq!(conditions[0].last_transition_time, "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_unchanged_condition_is_noop() {
        let mut conditions = Vec::new();
        track(&mut conditions, 0).set_true(ConditionType::Deployed, "Deployed", "ok");
        let before = conditions.clone();
        let changed =
            track(&mut conditions, 60).set_true(ConditionType::Deployed, "Deployed", "ok");
        assert!(!changed);
        assert_eq!(conditions, before);
    }

    #[test]
    fn test_message_refresh_keeps_timestamp() {
        let mut conditions = Vec::new();
        track(&mut conditions, 0).set_true(ConditionType::WaitingOnInfra, "InfraNotReady", "a");
        let changed = track(&mut conditions, 60).set_true(
            ConditionType::WaitingOnInfra,
            "InfraNotReady",
            "a; b",
        );
        assert!(changed);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].message, "a; b");
        assert_eq!(conditions[0].last_transition_time, "2023-11-14T22:13:20Z");
    }

    #[test]
    fn test_status_change_appends_transition() {
        let mut conditions = Vec::new();
        track(&mut conditions, 0).set_true(ConditionType::Failed, "ApplyFailed", "denied");
        track(&mut conditions, 30).resolve(ConditionType::Failed, "Recovered", "");
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[1].status, ConditionStatus::False);
        assert_eq!(conditions[1].last_transition_time, "2023-11-14T22:13:50Z");
    }

    #[test]
    fn test_reason_change_keeps_transition_time() {
        let mut conditions = Vec::new();
        track(&mut conditions, 0).set_true(ConditionType::Failed, "HostUnresolvable", "");
        track(&mut conditions, 30).set_true(ConditionType::Failed, "ApplyFailed", "");
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[1].last_transition_time, conditions[0].last_transition_time);
    }

    #[test]
    fn test_resolve_only_flips_true_conditions() {
        let mut conditions = Vec::new();
        let mut tracker = track(&mut conditions, 0);
        assert!(!tracker.resolve(ConditionType::HostInvalid, "HostValid", ""));
        assert!(tracker.latest(ConditionType::HostInvalid).is_none());
    }

    #[test]
    fn test_other_types_do_not_collapse() {
        let mut conditions = Vec::new();
        let mut tracker = track(&mut conditions, 0);
        tracker.set_true(ConditionType::WaitingOnInfra, "InfraNotReady", "");
        tracker.set_true(ConditionType::Deployed, "Deployed", "");
        tracker.set_true(ConditionType::WaitingOnInfra, "InfraNotReady", "");
        assert_eq!(conditions.len(), 2);
    }

    #[test]
    fn test_transition_time_parses() {
        let mut conditions = Vec::new();
        track(&mut conditions, 0).set_true(ConditionType::Deployed, "Deployed", "");
        assert_eq!(transition_time(&conditions[0]), Some(at(0)));
    }

    fn any_type() -> impl Strategy<Value = ConditionType> {
        prop_oneof![
            Just(ConditionType::Provisioning),
            Just(ConditionType::WaitingOnInfra),
            Just(ConditionType::Deployed),
            Just(ConditionType::Failed),
        ]
    }

    proptest! {
        #[test]
        fn prop_no_adjacent_duplicates_per_type(
            ops in prop::collection::vec((any_type(), any::<bool>(), 0..3u8), 0..40)
        ) {
            let mut conditions = Vec::new();
            for (i, (condition_type, status, reason)) in ops.into_iter().enumerate() {
                let mut tracker = ConditionTracker::new(&mut conditions, at(i as i64));
                tracker.record(condition_type, status.into(), &format!("R{}", reason), "");
            }
            for condition_type in [
                ConditionType::Provisioning,
                ConditionType::WaitingOnInfra,
                ConditionType::Deployed,
                ConditionType::Failed,
            ] {
                let of_type: Vec<_> = conditions
                    .iter()
                    .filter(|c| c.condition_type == condition_type)
                    .collect();
                for pair in of_type.windows(2) {
                    prop_assert!(
                        pair[0].status != pair[1].status || pair[0].reason != pair[1].reason
                    );
                }
            }
        }
    }
}
