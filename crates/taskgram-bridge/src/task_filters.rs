//! The three-gate filter pipeline: importance, creator leadership,
//! urgency. Gates run in fixed order against the raw located task object
//! and short-circuit on the first rejection; the rejecting gate is
//! reported so the webhook response and debug logs can name it.

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::identity_store::IdentityStore;
use crate::task_record::{probe_string_field, TASK_DEADLINE_ALIASES, TASK_PRIORITY_ALIASES};

const IMPORTANCE_FLAG_ALIASES: &[&str] = &["IMPORTANT", "important", "IS_IMPORTANT", "isImportant"];
const STATUS_TEXT_ALIASES: &[&str] = &["STATUS", "status"];
const STATUS_CODE_ALIASES: &[&str] = &["STATUS_ID", "status_id", "statusId", "STATUS", "status"];
const REAL_STATUS_ALIASES: &[&str] = &["REAL_STATUS", "real_status", "realStatus"];

/// Tokens Bitrix24 has been observed to use for an affirmative
/// importance flag across webhook variants.
const IMPORTANCE_TRUTHY_TOKENS: &[&str] = &["1", "true", "yes", "важно", "important"];

/// Importance status codes reserved by the portal configuration.
const RESERVED_IMPORTANT_STATUS_CODES: &[&str] = &["2", "3"];

/// Bitrix24 `REAL_STATUS` code for a task in progress.
const IN_PROGRESS_STATUS_CODE: &str = "3";

const DEADLINE_NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%SZ",
    "%d.%m.%Y %H:%M:%S",
];
const DEADLINE_OFFSET_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";
const DEADLINE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y"];

#[derive(Debug, Clone, Copy)]
pub struct TaskFilterConfig {
    pub urgent_priority_threshold: i64,
    pub urgent_deadline_hours: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskGate {
    Importance,
    Leadership,
    Urgency,
}

impl TaskGate {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Importance => "importance",
            Self::Leadership => "leadership",
            Self::Urgency => "urgency",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFilterVerdict {
    Passed,
    Rejected(TaskGate),
}

impl TaskFilterVerdict {
    pub fn passed(self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Status message returned to the webhook caller for a rejection.
    pub fn skip_message(self) -> &'static str {
        match self {
            Self::Passed => "Filters passed",
            Self::Rejected(TaskGate::Importance) => "Task not important",
            Self::Rejected(TaskGate::Leadership) => "Creator not a leader",
            Self::Rejected(TaskGate::Urgency) => "Task not urgent",
        }
    }
}

/// Runs all three gates in order, short-circuiting on the first `false`.
pub fn evaluate_task_filters(
    task: &Value,
    creator_id: &str,
    store: &IdentityStore,
    config: &TaskFilterConfig,
) -> TaskFilterVerdict {
    if !is_task_important(task, config) {
        tracing::debug!(gate = "importance", "task rejected by filter pipeline");
        return TaskFilterVerdict::Rejected(TaskGate::Importance);
    }
    if !store.is_leader(creator_id) {
        tracing::debug!(
            gate = "leadership",
            creator_id,
            "task rejected by filter pipeline"
        );
        return TaskFilterVerdict::Rejected(TaskGate::Leadership);
    }
    if !is_task_urgent(task, config) {
        tracing::debug!(gate = "urgency", "task rejected by filter pipeline");
        return TaskFilterVerdict::Rejected(TaskGate::Urgency);
    }
    TaskFilterVerdict::Passed
}

/// OR of four independent heuristics. The upstream representation of
/// importance is inconsistent across webhook variants, so each check
/// covers one observed encoding.
pub fn is_task_important(task: &Value, config: &TaskFilterConfig) -> bool {
    status_text_has_importance_marker(task)
        || importance_flag_is_truthy(task)
        || status_code_is_reserved(task)
        || in_progress_with_high_priority(task, config)
}

/// Status text mentions importance, English or Russian, any case.
fn status_text_has_importance_marker(task: &Value) -> bool {
    probe_string_field(task, STATUS_TEXT_ALIASES)
        .map(|status| {
            let lowered = status.to_lowercase();
            lowered.contains("important") || lowered.contains("важно")
        })
        .unwrap_or(false)
}

/// An explicit importance flag parses as one of the accepted tokens.
fn importance_flag_is_truthy(task: &Value) -> bool {
    probe_string_field(task, IMPORTANCE_FLAG_ALIASES)
        .map(|flag| IMPORTANCE_TRUTHY_TOKENS.contains(&flag.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// The status-code field equals a reserved important code.
fn status_code_is_reserved(task: &Value) -> bool {
    probe_string_field(task, STATUS_CODE_ALIASES)
        .map(|code| RESERVED_IMPORTANT_STATUS_CODES.contains(&code.as_str()))
        .unwrap_or(false)
}

/// A task already in progress with priority at or above the urgency
/// threshold counts as important even without an explicit marker.
fn in_progress_with_high_priority(task: &Value, config: &TaskFilterConfig) -> bool {
    let in_progress = probe_string_field(task, REAL_STATUS_ALIASES)
        .map(|code| code == IN_PROGRESS_STATUS_CODE)
        .unwrap_or(false);
    in_progress && task_priority(task) >= config.urgent_priority_threshold
}

pub fn is_task_urgent(task: &Value, config: &TaskFilterConfig) -> bool {
    is_task_urgent_at(task, config, Local::now().naive_local())
}

/// Urgency with an injected clock: priority at or above the threshold,
/// or a parseable deadline inside `[now, now + window]` inclusive.
pub fn is_task_urgent_at(task: &Value, config: &TaskFilterConfig, now: NaiveDateTime) -> bool {
    if task_priority(task) >= config.urgent_priority_threshold {
        return true;
    }
    let Some(deadline) = probe_string_field(task, TASK_DEADLINE_ALIASES) else {
        return false;
    };
    let Some(deadline) = parse_task_deadline(&deadline) else {
        return false;
    };
    // Compared as full durations; truncating to whole seconds would let
    // a deadline just past the window sneak in when `now` carries a
    // sub-second component.
    let until_deadline = deadline - now;
    until_deadline >= Duration::zero()
        && until_deadline <= Duration::hours(config.urgent_deadline_hours)
}

/// Tries the fixed format list in order, stopping at the first success.
/// Offset-carrying deadlines are converted to local time before the
/// window comparison. Unparseable input is not an error, just not urgent.
pub fn parse_task_deadline(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in DEADLINE_NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed);
        }
    }
    if let Ok(parsed) = chrono::DateTime::parse_from_str(trimmed, DEADLINE_OFFSET_FORMAT) {
        return Some(parsed.with_timezone(&Local).naive_local());
    }
    for format in DEADLINE_DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, format) {
            return parsed.and_hms_opt(0, 0, 0);
        }
    }
    None
}

fn task_priority(task: &Value) -> i64 {
    probe_string_field(task, TASK_PRIORITY_ALIASES)
        .and_then(|priority| priority.parse::<i64>().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn config() -> TaskFilterConfig {
        TaskFilterConfig {
            urgent_priority_threshold: 2,
            urgent_deadline_hours: 24,
        }
    }

    #[test]
    fn unit_importance_accepts_status_text_markers() {
        assert!(is_task_important(&json!({"STATUS": "Very Important"}), &config()));
        assert!(is_task_important(&json!({"status": "важно"}), &config()));
    }

    #[test]
    fn unit_importance_accepts_truthy_flag_tokens() {
        for token in ["1", "true", "yes", "важно", "important"] {
            assert!(
                is_task_important(&json!({"IMPORTANT": token}), &config()),
                "token {token} must be accepted"
            );
        }
        assert!(!is_task_important(&json!({"IMPORTANT": "no"}), &config()));
    }

    #[test]
    fn unit_importance_accepts_reserved_status_codes() {
        assert!(is_task_important(&json!({"STATUS_ID": "2"}), &config()));
        assert!(is_task_important(&json!({"STATUS": "3"}), &config()));
        assert!(is_task_important(&json!({"STATUS": 2}), &config()));
        assert!(!is_task_important(&json!({"STATUS_ID": "5"}), &config()));
    }

    #[test]
    fn unit_importance_accepts_in_progress_with_high_priority() {
        assert!(is_task_important(
            &json!({"REAL_STATUS": "3", "PRIORITY": "2"}),
            &config()
        ));
        assert!(!is_task_important(
            &json!({"REAL_STATUS": "3", "PRIORITY": "1"}),
            &config()
        ));
    }

    #[test]
    fn unit_importance_rejects_unmarked_tasks() {
        assert!(!is_task_important(&json!({"STATUS": "pending"}), &config()));
        assert!(!is_task_important(&json!({}), &config()));
    }

    #[test]
    fn unit_urgency_priority_threshold_ignores_deadline() {
        let now = Local::now().naive_local();
        let task = json!({"PRIORITY": "3", "DEADLINE": "garbage"});
        assert!(is_task_urgent_at(&task, &config(), now));
        assert!(is_task_urgent_at(&json!({"PRIORITY": "2"}), &config(), now));
        assert!(!is_task_urgent_at(&json!({"PRIORITY": "1"}), &config(), now));
    }

    #[test]
    fn unit_urgency_deadline_window_is_inclusive() {
        let now = Local::now().naive_local();
        let at_window_edge = (now + Duration::hours(24))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let past_window = (now + Duration::hours(24) + Duration::seconds(1))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let in_the_past = (now - Duration::hours(1))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();

        assert!(is_task_urgent_at(&json!({"DEADLINE": at_window_edge}), &config(), now));
        assert!(!is_task_urgent_at(&json!({"DEADLINE": past_window}), &config(), now));
        assert!(!is_task_urgent_at(&json!({"DEADLINE": in_the_past}), &config(), now));
    }

    #[test]
    fn unit_urgency_window_holds_for_subsecond_clock_readings() {
        let now = NaiveDate::from_ymd_opt(2026, 8, 24)
            .and_then(|date| date.and_hms_milli_opt(10, 0, 0, 250))
            .expect("valid clock reading");
        let just_past = json!({"DEADLINE": "2026-08-25 10:00:01"});
        assert!(!is_task_urgent_at(&just_past, &config(), now));
        let at_edge = json!({"DEADLINE": "2026-08-25 10:00:00"});
        assert!(is_task_urgent_at(&at_edge, &config(), now));
    }

    #[test]
    fn unit_urgency_unparseable_deadline_with_low_priority_is_not_urgent() {
        let now = Local::now().naive_local();
        let task = json!({"PRIORITY": "1", "DEADLINE": "next thursday"});
        assert!(!is_task_urgent_at(&task, &config(), now));
    }

    #[test]
    fn unit_parse_task_deadline_accepts_every_documented_format() {
        for raw in [
            "2026-09-01 12:00:00",
            "2026-09-01T12:00:00",
            "2026-09-01T12:00:00Z",
            "2026-09-01T12:00:00+03:00",
            "2026-09-01",
            "01.09.2026 12:00:00",
            "01.09.2026",
        ] {
            assert!(parse_task_deadline(raw).is_some(), "format of {raw}");
        }
        assert!(parse_task_deadline("").is_none());
        assert!(parse_task_deadline("tomorrow").is_none());
    }

    #[test]
    fn unit_filter_pipeline_short_circuits_in_order() {
        let temp = tempdir().expect("tempdir");
        let store = IdentityStore::new(temp.path().join("mappings.json"));
        store.add_leader("100").expect("add leader");
        let config = config();

        let unimportant = json!({"STATUS": "pending", "CREATED_BY": "100"});
        assert_eq!(
            evaluate_task_filters(&unimportant, "100", &store, &config),
            TaskFilterVerdict::Rejected(TaskGate::Importance)
        );

        let important = json!({"STATUS": "2", "PRIORITY": "3"});
        assert_eq!(
            evaluate_task_filters(&important, "999", &store, &config),
            TaskFilterVerdict::Rejected(TaskGate::Leadership)
        );

        let not_urgent = json!({"STATUS": "2", "PRIORITY": "1"});
        assert_eq!(
            evaluate_task_filters(&not_urgent, "100", &store, &config),
            TaskFilterVerdict::Rejected(TaskGate::Urgency)
        );

        let qualifying = json!({"STATUS": "2", "PRIORITY": "3"});
        assert!(evaluate_task_filters(&qualifying, "100", &store, &config).passed());
    }
}
