//! Canonical task extraction from heterogeneous webhook payloads.
//!
//! Bitrix24 sends the same task in at least four shapes: flat UPPER_CASE
//! fields, flat lower/camelCase fields (REST fetches), nested under a
//! `data`/`FIELDS_AFTER` envelope (event pushes), and bracket-notation
//! form fields. Every semantic field is probed through an ordered alias
//! list so downstream code only ever sees [`TaskRecord`].

use serde::Serialize;
use serde_json::Value;

pub const TASK_ID_ALIASES: &[&str] = &["ID", "id", "Id", "TASK_ID", "taskId"];
pub const TASK_TITLE_ALIASES: &[&str] = &["TITLE", "title", "Title"];
pub const TASK_PRIORITY_ALIASES: &[&str] = &["PRIORITY", "priority"];
pub const TASK_DEADLINE_ALIASES: &[&str] = &["DEADLINE", "deadline"];
pub const TASK_STATUS_ALIASES: &[&str] = &["STATUS", "status", "REAL_STATUS", "realStatus"];
pub const RESPONSIBLE_ID_ALIASES: &[&str] = &["RESPONSIBLE_ID", "responsible_id", "responsibleId"];
pub const RESPONSIBLE_NAME_ALIASES: &[&str] =
    &["RESPONSIBLE_NAME", "responsible_name", "responsibleName"];
pub const CREATOR_ID_ALIASES: &[&str] = &["CREATED_BY", "created_by", "createdBy", "CREATED_BY_ID"];
pub const CREATOR_NAME_ALIASES: &[&str] =
    &["CREATED_BY_NAME", "created_by_name", "createdByName"];

const RESPONSIBLE_OBJECT_ALIASES: &[&str] = &["RESPONSIBLE", "responsible"];
const CREATOR_OBJECT_ALIASES: &[&str] = &["CREATOR", "creator"];
const NESTED_ID_ALIASES: &[&str] = &["ID", "id"];
const NESTED_NAME_ALIASES: &[&str] = &["NAME", "name", "formattedName"];

/// Placeholder title for tasks whose payload carries none.
pub const FALLBACK_TASK_TITLE: &str = "Без названия";

#[derive(Debug, Clone, Serialize, PartialEq)]
/// Shape-independent representation of a task extracted from a webhook
/// payload or a REST fetch. `id` and `responsible_id` are required by the
/// pipeline; everything else degrades to placeholders or empty strings.
pub struct TaskRecord {
    pub id: String,
    pub title: String,
    pub priority: String,
    pub deadline: String,
    pub responsible_id: String,
    pub responsible_name: String,
    pub creator_id: String,
    pub creator_name: String,
    pub status: String,
    pub link: String,
    /// Original task object, kept for diagnostics only.
    pub raw: Value,
}

/// Finds the task-bearing object inside a decoded payload: the `data`
/// envelope is preferred, then a `FIELDS_AFTER` sub-object, then the
/// payload root. The literal string `"undefined"` counts as absent. A
/// bare root only qualifies when it actually carries a task identifier.
pub fn locate_task_object(payload: &Value) -> Option<&Value> {
    if !payload.is_object() {
        return None;
    }
    let mut task = payload;
    let mut enveloped = false;
    if let Some(data) = task.get("data").filter(|value| is_present_object(value)) {
        task = data;
        enveloped = true;
    }
    if let Some(fields) = first_present_object(task, &["FIELDS_AFTER", "fields_after", "fieldsAfter"])
    {
        task = fields;
        enveloped = true;
    }
    if !enveloped && probe_string_field(task, TASK_ID_ALIASES).is_none() {
        return None;
    }
    Some(task)
}

/// Probes `object` for the first alias holding a non-empty scalar and
/// returns it coerced to a trimmed string.
pub fn probe_string_field(object: &Value, aliases: &[&str]) -> Option<String> {
    aliases
        .iter()
        .filter_map(|alias| object.get(*alias))
        .find_map(value_as_trimmed_string)
}

/// Builds a [`TaskRecord`] from an already-located task object. Always
/// succeeds; callers reject records with an empty `id` upstream.
pub fn build_task_record(task: &Value, portal_domain: &str) -> TaskRecord {
    let id = probe_string_field(task, TASK_ID_ALIASES).unwrap_or_default();
    let title =
        probe_string_field(task, TASK_TITLE_ALIASES).unwrap_or_else(|| FALLBACK_TASK_TITLE.to_string());
    let priority = probe_string_field(task, TASK_PRIORITY_ALIASES).unwrap_or_default();
    let deadline = probe_string_field(task, TASK_DEADLINE_ALIASES).unwrap_or_default();
    let status = probe_string_field(task, TASK_STATUS_ALIASES).unwrap_or_default();

    let (responsible_id, responsible_name) = extract_identity(
        task,
        RESPONSIBLE_ID_ALIASES,
        RESPONSIBLE_NAME_ALIASES,
        RESPONSIBLE_OBJECT_ALIASES,
    );
    let (creator_id, creator_name) = extract_identity(
        task,
        CREATOR_ID_ALIASES,
        CREATOR_NAME_ALIASES,
        CREATOR_OBJECT_ALIASES,
    );

    let link = build_task_link(portal_domain, &responsible_id, &id);
    TaskRecord {
        id,
        title,
        priority,
        deadline,
        responsible_id,
        responsible_name,
        creator_id,
        creator_name,
        status,
        link,
        raw: task.clone(),
    }
}

/// Convenience wrapper: locate the task object, then build the record.
/// `None` means the payload carries no task data, a legitimate skip.
pub fn extract_task_record(payload: &Value, portal_domain: &str) -> Option<TaskRecord> {
    locate_task_object(payload).map(|task| build_task_record(task, portal_domain))
}

/// Deep link into the Bitrix24 portal, or a local anchor when no portal
/// domain is configured.
pub fn build_task_link(portal_domain: &str, responsible_id: &str, task_id: &str) -> String {
    let domain = portal_domain
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    if domain.is_empty() {
        format!("#task_{task_id}")
    } else {
        format!(
            "https://{domain}/company/personal/user/{responsible_id}/tasks/task/view/{task_id}/"
        )
    }
}

fn extract_identity(
    task: &Value,
    id_aliases: &[&str],
    name_aliases: &[&str],
    object_aliases: &[&str],
) -> (String, String) {
    let mut id = probe_string_field(task, id_aliases).unwrap_or_default();
    let mut name = probe_string_field(task, name_aliases).unwrap_or_default();
    if id.is_empty() || name.is_empty() {
        if let Some(nested) = first_present_object(task, object_aliases) {
            if id.is_empty() {
                id = probe_string_field(nested, NESTED_ID_ALIASES).unwrap_or_default();
            }
            if name.is_empty() {
                name = probe_string_field(nested, NESTED_NAME_ALIASES).unwrap_or_default();
            }
        }
    }
    if name.is_empty() {
        name = id.clone();
    }
    (id, name)
}

fn first_present_object<'a>(object: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|alias| object.get(*alias))
        .find(|value| is_present_object(value))
}

fn is_present_object(value: &Value) -> bool {
    value.as_object().map(|map| !map.is_empty()).unwrap_or(false)
}

fn value_as_trimmed_string(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => return None,
    };
    if text.is_empty() || text == "undefined" {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const DOMAIN: &str = "intranet.example.com";

    fn record_fields(record: &TaskRecord) -> Vec<String> {
        vec![
            record.id.clone(),
            record.title.clone(),
            record.priority.clone(),
            record.deadline.clone(),
            record.responsible_id.clone(),
            record.responsible_name.clone(),
            record.creator_id.clone(),
            record.creator_name.clone(),
            record.status.clone(),
            record.link.clone(),
        ]
    }

    #[test]
    fn unit_equivalent_payload_shapes_normalize_identically() {
        let flat_upper = json!({
            "ID": "42", "TITLE": "Fix the build", "PRIORITY": "3",
            "DEADLINE": "2026-09-01 12:00:00", "RESPONSIBLE_ID": "200",
            "RESPONSIBLE_NAME": "Anna", "CREATED_BY": "100",
            "CREATED_BY_NAME": "Boris", "STATUS": "2"
        });
        let flat_camel = json!({
            "id": "42", "title": "Fix the build", "priority": "3",
            "deadline": "2026-09-01 12:00:00", "responsibleId": "200",
            "responsibleName": "Anna", "createdBy": "100",
            "createdByName": "Boris", "status": "2"
        });
        let enveloped = json!({
            "event": "ONTASKADD",
            "data": {"FIELDS_AFTER": flat_upper.clone()}
        });
        let form_encoded = crate::body_decode::decode_webhook_body(
            "event=ONTASKADD&data[FIELDS_AFTER][ID]=42&data[FIELDS_AFTER][TITLE]=Fix+the+build\
             &data[FIELDS_AFTER][PRIORITY]=3&data[FIELDS_AFTER][DEADLINE]=2026-09-01+12:00:00\
             &data[FIELDS_AFTER][RESPONSIBLE_ID]=200&data[FIELDS_AFTER][RESPONSIBLE_NAME]=Anna\
             &data[FIELDS_AFTER][CREATED_BY]=100&data[FIELDS_AFTER][CREATED_BY_NAME]=Boris\
             &data[FIELDS_AFTER][STATUS]=2",
        )
        .expect("form payload decodes");

        let reference = extract_task_record(&flat_upper, DOMAIN).expect("flat upper");
        for payload in [&flat_camel, &enveloped, &form_encoded] {
            let record = extract_task_record(payload, DOMAIN).expect("record");
            assert_eq!(record_fields(&record), record_fields(&reference));
        }
    }

    #[test]
    fn unit_numeric_identifiers_coerce_to_strings() {
        let payload = json!({"data": {"ID": 42, "CREATED_BY": 100, "RESPONSIBLE_ID": 200}});
        let record = extract_task_record(&payload, DOMAIN).expect("record");
        assert_eq!(record.id, "42");
        assert_eq!(record.creator_id, "100");
        assert_eq!(record.responsible_id, "200");
    }

    #[test]
    fn unit_missing_title_gets_placeholder_and_names_fall_back_to_ids() {
        let payload = json!({"data": {"ID": "7", "RESPONSIBLE_ID": "200", "CREATED_BY": "100"}});
        let record = extract_task_record(&payload, DOMAIN).expect("record");
        assert_eq!(record.title, FALLBACK_TASK_TITLE);
        assert_eq!(record.responsible_name, "200");
        assert_eq!(record.creator_name, "100");
        assert_eq!(record.deadline, "");
    }

    #[test]
    fn unit_nested_identity_objects_supply_missing_names() {
        let payload = json!({
            "data": {
                "id": "7",
                "responsible": {"id": "200", "name": "Anna"},
                "creator": {"id": "100", "name": "Boris"}
            }
        });
        let record = extract_task_record(&payload, DOMAIN).expect("record");
        assert_eq!(record.responsible_id, "200");
        assert_eq!(record.responsible_name, "Anna");
        assert_eq!(record.creator_id, "100");
        assert_eq!(record.creator_name, "Boris");
    }

    #[test]
    fn unit_task_link_uses_portal_domain_or_anchor() {
        assert_eq!(
            build_task_link("https://intranet.example.com/", "200", "42"),
            "https://intranet.example.com/company/personal/user/200/tasks/task/view/42/"
        );
        assert_eq!(build_task_link("", "200", "42"), "#task_42");
    }

    #[test]
    fn unit_locate_prefers_envelope_and_skips_undefined() {
        let enveloped = json!({"ID": "1", "data": {"ID": "2"}});
        let located = locate_task_object(&enveloped).expect("envelope");
        assert_eq!(located["ID"], "2");

        let undefined_envelope = json!({"data": "undefined", "ID": "3"});
        let located = locate_task_object(&undefined_envelope).expect("root fallback");
        assert_eq!(located["ID"], "3");
    }

    #[test]
    fn unit_locate_returns_none_without_task_data() {
        assert!(locate_task_object(&json!({})).is_none());
        assert!(locate_task_object(&json!({"event": "ONTASKADD"})).is_none());
        assert!(locate_task_object(&json!("not an object")).is_none());
    }
}
