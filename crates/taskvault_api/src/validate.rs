//! Request validation, run before any storage access.

use crate::error::FieldError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use taskvault_core::{NewTask, TaskId, TaskPatch, TaskStatus};

static TASK_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?[0-9]+$").expect("valid task id regex"));
static BEARER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i:bearer)\s+(\S+)\s*$").expect("valid bearer regex"));

/// Parses a path segment as a task id.
pub fn parse_task_id(raw: &str) -> Result<TaskId, Vec<FieldError>> {
    if !TASK_ID_RE.is_match(raw) {
        return Err(vec![FieldError::new("id", "Invalid task ID")]);
    }
    raw.parse::<TaskId>()
        .map_err(|_| vec![FieldError::new("id", "Invalid task ID")])
}

/// Extracts the token from an `Authorization: Bearer <token>` value.
pub fn parse_bearer(header: &str) -> Option<&str> {
    BEARER_RE
        .captures(header.trim())
        .and_then(|captures| captures.get(1))
        .map(|token| token.as_str())
}

/// Validates a create body.
pub fn parse_new_task(body: &[u8]) -> Result<NewTask, Vec<FieldError>> {
    let object = parse_object(body)?;
    let mut errors = Vec::new();

    let title = match object.get("title") {
        Some(Value::String(title)) if !title.trim().is_empty() => Some(title.clone()),
        _ => {
            errors.push(FieldError::new("title", "Title is required"));
            None
        }
    };
    let description = optional_string(&object, "description", &mut errors);
    let status = optional_status(&object, &mut errors);
    let notes = optional_string(&object, "notes", &mut errors);

    match title {
        Some(title) if errors.is_empty() => Ok(NewTask {
            title,
            description,
            status,
            notes,
        }),
        _ => Err(errors),
    }
}

/// Validates a partial-update body.
pub fn parse_task_patch(body: &[u8]) -> Result<TaskPatch, Vec<FieldError>> {
    let object = parse_object(body)?;
    let mut errors = Vec::new();

    let title = match object.get("title") {
        None | Some(Value::Null) => None,
        Some(Value::String(title)) if !title.trim().is_empty() => Some(title.clone()),
        Some(_) => {
            errors.push(FieldError::new("title", "Title cannot be empty"));
            None
        }
    };
    let description = optional_string(&object, "description", &mut errors);
    let status = optional_status(&object, &mut errors);
    let notes = optional_string(&object, "notes", &mut errors);

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(TaskPatch {
        title,
        description,
        status,
        notes,
    })
}

fn parse_object(body: &[u8]) -> Result<Map<String, Value>, Vec<FieldError>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(vec![FieldError::new("body", "Body must be a JSON object")]),
        Err(err) => Err(vec![FieldError::new(
            "body",
            format!("Body is not valid JSON: {err}"),
        )]),
    }
}

fn optional_string(
    object: &Map<String, Value>,
    field: &'static str,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match object.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(value)) => Some(value.clone()),
        Some(_) => {
            errors.push(FieldError::new(field, format!("{field} must be a string")));
            None
        }
    }
}

fn optional_status(
    object: &Map<String, Value>,
    errors: &mut Vec<FieldError>,
) -> Option<TaskStatus> {
    let parsed = match object.get("status") {
        None | Some(Value::Null) => return None,
        Some(Value::String(value)) => TaskStatus::parse(value),
        Some(_) => None,
    };
    if parsed.is_none() {
        let allowed = TaskStatus::ALL.map(TaskStatus::as_str).join(", ");
        errors.push(FieldError::new(
            "status",
            format!("status must be one of {allowed}"),
        ));
    }
    parsed
}
