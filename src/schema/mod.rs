//! Structural validation of the team database document.
//!
//! The document is kept untyped (`serde_json::Value`) so that fields the
//! validator does not know about survive a round trip. Validation stops at the
//! first violation and reports where it happened as a path of mapping keys and
//! list indices.

use std::fmt;

use chrono::NaiveDate;
use serde_json::{Map, Value};

/// A structural violation found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    pub message: String,
    pub path: Vec<String>,
}

impl SchemaError {
    fn new(message: impl Into<String>, path: &[&str]) -> Self {
        Self {
            message: message.into(),
            path: path.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn at(message: impl Into<String>, path: &FieldPath) -> Self {
        Self {
            message: message.into(),
            path: path.0.clone(),
        }
    }

    /// Path joined with `/`, e.g. `database/people/0/name`.
    pub fn path_string(&self) -> String {
        self.path.join("/")
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "Validation error: {}", self.message)
        } else {
            write!(
                f,
                "Validation error: {} at {}",
                self.message,
                self.path_string()
            )
        }
    }
}

impl std::error::Error for SchemaError {}

#[derive(Debug, Clone)]
struct FieldPath(Vec<String>);

impl FieldPath {
    fn list_item(section: &str, index: usize) -> Self {
        Self(vec![
            "database".to_string(),
            section.to_string(),
            index.to_string(),
        ])
    }

    fn child(&self, segment: impl ToString) -> Self {
        let mut path = self.0.clone();
        path.push(segment.to_string());
        Self(path)
    }
}

/// Type expected of an optional field.
#[derive(Debug, Clone, Copy)]
enum FieldKind {
    Str,
    Bool,
    Int,
    StrList,
}

const PERSON_FIELDS: &[(&str, FieldKind)] = &[
    ("title", FieldKind::Str),
    ("external", FieldKind::Bool),
    ("team_name", FieldKind::Str),
    ("virtual_team", FieldKind::StrList),
    ("legal_manager", FieldKind::Str),
    ("functional_manager", FieldKind::Str),
    ("carry_over_holidays", FieldKind::Int),
    ("site", FieldKind::Str),
];

const TEAM_FIELDS: &[(&str, FieldKind)] = &[
    ("short_name", FieldKind::Str),
    ("product_owner", FieldKind::Str),
    ("functional_manager", FieldKind::Str),
    ("parent_team", FieldKind::Str),
];

const PROJECT_FIELDS: &[(&str, FieldKind)] = &[("project_lead", FieldKind::Str)];

/// Validate a complete document.
///
/// Checks run in a fixed order: top-level shape, `version`, `database`, the
/// three section lists, then every element of `people`, `teams` and `projects`.
pub fn validate(doc: &Value) -> Result<(), SchemaError> {
    let Some(root) = doc.as_object() else {
        return Err(SchemaError::new(
            "Document must be a mapping/dictionary",
            &[],
        ));
    };

    let version_ok = root
        .get("version")
        .and_then(Value::as_str)
        .is_some_and(|v| v.len() == 8 && v.bytes().all(|b| b.is_ascii_digit()));
    if !version_ok {
        return Err(SchemaError::new(
            "'version' must be a date string like '20260107'",
            &["version"],
        ));
    }

    let Some(inner) = root.get("database").and_then(Value::as_object) else {
        return Err(SchemaError::new(
            "'database' mapping is required",
            &["database"],
        ));
    };

    let people = section_list(inner, "people", true)?;
    let teams = section_list(inner, "teams", true)?;
    let projects = section_list(inner, "projects", false)?;

    for (idx, person) in people.iter().enumerate() {
        let path = FieldPath::list_item("people", idx);
        let person = entry_mapping(person, "person", &path)?;
        check_name(person, "person", &path)?;
        check_date_or_empty(person.get("birthday"), &path.child("birthday"))?;
        check_optional_fields(person, PERSON_FIELDS, &path)?;
    }

    for (idx, team) in teams.iter().enumerate() {
        let path = FieldPath::list_item("teams", idx);
        let team = entry_mapping(team, "team", &path)?;
        check_name(team, "team", &path)?;
        check_optional_fields(team, TEAM_FIELDS, &path)?;
    }

    for (idx, project) in projects.iter().enumerate() {
        let path = FieldPath::list_item("projects", idx);
        let project = entry_mapping(project, "project", &path)?;
        check_name(project, "project", &path)?;
        check_optional_fields(project, PROJECT_FIELDS, &path)?;
    }

    Ok(())
}

/// `projects` may be omitted; `people` and `teams` may not.
fn section_list<'a>(
    inner: &'a Map<String, Value>,
    section: &str,
    required: bool,
) -> Result<&'a [Value], SchemaError> {
    match inner.get(section) {
        None if !required => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        _ => Err(SchemaError::new(
            format!("'{}' must be a list", section),
            &["database", section],
        )),
    }
}

fn entry_mapping<'a>(
    value: &'a Value,
    kind: &str,
    path: &FieldPath,
) -> Result<&'a Map<String, Value>, SchemaError> {
    value
        .as_object()
        .ok_or_else(|| SchemaError::at(format!("{} entry must be a mapping", kind), path))
}

fn check_name(entry: &Map<String, Value>, kind: &str, path: &FieldPath) -> Result<(), SchemaError> {
    let path = path.child("name");
    match entry.get("name") {
        None => Err(SchemaError::at(format!("{}.name is required", kind), &path)),
        Some(value) => check_kind(value, FieldKind::Str, &path),
    }
}

fn check_optional_fields(
    entry: &Map<String, Value>,
    fields: &[(&str, FieldKind)],
    path: &FieldPath,
) -> Result<(), SchemaError> {
    for (field, kind) in fields {
        if let Some(value) = entry.get(*field) {
            check_kind(value, *kind, &path.child(field))?;
        }
    }
    Ok(())
}

fn check_kind(value: &Value, kind: FieldKind, path: &FieldPath) -> Result<(), SchemaError> {
    match kind {
        FieldKind::Str if !value.is_string() => Err(SchemaError::at("must be a string", path)),
        FieldKind::Bool if !value.is_boolean() => Err(SchemaError::at("must be a boolean", path)),
        FieldKind::Int if !(value.is_i64() || value.is_u64()) => {
            Err(SchemaError::at("must be an integer", path))
        }
        FieldKind::StrList => {
            let Some(items) = value.as_array() else {
                return Err(SchemaError::at("must be a list", path));
            };
            match items.iter().position(|item| !item.is_string()) {
                Some(i) => Err(SchemaError::at(
                    "list items must be strings",
                    &path.child(i),
                )),
                None => Ok(()),
            }
        }
        _ => Ok(()),
    }
}

/// Absent, null and `""` are all accepted as "no date".
fn check_date_or_empty(value: Option<&Value>, path: &FieldPath) -> Result<(), SchemaError> {
    match value {
        None | Some(Value::Null) => Ok(()),
        Some(Value::String(s)) if s.is_empty() => Ok(()),
        Some(Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(|_| ())
            .map_err(|_| {
                SchemaError::at("birthday must be ISO date yyyy-mm-dd or empty", path)
            }),
        Some(_) => Err(SchemaError::at(
            "birthday must be an ISO date string or empty",
            path,
        )),
    }
}
