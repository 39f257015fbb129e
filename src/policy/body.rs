//! Typed views of Docker request bodies.
//!
//! Docker encodes unset fields inconsistently: a key may be missing, `null`,
//! or present with an empty value, and these mean different things to the
//! policies (a missing `UsernsMode` is invalid, an empty one selects the
//! daemon's remapping). [`Field`] keeps the three states apart, and a value of
//! the wrong JSON type is always an error rather than being read as absent.
//!
//! Field errors are kept per field instead of failing the whole parse, so the
//! policy can report them in its own evaluation order.

use serde_json::{Map, Value};

/// Presence state of a body field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    /// Key not present.
    Absent,
    /// Key present with JSON `null`.
    Null,
    /// Key present with a value of the expected type.
    Present(T),
}

impl<T> Field<T> {
    /// Value when present.
    pub fn present(self) -> Option<T> {
        match self {
            Field::Present(v) => Some(v),
            Field::Absent | Field::Null => None,
        }
    }
}

/// Errors from body parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BodyError {
    /// Body is not valid JSON.
    #[error("malformed request body: {0}")]
    Malformed(String),
    /// Body is valid JSON but not an object.
    #[error("request body is not an object")]
    NotAnObject,
    /// `HostConfig` is missing or not an object.
    #[error("missing or invalid HostConfig")]
    HostConfig,
    /// A field holds a value of the wrong type.
    #[error("field {field} must be {expected}")]
    WrongType {
        /// Field name.
        field: &'static str,
        /// Expected JSON shape.
        expected: &'static str,
    },
}

/// Result of reading one field.
pub type FieldResult<T> = Result<Field<T>, BodyError>;

/// Parse a body into a JSON object.
///
/// # Errors
///
/// Returns [`BodyError::Malformed`] or [`BodyError::NotAnObject`].
pub fn parse_object(body: &[u8]) -> Result<Map<String, Value>, BodyError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(BodyError::NotAnObject),
        Err(e) => Err(BodyError::Malformed(e.to_string())),
    }
}

/// Read a string field.
pub fn string_field(map: &Map<String, Value>, field: &'static str) -> FieldResult<String> {
    match map.get(field) {
        None => Ok(Field::Absent),
        Some(Value::Null) => Ok(Field::Null),
        Some(Value::String(s)) => Ok(Field::Present(s.clone())),
        Some(_) => Err(BodyError::WrongType {
            field,
            expected: "a string",
        }),
    }
}

/// Read an array-of-strings field.
pub fn string_list_field(map: &Map<String, Value>, field: &'static str) -> FieldResult<Vec<String>> {
    let wrong = || BodyError::WrongType {
        field,
        expected: "an array of strings",
    };
    match map.get(field) {
        None => Ok(Field::Absent),
        Some(Value::Null) => Ok(Field::Null),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_owned).ok_or_else(wrong))
            .collect::<Result<Vec<_>, _>>()
            .map(Field::Present),
        Some(_) => Err(wrong()),
    }
}

/// Fields of a `POST /containers/create` body that policy inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSpec {
    /// Top-level `User`.
    pub user: FieldResult<String>,
    /// `HostConfig.Binds`.
    pub binds: FieldResult<Vec<String>>,
    /// `HostConfig.UsernsMode`.
    pub userns_mode: FieldResult<String>,
    /// `HostConfig.GroupAdd`.
    pub group_add: FieldResult<Vec<String>>,
    /// `HostConfig.SecurityOpt`.
    pub security_opt: FieldResult<Vec<String>>,
}

impl CreateSpec {
    /// Parse a create body.
    ///
    /// # Errors
    ///
    /// Fails only when the body is not a JSON object or `HostConfig` is
    /// missing or not an object; field-level errors are kept on the spec.
    pub fn parse(body: &[u8]) -> Result<Self, BodyError> {
        let root = parse_object(body)?;
        let host = match root.get("HostConfig") {
            Some(Value::Object(host)) => host,
            _ => return Err(BodyError::HostConfig),
        };
        Ok(Self {
            user: string_field(&root, "User"),
            binds: string_list_field(host, "Binds"),
            userns_mode: string_field(host, "UsernsMode"),
            group_add: string_list_field(host, "GroupAdd"),
            security_opt: string_list_field(host, "SecurityOpt"),
        })
    }
}

/// Fields of a `POST /containers/{id}/exec` body that policy inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSpec {
    /// `User` the exec process runs as.
    pub user: Field<String>,
}

impl ExecSpec {
    /// Parse an exec body.
    ///
    /// # Errors
    ///
    /// Returns [`BodyError`] when the body is not a JSON object or `User` is
    /// not a string.
    pub fn parse(body: &[u8]) -> Result<Self, BodyError> {
        let root = parse_object(body)?;
        Ok(Self {
            user: string_field(&root, "User")?,
        })
    }
}
