//! Field accessors that report the dotted path of whatever is wrong.

use serde_json::{Map, Value};

use super::error::{ParseError, ParseProblem};

pub(super) type Object = Map<String, Value>;

pub(super) fn field_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_owned()
    } else {
        format!("{parent}.{key}")
    }
}

pub(super) fn parse_document(bytes: &[u8]) -> Result<Value, ParseError> {
    serde_json::from_slice(bytes)
        .map_err(|err| ParseError::new("document", ParseProblem::Syntax(err.to_string())))
}

pub(super) fn as_object<'a>(value: &'a Value, path: &str) -> Result<&'a Object, ParseError> {
    value.as_object().ok_or_else(|| {
        ParseError::new(
            if path.is_empty() { "document" } else { path },
            ParseProblem::WrongType {
                expected: "an object",
            },
        )
    })
}

pub(super) fn required<'a>(
    object: &'a Object,
    key: &str,
    parent: &str,
) -> Result<&'a Value, ParseError> {
    match object.get(key) {
        Some(Value::Null) | None => Err(ParseError::new(
            field_path(parent, key),
            ParseProblem::Missing,
        )),
        Some(value) => Ok(value),
    }
}

pub(super) fn required_object<'a>(
    object: &'a Object,
    key: &str,
    parent: &str,
) -> Result<&'a Object, ParseError> {
    as_object(required(object, key, parent)?, &field_path(parent, key))
}

pub(super) fn required_str(object: &Object, key: &str, parent: &str) -> Result<String, ParseError> {
    let value = required(object, key, parent)?;
    value.as_str().map(str::to_owned).ok_or_else(|| {
        ParseError::new(
            field_path(parent, key),
            ParseProblem::WrongType {
                expected: "a string",
            },
        )
    })
}

pub(super) fn optional_str(
    object: &Object,
    key: &str,
    parent: &str,
) -> Result<Option<String>, ParseError> {
    match object.get(key) {
        Some(Value::Null) | None => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(_) => Err(ParseError::new(
            field_path(parent, key),
            ParseProblem::WrongType {
                expected: "a string",
            },
        )),
    }
}

pub(super) fn optional_array<'a>(
    object: &'a Object,
    key: &str,
    parent: &str,
) -> Result<&'a [Value], ParseError> {
    match object.get(key) {
        Some(Value::Null) | None => Ok(&[]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(ParseError::new(
            field_path(parent, key),
            ParseProblem::WrongType {
                expected: "an array",
            },
        )),
    }
}

pub(super) fn required_string_array(
    object: &Object,
    key: &str,
    parent: &str,
) -> Result<Vec<String>, ParseError> {
    let path = field_path(parent, key);
    let Value::Array(items) = required(object, key, parent)? else {
        return Err(ParseError::new(
            path,
            ParseProblem::WrongType {
                expected: "an array of strings",
            },
        ));
    };
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            item.as_str().map(str::to_owned).ok_or_else(|| {
                ParseError::new(
                    format!("{path}[{index}]"),
                    ParseProblem::WrongType {
                        expected: "a string",
                    },
                )
            })
        })
        .collect()
}
