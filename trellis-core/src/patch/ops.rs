//! Patch operations and their wire form.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::path::Path;
use crate::error::{Error, Result};

/// One RFC 6902 operation.
///
/// Serializes as `{"op": "...", "path": "/pointer", "value"?, "from"?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    Add { path: Path, value: Value },
    Remove { path: Path },
    Replace { path: Path, value: Value },
    Move { from: Path, path: Path },
    Copy { from: Path, path: Path },
    Test { path: Path, value: Value },
}

impl PatchOp {
    pub fn add(path: impl Into<Path>, value: impl Into<Value>) -> Self {
        Self::Add {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn remove(path: impl Into<Path>) -> Self {
        Self::Remove { path: path.into() }
    }

    pub fn replace(path: impl Into<Path>, value: impl Into<Value>) -> Self {
        Self::Replace {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn move_from(from: impl Into<Path>, path: impl Into<Path>) -> Self {
        Self::Move {
            from: from.into(),
            path: path.into(),
        }
    }

    pub fn copy_from(from: impl Into<Path>, path: impl Into<Path>) -> Self {
        Self::Copy {
            from: from.into(),
            path: path.into(),
        }
    }

    pub fn test(path: impl Into<Path>, value: impl Into<Value>) -> Self {
        Self::Test {
            path: path.into(),
            value: value.into(),
        }
    }

    /// The `op` member as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Remove { .. } => "remove",
            Self::Replace { .. } => "replace",
            Self::Move { .. } => "move",
            Self::Copy { .. } => "copy",
            Self::Test { .. } => "test",
        }
    }

    /// The target location of the operation.
    pub fn path(&self) -> &Path {
        match self {
            Self::Add { path, .. }
            | Self::Remove { path }
            | Self::Replace { path, .. }
            | Self::Move { path, .. }
            | Self::Copy { path, .. }
            | Self::Test { path, .. } => path,
        }
    }

    /// The same operation addressed from one level up: `segment` is put in
    /// front of every path the operation carries.
    pub fn prefixed(&self, segment: &str) -> Self {
        match self {
            Self::Add { path, value } => Self::Add {
                path: path.prefixed(segment),
                value: value.clone(),
            },
            Self::Remove { path } => Self::Remove {
                path: path.prefixed(segment),
            },
            Self::Replace { path, value } => Self::Replace {
                path: path.prefixed(segment),
                value: value.clone(),
            },
            Self::Move { from, path } => Self::Move {
                from: from.prefixed(segment),
                path: path.prefixed(segment),
            },
            Self::Copy { from, path } => Self::Copy {
                from: from.prefixed(segment),
                path: path.prefixed(segment),
            },
            Self::Test { path, value } => Self::Test {
                path: path.prefixed(segment),
                value: value.clone(),
            },
        }
    }

    /// Validate and convert a raw JSON patch object.
    ///
    /// A missing `op`, a missing required member or an unknown `op` is a
    /// structural error. A `null` value is a valid value.
    pub fn from_value(raw: &Value) -> Result<Self> {
        let object = raw
            .as_object()
            .ok_or_else(|| Error::invalid_patch("patch must be an object"))?;
        let op = match object.get("op") {
            Some(Value::String(op)) => op.as_str(),
            Some(_) => return Err(Error::invalid_patch("op must be a string")),
            None => return Err(Error::invalid_patch("missing op")),
        };
        match op {
            "add" => Ok(Self::Add {
                path: pointer(object, "path")?,
                value: member(object, "value")?,
            }),
            "remove" => Ok(Self::Remove {
                path: pointer(object, "path")?,
            }),
            "replace" => Ok(Self::Replace {
                path: pointer(object, "path")?,
                value: member(object, "value")?,
            }),
            "move" => Ok(Self::Move {
                from: pointer(object, "from")?,
                path: pointer(object, "path")?,
            }),
            "copy" => Ok(Self::Copy {
                from: pointer(object, "from")?,
                path: pointer(object, "path")?,
            }),
            "test" => Ok(Self::Test {
                path: pointer(object, "path")?,
                value: member(object, "value")?,
            }),
            other => Err(Error::UnknownOp { op: other.to_string() }),
        }
    }
}

fn member(object: &Map<String, Value>, key: &str) -> Result<Value> {
    object
        .get(key)
        .cloned()
        .ok_or_else(|| Error::invalid_patch(format!("missing required key: {key}")))
}

fn pointer(object: &Map<String, Value>, key: &str) -> Result<Path> {
    match object.get(key) {
        Some(Value::String(raw)) => Path::parse(raw),
        Some(_) => Err(Error::invalid_patch(format!("{key} must be a string pointer"))),
        None => Err(Error::invalid_patch(format!("missing required key: {key}"))),
    }
}

/// Validate a whole patch document (a JSON array of operations) before any
/// of it is applied.
pub fn parse_patches(raw: &Value) -> Result<Vec<PatchOp>> {
    let items = raw
        .as_array()
        .ok_or_else(|| Error::invalid_patch("patch document must be an array"))?;
    items.iter().map(PatchOp::from_value).collect()
}
