// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt::Display;

use serde_json::{Map, Value};

/// Access which a policy grants to a subject on a single entity.
///
/// Grants are ordered such that "higher" grants include all "lower" ones.
///
/// Denied < ReadOnly < ReadWrite
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Grant {
    /// No grant is recorded for the entity.
    #[default]
    Denied,

    /// The entity can be read but not controlled.
    ReadOnly,

    /// The entity can be read and controlled.
    ReadWrite,
}

impl Grant {
    /// Derive a grant from a pair of leaf flags.
    ///
    /// Write access without read access can not be expressed in a policy and collapses to
    /// `Denied`.
    pub fn from_flags(read: bool, write: bool) -> Self {
        match (read, write) {
            (true, true) => Grant::ReadWrite,
            (true, false) => Grant::ReadOnly,
            (false, _) => Grant::Denied,
        }
    }

    /// Read and write flags of this grant.
    pub fn flags(&self) -> (bool, bool) {
        (self.can_read(), self.can_write())
    }

    pub fn can_read(&self) -> bool {
        !matches!(self, Grant::Denied)
    }

    pub fn can_write(&self) -> bool {
        matches!(self, Grant::ReadWrite)
    }

    /// Interpret a stored policy value.
    ///
    /// `true` is read+write and `{"read": true}` is read-only. Every other shape, including
    /// records which mention `write` at all, is treated as no grant.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Bool(true) => Grant::ReadWrite,
            Value::Object(record)
                if record.get("read") == Some(&Value::Bool(true))
                    && !record.contains_key("write") =>
            {
                Grant::ReadOnly
            }
            _ => Grant::Denied,
        }
    }

    /// Value to store for this grant, `None` meaning the key is removed from the policy.
    pub fn to_value(self) -> Option<Value> {
        match self {
            Grant::Denied => None,
            Grant::ReadOnly => {
                let mut record = Map::new();
                record.insert("read".into(), Value::Bool(true));
                Some(Value::Object(record))
            }
            Grant::ReadWrite => Some(Value::Bool(true)),
        }
    }
}

impl Display for Grant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Grant::Denied => "denied",
            Grant::ReadOnly => "read",
            Grant::ReadWrite => "read-write",
        };

        write!(f, "{}", s)
    }
}
