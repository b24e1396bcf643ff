// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt::Display;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Aggregate state of a group node.
///
/// `Mixed` is only ever derived from children by [`rollup`], it is never written directly.
/// Serialized as `true`, `false` or `"mixed"`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TriState {
    On,
    #[default]
    Off,
    Mixed,
}

impl TriState {
    pub fn is_on(&self) -> bool {
        matches!(self, TriState::On)
    }
}

impl From<bool> for TriState {
    fn from(value: bool) -> Self {
        if value { TriState::On } else { TriState::Off }
    }
}

impl Display for TriState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TriState::On => "true",
            TriState::Off => "false",
            TriState::Mixed => "mixed",
        };

        write!(f, "{}", s)
    }
}

impl Serialize for TriState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TriState::On => serializer.serialize_bool(true),
            TriState::Off => serializer.serialize_bool(false),
            TriState::Mixed => serializer.serialize_str("mixed"),
        }
    }
}

impl<'de> Deserialize<'de> for TriState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Flag(value) => Ok(value.into()),
            Repr::Text(text) if text == "mixed" => Ok(TriState::Mixed),
            Repr::Text(text) => Err(D::Error::custom(format!("unknown tri-state {text:?}"))),
        }
    }
}

/// Flag of a leaf or group which can be toggled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    /// Entity can be read.
    Read,

    /// Entity can be controlled.
    Write,

    /// Dashboard or view is shown.
    Visible,
}

impl Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Field::Read => "read",
            Field::Write => "write",
            Field::Visible => "visible",
        };

        write!(f, "{}", s)
    }
}

/// Aggregate the flags of a group's children.
///
/// `On` if every child is set, `Mixed` if at least one is, `Off` otherwise. A group without
/// children keeps its `prior` state.
pub fn rollup<I>(children: I, prior: TriState) -> TriState
where
    I: IntoIterator<Item = bool>,
{
    let mut seen = false;
    let mut all = true;
    let mut some = false;

    for child in children {
        seen = true;
        all &= child;
        some |= child;
    }

    match (seen, all, some) {
        (false, _, _) => prior,
        (true, true, _) => TriState::On,
        (true, false, true) => TriState::Mixed,
        (true, false, false) => TriState::Off,
    }
}
