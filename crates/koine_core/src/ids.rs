use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Timestamp;

/// A stable, opaque identifier for a repository resource, optionally
/// qualified with the instant of a historical (memento) view.
///
/// The full form is `base` or `base@<rfc3339>`; rendering is canonical, so
/// derived equality matches exact-string equality on the full form.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ResourceId {
    base: String,
    memento: Option<Timestamp>,
}

impl ResourceId {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            memento: None,
        }
    }

    pub fn memento(base: impl Into<String>, instant: Timestamp) -> Self {
        Self {
            base: base.into(),
            memento: Some(instant),
        }
    }

    /// Parses a full id, recognising a trailing `@<rfc3339>` memento
    /// qualifier. A suffix that does not parse as an instant is part of the
    /// base id.
    pub fn parse(full: &str) -> Self {
        if let Some((base, suffix)) = full.rsplit_once('@')
            && let Ok(instant) = Timestamp::parse_rfc3339(suffix)
        {
            return Self {
                base: base.to_string(),
                memento: Some(instant),
            };
        }
        Self {
            base: full.to_string(),
            memento: None,
        }
    }

    pub fn full_id(&self) -> String {
        match self.memento {
            Some(instant) => format!("{}@{}", self.base, instant.to_rfc3339()),
            None => self.base.clone(),
        }
    }

    pub fn base_id(&self) -> &str {
        &self.base
    }

    pub fn is_memento(&self) -> bool {
        self.memento.is_some()
    }

    pub fn memento_instant(&self) -> Option<Timestamp> {
        self.memento
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_id())
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        ResourceId::parse(value)
    }
}

impl Serialize for ResourceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.full_id())
    }
}

impl<'de> Deserialize<'de> for ResourceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(ResourceId::parse(&value))
    }
}
