//! Datatype mapping identifiers
//!
//! A mapping is addressed by a single string key:
//!
//! ```text
//! v2-2.1-Germplasm              top-level mapping of a datatype
//! v2-2.1-Germplasm-donors       one-off nested shape of Germplasm.donors
//! v2-2.1-Study-seasons-season   nested shapes can nest further
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

static MAPPING_ID: LazyLock<Result<regex::Regex, regex::Error>> = LazyLock::new(|| {
    regex::Regex::new(r"^(v\d+)-(\d+\.\d+)-([A-Z][A-Za-z0-9]*)((?:-[a-z][A-Za-z0-9]*)*)$")
});

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid mapping identifier '{0}'")]
pub struct InvalidMappingId(pub String);

/// Identity of a datatype mapping
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MappingId {
    /// Major BrAPI version, e.g. `v2`
    pub version: String,
    /// Release within the version, e.g. `2.1`
    pub release: String,
    /// BrAPI datatype name, e.g. `Germplasm`
    pub datatype: String,
    /// Field path for nested mappings
    pub subfields: Vec<String>,
}

impl MappingId {
    pub fn new(
        version: impl Into<String>,
        release: impl Into<String>,
        datatype: impl Into<String>,
    ) -> Self {
        Self {
            version: version.into(),
            release: release.into(),
            datatype: datatype.into(),
            subfields: Vec::new(),
        }
    }

    pub fn is_nested(&self) -> bool {
        !self.subfields.is_empty()
    }

    /// The top-level mapping this one belongs to
    pub fn root(&self) -> MappingId {
        MappingId::new(&self.version, &self.release, &self.datatype)
    }

    /// Nested mapping for `field` below this one
    pub fn nested(&self, field: &str) -> MappingId {
        let mut id = self.clone();
        id.subfields.push(field.to_string());
        id
    }

    /// Top-level mapping of another datatype in the same release
    pub fn sibling(&self, datatype: &str) -> MappingId {
        MappingId::new(&self.version, &self.release, datatype)
    }
}

impl fmt::Display for MappingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.version, self.release, self.datatype)?;
        for field in &self.subfields {
            write!(f, "-{field}")?;
        }
        Ok(())
    }
}

impl FromStr for MappingId {
    type Err = InvalidMappingId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = MAPPING_ID
            .as_ref()
            .ok()
            .and_then(|pattern| pattern.captures(s))
            .ok_or_else(|| InvalidMappingId(s.to_string()))?;
        let subfields = caps
            .get(4)
            .map(|m| {
                m.as_str()
                    .split('-')
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(MappingId {
            version: caps[1].to_string(),
            release: caps[2].to_string(),
            datatype: caps[3].to_string(),
            subfields,
        })
    }
}

impl TryFrom<String> for MappingId {
    type Error = InvalidMappingId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MappingId> for String {
    fn from(id: MappingId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_top_level() {
        let id: MappingId = "v2-2.1-Germplasm".parse().unwrap();
        assert_eq!(id.version, "v2");
        assert_eq!(id.release, "2.1");
        assert_eq!(id.datatype, "Germplasm");
        assert!(!id.is_nested());
    }

    #[test]
    fn test_parse_nested_chain() {
        let id: MappingId = "v2-2.1-Study-seasons-season".parse().unwrap();
        assert_eq!(id.subfields, vec!["seasons", "season"]);
        assert_eq!(id.root().to_string(), "v2-2.1-Study");
        assert_eq!(id.to_string(), "v2-2.1-Study-seasons-season");
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in [
            "2-2.1-Germplasm",
            "v2-2-Germplasm",
            "v2-2.1-germplasm",
            "v2-2.1-Germplasm-",
            "v2-2.1-Germplasm-Donors",
        ] {
            assert!(bad.parse::<MappingId>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_nested_and_sibling() {
        let id = MappingId::new("v1", "1.3", "Germplasm");
        assert_eq!(id.nested("donors").to_string(), "v1-1.3-Germplasm-donors");
        assert_eq!(id.nested("donors").sibling("Study").to_string(), "v1-1.3-Study");
    }

    #[test]
    fn test_serde_as_string() {
        let id: MappingId = serde_json::from_str("\"v2-2.1-Germplasm-donors\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"v2-2.1-Germplasm-donors\"");
        assert!(serde_json::from_str::<MappingId>("\"nope\"").is_err());
    }
}
