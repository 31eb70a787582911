//! Source/target version identifiers and compatibility matching.
//!
//! A [`Version`] names one product release of a search cluster: its flavor
//! (Elasticsearch vs. OpenSearch) plus major/minor/patch numbers. Versions
//! select the metadata factories, creators, and transformation rule sets at
//! startup; a mismatch there is a fatal configuration error, never retried.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Product family distinguishing otherwise similarly-numbered versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flavor {
    Elasticsearch,
    OpenSearch,
}

impl Flavor {
    /// Full product name, as accepted in version strings.
    pub fn name(&self) -> &'static str {
        match self {
            Flavor::Elasticsearch => "Elasticsearch",
            Flavor::OpenSearch => "OpenSearch",
        }
    }

    /// Two-letter shorthand, as accepted in version strings.
    pub fn shorthand(&self) -> &'static str {
        match self {
            Flavor::Elasticsearch => "ES",
            Flavor::OpenSearch => "OS",
        }
    }

    fn all() -> [Flavor; 2] {
        [Flavor::Elasticsearch, Flavor::OpenSearch]
    }
}

/// An immutable cluster version: flavor + major.minor.patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub flavor: Flavor,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(flavor: Flavor, major: u32, minor: u32, patch: u32) -> Self {
        Self {
            flavor,
            major,
            minor,
            patch,
        }
    }

    /// Whether two versions are treated as compatible.
    ///
    /// Flavors and majors must agree. All OpenSearch majors are
    /// forward-compatible with one another; Elasticsearch additionally
    /// requires equal minors. Patch versions never participate.
    pub fn matches(&self, other: &Version) -> bool {
        if self.flavor != other.flavor || self.major != other.major {
            return false;
        }
        if self.flavor == Flavor::OpenSearch {
            return true;
        }
        self.minor == other.minor
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{}.{}",
            self.flavor.name(),
            self.major,
            self.minor,
            self.patch
        )
    }
}

impl FromStr for Version {
    type Err = Error;

    /// Parse strings like `"ES 7.10"`, `"OS 1.3.16"`, `"Elasticsearch 6.8"`,
    /// or `"opensearch_2_x"`. An `x` component parses as 0.
    fn from_str(raw: &str) -> Result<Self> {
        let lowered = raw.to_lowercase();
        let mut flavor = None;
        let mut rest = lowered.as_str();

        for candidate in Flavor::all() {
            let full = candidate.name().to_lowercase();
            let short = candidate.shorthand().to_lowercase();
            if let Some(tail) = rest.strip_prefix(full.as_str()) {
                flavor = Some(candidate);
                rest = tail;
                break;
            }
            if let Some(tail) = rest.strip_prefix(short.as_str()) {
                flavor = Some(candidate);
                rest = tail;
                break;
            }
        }

        let flavor = flavor.ok_or_else(|| {
            Error::VersionParse(format!("unable to determine flavor from '{raw}'"))
        })?;

        let rest = rest.trim().trim_start_matches('_');
        let mut parts = rest.split(['.', '_']);

        let major = parse_component(parts.next(), raw)?;
        let minor = match parts.next() {
            Some(p) => parse_component(Some(p), raw)?,
            None => 0,
        };
        let patch = match parts.next() {
            Some(p) => parse_component(Some(p), raw)?,
            None => 0,
        };

        Ok(Version::new(flavor, major, minor, patch))
    }
}

fn parse_component(part: Option<&str>, raw: &str) -> Result<u32> {
    let part = part
        .ok_or_else(|| Error::VersionParse(format!("missing version numbers in '{raw}'")))?;
    if part == "x" {
        return Ok(0);
    }
    part.parse::<u32>()
        .map_err(|_| Error::VersionParse(format!("unable to parse version numbers from '{raw}'")))
}

/// Version predicates used by the factory and transformer registries.
pub mod matchers {
    use super::{Flavor, Version};

    fn matches_major(version: &Version, flavor: Flavor, major: u32) -> bool {
        version.flavor == flavor && version.major == major
    }

    /// ES 6.8 sources (last 6.x with snapshot compatibility into OS 2.x).
    pub fn is_es_6_8(version: &Version) -> bool {
        matches_major(version, Flavor::Elasticsearch, 6) && version.minor == 8
    }

    /// Any ES 7.x source.
    pub fn is_es_7_x(version: &Version) -> bool {
        matches_major(version, Flavor::Elasticsearch, 7)
    }

    /// Any OS 1.x source.
    pub fn is_os_1_x(version: &Version) -> bool {
        matches_major(version, Flavor::OpenSearch, 1)
    }

    /// Any OS 2.x target.
    pub fn is_os_2_x(version: &Version) -> bool {
        matches_major(version, Flavor::OpenSearch, 2)
    }
}
