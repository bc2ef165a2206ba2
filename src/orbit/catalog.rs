use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Result, VisibilityError};

/// COSPAR designator without the century or dash: `YYNNNP`, piece 1..=3
/// letters (e.g. `25225A`, `98067A`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InternationalDesignator(String);

impl InternationalDesignator {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn launch_group(&self) -> LaunchGroup {
        LaunchGroup(self.0[..5].to_string())
    }
}

impl FromStr for InternationalDesignator {
    type Err = VisibilityError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let bytes = s.as_bytes();
        let well_formed = (6..=8).contains(&bytes.len())
            && bytes[..5].iter().all(u8::is_ascii_digit)
            && bytes[5..].iter().all(u8::is_ascii_uppercase);
        if !well_formed {
            return Err(VisibilityError::invalid(format!(
                "malformed international designator {s:?}"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for InternationalDesignator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for InternationalDesignator {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Launch year and number, `YYNNN`. Satellites sharing one fly as a train.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LaunchGroup(String);

impl LaunchGroup {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for LaunchGroup {
    type Err = VisibilityError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != 5 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(VisibilityError::invalid(format!("malformed launch group {s:?}")));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for LaunchGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SatelliteKind {
    StarlinkTrain,
    Station,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SatelliteRef {
    pub name: String,
    pub designator: InternationalDesignator,
    pub kind: SatelliteKind,
    pub line1: String,
    pub line2: String,
}

/// Satellites by designator and by launch group.
#[derive(Debug, Default, Clone)]
pub struct SatelliteCatalog {
    by_designator: BTreeMap<InternationalDesignator, Arc<SatelliteRef>>,
    by_group: BTreeMap<LaunchGroup, Vec<Arc<SatelliteRef>>>,
}

impl SatelliteCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tle_text(text: &str, kind: SatelliteKind) -> Result<Self> {
        let mut catalog = Self::new();
        catalog.extend_from_tle_text(text, kind)?;
        Ok(catalog)
    }

    /// Adds every element set in `text` (name line optional). Returns the
    /// number of satellites added; entries without a usable designator are
    /// skipped.
    pub fn extend_from_tle_text(&mut self, text: &str, kind: SatelliteKind) -> Result<usize> {
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.trim().is_empty())
            .collect();
        let mut added = 0;
        let mut i = 0;

        while i < lines.len() {
            let (name, line1, line2) = if lines[i].starts_with("1 ") {
                (None, lines[i], lines.get(i + 1).copied())
            } else {
                let Some(&line1) = lines.get(i + 1) else {
                    return Err(VisibilityError::invalid(format!(
                        "dangling TLE name line {:?}",
                        lines[i]
                    )));
                };
                (Some(lines[i].trim()), line1, lines.get(i + 2).copied())
            };

            let Some(line2) = line2.filter(|l| l.starts_with("2 ")) else {
                return Err(VisibilityError::invalid(format!(
                    "TLE line 1 without line 2: {line1:?}"
                )));
            };
            if !line1.starts_with("1 ") {
                return Err(VisibilityError::invalid(format!("expected TLE line 1, got {line1:?}")));
            }
            i += if name.is_some() { 3 } else { 2 };

            let field = line1.get(9..17).unwrap_or("").trim();
            let designator = match field.parse::<InternationalDesignator>() {
                Ok(d) => d,
                Err(_) => {
                    let name = name.unwrap_or("");
                    debug!(name, field, "skipping satellite without designator");
                    continue;
                }
            };

            let name = name.map(str::to_string).unwrap_or_else(|| designator.to_string());
            self.insert(SatelliteRef {
                name,
                designator,
                kind,
                line1: line1.to_string(),
                line2: line2.to_string(),
            });
            added += 1;
        }

        let (total, groups) = (self.len(), self.by_group.len());
        info!(added, ?kind, total, groups, "loaded element sets");
        Ok(added)
    }

    /// Insert or replace by designator; groups stay sorted by designator.
    pub fn insert(&mut self, satellite: SatelliteRef) {
        let satellite = Arc::new(satellite);
        let group = satellite.designator.launch_group();
        let members = self.by_group.entry(group).or_default();
        members.retain(|s| s.designator != satellite.designator);
        let at = members.partition_point(|s| s.designator < satellite.designator);
        members.insert(at, satellite.clone());
        self.by_designator.insert(satellite.designator.clone(), satellite);
    }

    pub fn get(&self, designator: &InternationalDesignator) -> Option<&Arc<SatelliteRef>> {
        self.by_designator.get(designator)
    }

    pub fn group(&self, group: &LaunchGroup) -> &[Arc<SatelliteRef>] {
        self.by_group.get(group).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn groups(&self) -> impl Iterator<Item = (&LaunchGroup, &[Arc<SatelliteRef>])> {
        self.by_group.iter().map(|(g, members)| (g, members.as_slice()))
    }

    pub fn satellites(&self) -> impl Iterator<Item = &Arc<SatelliteRef>> {
        self.by_designator.values()
    }

    pub fn len(&self) -> usize {
        self.by_designator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_designator.is_empty()
    }
}
