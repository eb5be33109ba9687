//! Rally points

use serde::{Deserialize, Serialize};

use crate::types::{MemberId, RallyPointId};

/// Upper bound on rally points held by a team
pub const MAX_RALLY_POINTS: usize = 20;

/// Purpose of a rally point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RallyType {
    #[default]
    Primary,
    Secondary,
    Emergency,
    Cache,
    Extraction,
}

impl std::str::FromStr for RallyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(RallyType::Primary),
            "secondary" => Ok(RallyType::Secondary),
            "emergency" => Ok(RallyType::Emergency),
            "cache" => Ok(RallyType::Cache),
            "extraction" => Ok(RallyType::Extraction),
            other => Err(format!("unknown rally type: {}", other)),
        }
    }
}

/// A named meeting or contingency location owned by the team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RallyPoint {
    pub id: RallyPointId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: RallyType,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub notes: String,
    /// Free-form schedule, e.g. "every 6h from 0600"
    #[serde(default)]
    pub schedule: Option<String>,
    pub created_by: MemberId,
    pub created_at: i64,
}

impl RallyPoint {
    /// Create a rally point with a fresh id
    pub fn new(
        name: &str,
        kind: RallyType,
        lat: f64,
        lon: f64,
        created_by: MemberId,
        now: i64,
    ) -> Self {
        Self {
            id: RallyPointId::generate(),
            name: name.to_string(),
            kind,
            lat,
            lon,
            notes: String::new(),
            schedule: None,
            created_by,
            created_at: now,
        }
    }

    /// Attach notes (builder pattern)
    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = notes.to_string();
        self
    }

    /// Attach a schedule (builder pattern)
    pub fn with_schedule(mut self, schedule: &str) -> Self {
        self.schedule = Some(schedule.to_string());
        self
    }
}

/// Field-level edits applied by `update_rally_point`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RallyPointUpdate {
    pub name: Option<String>,
    pub kind: Option<RallyType>,
    pub position: Option<(f64, f64)>,
    pub notes: Option<String>,
    pub schedule: Option<Option<String>>,
}

impl RallyPointUpdate {
    pub(crate) fn apply(self, point: &mut RallyPoint) {
        if let Some(name) = self.name {
            point.name = name;
        }
        if let Some(kind) = self.kind {
            point.kind = kind;
        }
        if let Some((lat, lon)) = self.position {
            point.lat = lat;
            point.lon = lon;
        }
        if let Some(notes) = self.notes {
            point.notes = notes;
        }
        if let Some(schedule) = self.schedule {
            point.schedule = schedule;
        }
    }
}
