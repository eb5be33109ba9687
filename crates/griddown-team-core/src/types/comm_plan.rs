//! Shared radio communication plan

use serde::{Deserialize, Serialize};

/// How often a check-in repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckInFrequency {
    #[default]
    Daily,
    Hourly,
    Once,
}

impl std::str::FromStr for CheckInFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(CheckInFrequency::Daily),
            "hourly" => Ok(CheckInFrequency::Hourly),
            "once" => Ok(CheckInFrequency::Once),
            other => Err(format!("unknown check-in frequency: {}", other)),
        }
    }
}

/// A scheduled radio check-in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckIn {
    /// Local time, "HH:MM"
    pub time: String,
    #[serde(default)]
    pub frequency: CheckInFrequency,
    /// Calendar date for one-off check-ins
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommPlan {
    pub primary_frequency: Option<String>,
    pub backup_frequency: Option<String>,
    pub check_in_times: Vec<CheckIn>,
    pub emergency_word: Option<String>,
    pub all_clear_word: Option<String>,
}
