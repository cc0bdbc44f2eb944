//! Database models
//!
//! Records owned by one event. Volunteers, shifts and assets are created by the
//! management surfaces; assignments and custody records are written only by
//! the scheduling and check-in services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::required_groups::{deserialize_group_list, RequiredGroups};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volunteer {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub group: Option<String>,
    /// Weekly hour cap; `None` means unlimited
    pub max_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub required_groups: RequiredGroups,
    #[serde(default, deserialize_with = "deserialize_group_list")]
    pub allowed_groups: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_group_list")]
    pub excluded_groups: Vec<String>,
}

impl Shift {
    /// Create a shift, enforcing `end_time > start_time`
    pub fn new(
        event_id: Uuid,
        name: Option<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        required_groups: RequiredGroups,
    ) -> Result<Self> {
        if end_time <= start_time {
            return Err(Error::ShiftInterval {
                shift: name.unwrap_or_default(),
                start: start_time.to_string(),
                end: end_time.to_string(),
            });
        }
        Ok(Self {
            id: Uuid::new_v4(),
            event_id,
            name,
            start_time,
            end_time,
            required_groups,
            allowed_groups: Vec::new(),
            excluded_groups: Vec::new(),
        })
    }

    pub fn duration_hours(&self) -> f64 {
        crate::time::hours_between(self.start_time, self.end_time)
    }

    /// Name for messages and logs
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("Shift at {}", self.start_time.format("%Y-%m-%d %H:%M")),
        }
    }
}

/// Attendance state of an assignment as shown at the kiosk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    /// Neither checked in nor checked out
    Pending,
    /// Checked in, not checked out
    Active,
    /// Checked in at some point and since checked out
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub shift_id: Uuid,
    pub volunteer_id: Uuid,
    pub checked_in: bool,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub checked_out_at: Option<DateTime<Utc>>,
    pub late_dismissed: bool,
    /// Row version for compare-and-swap updates
    pub version: i64,
}

impl Assignment {
    pub fn new(shift_id: Uuid, volunteer_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            shift_id,
            volunteer_id,
            checked_in: false,
            checked_in_at: None,
            checked_out_at: None,
            late_dismissed: false,
            version: 0,
        }
    }

    pub fn attendance(&self) -> AttendanceStatus {
        match (self.checked_in, self.checked_out_at) {
            (true, None) => AttendanceStatus::Active,
            (checked_in, Some(_)) if checked_in || self.checked_in_at.is_some() => {
                AttendanceStatus::Completed
            }
            _ => AttendanceStatus::Pending,
        }
    }

    pub fn is_active(&self) -> bool {
        self.attendance() == AttendanceStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    Available,
    Assigned,
    Maintenance,
    Lost,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Available => "available",
            AssetStatus::Assigned => "assigned",
            AssetStatus::Maintenance => "maintenance",
            AssetStatus::Lost => "lost",
        }
    }
}

impl std::str::FromStr for AssetStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "available" => Ok(AssetStatus::Available),
            "assigned" => Ok(AssetStatus::Assigned),
            "maintenance" => Ok(AssetStatus::Maintenance),
            "lost" => Ok(AssetStatus::Lost),
            other => Err(Error::malformed("asset status", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub category: String,
    pub identifier: Option<String>,
    pub status: AssetStatus,
    /// Current holder while `status == Assigned`
    pub volunteer_id: Option<Uuid>,
    pub version: i64,
}

/// Open-ended loan of one asset to one volunteer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustodyRecord {
    pub id: Uuid,
    pub asset_id: Uuid,
    pub volunteer_id: Uuid,
    pub checked_out_at: DateTime<Utc>,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl CustodyRecord {
    pub fn is_open(&self) -> bool {
        self.checked_in_at.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    CheckIn,
    CheckOut,
    AssetOut,
    AssetIn,
    LateWarning,
    AutoAssign,
    AssignmentChange,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::CheckIn => "check_in",
            ActivityKind::CheckOut => "check_out",
            ActivityKind::AssetOut => "asset_out",
            ActivityKind::AssetIn => "asset_in",
            ActivityKind::LateWarning => "late_warning",
            ActivityKind::AutoAssign => "auto_assign",
            ActivityKind::AssignmentChange => "assignment_change",
        }
    }
}

impl std::str::FromStr for ActivityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "check_in" => Ok(ActivityKind::CheckIn),
            "check_out" => Ok(ActivityKind::CheckOut),
            "asset_out" => Ok(ActivityKind::AssetOut),
            "asset_in" => Ok(ActivityKind::AssetIn),
            "late_warning" => Ok(ActivityKind::LateWarning),
            "auto_assign" => Ok(ActivityKind::AutoAssign),
            "assignment_change" => Ok(ActivityKind::AssignmentChange),
            other => Err(Error::malformed("activity type", other)),
        }
    }
}

/// Immutable audit trail entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub event_id: Uuid,
    pub kind: ActivityKind,
    pub description: String,
    pub volunteer_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Activity entry before it is persisted
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub event_id: Uuid,
    pub kind: ActivityKind,
    pub description: String,
    pub volunteer_id: Option<Uuid>,
    pub metadata: serde_json::Value,
}

impl NewActivity {
    pub fn new(event_id: Uuid, kind: ActivityKind, description: impl Into<String>) -> Self {
        Self {
            event_id,
            kind,
            description: description.into(),
            volunteer_id: None,
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn volunteer(mut self, volunteer_id: Uuid) -> Self {
        self.volunteer_id = Some(volunteer_id);
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Assignment joined with its resolved volunteer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub assignment: Assignment,
    pub volunteer: Volunteer,
}

/// Shift with its embedded assignments, the unit the conflict pass works on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftRoster {
    pub shift: Shift,
    pub assignments: Vec<RosterEntry>,
}
