//! Device profile and the mutations that may be queued against it

use serde::{Deserialize, Serialize};

/// The single per-device user row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Points earned, mostly by sharing data with nearby devices
    pub points: i64,
    /// Whether this device relays its cached data to peers
    pub is_sharing_mode: bool,
    /// Whether the user opted into the battery-hungry relay role
    pub more_battery_guy: bool,
    /// Unix millis of the last profile write, if any
    pub last_sync: Option<i64>,
}

/// Profile field a pending mutation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileField {
    Points,
    SharingMode,
    MoreBattery,
}

/// A queued, not yet persisted change to the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileMutation {
    /// Cumulative: applied as `points = points + delta` at flush time
    AddPoints(i64),
    SetSharingMode(bool),
    SetMoreBattery(bool),
}

impl ProfileMutation {
    /// The field this mutation writes
    pub fn field(&self) -> ProfileField {
        match self {
            ProfileMutation::AddPoints(_) => ProfileField::Points,
            ProfileMutation::SetSharingMode(_) => ProfileField::SharingMode,
            ProfileMutation::SetMoreBattery(_) => ProfileField::MoreBattery,
        }
    }

    /// Combine with a later mutation of the same field.
    ///
    /// Point deltas add up; flags keep the later value.
    pub fn merge(self, later: ProfileMutation) -> ProfileMutation {
        match (self, later) {
            (ProfileMutation::AddPoints(a), ProfileMutation::AddPoints(b)) => {
                ProfileMutation::AddPoints(a.saturating_add(b))
            }
            (_, later) => later,
        }
    }

    /// Apply this mutation to an in-memory profile
    pub fn apply_to(&self, profile: &mut UserProfile) {
        match *self {
            ProfileMutation::AddPoints(delta) => {
                profile.points = profile.points.saturating_add(delta)
            }
            ProfileMutation::SetSharingMode(on) => profile.is_sharing_mode = on,
            ProfileMutation::SetMoreBattery(on) => profile.more_battery_guy = on,
        }
    }
}
