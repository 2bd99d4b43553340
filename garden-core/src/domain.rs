//! Persisted entity shapes — mirrors the tables described in spec §3/§6.

use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type GardenId = i64;
pub type PlantId = i64;
pub type EventId = i64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub location_country: Option<String>,
    pub location_city: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipRole {
    Admin,
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Garden {
    pub id: GardenId,
    pub name: String,
    pub admin_user_id: UserId,
    pub invite_code: String,
    pub country: String,
    pub city: String,
    pub active: bool,
    pub max_members: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: UserId,
    pub garden_id: GardenId,
    pub role: MembershipRole,
    pub active: bool,
    pub joined_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrrigationMode {
    None,
    Smart,
    Manual,
}

impl Default for IrrigationMode {
    fn default() -> Self {
        IrrigationMode::None
    }
}

/// Per-plant irrigation state (spec §3's `IrrigationState`, §4.4).
///
/// Invariant: `mode == None` iff `session_id.is_none() && end_at.is_none()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IrrigationState {
    pub mode: IrrigationMode,
    pub start_at: Option<chrono::DateTime<chrono::Utc>>,
    pub end_at: Option<chrono::DateTime<chrono::Utc>>,
    pub session_id: Option<String>,
}

impl IrrigationState {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn smart(start_at: chrono::DateTime<chrono::Utc>, session_id: String) -> Self {
        Self {
            mode: IrrigationMode::Smart,
            start_at: Some(start_at),
            end_at: None,
            session_id: Some(session_id),
        }
    }

    pub fn manual(start_at: chrono::DateTime<chrono::Utc>, end_at: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            mode: IrrigationMode::Manual,
            start_at: Some(start_at),
            end_at: Some(end_at),
            session_id: None,
        }
    }

    /// Check the invariant from spec §8: `mode=none ⇔ (sessionId=null ∧ endAt=null)`.
    pub fn is_consistent(&self) -> bool {
        match self.mode {
            IrrigationMode::None => self.session_id.is_none() && self.end_at.is_none(),
            IrrigationMode::Smart => self.end_at.is_none(),
            IrrigationMode::Manual => self.session_id.is_none() && self.end_at.is_some(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub days: Vec<String>,
    pub time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plant {
    pub id: PlantId,
    pub garden_id: GardenId,
    pub user_id: UserId,
    pub name: String,
    pub ideal_moisture_pct: f64,
    pub water_limit_liters: f64,
    pub dripper_type: String,
    pub schedule: Option<Schedule>,
    pub sensor_port: Option<i32>,
    pub valve_id: Option<i32>,
    pub valve_blocked: bool,
    pub version: i64,
    pub irrigation: IrrigationState,
}

impl Plant {
    /// A plant is hardware-ready once the controller has assigned both a
    /// sensor port and a valve id (spec §8's `GARDEN_SYNC` boundary behavior).
    pub fn is_hardware_assigned(&self) -> bool {
        self.sensor_port.is_some() && self.valve_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrrigationEventStatus {
    Done,
    Skipped,
    Stopped,
    Cancelled,
    Error,
    ValveOpened,
    ValveClosed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrrigationEvent {
    pub id: EventId,
    pub plant_id: PlantId,
    pub status: IrrigationEventStatus,
    pub reason: Option<String>,
    pub initial_moisture: Option<f64>,
    pub final_moisture: Option<f64>,
    pub liters: Option<f64>,
    pub hardware_time: Option<chrono::DateTime<chrono::Utc>>,
    pub extra: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIrrigationEvent {
    pub plant_id: PlantId,
    pub status: IrrigationEventStatus,
    pub reason: Option<String>,
    pub initial_moisture: Option<f64>,
    pub final_moisture: Option<f64>,
    pub liters: Option<f64>,
    pub hardware_time: Option<chrono::DateTime<chrono::Utc>>,
    pub extra: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_state_is_consistent() {
        assert!(IrrigationState::none().is_consistent());
    }

    #[test]
    fn smart_state_is_consistent() {
        let s = IrrigationState::smart(chrono::Utc::now(), "sess-1".into());
        assert!(s.is_consistent());
        assert!(s.end_at.is_none());
    }

    #[test]
    fn manual_state_is_consistent() {
        let now = chrono::Utc::now();
        let s = IrrigationState::manual(now, now + chrono::Duration::minutes(5));
        assert!(s.is_consistent());
    }

    #[test]
    fn hardware_assignment_requires_both_fields() {
        let mut plant = sample_plant();
        assert!(!plant.is_hardware_assigned());
        plant.sensor_port = Some(1);
        assert!(!plant.is_hardware_assigned());
        plant.valve_id = Some(2);
        assert!(plant.is_hardware_assigned());
    }

    fn sample_plant() -> Plant {
        Plant {
            id: 1,
            garden_id: 1,
            user_id: 1,
            name: "Tomato".into(),
            ideal_moisture_pct: 60.0,
            water_limit_liters: 1.2,
            dripper_type: "drip".into(),
            schedule: None,
            sensor_port: None,
            valve_id: None,
            valve_blocked: false,
            version: 1,
            irrigation: IrrigationState::none(),
        }
    }
}
