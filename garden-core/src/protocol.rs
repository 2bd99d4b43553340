//! Wire frame taxonomy (spec §6) — every JSON message shape the broker
//! accepts from, or emits to, clients and controllers. Wire tokens are
//! the literal ones named in the frame taxonomy, not a regularized
//! transformation of the Rust variant name, since the two vocabularies
//! don't always agree on word order (`CREATE_GARDEN`, not `GARDEN_CREATE`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{GardenId, PlantId, Schedule};

/// Inbound frames a client connection can send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientRequest {
    #[serde(rename = "HELLO_USER")]
    HelloUser { email: String },
    #[serde(rename = "LOGIN")]
    Login { email: String, token: Option<String> },

    #[serde(rename = "CREATE_GARDEN")]
    CreateGarden { name: String, country: String, city: String, max_members: Option<i32> },
    #[serde(rename = "GET_USER_GARDENS")]
    GetUserGardens,
    #[serde(rename = "GET_GARDEN_DETAILS")]
    GetGardenDetails { garden_id: GardenId },
    #[serde(rename = "SEARCH_GARDEN_BY_CODE")]
    SearchGardenByCode { invite_code: String },
    #[serde(rename = "JOIN_GARDEN")]
    JoinGarden { invite_code: String },
    #[serde(rename = "GET_GARDEN_MEMBERS")]
    GetGardenMembers { garden_id: GardenId },
    #[serde(rename = "LEAVE_GARDEN")]
    LeaveGarden { garden_id: GardenId },
    #[serde(rename = "UPDATE_GARDEN")]
    UpdateGarden {
        garden_id: GardenId,
        name: Option<String>,
        country: Option<String>,
        city: Option<String>,
        max_members: Option<i32>,
    },

    #[serde(rename = "ADD_PLANT")]
    AddPlant {
        garden_id: GardenId,
        name: String,
        ideal_moisture_pct: f64,
        water_limit_liters: f64,
        dripper_type: String,
        schedule: Option<Schedule>,
    },
    #[serde(rename = "UPDATE_PLANT_DETAILS")]
    UpdatePlantDetails {
        plant_id: PlantId,
        name: Option<String>,
        ideal_moisture_pct: Option<f64>,
        water_limit_liters: Option<f64>,
        dripper_type: Option<String>,
    },
    #[serde(rename = "DELETE_PLANT")]
    DeletePlant { plant_id: PlantId },
    #[serde(rename = "UPDATE_PLANT_SCHEDULE")]
    UpdatePlantSchedule { plant_id: PlantId, schedule: Schedule },

    #[serde(rename = "IRRIGATE_PLANT")]
    IrrigatePlant { plant_id: PlantId },
    #[serde(rename = "STOP_IRRIGATION")]
    StopIrrigation { plant_id: PlantId },
    #[serde(rename = "OPEN_VALVE")]
    OpenValve { plant_id: PlantId, minutes: u32 },
    #[serde(rename = "CLOSE_VALVE")]
    CloseValve { plant_id: PlantId },
    #[serde(rename = "RESTART_VALVE")]
    RestartValve { plant_id: PlantId },
    #[serde(rename = "GET_VALVE_STATUS")]
    GetValveStatus { plant_id: PlantId },
    #[serde(rename = "UNBLOCK_VALVE")]
    UnblockValve { plant_id: PlantId },
    #[serde(rename = "TEST_VALVE_BLOCK")]
    TestValveBlock { plant_id: PlantId },
    #[serde(rename = "GET_IRRIGATION_RESULT")]
    GetIrrigationResult { plant_id: PlantId },

    #[serde(rename = "GET_PLANT_MOISTURE")]
    GetPlantMoisture { plant_id: PlantId },
    #[serde(rename = "GET_ALL_MOISTURE")]
    GetAllMoisture { garden_id: GardenId },
}

/// Inbound frames a controller connection can send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ControllerRequest {
    #[serde(rename = "HELLO_PI")]
    HelloPi,
    #[serde(rename = "PI_CONNECT")]
    PiConnect { family_code: String },
    #[serde(rename = "PING")]
    Ping,

    #[serde(rename = "SENSOR_ASSIGNED")]
    SensorAssigned { plant_id: PlantId, sensor_port: i32 },
    #[serde(rename = "VALVE_ASSIGNED")]
    ValveAssigned { plant_id: PlantId, valve_id: i32 },
    #[serde(rename = "ADD_PLANT_RESPONSE")]
    AddPlantResponse {
        status: String,
        plant_id: PlantId,
        sensor_port: Option<i32>,
        assigned_valve: Option<i32>,
        error_message: Option<String>,
    },
    #[serde(rename = "UPDATE_PLANT_RESPONSE")]
    UpdatePlantResponse { success: bool, plant_id: PlantId, message: Option<String> },
    #[serde(rename = "REMOVE_PLANT_RESPONSE")]
    RemovePlantResponse { status: String, plant_id: PlantId },

    #[serde(rename = "IRRIGATION_DECISION")]
    IrrigationDecision {
        plant_id: PlantId,
        session_id: Option<String>,
        will_irrigate: bool,
        current: Option<f64>,
        target: Option<f64>,
        gap: Option<f64>,
        reason: Option<String>,
    },
    /// A scheduled (non-client-initiated) irrigation run starting on its own,
    /// with no preceding `IRRIGATION_DECISION` on this channel.
    #[serde(rename = "IRRIGATION_STARTED")]
    IrrigationStarted { plant_id: PlantId, session_id: Option<String> },
    #[serde(rename = "IRRIGATION_PROGRESS")]
    IrrigationProgress {
        plant_id: PlantId,
        session_id: Option<String>,
        stage: Option<String>,
        pulse: Option<u32>,
        current: Option<f64>,
        target: Option<f64>,
        total_water: Option<f64>,
    },
    #[serde(rename = "IRRIGATE_PLANT_RESPONSE")]
    IrrigatePlantResponse {
        plant_id: PlantId,
        session_id: Option<String>,
        status: String,
        moisture: Option<f64>,
        final_moisture: Option<f64>,
        water_added_liters: Option<f64>,
        error_message: Option<String>,
    },
    #[serde(rename = "STOP_IRRIGATION_RESPONSE")]
    StopIrrigationResponse { plant_id: PlantId },

    #[serde(rename = "OPEN_VALVE_RESPONSE")]
    OpenValveResponse { plant_id: PlantId, status: String, time_minutes: Option<u32> },
    #[serde(rename = "CLOSE_VALVE_RESPONSE")]
    CloseValveResponse { plant_id: PlantId, status: String },
    #[serde(rename = "RESTART_VALVE_RESPONSE")]
    RestartValveResponse { plant_id: PlantId, status: String },
    #[serde(rename = "VALVE_STATUS_RESPONSE")]
    ValveStatusResponse { plant_id: PlantId, blocked: bool },

    #[serde(rename = "PLANT_MOISTURE_RESPONSE")]
    PlantMoistureResponse { plant_id: PlantId, status: String, moisture: Option<f64>, temperature: Option<f64> },
    #[serde(rename = "ALL_MOISTURE_RESPONSE")]
    AllMoistureResponse { garden_id: GardenId, readings: Vec<MoistureSample> },

    #[serde(rename = "CHECK_POWER_SUPPLY_RESPONSE")]
    CheckPowerSupplyResponse { plant_id: PlantId, status: String, message: Option<String> },
    #[serde(rename = "CHECK_SENSOR_CONNECTION_RESPONSE")]
    CheckSensorConnectionResponse { plant_id: PlantId, status: String, message: Option<String> },
    #[serde(rename = "CHECK_VALVE_MECHANISM_RESPONSE")]
    CheckValveMechanismResponse { plant_id: PlantId, status: String, message: Option<String> },

    #[serde(rename = "PI_LOG")]
    PiLog { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoistureSample {
    pub plant_id: PlantId,
    pub moisture: f64,
}

/// Build the standard `{ "type": "<NAME>", "data": <payload> }` envelope.
pub fn envelope(type_name: &str, data: Value) -> Value {
    serde_json::json!({ "type": type_name, "data": data })
}

/// Build a `*_FAIL`-shaped error envelope. `op` is the wire token of the
/// request that failed (spec §7); callers that have no specific operation
/// in scope (malformed frames, dispatch-level rejections) pass `None` and
/// get the generic `ERROR` envelope instead.
pub fn error_envelope(op: Option<&str>, error: &crate::error::BrokerError) -> Value {
    let type_name = match op {
        Some(op) => format!("{op}_FAIL"),
        None => "ERROR".to_string(),
    };
    envelope(
        &type_name,
        serde_json::json!({
            "code": error.code(),
            "reason": error.reason(),
        }),
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct MembershipView {
    pub user_id: crate::domain::UserId,
    pub email: String,
    pub display_name: String,
    pub role: crate::domain::MembershipRole,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_user_deserializes_from_tagged_envelope() {
        let raw = serde_json::json!({
            "type": "HELLO_USER",
            "data": { "email": "a@b.com" }
        });
        let req: ClientRequest = serde_json::from_value(raw).unwrap();
        matches!(req, ClientRequest::HelloUser { .. });
    }

    #[test]
    fn unknown_type_fails_to_deserialize() {
        let raw = serde_json::json!({ "type": "NOT_A_REAL_TYPE", "data": {} });
        assert!(serde_json::from_value::<ClientRequest>(raw).is_err());
    }

    #[test]
    fn error_envelope_uses_op_fail_when_op_known() {
        let err = crate::error::BrokerError::ValveBlocked;
        let env = error_envelope(Some("IRRIGATE_PLANT"), &err);
        assert_eq!(env["type"], "IRRIGATE_PLANT_FAIL");
        assert_eq!(env["data"]["code"], "VALVE_BLOCKED");
    }

    #[test]
    fn error_envelope_falls_back_to_generic_error() {
        let err = crate::error::BrokerError::InvalidJson;
        let env = error_envelope(None, &err);
        assert_eq!(env["type"], "ERROR");
    }
}
