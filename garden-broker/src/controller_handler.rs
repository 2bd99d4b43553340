//! Controller message dispatch (spec §4.6) — implements the per-plant
//! irrigation state machine (`none -> smart|manual -> none`) as responses
//! stream back from garden hardware.

use chrono::Utc;
use garden_core::broadcaster::GardenBroadcaster;
use garden_core::channel::ChannelHandle;
use garden_core::domain::{IrrigationState, NewIrrigationEvent};
use garden_core::error::BrokerError;
use garden_core::protocol::{envelope, ControllerRequest};
use serde_json::json;
use tracing::warn;

use crate::broker::Broker;

pub async fn handle_text(broker: &Broker, handle: &ChannelHandle, text: &str) -> Result<(), BrokerError> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(|_| BrokerError::InvalidJson)?;
    let type_name = value
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let request: ControllerRequest = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(_) => return Err(BrokerError::UnknownType(type_name)),
    };

    let result = match request {
        ControllerRequest::HelloPi => {
            handle.send(envelope("HELLO_PI_SUCCESS", json!({})));
            Ok(())
        }
        ControllerRequest::PiConnect { family_code } => pi_connect(broker, handle, &family_code).await,
        ControllerRequest::Ping => {
            if let Some(garden_id) = garden_for_channel(broker, handle).await {
                broker.registry.heartbeat(garden_id).await;
            }
            handle.send(envelope("PONG", json!({})));
            Ok(())
        }

        ControllerRequest::SensorAssigned { plant_id, sensor_port } => {
            partial_assignment(broker, plant_id, Some(sensor_port), None).await
        }
        ControllerRequest::ValveAssigned { plant_id, valve_id } => {
            partial_assignment(broker, plant_id, None, Some(valve_id)).await
        }
        ControllerRequest::AddPlantResponse { status, plant_id, sensor_port, assigned_valve, error_message } => {
            add_plant_response(broker, plant_id, &status, sensor_port, assigned_valve, error_message).await
        }
        ControllerRequest::UpdatePlantResponse { success, plant_id, message } => {
            update_plant_response(broker, plant_id, success, message).await
        }
        ControllerRequest::RemovePlantResponse { status, plant_id } => {
            remove_plant_response(broker, plant_id, &status).await
        }

        ControllerRequest::IrrigationDecision { plant_id, session_id, will_irrigate, current, target, gap, reason } => {
            irrigation_decision(broker, plant_id, session_id, will_irrigate, current, target, gap, reason).await
        }
        ControllerRequest::IrrigationStarted { plant_id, session_id } => {
            irrigation_started(broker, plant_id, session_id).await
        }
        ControllerRequest::IrrigationProgress { plant_id, session_id, stage, pulse, current, target, total_water } => {
            irrigation_progress(broker, plant_id, session_id, stage, pulse, current, target, total_water).await
        }
        ControllerRequest::IrrigatePlantResponse {
            plant_id, session_id, status, moisture, final_moisture, water_added_liters, error_message,
        } => {
            irrigate_plant_response(
                broker, plant_id, session_id, &status, moisture, final_moisture, water_added_liters, error_message,
            )
            .await
        }
        ControllerRequest::StopIrrigationResponse { plant_id } => stop_irrigation_response(broker, plant_id).await,

        ControllerRequest::OpenValveResponse { plant_id, status, time_minutes } => {
            open_valve_response(broker, plant_id, &status, time_minutes).await
        }
        ControllerRequest::CloseValveResponse { plant_id, status } => {
            close_valve_response(broker, plant_id, &status).await
        }
        ControllerRequest::RestartValveResponse { plant_id, status } => {
            restart_valve_response(broker, plant_id, &status).await
        }
        ControllerRequest::ValveStatusResponse { plant_id, blocked } => {
            valve_status_response(broker, plant_id, blocked).await
        }

        ControllerRequest::PlantMoistureResponse { plant_id, status, moisture, temperature } => {
            plant_moisture_response(broker, plant_id, &status, moisture, temperature).await
        }
        ControllerRequest::AllMoistureResponse { garden_id, readings } => {
            all_moisture_response(broker, garden_id, readings).await
        }

        ControllerRequest::CheckPowerSupplyResponse { plant_id, status, message } => {
            pass_through(broker, plant_id, "CHECK_POWER_SUPPLY_RESPONSE", status, message).await
        }
        ControllerRequest::CheckSensorConnectionResponse { plant_id, status, message } => {
            pass_through(broker, plant_id, "CHECK_SENSOR_CONNECTION_RESPONSE", status, message).await
        }
        ControllerRequest::CheckValveMechanismResponse { plant_id, status, message } => {
            pass_through(broker, plant_id, "CHECK_VALVE_MECHANISM_RESPONSE", status, message).await
        }

        ControllerRequest::PiLog { message } => {
            tracing::info!(pi_log = %message, "controller forensic log");
            Ok(())
        }
    };

    result
}

async fn garden_for_channel(broker: &Broker, handle: &ChannelHandle) -> Option<i64> {
    broker.registry.garden_by_channel(handle.id()).await
}

async fn plant_garden(broker: &Broker, plant_id: i64) -> Result<i64, BrokerError> {
    broker
        .db
        .find_plant(plant_id)
        .await
        .map_err(BrokerError::Storage)?
        .ok_or(BrokerError::PlantNotFound)
        .map(|p| p.garden_id)
}

async fn notify(broker: &Broker, email: &str, frame: serde_json::Value) {
    if let Some(channel) = broker.registry.channel_by_email(email).await {
        channel.send(frame);
    }
}

async fn pi_connect(broker: &Broker, handle: &ChannelHandle, family_code: &str) -> Result<(), BrokerError> {
    let garden = broker
        .db
        .find_garden_by_invite_code(family_code)
        .await
        .map_err(BrokerError::Storage)?
        .ok_or(BrokerError::GardenNotFound)?;

    broker.registry.bind_controller(garden.id, handle.clone()).await;
    let plants = broker.db.list_plants_for_garden(garden.id).await.map_err(BrokerError::Storage)?;
    handle.send(envelope("GARDEN_SYNC", json!({ "garden": garden, "plants": plants })));
    Ok(())
}

async fn partial_assignment(
    broker: &Broker,
    plant_id: i64,
    sensor_port: Option<i32>,
    valve_id: Option<i32>,
) -> Result<(), BrokerError> {
    let garden_id = plant_garden(broker, plant_id).await?;
    let emails = broker.db.member_emails(garden_id).await.map_err(BrokerError::Storage)?;
    let (type_name, payload) = match (sensor_port, valve_id) {
        (Some(port), _) => ("SENSOR_ASSIGNED", json!({ "plant_id": plant_id, "sensor_port": port })),
        (_, Some(valve)) => ("VALVE_ASSIGNED", json!({ "plant_id": plant_id, "valve_id": valve })),
        _ => return Ok(()),
    };
    GardenBroadcaster::new(&broker.registry)
        .broadcast(&emails, envelope(type_name, payload), None)
        .await;
    Ok(())
}

async fn add_plant_response(
    broker: &Broker,
    plant_id: i64,
    status: &str,
    sensor_port: Option<i32>,
    assigned_valve: Option<i32>,
    error_message: Option<String>,
) -> Result<(), BrokerError> {
    let Some(ctx) = broker.pending.hardware_assignment.complete(&plant_id).await else {
        warn!(plant_id, "ADD_PLANT_RESPONSE with no matching pending request");
        return Ok(());
    };

    let garden_id = plant_garden(broker, plant_id).await?;
    let emails = broker.db.member_emails(garden_id).await.map_err(BrokerError::Storage)?;
    let broadcaster = GardenBroadcaster::new(&broker.registry);

    if status == "success" {
        if let (Some(port), Some(valve)) = (sensor_port, assigned_valve) {
            broker.db.assign_hardware(plant_id, port, valve).await.map_err(BrokerError::Storage)?;
        }
        let plant = broker.db.find_plant(plant_id).await.map_err(BrokerError::Storage)?;
        notify(broker, &ctx.email, envelope("ADD_PLANT_SUCCESS", json!({ "plant": plant }))).await;
        broadcaster
            .broadcast(&emails, envelope("PLANT_ADDED_TO_GARDEN", json!({ "plant": plant })), None)
            .await;
    } else {
        broker.db.delete_plant(plant_id).await.map_err(BrokerError::Storage)?;
        notify(
            broker,
            &ctx.email,
            envelope("ADD_PLANT_FAIL", json!({ "plant_id": plant_id, "reason": error_message })),
        )
        .await;
    }
    Ok(())
}

async fn update_plant_response(
    broker: &Broker,
    plant_id: i64,
    success: bool,
    message: Option<String>,
) -> Result<(), BrokerError> {
    let Some(ctx) = broker.pending.update.complete(&plant_id).await else {
        return Ok(());
    };
    let frame = if success {
        envelope("UPDATE_PLANT_DETAILS_SUCCESS", json!({ "plant_id": plant_id }))
    } else {
        envelope("UPDATE_PLANT_DETAILS_FAIL", json!({ "plant_id": plant_id, "reason": message }))
    };
    notify(broker, &ctx.email, frame).await;
    Ok(())
}

async fn remove_plant_response(broker: &Broker, plant_id: i64, status: &str) -> Result<(), BrokerError> {
    let Some(ctx) = broker.pending.deletion.complete(&plant_id).await else {
        warn!(plant_id, "REMOVE_PLANT_RESPONSE with no matching pending request");
        return Ok(());
    };
    let garden_id = ctx.snapshot.get("garden_id").and_then(|v| v.as_i64());

    if status == "success" {
        broker.db.delete_plant(plant_id).await.map_err(BrokerError::Storage)?;
        notify(broker, &ctx.email, envelope("DELETE_PLANT_SUCCESS", json!({ "plant_id": plant_id }))).await;
        if let Some(garden_id) = garden_id {
            let emails = broker.db.member_emails(garden_id).await.map_err(BrokerError::Storage)?;
            GardenBroadcaster::new(&broker.registry)
                .broadcast(
                    &emails,
                    envelope("PLANT_DELETED_FROM_GARDEN", json!({ "plant_id": plant_id })),
                    None,
                )
                .await;
        }
    } else {
        notify(broker, &ctx.email, envelope("DELETE_PLANT_FAIL", json!({ "plant_id": plant_id }))).await;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn irrigation_decision(
    broker: &Broker,
    plant_id: i64,
    session_id: Option<String>,
    will_irrigate: bool,
    current: Option<f64>,
    target: Option<f64>,
    gap: Option<f64>,
    reason: Option<String>,
) -> Result<(), BrokerError> {
    let Some(ctx) = broker
        .pending
        .irrigation
        .resolve(Some(plant_id), session_id.as_deref())
        .await
    else {
        warn!(plant_id, "IRRIGATION_DECISION with no matching pending request");
        return Ok(());
    };

    if !will_irrigate {
        broker
            .db
            .set_irrigation_state(plant_id, &IrrigationState::none())
            .await
            .map_err(BrokerError::Storage)?;
        let event = NewIrrigationEvent {
            plant_id,
            status: garden_core::domain::IrrigationEventStatus::Skipped,
            reason: reason.clone(),
            initial_moisture: current,
            final_moisture: None,
            liters: None,
            hardware_time: Some(Utc::now()),
            extra: None,
        };
        broker.db.record_irrigation_event(&event).await.map_err(BrokerError::Storage)?;

        notify(
            broker,
            &ctx.email,
            envelope(
                "IRRIGATION_DECISION",
                json!({ "plant_id": plant_id, "will_irrigate": will_irrigate, "current": current, "target": target, "gap": gap, "reason": reason }),
            ),
        )
        .await;
    } else {
        broker
            .db
            .set_irrigation_state(plant_id, &IrrigationState::smart(Utc::now(), session_id.clone().unwrap_or_default()))
            .await
            .map_err(BrokerError::Storage)?;

        notify(
            broker,
            &ctx.email,
            envelope(
                "IRRIGATION_STARTED",
                json!({ "plant_id": plant_id, "current": current, "target": target, "gap": gap }),
            ),
        )
        .await;

        let garden_id = plant_garden(broker, plant_id).await?;
        let emails = broker.db.member_emails(garden_id).await.map_err(BrokerError::Storage)?;
        GardenBroadcaster::new(&broker.registry)
            .broadcast(&emails, envelope("GARDEN_IRRIGATION_STARTED", json!({ "plant_id": plant_id })), None)
            .await;
    }

    // Keep the session alive for progress/result frames that follow an
    // acceptance; a rejection already cleared it above via `resolve`.
    if will_irrigate {
        if let Some(sid) = session_id {
            broker.pending.irrigation.register_by_session(sid, ctx).await;
        } else {
            broker.pending.irrigation.register_by_plant(plant_id, ctx).await;
        }
    }
    Ok(())
}

/// A scheduled irrigation run starting with no preceding `IRRIGATION_DECISION`
/// on this channel (spec §4.6's "Reentry" case).
async fn irrigation_started(broker: &Broker, plant_id: i64, session_id: Option<String>) -> Result<(), BrokerError> {
    broker
        .db
        .set_irrigation_state(plant_id, &IrrigationState::smart(Utc::now(), session_id.clone().unwrap_or_default()))
        .await
        .map_err(BrokerError::Storage)?;

    let garden_id = plant_garden(broker, plant_id).await?;
    let emails = broker.db.member_emails(garden_id).await.map_err(BrokerError::Storage)?;
    GardenBroadcaster::new(&broker.registry)
        .broadcast(&emails, envelope("GARDEN_IRRIGATION_STARTED", json!({ "plant_id": plant_id })), None)
        .await;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn irrigation_progress(
    broker: &Broker,
    plant_id: i64,
    session_id: Option<String>,
    stage: Option<String>,
    pulse: Option<u32>,
    current: Option<f64>,
    target: Option<f64>,
    total_water: Option<f64>,
) -> Result<(), BrokerError> {
    if let Some(sid) = &session_id {
        broker.pending.irrigation.touch_session(sid).await;
    }
    let Some(ctx) = broker.pending.irrigation.peek(Some(plant_id), session_id.as_deref()).await else {
        warn!(plant_id, "IRRIGATION_PROGRESS with no matching pending request");
        return Ok(());
    };
    // Forwarded verbatim to the originator, including the first pulse.
    notify(
        broker,
        &ctx.email,
        envelope(
            "IRRIGATION_PROGRESS",
            json!({ "plant_id": plant_id, "stage": stage, "pulse": pulse, "current": current, "target": target, "total_water": total_water }),
        ),
    )
    .await;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn irrigate_plant_response(
    broker: &Broker,
    plant_id: i64,
    session_id: Option<String>,
    status: &str,
    moisture: Option<f64>,
    final_moisture: Option<f64>,
    water_added_liters: Option<f64>,
    error_message: Option<String>,
) -> Result<(), BrokerError> {
    let ctx = broker
        .pending
        .irrigation
        .resolve(Some(plant_id), session_id.as_deref())
        .await;

    broker
        .db
        .set_irrigation_state(plant_id, &IrrigationState::none())
        .await
        .map_err(BrokerError::Storage)?;

    let garden_id = plant_garden(broker, plant_id).await?;
    let emails = broker.db.member_emails(garden_id).await.map_err(BrokerError::Storage)?;
    let broadcaster = GardenBroadcaster::new(&broker.registry);

    let valve_blocked = status == "error" && classify_valve_blocked(error_message.as_deref());
    let (event_status, reply_type) = match status {
        "success" => (garden_core::domain::IrrigationEventStatus::Done, "IRRIGATE_SUCCESS"),
        "skipped" => (garden_core::domain::IrrigationEventStatus::Skipped, "IRRIGATE_SKIPPED"),
        "cancelled" => (garden_core::domain::IrrigationEventStatus::Cancelled, "IRRIGATION_CANCELLED"),
        "error" if valve_blocked => (garden_core::domain::IrrigationEventStatus::Error, "VALVE_BLOCKED"),
        _ => (garden_core::domain::IrrigationEventStatus::Error, "IRRIGATE_FAIL"),
    };

    let event = NewIrrigationEvent {
        plant_id,
        status: event_status,
        reason: error_message.clone(),
        initial_moisture: moisture,
        final_moisture,
        liters: water_added_liters,
        hardware_time: Some(Utc::now()),
        extra: None,
    };
    broker.db.record_irrigation_event(&event).await.map_err(BrokerError::Storage)?;

    if let Some(ctx) = ctx {
        notify(
            broker,
            &ctx.email,
            envelope(
                reply_type,
                json!({ "plant_id": plant_id, "final_moisture": final_moisture, "water_added_liters": water_added_liters, "reason": error_message }),
            ),
        )
        .await;
    }

    broadcaster
        .broadcast(&emails, envelope("GARDEN_IRRIGATION_STOPPED", json!({ "plant_id": plant_id, "status": status })), None)
        .await;

    if valve_blocked {
        broker.db.set_valve_blocked(plant_id, true).await.map_err(BrokerError::Storage)?;
        broadcaster
            .broadcast(&emails, envelope("GARDEN_VALVE_BLOCKED", json!({ "plant_id": plant_id })), None)
            .await;
    }
    Ok(())
}

/// Hardware reports valve-blocked as an `error` status carrying a specific
/// `error_message`, not as a distinct status token (spec §7).
fn classify_valve_blocked(error_message: Option<&str>) -> bool {
    error_message
        .map(|m| m.contains("water_limit_reached") || m.contains("valve_blocked"))
        .unwrap_or(false)
}

async fn stop_irrigation_response(broker: &Broker, plant_id: i64) -> Result<(), BrokerError> {
    let ctx = broker.pending.irrigation.resolve(Some(plant_id), None).await;
    broker
        .db
        .set_irrigation_state(plant_id, &IrrigationState::none())
        .await
        .map_err(BrokerError::Storage)?;
    let event = NewIrrigationEvent {
        plant_id,
        status: garden_core::domain::IrrigationEventStatus::Stopped,
        reason: None,
        initial_moisture: None,
        final_moisture: None,
        liters: None,
        hardware_time: Some(Utc::now()),
        extra: None,
    };
    broker.db.record_irrigation_event(&event).await.map_err(BrokerError::Storage)?;
    if let Some(ctx) = ctx {
        notify(broker, &ctx.email, envelope("STOP_IRRIGATION_SUCCESS", json!({ "plant_id": plant_id }))).await;
    }
    let garden_id = plant_garden(broker, plant_id).await?;
    let emails = broker.db.member_emails(garden_id).await.map_err(BrokerError::Storage)?;
    GardenBroadcaster::new(&broker.registry)
        .broadcast(&emails, envelope("GARDEN_IRRIGATION_STOPPED", json!({ "plant_id": plant_id })), None)
        .await;
    Ok(())
}

async fn open_valve_response(
    broker: &Broker,
    plant_id: i64,
    status: &str,
    time_minutes: Option<u32>,
) -> Result<(), BrokerError> {
    if status == "success" {
        let now = Utc::now();
        let end_at = now + chrono::Duration::minutes(time_minutes.unwrap_or(0) as i64);
        broker
            .db
            .set_irrigation_state(plant_id, &IrrigationState::manual(now, end_at))
            .await
            .map_err(BrokerError::Storage)?;
        let event = NewIrrigationEvent {
            plant_id,
            status: garden_core::domain::IrrigationEventStatus::ValveOpened,
            reason: None,
            initial_moisture: None,
            final_moisture: None,
            liters: None,
            hardware_time: Some(now),
            extra: None,
        };
        broker.db.record_irrigation_event(&event).await.map_err(BrokerError::Storage)?;
    }
    let garden_id = plant_garden(broker, plant_id).await?;
    let emails = broker.db.member_emails(garden_id).await.map_err(BrokerError::Storage)?;
    GardenBroadcaster::new(&broker.registry)
        .broadcast(
            &emails,
            envelope("OPEN_VALVE_SUCCESS", json!({ "plant_id": plant_id, "status": status, "time_minutes": time_minutes })),
            None,
        )
        .await;
    if status == "success" {
        GardenBroadcaster::new(&broker.registry)
            .broadcast(&emails, envelope("GARDEN_IRRIGATION_STARTED", json!({ "plant_id": plant_id })), None)
            .await;
    }
    Ok(())
}

async fn close_valve_response(broker: &Broker, plant_id: i64, status: &str) -> Result<(), BrokerError> {
    broker
        .db
        .set_irrigation_state(plant_id, &IrrigationState::none())
        .await
        .map_err(BrokerError::Storage)?;
    let event = NewIrrigationEvent {
        plant_id,
        status: garden_core::domain::IrrigationEventStatus::ValveClosed,
        reason: None,
        initial_moisture: None,
        final_moisture: None,
        liters: None,
        hardware_time: Some(Utc::now()),
        extra: None,
    };
    broker.db.record_irrigation_event(&event).await.map_err(BrokerError::Storage)?;
    let garden_id = plant_garden(broker, plant_id).await?;
    let emails = broker.db.member_emails(garden_id).await.map_err(BrokerError::Storage)?;
    GardenBroadcaster::new(&broker.registry)
        .broadcast(&emails, envelope("CLOSE_VALVE_SUCCESS", json!({ "plant_id": plant_id, "status": status })), None)
        .await;
    GardenBroadcaster::new(&broker.registry)
        .broadcast(&emails, envelope("GARDEN_IRRIGATION_STOPPED", json!({ "plant_id": plant_id })), None)
        .await;
    Ok(())
}

async fn restart_valve_response(broker: &Broker, plant_id: i64, status: &str) -> Result<(), BrokerError> {
    let garden_id = plant_garden(broker, plant_id).await?;
    let emails = broker.db.member_emails(garden_id).await.map_err(BrokerError::Storage)?;
    if status == "success" {
        broker.db.set_valve_blocked(plant_id, false).await.map_err(BrokerError::Storage)?;
        GardenBroadcaster::new(&broker.registry)
            .broadcast(&emails, envelope("GARDEN_VALVE_UNBLOCKED", json!({ "plant_id": plant_id })), None)
            .await;
    }
    GardenBroadcaster::new(&broker.registry)
        .broadcast(&emails, envelope("RESTART_VALVE_SUCCESS", json!({ "plant_id": plant_id, "status": status })), None)
        .await;
    Ok(())
}

async fn valve_status_response(broker: &Broker, plant_id: i64, blocked: bool) -> Result<(), BrokerError> {
    broker.db.set_valve_blocked(plant_id, blocked).await.map_err(BrokerError::Storage)?;
    let garden_id = plant_garden(broker, plant_id).await?;
    let emails = broker.db.member_emails(garden_id).await.map_err(BrokerError::Storage)?;
    let broadcaster = GardenBroadcaster::new(&broker.registry);
    if blocked {
        broadcaster
            .broadcast(&emails, envelope("GARDEN_VALVE_BLOCKED", json!({ "plant_id": plant_id })), None)
            .await;
    }
    broadcaster
        .broadcast(
            &emails,
            envelope("VALVE_STATUS_SUCCESS", json!({ "plant_id": plant_id, "blocked": blocked })),
            None,
        )
        .await;
    Ok(())
}

async fn plant_moisture_response(
    broker: &Broker,
    plant_id: i64,
    status: &str,
    moisture: Option<f64>,
    temperature: Option<f64>,
) -> Result<(), BrokerError> {
    if let Some(ctx) = broker.pending.moisture.complete(&plant_id).await {
        notify(
            broker,
            &ctx.email,
            envelope(
                "GET_PLANT_MOISTURE_SUCCESS",
                json!({ "plant_id": plant_id, "status": status, "moisture": moisture, "temperature": temperature }),
            ),
        )
        .await;
    }
    let garden_id = plant_garden(broker, plant_id).await?;
    let emails = broker.db.member_emails(garden_id).await.map_err(BrokerError::Storage)?;
    GardenBroadcaster::new(&broker.registry)
        .broadcast(
            &emails,
            envelope("GARDEN_MOISTURE_UPDATE", json!({ "plant_id": plant_id, "moisture": moisture })),
            None,
        )
        .await;
    Ok(())
}

async fn all_moisture_response(
    broker: &Broker,
    garden_id: i64,
    readings: Vec<garden_core::protocol::MoistureSample>,
) -> Result<(), BrokerError> {
    let emails = broker.db.member_emails(garden_id).await.map_err(BrokerError::Storage)?;
    GardenBroadcaster::new(&broker.registry)
        .broadcast(
            &emails,
            envelope("GARDEN_MOISTURE_UPDATE", json!({ "garden_id": garden_id, "readings": readings })),
            None,
        )
        .await;
    Ok(())
}

async fn pass_through(
    broker: &Broker,
    plant_id: i64,
    type_name: &str,
    status: String,
    message: Option<String>,
) -> Result<(), BrokerError> {
    let garden_id = plant_garden(broker, plant_id).await?;
    let emails = broker.db.member_emails(garden_id).await.map_err(BrokerError::Storage)?;
    GardenBroadcaster::new(&broker.registry)
        .broadcast(
            &emails,
            envelope(type_name, json!({ "plant_id": plant_id, "status": status, "message": message })),
            None,
        )
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn garden_for_channel_is_none_when_unbound() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = ChannelHandle::new(garden_core::channel::ChannelId::next(), tx);
        let registry = garden_core::registry::SessionRegistry::new();
        assert!(registry.garden_by_channel(handle.id()).await.is_none());
    }
}
