//! Client message dispatch (spec §4.5) — one function per request variant,
//! matched through a single compile-time `match` rather than a runtime
//! handler map (spec §9's redesign note).
//!
//! Replies follow the `<REQUEST_TYPE>_SUCCESS` convention; requests that
//! need a controller round trip (`ADD_PLANT`, `DELETE_PLANT`, irrigation,
//! valve commands) instead ack with a `<REQUEST_TYPE>_PENDING` frame and
//! the real outcome arrives later out of `controller_handler`, or a
//! `<REQUEST_TYPE>_SENT` ack for the fire-and-forget valve commands.

use chrono::Utc;
use garden_core::broadcaster::GardenBroadcaster;
use garden_core::channel::ChannelHandle;
use garden_core::domain::{Garden, IrrigationState, MembershipRole, Plant};
use garden_core::error::BrokerError;
use garden_core::invite;
use garden_core::pending::PendingContext;
use garden_core::protocol::{envelope, error_envelope, ClientRequest};
use serde_json::json;

use crate::broker::Broker;

pub async fn handle_text(broker: &Broker, handle: &ChannelHandle, text: &str) -> Result<(), BrokerError> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(|_| BrokerError::InvalidJson)?;
    let type_name = value
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let request: ClientRequest =
        serde_json::from_value(value).map_err(|_| BrokerError::UnknownType(type_name.clone()))?;

    match &request {
        ClientRequest::HelloUser { email } => return handle_hello(broker, handle, email).await,
        ClientRequest::Login { email, .. } => return handle_hello(broker, handle, email).await,
        _ => {}
    }

    let email = match broker.registry.email_by_channel(handle.id()).await {
        Some(email) => email,
        None => {
            handle.send(error_envelope(Some(&type_name), &BrokerError::Unauthorized));
            return Ok(());
        }
    };

    match dispatch(broker, handle, &email, request).await {
        Ok(frame) => handle.send(frame),
        Err(err) => handle.send(error_envelope(Some(&type_name), &err)),
    }
    Ok(())
}

async fn handle_hello(broker: &Broker, handle: &ChannelHandle, email: &str) -> Result<(), BrokerError> {
    let user = match broker
        .db
        .find_user_by_email(email)
        .await
        .map_err(BrokerError::Storage)?
    {
        Some(user) => user,
        None => broker
            .db
            .create_user(email, email)
            .await
            .map_err(BrokerError::Storage)?,
    };

    broker.registry.attach_client(handle.clone(), email).await;

    let gardens = broker
        .db
        .list_gardens_for_user(user.id)
        .await
        .map_err(BrokerError::Storage)?;

    let mut garden_views = Vec::with_capacity(gardens.len());
    for garden in gardens {
        let plants = broker
            .db
            .list_plants_for_garden(garden.id)
            .await
            .map_err(BrokerError::Storage)?;
        garden_views.push(json!({ "garden": garden, "plants": plants }));
    }

    handle.send(envelope(
        "HELLO_USER_SUCCESS",
        json!({ "user": user, "gardens": garden_views }),
    ));
    Ok(())
}

async fn require_membership(
    broker: &Broker,
    email: &str,
    garden_id: i64,
) -> Result<MembershipRole, BrokerError> {
    let members = broker
        .db
        .list_members(garden_id)
        .await
        .map_err(BrokerError::Storage)?;
    members
        .into_iter()
        .find(|(user, _)| user.email.eq_ignore_ascii_case(email))
        .map(|(_, role)| role)
        .ok_or(BrokerError::NotMember)
}

async fn require_plant(broker: &Broker, plant_id: i64) -> Result<Plant, BrokerError> {
    broker
        .db
        .find_plant(plant_id)
        .await
        .map_err(BrokerError::Storage)?
        .ok_or(BrokerError::PlantNotFound)
}

async fn user_already_has_garden(broker: &Broker, user_id: i64) -> Result<bool, BrokerError> {
    let gardens = broker
        .db
        .list_gardens_for_user(user_id)
        .await
        .map_err(BrokerError::Storage)?;
    Ok(!gardens.is_empty())
}

async fn dispatch(
    broker: &Broker,
    handle: &ChannelHandle,
    email: &str,
    request: ClientRequest,
) -> Result<serde_json::Value, BrokerError> {
    match request {
        ClientRequest::HelloUser { .. } | ClientRequest::Login { .. } => {
            unreachable!("handled before dispatch")
        }

        ClientRequest::CreateGarden { name, country, city, max_members } => {
            garden_create(broker, email, name, country, city, max_members).await
        }
        ClientRequest::GetUserGardens => garden_list(broker, email).await,
        ClientRequest::GetGardenDetails { garden_id } => {
            garden_get_details(broker, email, garden_id).await
        }
        ClientRequest::SearchGardenByCode { invite_code } => {
            garden_search_by_code(broker, invite_code).await
        }
        ClientRequest::JoinGarden { invite_code } => {
            garden_join(broker, handle, email, invite_code).await
        }
        ClientRequest::GetGardenMembers { garden_id } => {
            garden_get_members(broker, email, garden_id).await
        }
        ClientRequest::LeaveGarden { garden_id } => {
            garden_leave(broker, handle, email, garden_id).await
        }
        ClientRequest::UpdateGarden { garden_id, name, country, city, max_members } => {
            garden_update(broker, handle, email, garden_id, name, country, city, max_members).await
        }

        ClientRequest::AddPlant {
            garden_id,
            name,
            ideal_moisture_pct,
            water_limit_liters,
            dripper_type,
            schedule,
        } => {
            add_plant(
                broker, handle, email, garden_id, name, ideal_moisture_pct,
                water_limit_liters, dripper_type, schedule,
            )
            .await
        }
        ClientRequest::UpdatePlantDetails {
            plant_id,
            name,
            ideal_moisture_pct,
            water_limit_liters,
            dripper_type,
        } => {
            update_plant_details(
                broker, handle, email, plant_id, name, ideal_moisture_pct,
                water_limit_liters, dripper_type,
            )
            .await
        }
        ClientRequest::DeletePlant { plant_id } => {
            delete_plant(broker, handle, email, plant_id).await
        }
        ClientRequest::UpdatePlantSchedule { plant_id, schedule } => {
            update_plant_schedule(broker, handle, email, plant_id, schedule).await
        }

        ClientRequest::IrrigatePlant { plant_id } => {
            irrigate_plant(broker, handle, email, plant_id).await
        }
        ClientRequest::StopIrrigation { plant_id } => {
            stop_irrigation(broker, handle, email, plant_id).await
        }
        ClientRequest::OpenValve { plant_id, minutes } => {
            forward_valve_command(broker, email, plant_id, "OPEN_VALVE", json!({ "minutes": minutes })).await
        }
        ClientRequest::CloseValve { plant_id } => {
            forward_valve_command(broker, email, plant_id, "CLOSE_VALVE", json!({})).await
        }
        ClientRequest::RestartValve { plant_id } => {
            forward_valve_command(broker, email, plant_id, "RESTART_VALVE", json!({})).await
        }
        ClientRequest::GetValveStatus { plant_id } => {
            forward_valve_command(broker, email, plant_id, "GET_VALVE_STATUS", json!({})).await
        }
        ClientRequest::UnblockValve { plant_id } => unblock_valve(broker, email, plant_id).await,
        ClientRequest::TestValveBlock { plant_id } => {
            forward_valve_command(broker, email, plant_id, "TEST_VALVE_BLOCK", json!({})).await
        }
        ClientRequest::GetIrrigationResult { plant_id } => {
            get_irrigation_result(broker, email, plant_id).await
        }

        ClientRequest::GetPlantMoisture { plant_id } => {
            get_plant_moisture(broker, handle, email, plant_id).await
        }
        ClientRequest::GetAllMoisture { garden_id } => {
            get_all_moisture(broker, email, garden_id).await
        }
    }
}

async fn garden_create(
    broker: &Broker,
    email: &str,
    name: String,
    country: String,
    city: String,
    max_members: Option<i32>,
) -> Result<serde_json::Value, BrokerError> {
    if name.trim().is_empty() {
        return Err(BrokerError::Validation("garden name cannot be empty".into()));
    }
    let user = broker
        .db
        .find_user_by_email(email)
        .await
        .map_err(BrokerError::Storage)?
        .ok_or(BrokerError::UserNotFound)?;

    if user_already_has_garden(broker, user.id).await? {
        return Err(BrokerError::UserAlreadyAdmin);
    }

    let invite_code = invite::generate_unique(20, |candidate| async move {
        broker.db.invite_code_taken(&candidate).await
    })
    .await
    .map_err(BrokerError::Storage)?;

    let garden = broker
        .db
        .create_garden(&name, user.id, &invite_code, &country, &city, max_members.unwrap_or(8))
        .await
        .map_err(BrokerError::Storage)?;

    broker
        .db
        .add_membership(user.id, garden.id, MembershipRole::Admin)
        .await
        .map_err(BrokerError::Storage)?;

    Ok(envelope("CREATE_GARDEN_SUCCESS", json!({ "garden": garden })))
}

async fn garden_list(broker: &Broker, email: &str) -> Result<serde_json::Value, BrokerError> {
    let user = broker
        .db
        .find_user_by_email(email)
        .await
        .map_err(BrokerError::Storage)?
        .ok_or(BrokerError::UserNotFound)?;
    let gardens = broker
        .db
        .list_gardens_for_user(user.id)
        .await
        .map_err(BrokerError::Storage)?;
    Ok(envelope("GET_USER_GARDENS_SUCCESS", json!({ "gardens": gardens })))
}

async fn garden_get_details(
    broker: &Broker,
    email: &str,
    garden_id: i64,
) -> Result<serde_json::Value, BrokerError> {
    require_membership(broker, email, garden_id).await?;
    let garden = broker
        .db
        .find_garden(garden_id)
        .await
        .map_err(BrokerError::Storage)?
        .ok_or(BrokerError::GardenNotFound)?;
    let plants = broker
        .db
        .list_plants_for_garden(garden_id)
        .await
        .map_err(BrokerError::Storage)?;
    Ok(envelope(
        "GET_GARDEN_DETAILS_SUCCESS",
        json!({ "garden": garden, "plants": plants }),
    ))
}

async fn garden_search_by_code(
    broker: &Broker,
    invite_code: String,
) -> Result<serde_json::Value, BrokerError> {
    let garden: Garden = broker
        .db
        .find_garden_by_invite_code(&invite_code)
        .await
        .map_err(BrokerError::Storage)?
        .ok_or(BrokerError::GardenNotFound)?;
    Ok(envelope(
        "SEARCH_GARDEN_BY_CODE_SUCCESS",
        json!({ "name": garden.name, "country": garden.country, "city": garden.city, "invite_code": garden.invite_code }),
    ))
}

async fn garden_join(
    broker: &Broker,
    handle: &ChannelHandle,
    email: &str,
    invite_code: String,
) -> Result<serde_json::Value, BrokerError> {
    let user = broker
        .db
        .find_user_by_email(email)
        .await
        .map_err(BrokerError::Storage)?
        .ok_or(BrokerError::UserNotFound)?;
    if user_already_has_garden(broker, user.id).await? {
        return Err(BrokerError::AlreadyInGarden);
    }
    let garden = broker
        .db
        .find_garden_by_invite_code(&invite_code)
        .await
        .map_err(BrokerError::Storage)?
        .ok_or(BrokerError::GardenNotFound)?;

    let members = broker
        .db
        .list_members(garden.id)
        .await
        .map_err(BrokerError::Storage)?;
    if members.len() as i32 >= garden.max_members {
        return Err(BrokerError::Validation("garden is full".into()));
    }
    if members.iter().any(|(u, _)| u.id == user.id) {
        return Err(BrokerError::UserAlreadyMember);
    }

    broker
        .db
        .add_membership(user.id, garden.id, MembershipRole::Member)
        .await
        .map_err(BrokerError::Storage)?;

    let emails = broker
        .db
        .member_emails(garden.id)
        .await
        .map_err(BrokerError::Storage)?;
    GardenBroadcaster::new(&broker.registry)
        .broadcast(
            &emails,
            envelope("MEMBER_JOINED", json!({ "garden_id": garden.id, "email": user.email })),
            Some(handle.id()),
        )
        .await;

    Ok(envelope("JOIN_GARDEN_SUCCESS", json!({ "garden": garden })))
}

async fn garden_get_members(
    broker: &Broker,
    email: &str,
    garden_id: i64,
) -> Result<serde_json::Value, BrokerError> {
    require_membership(broker, email, garden_id).await?;
    let members = broker
        .db
        .list_members(garden_id)
        .await
        .map_err(BrokerError::Storage)?;
    let views: Vec<_> = members
        .into_iter()
        .map(|(user, role)| json!({ "user": user, "role": role }))
        .collect();
    Ok(envelope("GET_GARDEN_MEMBERS_SUCCESS", json!({ "members": views })))
}

async fn garden_leave(
    broker: &Broker,
    handle: &ChannelHandle,
    email: &str,
    garden_id: i64,
) -> Result<serde_json::Value, BrokerError> {
    let role = require_membership(broker, email, garden_id).await?;
    if role == MembershipRole::Admin {
        return Err(BrokerError::AdminCannotLeave);
    }
    let user = broker
        .db
        .find_user_by_email(email)
        .await
        .map_err(BrokerError::Storage)?
        .ok_or(BrokerError::UserNotFound)?;
    broker
        .db
        .deactivate_membership(user.id, garden_id)
        .await
        .map_err(BrokerError::Storage)?;

    let emails = broker
        .db
        .member_emails(garden_id)
        .await
        .map_err(BrokerError::Storage)?;
    GardenBroadcaster::new(&broker.registry)
        .broadcast(
            &emails,
            envelope("MEMBER_LEFT", json!({ "garden_id": garden_id, "email": email })),
            Some(handle.id()),
        )
        .await;

    Ok(envelope("LEAVE_GARDEN_SUCCESS", json!({ "garden_id": garden_id })))
}

/// Location changes additionally push `UPDATE_PLANT_LOCATION` to the
/// controller for every plant in the garden, best-effort (spec §4.5's
/// "Garden" family).
#[allow(clippy::too_many_arguments)]
async fn garden_update(
    broker: &Broker,
    handle: &ChannelHandle,
    email: &str,
    garden_id: i64,
    name: Option<String>,
    country: Option<String>,
    city: Option<String>,
    max_members: Option<i32>,
) -> Result<serde_json::Value, BrokerError> {
    let role = require_membership(broker, email, garden_id).await?;
    if role != MembershipRole::Admin {
        return Err(BrokerError::Unauthorized);
    }
    let location_changed = country.is_some() || city.is_some();
    let garden = broker
        .db
        .update_garden(garden_id, name.as_deref(), country.as_deref(), city.as_deref(), max_members)
        .await
        .map_err(BrokerError::Storage)?
        .ok_or(BrokerError::GardenNotFound)?;

    let emails = broker
        .db
        .member_emails(garden_id)
        .await
        .map_err(BrokerError::Storage)?;
    GardenBroadcaster::new(&broker.registry)
        .broadcast(
            &emails,
            envelope("GARDEN_UPDATED", json!({ "garden": garden })),
            Some(handle.id()),
        )
        .await;

    if location_changed {
        let plants = broker.db.list_plants_for_garden(garden_id).await.map_err(BrokerError::Storage)?;
        let broadcaster = GardenBroadcaster::new(&broker.registry);
        for plant in &plants {
            broadcaster
                .send_to_controller(
                    garden_id,
                    envelope(
                        "UPDATE_PLANT_LOCATION",
                        json!({ "plant_id": plant.id, "country": garden.country, "city": garden.city }),
                    ),
                )
                .await;
        }
    }

    Ok(envelope("UPDATE_GARDEN_SUCCESS", json!({ "garden": garden })))
}

/// Persists the plant row, then forwards `ADD_PLANT` to the garden's
/// controller and registers a hardware-assignment correlation (spec §4.5).
/// The caller only gets an ack here; `ADD_PLANT_SUCCESS` (or failure)
/// arrives once the controller answers with `ADD_PLANT_RESPONSE`.
#[allow(clippy::too_many_arguments)]
async fn add_plant(
    broker: &Broker,
    handle: &ChannelHandle,
    email: &str,
    garden_id: i64,
    name: String,
    ideal_moisture_pct: f64,
    water_limit_liters: f64,
    dripper_type: String,
    schedule: Option<garden_core::domain::Schedule>,
) -> Result<serde_json::Value, BrokerError> {
    require_membership(broker, email, garden_id).await?;
    let user = broker
        .db
        .find_user_by_email(email)
        .await
        .map_err(BrokerError::Storage)?
        .ok_or(BrokerError::UserNotFound)?;

    if !(0.0..=100.0).contains(&ideal_moisture_pct) {
        return Err(BrokerError::Validation("ideal_moisture_pct must be within 0..=100".into()));
    }

    let plant = Plant {
        id: 0,
        garden_id,
        user_id: user.id,
        name,
        ideal_moisture_pct,
        water_limit_liters,
        dripper_type,
        schedule,
        sensor_port: None,
        valve_id: None,
        valve_blocked: false,
        version: 1,
        irrigation: IrrigationState::none(),
    };
    let plant = broker.db.create_plant(&plant).await.map_err(BrokerError::Storage)?;

    let sent = GardenBroadcaster::new(&broker.registry)
        .send_to_controller(garden_id, envelope("ADD_PLANT", json!({ "plant": plant })))
        .await;
    if sent {
        broker
            .pending
            .hardware_assignment
            .register(
                plant.id,
                PendingContext::new(handle.id(), email, json!({ "plant": plant })),
            )
            .await;
    }

    Ok(envelope(
        "ADD_PLANT_PENDING",
        json!({ "plant": plant, "controller_reachable": sent }),
    ))
}

#[allow(clippy::too_many_arguments)]
async fn update_plant_details(
    broker: &Broker,
    handle: &ChannelHandle,
    email: &str,
    plant_id: i64,
    name: Option<String>,
    ideal_moisture_pct: Option<f64>,
    water_limit_liters: Option<f64>,
    dripper_type: Option<String>,
) -> Result<serde_json::Value, BrokerError> {
    let plant = require_plant(broker, plant_id).await?;
    require_membership(broker, email, plant.garden_id).await?;

    let updated = broker
        .db
        .update_plant_details(
            plant_id,
            plant.version,
            name.as_deref(),
            ideal_moisture_pct,
            water_limit_liters,
            dripper_type.as_deref(),
            None,
        )
        .await
        .map_err(BrokerError::Storage)?
        .ok_or_else(|| BrokerError::Validation("plant was modified concurrently, retry".into()))?;

    let emails = broker.db.member_emails(plant.garden_id).await.map_err(BrokerError::Storage)?;
    GardenBroadcaster::new(&broker.registry)
        .broadcast(&emails, envelope("PLANT_UPDATED", json!({ "plant": updated })), Some(handle.id()))
        .await;

    Ok(envelope("UPDATE_PLANT_DETAILS_SUCCESS", json!({ "plant": updated })))
}

/// Forwards `REMOVE_PLANT` to the controller and registers a deletion
/// correlation; the row is only deleted once `REMOVE_PLANT_RESPONSE`
/// reports success (spec §4.5).
async fn delete_plant(
    broker: &Broker,
    handle: &ChannelHandle,
    email: &str,
    plant_id: i64,
) -> Result<serde_json::Value, BrokerError> {
    let plant = require_plant(broker, plant_id).await?;
    require_membership(broker, email, plant.garden_id).await?;

    let sent = GardenBroadcaster::new(&broker.registry)
        .send_to_controller(plant.garden_id, envelope("REMOVE_PLANT", json!({ "plant_id": plant_id })))
        .await;
    if !sent {
        return Err(BrokerError::ControllerDisconnected);
    }

    broker
        .pending
        .deletion
        .register(
            plant_id,
            PendingContext::new(handle.id(), email, json!({ "plant_id": plant_id, "garden_id": plant.garden_id })),
        )
        .await;

    Ok(envelope("DELETE_PLANT_PENDING", json!({ "plant_id": plant_id })))
}

async fn update_plant_schedule(
    broker: &Broker,
    handle: &ChannelHandle,
    email: &str,
    plant_id: i64,
    schedule: garden_core::domain::Schedule,
) -> Result<serde_json::Value, BrokerError> {
    let plant = require_plant(broker, plant_id).await?;
    require_membership(broker, email, plant.garden_id).await?;

    let updated = broker
        .db
        .update_plant_details(plant_id, plant.version, None, None, None, None, Some(&schedule))
        .await
        .map_err(BrokerError::Storage)?
        .ok_or_else(|| BrokerError::Validation("plant was modified concurrently, retry".into()))?;

    let emails = broker.db.member_emails(plant.garden_id).await.map_err(BrokerError::Storage)?;
    GardenBroadcaster::new(&broker.registry)
        .broadcast(&emails, envelope("PLANT_UPDATED", json!({ "plant": updated })), Some(handle.id()))
        .await;

    Ok(envelope("UPDATE_PLANT_SCHEDULE_SUCCESS", json!({ "plant": updated })))
}

async fn irrigate_plant(
    broker: &Broker,
    handle: &ChannelHandle,
    email: &str,
    plant_id: i64,
) -> Result<serde_json::Value, BrokerError> {
    let plant = require_plant(broker, plant_id).await?;
    require_membership(broker, email, plant.garden_id).await?;

    if plant.valve_blocked {
        return Err(BrokerError::ValveBlocked);
    }
    if plant.irrigation.mode != garden_core::domain::IrrigationMode::None {
        return Err(BrokerError::Validation("irrigation already in progress".into()));
    }
    if !plant.is_hardware_assigned() {
        return Err(BrokerError::AssignmentFailed("plant has no sensor/valve assigned".into()));
    }

    let session_id = format!("irr-{plant_id}-{}", Utc::now().timestamp_millis());
    let sent = GardenBroadcaster::new(&broker.registry)
        .send_to_controller(
            plant.garden_id,
            envelope("IRRIGATE_PLANT", json!({ "plant_id": plant_id, "session_id": session_id })),
        )
        .await;
    if !sent {
        return Err(BrokerError::ControllerDisconnected);
    }

    broker
        .pending
        .irrigation
        .register_by_session(
            session_id.clone(),
            PendingContext::new(handle.id(), email, json!({ "plant_id": plant_id })),
        )
        .await;

    // `smart` state is written by the Controller Handler once
    // `IRRIGATION_DECISION` arrives, not here.

    Ok(envelope(
        "IRRIGATE_PLANT_PENDING",
        json!({ "plant_id": plant_id, "session_id": session_id }),
    ))
}

async fn stop_irrigation(
    broker: &Broker,
    handle: &ChannelHandle,
    email: &str,
    plant_id: i64,
) -> Result<serde_json::Value, BrokerError> {
    let plant = require_plant(broker, plant_id).await?;
    require_membership(broker, email, plant.garden_id).await?;
    if plant.irrigation.mode == garden_core::domain::IrrigationMode::None {
        return Err(BrokerError::Validation("no irrigation in progress".into()));
    }

    let sent = GardenBroadcaster::new(&broker.registry)
        .send_to_controller(plant.garden_id, envelope("STOP_IRRIGATION", json!({ "plant_id": plant_id })))
        .await;
    if !sent {
        return Err(BrokerError::ControllerDisconnected);
    }

    broker
        .pending
        .irrigation
        .register_by_plant(
            plant_id,
            PendingContext::new(handle.id(), email, json!({ "plant_id": plant_id })),
        )
        .await;

    Ok(envelope("STOP_IRRIGATION_PENDING", json!({ "plant_id": plant_id })))
}

async fn forward_valve_command(
    broker: &Broker,
    email: &str,
    plant_id: i64,
    type_name: &str,
    extra: serde_json::Value,
) -> Result<serde_json::Value, BrokerError> {
    let plant = require_plant(broker, plant_id).await?;
    require_membership(broker, email, plant.garden_id).await?;

    let mut data = json!({ "plant_id": plant_id });
    if let (Some(data_obj), Some(extra_obj)) = (data.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            data_obj.insert(k.clone(), v.clone());
        }
    }

    let sent = GardenBroadcaster::new(&broker.registry)
        .send_to_controller(plant.garden_id, envelope(type_name, data))
        .await;
    if !sent {
        return Err(BrokerError::ControllerDisconnected);
    }
    Ok(envelope(&format!("{type_name}_SENT"), json!({ "plant_id": plant_id })))
}

async fn unblock_valve(broker: &Broker, email: &str, plant_id: i64) -> Result<serde_json::Value, BrokerError> {
    let plant = require_plant(broker, plant_id).await?;
    require_membership(broker, email, plant.garden_id).await?;
    GardenBroadcaster::new(&broker.registry)
        .send_to_controller(plant.garden_id, envelope("RESTART_VALVE", json!({ "plant_id": plant_id })))
        .await;
    Ok(envelope("UNBLOCK_VALVE_SENT", json!({ "plant_id": plant_id })))
}

async fn get_irrigation_result(
    broker: &Broker,
    email: &str,
    plant_id: i64,
) -> Result<serde_json::Value, BrokerError> {
    let plant = require_plant(broker, plant_id).await?;
    require_membership(broker, email, plant.garden_id).await?;
    let events = broker.db.list_events_for_plant(plant_id, 1).await.map_err(BrokerError::Storage)?;
    Ok(envelope(
        "GET_IRRIGATION_RESULT_SUCCESS",
        json!({ "plant_id": plant_id, "event": events.into_iter().next() }),
    ))
}

async fn get_plant_moisture(
    broker: &Broker,
    handle: &ChannelHandle,
    email: &str,
    plant_id: i64,
) -> Result<serde_json::Value, BrokerError> {
    let plant = require_plant(broker, plant_id).await?;
    require_membership(broker, email, plant.garden_id).await?;

    broker
        .pending
        .moisture
        .register(
            plant_id,
            PendingContext::new(handle.id(), email, json!({ "plant_id": plant_id })),
        )
        .await;

    let sent = GardenBroadcaster::new(&broker.registry)
        .send_to_controller(plant.garden_id, envelope("GET_PLANT_MOISTURE", json!({ "plant_id": plant_id })))
        .await;
    if !sent {
        broker.pending.moisture.complete(&plant_id).await;
        return Err(BrokerError::ControllerDisconnected);
    }

    Ok(envelope("GET_PLANT_MOISTURE_PENDING", json!({ "plant_id": plant_id })))
}

async fn get_all_moisture(broker: &Broker, email: &str, garden_id: i64) -> Result<serde_json::Value, BrokerError> {
    require_membership(broker, email, garden_id).await?;
    let plants = broker.db.list_plants_for_garden(garden_id).await.map_err(BrokerError::Storage)?;
    let broadcaster = GardenBroadcaster::new(&broker.registry);
    let mut requested = Vec::new();
    for plant in &plants {
        if broadcaster
            .send_to_controller(garden_id, envelope("GET_PLANT_MOISTURE", json!({ "plant_id": plant.id })))
            .await
        {
            requested.push(plant.id);
        }
    }
    Ok(envelope(
        "GET_ALL_MOISTURE_PENDING",
        json!({ "garden_id": garden_id, "plant_ids": requested }),
    ))
}
