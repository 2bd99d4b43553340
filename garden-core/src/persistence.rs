//! Postgres-backed storage (spec §3/§8), modeled on the teacher's
//! single-reconnecting-client pool: one `tokio_postgres::Client` behind an
//! `Arc<RwLock<Option<Client>>>`, reconnected lazily on first use after a
//! dropped connection rather than pooled via a full connection-pool crate.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::RwLock;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{error, info};

use crate::domain::{
    Garden, IrrigationEvent, IrrigationEventStatus, IrrigationMode, IrrigationState, Membership,
    MembershipRole, NewIrrigationEvent, Plant, Schedule, User,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    location_country TEXT,
    location_city TEXT
);

CREATE TABLE IF NOT EXISTS gardens (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    admin_user_id BIGINT NOT NULL REFERENCES users(id),
    invite_code TEXT NOT NULL,
    country TEXT NOT NULL,
    city TEXT NOT NULL,
    active BOOLEAN NOT NULL DEFAULT TRUE,
    max_members INTEGER NOT NULL DEFAULT 8
);

CREATE UNIQUE INDEX IF NOT EXISTS gardens_invite_code_active_idx
    ON gardens (invite_code) WHERE active;

CREATE TABLE IF NOT EXISTS user_gardens (
    user_id BIGINT NOT NULL REFERENCES users(id),
    garden_id BIGINT NOT NULL REFERENCES gardens(id),
    role TEXT NOT NULL,
    active BOOLEAN NOT NULL DEFAULT TRUE,
    joined_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (user_id, garden_id)
);

CREATE TABLE IF NOT EXISTS plants (
    id BIGSERIAL PRIMARY KEY,
    garden_id BIGINT NOT NULL REFERENCES gardens(id),
    user_id BIGINT NOT NULL REFERENCES users(id),
    name TEXT NOT NULL,
    ideal_moisture_pct DOUBLE PRECISION NOT NULL,
    water_limit_liters DOUBLE PRECISION NOT NULL,
    dripper_type TEXT NOT NULL,
    schedule JSONB,
    sensor_port INTEGER,
    valve_id INTEGER,
    valve_blocked BOOLEAN NOT NULL DEFAULT FALSE,
    version BIGINT NOT NULL DEFAULT 1,
    irrigation_mode TEXT NOT NULL DEFAULT 'none',
    irrigation_start_at TIMESTAMPTZ,
    irrigation_end_at TIMESTAMPTZ,
    irrigation_session_id TEXT
);

CREATE TABLE IF NOT EXISTS irrigation_events (
    id BIGSERIAL PRIMARY KEY,
    plant_id BIGINT NOT NULL REFERENCES plants(id),
    status TEXT NOT NULL,
    reason TEXT,
    initial_moisture DOUBLE PRECISION,
    final_moisture DOUBLE PRECISION,
    liters DOUBLE PRECISION,
    hardware_time TIMESTAMPTZ,
    extra JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS password_reset_tokens (
    token TEXT PRIMARY KEY,
    user_id BIGINT NOT NULL REFERENCES users(id),
    expires_at TIMESTAMPTZ NOT NULL,
    used BOOLEAN NOT NULL DEFAULT FALSE
);
"#;

pub struct PgPool {
    dsn: String,
    client: Arc<RwLock<Option<Client>>>,
}

impl PgPool {
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            client: Arc::new(RwLock::new(None)),
        }
    }

    async fn connect(&self) -> Result<()> {
        let (client, connection) = tokio_postgres::connect(&self.dsn, NoTls)
            .await
            .context("connecting to postgres")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "postgres connection task terminated");
            }
        });

        *self.client.write().await = Some(client);
        info!("connected to postgres");
        Ok(())
    }

    /// Return a usable client, reconnecting first if the last connection
    /// was dropped (or never established).
    async fn get(&self) -> Result<tokio::sync::RwLockReadGuard<'_, Option<Client>>> {
        {
            let guard = self.client.read().await;
            if guard.as_ref().is_some_and(|c| !c.is_closed()) {
                drop(guard);
                return Ok(self.client.read().await);
            }
        }
        self.connect().await?;
        Ok(self.client.read().await)
    }

    async fn with_client<T>(
        &self,
        f: impl AsyncFnOnce(&Client) -> Result<T>,
    ) -> Result<T> {
        let guard = self.get().await?;
        let client = guard.as_ref().context("no postgres client available")?;
        f(client).await
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        self.with_client(async |client| {
            client
                .batch_execute(SCHEMA)
                .await
                .context("creating schema")?;
            Ok(())
        })
        .await
    }

    // ---- users ----

    pub async fn create_user(&self, email: &str, display_name: &str) -> Result<User> {
        self.with_client(async |client| {
            let row = client
                .query_one(
                    "INSERT INTO users (email, display_name) VALUES ($1, $2) RETURNING *",
                    &[&email, &display_name],
                )
                .await
                .context("inserting user")?;
            Ok(row_to_user(&row))
        })
        .await
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.with_client(async |client| {
            let row = client
                .query_opt("SELECT * FROM users WHERE email = $1", &[&email])
                .await
                .context("querying user by email")?;
            Ok(row.as_ref().map(row_to_user))
        })
        .await
    }

    // ---- gardens ----

    pub async fn create_garden(
        &self,
        name: &str,
        admin_user_id: i64,
        invite_code: &str,
        country: &str,
        city: &str,
        max_members: i32,
    ) -> Result<Garden> {
        self.with_client(async |client| {
            let row = client
                .query_one(
                    "INSERT INTO gardens (name, admin_user_id, invite_code, country, city, max_members)
                     VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
                    &[&name, &admin_user_id, &invite_code, &country, &city, &max_members],
                )
                .await
                .context("inserting garden")?;
            Ok(row_to_garden(&row))
        })
        .await
    }

    pub async fn update_garden(
        &self,
        garden_id: i64,
        name: Option<&str>,
        country: Option<&str>,
        city: Option<&str>,
        max_members: Option<i32>,
    ) -> Result<Option<Garden>> {
        self.with_client(async |client| {
            let row = client
                .query_opt(
                    "UPDATE gardens SET
                        name = COALESCE($2, name),
                        country = COALESCE($3, country),
                        city = COALESCE($4, city),
                        max_members = COALESCE($5, max_members)
                     WHERE id = $1
                     RETURNING *",
                    &[&garden_id, &name, &country, &city, &max_members],
                )
                .await
                .context("updating garden")?;
            Ok(row.as_ref().map(row_to_garden))
        })
        .await
    }

    pub async fn invite_code_taken(&self, invite_code: &str) -> Result<bool> {
        self.with_client(async |client| {
            let row = client
                .query_one(
                    "SELECT EXISTS(SELECT 1 FROM gardens WHERE invite_code = $1 AND active) AS taken",
                    &[&invite_code],
                )
                .await
                .context("checking invite code uniqueness")?;
            Ok(row.get::<_, bool>("taken"))
        })
        .await
    }

    pub async fn find_garden_by_invite_code(&self, invite_code: &str) -> Result<Option<Garden>> {
        self.with_client(async |client| {
            let row = client
                .query_opt(
                    "SELECT * FROM gardens WHERE invite_code = $1 AND active",
                    &[&invite_code],
                )
                .await
                .context("querying garden by invite code")?;
            Ok(row.as_ref().map(row_to_garden))
        })
        .await
    }

    pub async fn find_garden(&self, garden_id: i64) -> Result<Option<Garden>> {
        self.with_client(async |client| {
            let row = client
                .query_opt("SELECT * FROM gardens WHERE id = $1", &[&garden_id])
                .await
                .context("querying garden by id")?;
            Ok(row.as_ref().map(row_to_garden))
        })
        .await
    }

    pub async fn list_gardens_for_user(&self, user_id: i64) -> Result<Vec<Garden>> {
        self.with_client(async |client| {
            let rows = client
                .query(
                    "SELECT g.* FROM gardens g
                     JOIN user_gardens ug ON ug.garden_id = g.id
                     WHERE ug.user_id = $1 AND ug.active",
                    &[&user_id],
                )
                .await
                .context("listing gardens for user")?;
            Ok(rows.iter().map(row_to_garden).collect())
        })
        .await
    }

    // ---- memberships ----

    pub async fn add_membership(
        &self,
        user_id: i64,
        garden_id: i64,
        role: MembershipRole,
    ) -> Result<Membership> {
        let role_str = role_to_str(role);
        self.with_client(async |client| {
            let row = client
                .query_one(
                    "INSERT INTO user_gardens (user_id, garden_id, role) VALUES ($1, $2, $3)
                     RETURNING *",
                    &[&user_id, &garden_id, &role_str],
                )
                .await
                .context("inserting membership")?;
            Ok(row_to_membership(&row))
        })
        .await
    }

    pub async fn deactivate_membership(&self, user_id: i64, garden_id: i64) -> Result<()> {
        self.with_client(async |client| {
            client
                .execute(
                    "UPDATE user_gardens SET active = FALSE WHERE user_id = $1 AND garden_id = $2",
                    &[&user_id, &garden_id],
                )
                .await
                .context("deactivating membership")?;
            Ok(())
        })
        .await
    }

    pub async fn list_members(&self, garden_id: i64) -> Result<Vec<(User, MembershipRole)>> {
        self.with_client(async |client| {
            let rows = client
                .query(
                    "SELECT u.*, ug.role FROM users u
                     JOIN user_gardens ug ON ug.user_id = u.id
                     WHERE ug.garden_id = $1 AND ug.active",
                    &[&garden_id],
                )
                .await
                .context("listing garden members")?;
            Ok(rows
                .iter()
                .map(|row| (row_to_user(row), str_to_role(row.get("role"))))
                .collect())
        })
        .await
    }

    pub async fn member_emails(&self, garden_id: i64) -> Result<Vec<String>> {
        self.with_client(async |client| {
            let rows = client
                .query(
                    "SELECT u.email FROM users u
                     JOIN user_gardens ug ON ug.user_id = u.id
                     WHERE ug.garden_id = $1 AND ug.active",
                    &[&garden_id],
                )
                .await
                .context("listing member emails")?;
            Ok(rows.iter().map(|row| row.get("email")).collect())
        })
        .await
    }

    // ---- plants ----

    pub async fn create_plant(&self, plant: &Plant) -> Result<Plant> {
        let schedule_json = plant.schedule.as_ref().map(serde_json::to_value).transpose()?;
        self.with_client(async |client| {
            let row = client
                .query_one(
                    "INSERT INTO plants (garden_id, user_id, name, ideal_moisture_pct,
                        water_limit_liters, dripper_type, schedule)
                     VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
                    &[
                        &plant.garden_id,
                        &plant.user_id,
                        &plant.name,
                        &plant.ideal_moisture_pct,
                        &plant.water_limit_liters,
                        &plant.dripper_type,
                        &schedule_json,
                    ],
                )
                .await
                .context("inserting plant")?;
            Ok(row_to_plant(&row)?)
        })
        .await
    }

    pub async fn find_plant(&self, plant_id: i64) -> Result<Option<Plant>> {
        self.with_client(async |client| {
            let row = client
                .query_opt("SELECT * FROM plants WHERE id = $1", &[&plant_id])
                .await
                .context("querying plant by id")?;
            row.as_ref().map(row_to_plant).transpose()
        })
        .await
    }

    pub async fn list_plants_for_garden(&self, garden_id: i64) -> Result<Vec<Plant>> {
        self.with_client(async |client| {
            let rows = client
                .query("SELECT * FROM plants WHERE garden_id = $1", &[&garden_id])
                .await
                .context("listing plants for garden")?;
            rows.iter().map(row_to_plant).collect()
        })
        .await
    }

    /// Optimistic-concurrency update: bumps `version` and fails the caller's
    /// expectation if `expected_version` no longer matches (spec §8).
    pub async fn update_plant_details(
        &self,
        plant_id: i64,
        expected_version: i64,
        name: Option<&str>,
        ideal_moisture_pct: Option<f64>,
        water_limit_liters: Option<f64>,
        dripper_type: Option<&str>,
        schedule: Option<&Schedule>,
    ) -> Result<Option<Plant>> {
        let schedule_json = schedule.map(serde_json::to_value).transpose()?;
        self.with_client(async |client| {
            let row = client
                .query_opt(
                    "UPDATE plants SET
                        name = COALESCE($3, name),
                        ideal_moisture_pct = COALESCE($4, ideal_moisture_pct),
                        water_limit_liters = COALESCE($5, water_limit_liters),
                        dripper_type = COALESCE($6, dripper_type),
                        schedule = COALESCE($7, schedule),
                        version = version + 1
                     WHERE id = $1 AND version = $2
                     RETURNING *",
                    &[
                        &plant_id,
                        &expected_version,
                        &name,
                        &ideal_moisture_pct,
                        &water_limit_liters,
                        &dripper_type,
                        &schedule_json,
                    ],
                )
                .await
                .context("updating plant details")?;
            row.as_ref().map(row_to_plant).transpose()
        })
        .await
    }

    pub async fn assign_hardware(&self, plant_id: i64, sensor_port: i32, valve_id: i32) -> Result<()> {
        self.with_client(async |client| {
            client
                .execute(
                    "UPDATE plants SET sensor_port = $2, valve_id = $3, version = version + 1 WHERE id = $1",
                    &[&plant_id, &sensor_port, &valve_id],
                )
                .await
                .context("assigning hardware")?;
            Ok(())
        })
        .await
    }

    pub async fn set_irrigation_state(&self, plant_id: i64, state: &IrrigationState) -> Result<()> {
        let mode_str = mode_to_str(state.mode);
        self.with_client(async |client| {
            client
                .execute(
                    "UPDATE plants SET irrigation_mode = $2, irrigation_start_at = $3,
                        irrigation_end_at = $4, irrigation_session_id = $5, version = version + 1
                     WHERE id = $1",
                    &[&plant_id, &mode_str, &state.start_at, &state.end_at, &state.session_id],
                )
                .await
                .context("updating irrigation state")?;
            Ok(())
        })
        .await
    }

    pub async fn set_valve_blocked(&self, plant_id: i64, blocked: bool) -> Result<()> {
        self.with_client(async |client| {
            client
                .execute(
                    "UPDATE plants SET valve_blocked = $2, version = version + 1 WHERE id = $1",
                    &[&plant_id, &blocked],
                )
                .await
                .context("updating valve_blocked")?;
            Ok(())
        })
        .await
    }

    pub async fn delete_plant(&self, plant_id: i64) -> Result<()> {
        self.with_client(async |client| {
            client
                .execute("DELETE FROM irrigation_events WHERE plant_id = $1", &[&plant_id])
                .await
                .context("deleting plant's irrigation events")?;
            client
                .execute("DELETE FROM plants WHERE id = $1", &[&plant_id])
                .await
                .context("deleting plant")?;
            Ok(())
        })
        .await
    }

    // ---- irrigation events ----

    pub async fn record_irrigation_event(&self, event: &NewIrrigationEvent) -> Result<IrrigationEvent> {
        let status_str = status_to_str(event.status);
        self.with_client(async |client| {
            let row = client
                .query_one(
                    "INSERT INTO irrigation_events
                        (plant_id, status, reason, initial_moisture, final_moisture, liters, hardware_time, extra)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
                    &[
                        &event.plant_id,
                        &status_str,
                        &event.reason,
                        &event.initial_moisture,
                        &event.final_moisture,
                        &event.liters,
                        &event.hardware_time,
                        &event.extra,
                    ],
                )
                .await
                .context("inserting irrigation event")?;
            Ok(row_to_event(&row)?)
        })
        .await
    }

    pub async fn list_events_for_plant(&self, plant_id: i64, limit: i64) -> Result<Vec<IrrigationEvent>> {
        self.with_client(async |client| {
            let rows = client
                .query(
                    "SELECT * FROM irrigation_events WHERE plant_id = $1
                     ORDER BY created_at DESC LIMIT $2",
                    &[&plant_id, &limit],
                )
                .await
                .context("listing irrigation events")?;
            rows.iter().map(row_to_event).collect()
        })
        .await
    }
}

fn row_to_user(row: &Row) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        location_country: row.get("location_country"),
        location_city: row.get("location_city"),
    }
}

fn row_to_garden(row: &Row) -> Garden {
    Garden {
        id: row.get("id"),
        name: row.get("name"),
        admin_user_id: row.get("admin_user_id"),
        invite_code: row.get("invite_code"),
        country: row.get("country"),
        city: row.get("city"),
        active: row.get("active"),
        max_members: row.get("max_members"),
    }
}

fn row_to_membership(row: &Row) -> Membership {
    Membership {
        user_id: row.get("user_id"),
        garden_id: row.get("garden_id"),
        role: str_to_role(row.get("role")),
        active: row.get("active"),
        joined_at: row.get("joined_at"),
    }
}

fn row_to_plant(row: &Row) -> Result<Plant> {
    let schedule_json: Option<serde_json::Value> = row.get("schedule");
    let schedule = schedule_json.map(serde_json::from_value).transpose()?;

    Ok(Plant {
        id: row.get("id"),
        garden_id: row.get("garden_id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        ideal_moisture_pct: row.get("ideal_moisture_pct"),
        water_limit_liters: row.get("water_limit_liters"),
        dripper_type: row.get("dripper_type"),
        schedule,
        sensor_port: row.get("sensor_port"),
        valve_id: row.get("valve_id"),
        valve_blocked: row.get("valve_blocked"),
        version: row.get("version"),
        irrigation: IrrigationState {
            mode: str_to_mode(row.get("irrigation_mode")),
            start_at: row.get("irrigation_start_at"),
            end_at: row.get("irrigation_end_at"),
            session_id: row.get("irrigation_session_id"),
        },
    })
}

fn row_to_event(row: &Row) -> Result<IrrigationEvent> {
    Ok(IrrigationEvent {
        id: row.get("id"),
        plant_id: row.get("plant_id"),
        status: str_to_status(row.get("status")),
        reason: row.get("reason"),
        initial_moisture: row.get("initial_moisture"),
        final_moisture: row.get("final_moisture"),
        liters: row.get("liters"),
        hardware_time: row.get("hardware_time"),
        extra: row.get("extra"),
    })
}

fn role_to_str(role: MembershipRole) -> &'static str {
    match role {
        MembershipRole::Admin => "admin",
        MembershipRole::Member => "member",
    }
}

fn str_to_role(s: String) -> MembershipRole {
    match s.as_str() {
        "admin" => MembershipRole::Admin,
        _ => MembershipRole::Member,
    }
}

fn mode_to_str(mode: IrrigationMode) -> &'static str {
    match mode {
        IrrigationMode::None => "none",
        IrrigationMode::Smart => "smart",
        IrrigationMode::Manual => "manual",
    }
}

fn str_to_mode(s: String) -> IrrigationMode {
    match s.as_str() {
        "smart" => IrrigationMode::Smart,
        "manual" => IrrigationMode::Manual,
        _ => IrrigationMode::None,
    }
}

fn status_to_str(status: IrrigationEventStatus) -> &'static str {
    match status {
        IrrigationEventStatus::Done => "done",
        IrrigationEventStatus::Skipped => "skipped",
        IrrigationEventStatus::Stopped => "stopped",
        IrrigationEventStatus::Cancelled => "cancelled",
        IrrigationEventStatus::Error => "error",
        IrrigationEventStatus::ValveOpened => "valve_opened",
        IrrigationEventStatus::ValveClosed => "valve_closed",
    }
}

fn str_to_status(s: String) -> IrrigationEventStatus {
    match s.as_str() {
        "skipped" => IrrigationEventStatus::Skipped,
        "stopped" => IrrigationEventStatus::Stopped,
        "cancelled" => IrrigationEventStatus::Cancelled,
        "error" => IrrigationEventStatus::Error,
        "valve_opened" => IrrigationEventStatus::ValveOpened,
        "valve_closed" => IrrigationEventStatus::ValveClosed,
        _ => IrrigationEventStatus::Done,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These exercise the pure row <-> domain mappers without touching a
    // real database; the `PgPool` methods themselves need a live Postgres
    // and are covered by garden-broker's `#[ignore]`d integration test.

    #[test]
    fn role_roundtrips_through_str() {
        assert_eq!(str_to_role(role_to_str(MembershipRole::Admin).to_string()), MembershipRole::Admin);
        assert_eq!(str_to_role(role_to_str(MembershipRole::Member).to_string()), MembershipRole::Member);
    }

    #[test]
    fn mode_roundtrips_through_str() {
        for mode in [IrrigationMode::None, IrrigationMode::Smart, IrrigationMode::Manual] {
            assert_eq!(str_to_mode(mode_to_str(mode).to_string()), mode);
        }
    }

    #[test]
    fn status_roundtrips_through_str() {
        for status in [
            IrrigationEventStatus::Done,
            IrrigationEventStatus::Skipped,
            IrrigationEventStatus::Stopped,
            IrrigationEventStatus::Cancelled,
            IrrigationEventStatus::Error,
            IrrigationEventStatus::ValveOpened,
            IrrigationEventStatus::ValveClosed,
        ] {
            assert_eq!(str_to_status(status_to_str(status).to_string()), status);
        }
    }
}
