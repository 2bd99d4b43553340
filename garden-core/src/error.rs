use thiserror::Error;

/// The closed taxonomy of errors the broker can report to a client, per
/// spec §7. Every variant maps to a wire error code via [`BrokerError::code`]
/// so that handlers can build `*_FAIL` envelopes uniformly.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("channel is not attached to a user")]
    Unauthorized,

    #[error("not a member of this garden")]
    NotMember,

    #[error("user not found")]
    UserNotFound,

    #[error("garden not found")]
    GardenNotFound,

    #[error("plant not found")]
    PlantNotFound,

    #[error("user is already admin of an active garden")]
    UserAlreadyAdmin,

    #[error("user is already a member of this garden")]
    UserAlreadyMember,

    #[error("user already belongs to a garden")]
    AlreadyInGarden,

    #[error("garden admin cannot leave their own garden")]
    AdminCannotLeave,

    #[error("invalid location: {0}")]
    InvalidLocation(String),

    #[error("controller is not connected for this garden")]
    ControllerDisconnected,

    #[error("hardware assignment failed: {0}")]
    AssignmentFailed(String),

    #[error("valve is blocked")]
    ValveBlocked,

    #[error("water limit reached before target moisture")]
    WaterLimitReached,

    #[error("sensor read failed: {0}")]
    SensorReadFailed(String),

    #[error("pending correlation expired")]
    Timeout,

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("malformed frame")]
    InvalidJson,

    #[error("database error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl BrokerError {
    /// The machine-readable code carried on `*_FAIL` envelopes (spec §6/§7).
    pub fn code(&self) -> &'static str {
        match self {
            BrokerError::Validation(_) => "VALIDATION_ERROR",
            BrokerError::Unauthorized => "UNAUTHORIZED",
            BrokerError::NotMember => "NOT_MEMBER",
            BrokerError::UserNotFound => "USER_NOT_FOUND",
            BrokerError::GardenNotFound => "GARDEN_NOT_FOUND",
            BrokerError::PlantNotFound => "PLANT_NOT_FOUND",
            BrokerError::UserAlreadyAdmin => "USER_ALREADY_ADMIN",
            BrokerError::UserAlreadyMember => "USER_ALREADY_MEMBER",
            BrokerError::AlreadyInGarden => "ALREADY_IN_GARDEN",
            BrokerError::AdminCannotLeave => "ADMIN_CANNOT_LEAVE",
            BrokerError::InvalidLocation(_) => "INVALID_LOCATION",
            BrokerError::ControllerDisconnected => "CONTROLLER_DISCONNECTED",
            BrokerError::AssignmentFailed(_) => "ASSIGNMENT_FAILED",
            BrokerError::ValveBlocked => "VALVE_BLOCKED",
            BrokerError::WaterLimitReached => "WATER_LIMIT_REACHED",
            BrokerError::SensorReadFailed(_) => "SENSOR_READ_FAILED",
            BrokerError::Timeout => "TIMEOUT",
            BrokerError::UnknownType(_) => "UNKNOWN_TYPE",
            BrokerError::InvalidJson => "INVALID_JSON",
            BrokerError::Storage(_) => "DATABASE_ERROR",
        }
    }

    pub fn reason(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(BrokerError::Unauthorized.code(), "UNAUTHORIZED");
        assert_eq!(BrokerError::ValveBlocked.code(), "VALVE_BLOCKED");
        assert_eq!(
            BrokerError::UnknownType("FOO".into()).code(),
            "UNKNOWN_TYPE"
        );
    }
}
