//! Gateway status codes.
//!
//! Only [`GatewayStatus::InvalidToken`] is permanent; everything else is logged
//! and the correlation record is left to expire.

/// Classified status code from a gateway error response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStatus {
    NoError,
    ProcessingError,
    MissingDeviceToken,
    MissingTopic,
    MissingPayload,
    PayloadTooLarge,
    InvalidTokenSize,
    InvalidTopicSize,
    InvalidToken,
    Unknown(u8),
}

impl GatewayStatus {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => GatewayStatus::NoError,
            1 => GatewayStatus::ProcessingError,
            2 => GatewayStatus::MissingDeviceToken,
            3 => GatewayStatus::MissingTopic,
            4 => GatewayStatus::MissingPayload,
            5 => GatewayStatus::PayloadTooLarge,
            6 => GatewayStatus::InvalidTokenSize,
            7 => GatewayStatus::InvalidTopicSize,
            8 => GatewayStatus::InvalidToken,
            other => GatewayStatus::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            GatewayStatus::NoError => 0,
            GatewayStatus::ProcessingError => 1,
            GatewayStatus::MissingDeviceToken => 2,
            GatewayStatus::MissingTopic => 3,
            GatewayStatus::MissingPayload => 4,
            GatewayStatus::PayloadTooLarge => 5,
            GatewayStatus::InvalidTokenSize => 6,
            GatewayStatus::InvalidTopicSize => 7,
            GatewayStatus::InvalidToken => 8,
            GatewayStatus::Unknown(code) => *code,
        }
    }

    /// Human-readable reason used in delivery failure logs.
    pub fn reason(&self) -> &'static str {
        match self {
            GatewayStatus::NoError => "No errors encountered",
            GatewayStatus::ProcessingError => "Processing error",
            GatewayStatus::MissingDeviceToken => "Missing device token",
            GatewayStatus::MissingTopic => "Missing topic",
            GatewayStatus::MissingPayload => "Missing payload",
            GatewayStatus::PayloadTooLarge => "Payload too large",
            GatewayStatus::InvalidTokenSize => "Invalid token size",
            GatewayStatus::InvalidTopicSize => "Invalid topic size",
            GatewayStatus::InvalidToken => "Invalid token",
            GatewayStatus::Unknown(_) => "Unknown error",
        }
    }

    /// The device token will never be accepted again.
    pub fn is_permanent(&self) -> bool {
        matches!(self, GatewayStatus::InvalidToken)
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, GatewayStatus::NoError)
    }
}

impl std::fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.reason(), self.code())
    }
}
