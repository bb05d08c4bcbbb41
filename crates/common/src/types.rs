use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Push service a device token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Apns,
    Gcm,
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Apns => write!(f, "apns"),
            DeviceKind::Gcm => write!(f, "gcm"),
        }
    }
}

/// A device registered to receive pushes for a user.
///
/// `token` is stored base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceRegistration {
    pub id: i64,
    pub user_id: i64,
    pub kind: DeviceKind,
    pub token: String,
    pub ios_app_id: Option<String>,
    pub last_updated: DateTime<Utc>,
}

/// Short-lived record tying an in-flight notification to its target device.
///
/// `token` is kept in the gateway's hex form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub token: String,
    pub user_id: i64,
}

/// Gateway response for a previously sent notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResponseEvent {
    pub identifier: u32,
    pub status: u8,
}

/// Notification content accepted from callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    /// Alert text shown to the user
    pub alert: Option<String>,
    /// Name of the sound file to play
    pub sound: Option<String>,
    /// App icon badge count
    pub badge: Option<u32>,
    /// Extra top-level keys delivered alongside `aps`
    #[serde(default)]
    pub custom: Map<String, Value>,
}

impl PushPayload {
    pub fn alert(text: impl Into<String>) -> Self {
        Self {
            alert: Some(text.into()),
            ..Default::default()
        }
    }

    /// Render the gateway JSON document: `{"aps": {...}, <custom keys>}`.
    pub fn to_gateway_json(&self) -> Value {
        let mut aps = Map::new();
        if let Some(alert) = &self.alert {
            aps.insert("alert".to_string(), Value::String(alert.clone()));
        }
        if let Some(sound) = &self.sound {
            aps.insert("sound".to_string(), Value::String(sound.clone()));
        }
        if let Some(badge) = self.badge {
            aps.insert("badge".to_string(), Value::from(badge));
        }

        let mut doc = self.custom.clone();
        doc.insert("aps".to_string(), Value::Object(aps));
        Value::Object(doc)
    }
}
