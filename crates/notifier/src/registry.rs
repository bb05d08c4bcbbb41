//! Device registration gateway.
//!
//! Registrations are owned elsewhere; delivery only looks them up and removes the
//! ones the push gateway reports as dead. Tokens here are always base64.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::PgPool;

use herald_common::error::AppError;
use herald_common::types::{DeviceKind, DeviceRegistration};

/// Lookup and removal of APNs device registrations for one app identifier.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Registrations matching `(user_id, token)`.
    async fn find(&self, user_id: i64, token: &str) -> Result<Vec<DeviceRegistration>, AppError>;

    /// Delete the given rows. Rows already gone are not an error.
    async fn delete(&self, rows: &[DeviceRegistration]) -> Result<u64, AppError>;

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<DeviceRegistration>, AppError>;

    /// Delete registrations for `token` not refreshed since `before`.
    async fn delete_stale(&self, token: &str, before: DateTime<Utc>) -> Result<u64, AppError>;

    /// Find and delete every registration matching `(user_id, token)`.
    async fn deregister(&self, user_id: i64, token: &str) -> Result<u64, AppError> {
        let rows = self.find(user_id, token).await?;
        if rows.is_empty() {
            return Ok(0);
        }
        self.delete(&rows).await
    }
}

/// Registrations stored in the `push_device_tokens` table.
#[derive(Clone)]
pub struct PgDeviceRegistry {
    pool: PgPool,
    app_id: String,
}

impl PgDeviceRegistry {
    pub fn new(pool: PgPool, app_id: impl Into<String>) -> Self {
        Self {
            pool,
            app_id: app_id.into(),
        }
    }

    /// Insert or refresh an APNs registration.
    pub async fn register(&self, user_id: i64, token: &str) -> Result<DeviceRegistration, AppError> {
        let row: DeviceRegistration = sqlx::query_as(
            r#"
            INSERT INTO push_device_tokens (user_id, kind, token, ios_app_id, last_updated)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (user_id, token, kind)
            DO UPDATE SET ios_app_id = EXCLUDED.ios_app_id, last_updated = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(DeviceKind::Apns)
        .bind(token)
        .bind(&self.app_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(user_id, registration_id = row.id, "Device registered");
        Ok(row)
    }
}

#[async_trait]
impl DeviceRegistry for PgDeviceRegistry {
    async fn find(&self, user_id: i64, token: &str) -> Result<Vec<DeviceRegistration>, AppError> {
        let rows: Vec<DeviceRegistration> = sqlx::query_as(
            r#"
            SELECT * FROM push_device_tokens
            WHERE user_id = $1 AND token = $2 AND kind = $3 AND ios_app_id = $4
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(DeviceKind::Apns)
        .bind(&self.app_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn delete(&self, rows: &[DeviceRegistration]) -> Result<u64, AppError> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let result = sqlx::query("DELETE FROM push_device_tokens WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            tracing::info!(deleted, "Device registrations deleted");
        }
        Ok(deleted)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<DeviceRegistration>, AppError> {
        let rows: Vec<DeviceRegistration> = sqlx::query_as(
            r#"
            SELECT * FROM push_device_tokens
            WHERE user_id = $1 AND kind = $2 AND ios_app_id = $3
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .bind(DeviceKind::Apns)
        .bind(&self.app_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn delete_stale(&self, token: &str, before: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM push_device_tokens
            WHERE token = $1 AND kind = $2 AND ios_app_id = $3 AND last_updated < $4
            "#,
        )
        .bind(token)
        .bind(DeviceKind::Apns)
        .bind(&self.app_id)
        .bind(before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// In-process registry keyed by registration id.
#[derive(Debug)]
pub struct MemoryDeviceRegistry {
    app_id: String,
    rows: DashMap<i64, DeviceRegistration>,
    next_id: AtomicI64,
}

impl MemoryDeviceRegistry {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            rows: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn register(&self, user_id: i64, token: &str) -> DeviceRegistration {
        self.register_at(user_id, token, Utc::now())
    }

    /// Insert a registration with an explicit `last_updated`.
    pub fn register_at(
        &self,
        user_id: i64,
        token: &str,
        last_updated: DateTime<Utc>,
    ) -> DeviceRegistration {
        let row = DeviceRegistration {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            user_id,
            kind: DeviceKind::Apns,
            token: token.to_string(),
            ios_app_id: Some(self.app_id.clone()),
            last_updated,
        };
        self.rows.insert(row.id, row.clone());
        row
    }

    /// Number of registrations matching `(user_id, token)`.
    pub fn count(&self, user_id: i64, token: &str) -> usize {
        self.rows
            .iter()
            .filter(|r| self.matches(r.value()) && r.user_id == user_id && r.token == token)
            .count()
    }

    fn matches(&self, row: &DeviceRegistration) -> bool {
        row.kind == DeviceKind::Apns && row.ios_app_id.as_deref() == Some(self.app_id.as_str())
    }
}

#[async_trait]
impl DeviceRegistry for MemoryDeviceRegistry {
    async fn find(&self, user_id: i64, token: &str) -> Result<Vec<DeviceRegistration>, AppError> {
        Ok(self
            .rows
            .iter()
            .filter(|r| self.matches(r.value()) && r.user_id == user_id && r.token == token)
            .map(|r| r.value().clone())
            .collect())
    }

    async fn delete(&self, rows: &[DeviceRegistration]) -> Result<u64, AppError> {
        let deleted = rows
            .iter()
            .filter(|row| self.rows.remove(&row.id).is_some())
            .count();
        Ok(deleted as u64)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<DeviceRegistration>, AppError> {
        let mut rows: Vec<DeviceRegistration> = self
            .rows
            .iter()
            .filter(|r| self.matches(r.value()) && r.user_id == user_id)
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    async fn delete_stale(&self, token: &str, before: DateTime<Utc>) -> Result<u64, AppError> {
        let before_len = self.rows.len();
        self.rows.retain(|_, row| {
            !(self.matches(row) && row.token == token && row.last_updated < before)
        });
        Ok((before_len - self.rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_find_scoped_to_user_and_app() {
        let registry = MemoryDeviceRegistry::new("org.herald.app");
        registry.register(1, "qqo=");
        registry.register(2, "qqo=");

        let rows = registry.find(1, "qqo=").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, 1);
        assert_eq!(rows[0].ios_app_id.as_deref(), Some("org.herald.app"));

        let mut foreign = registry.register(1, "u7s=");
        foreign.ios_app_id = Some("org.herald.other".to_string());
        registry.rows.insert(foreign.id, foreign);
        assert_eq!(registry.find(1, "u7s=").await.unwrap().len(), 0);
        assert_eq!(registry.list_for_user(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deregister_is_idempotent() {
        let registry = MemoryDeviceRegistry::new("org.herald.app");
        registry.register(1, "qqo=");
        registry.register(1, "u7s=");

        assert_eq!(registry.deregister(1, "qqo=").await.unwrap(), 1);
        assert_eq!(registry.deregister(1, "qqo=").await.unwrap(), 0);
        assert_eq!(registry.count(1, "qqo="), 0);
        assert_eq!(registry.count(1, "u7s="), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_rows() {
        let registry = MemoryDeviceRegistry::new("org.herald.app");
        let row = registry.register(1, "qqo=");
        assert_eq!(registry.delete(&[row.clone()]).await.unwrap(), 1);
        assert_eq!(registry.delete(&[row]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_stale_keeps_fresh_rows() {
        let registry = MemoryDeviceRegistry::new("org.herald.app");
        let now = Utc::now();
        registry.register_at(1, "qqo=", now - Duration::hours(2));
        registry.register_at(2, "qqo=", now);

        let removed = registry
            .delete_stale("qqo=", now - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(registry.count(1, "qqo="), 0);
        assert_eq!(registry.count(2, "qqo="), 1);
    }

    #[tokio::test]
    async fn test_list_for_user_ordered() {
        let registry = MemoryDeviceRegistry::new("org.herald.app");
        registry.register(1, "qqo=");
        registry.register(1, "u7s=");
        registry.register(2, "zMw=");

        let rows = registry.list_for_user(1).await.unwrap();
        let tokens: Vec<&str> = rows.iter().map(|r| r.token.as_str()).collect();
        assert_eq!(tokens, vec!["qqo=", "u7s="]);
    }
}
