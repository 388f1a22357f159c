//! SQLite 订阅注册表实现

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{base64_decode, base64_encode};
use crate::registry::SubscriptionRegistry;
use crate::types::{DeviceSubscription, SubscriptionKeys, SubscriptionRecord};

pub type SqlitePool = r2d2::Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const SUBSCRIPTION_STORE: &str = r##"
    create table if not exists push_subscription (
        identity text primary key,
        endpoint text not null,
        p256dh text not null,
        auth text not null,
        createdAt text not null
    )"##;

/// 连接初始化 Pragmas
const STARTUP_SQL: &str = r##"
        PRAGMA main.synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        "##;

/// SQLite 注册表
///
/// 身份为主键，upsert 以 `insert or replace` 实现，单语句内原子。
pub struct SqliteRegistry {
    pool: SqlitePool,
}

impl SqliteRegistry {
    /// 打开（或创建）注册表数据库
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path.as_ref())
            .with_init(|c| c.execute_batch(STARTUP_SQL));
        let pool = r2d2::Pool::builder()
            .build(manager)
            .map_err(|e| Error::RegistryUnavailable(format!("Sqlite pool init failed: {}", e)))?;

        let conn = pool
            .get()
            .map_err(|e| Error::RegistryUnavailable(e.to_string()))?;
        conn.execute(SUBSCRIPTION_STORE, ())
            .map_err(|e| Error::RegistryUnavailable(format!("Schema init failed: {}", e)))?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection> {
        self.pool
            .get()
            .map_err(|e| Error::RegistryUnavailable(e.to_string()))
    }
}

#[async_trait]
impl SubscriptionRegistry for SqliteRegistry {
    async fn register(&self, identity: &str, handle: DeviceSubscription) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "insert or replace into push_subscription (identity, endpoint, p256dh, auth, createdAt) \
             values (?1, ?2, ?3, ?4, ?5)",
            params![
                identity,
                handle.endpoint,
                base64_encode(&handle.keys.p256dh),
                base64_encode(&handle.keys.auth),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| Error::RegistryUnavailable(format!("Register failed: {}", e)))?;
        debug!("Registered subscription for identity: {}", identity);
        Ok(())
    }

    async fn delete(&self, identity: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "delete from push_subscription where identity = ?1",
            params![identity],
        )
        .map_err(|e| Error::RegistryUnavailable(format!("Delete failed: {}", e)))?;
        debug!("Deleted subscription for identity: {}", identity);
        Ok(())
    }

    async fn get(&self, identity: &str) -> Result<Option<SubscriptionRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "select endpoint, p256dh, auth, createdAt from push_subscription where identity = ?1",
                params![identity],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| Error::RegistryUnavailable(format!("Lookup failed: {}", e)))?;

        match row {
            None => Ok(None),
            Some((endpoint, p256dh, auth, created_at)) => {
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|e| Error::RegistryUnavailable(format!("Corrupt createdAt: {}", e)))?
                    .with_timezone(&Utc);
                Ok(Some(SubscriptionRecord {
                    identity: identity.to_string(),
                    handle: DeviceSubscription {
                        endpoint,
                        keys: SubscriptionKeys {
                            p256dh: base64_decode(&p256dh)?,
                            auth: base64_decode(&auth)?,
                        },
                    },
                    created_at,
                }))
            }
        }
    }
}
