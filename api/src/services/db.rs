//! Record store for captures
//!
//! Route handlers talk to the [`CaptureStore`] trait so the ingestion flow can be
//! exercised without a database. The Postgres implementation delegates to the
//! query functions in `domain::captures`, which use sqlx's generic Executor
//! pattern and accept either `&PgPool` or `&mut PgConnection`.
//!
//! Duplicate addresses are rejected by a partial unique index on
//! `captures.ip_address`; a rejected insert is reported as
//! [`InsertOutcome::Duplicate`] rather than an error.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::domain::captures as captures_domain;
use crate::models::{CaptureRecord, NewCapture};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug)]
pub enum InsertOutcome {
    Inserted(CaptureRecord),
    Duplicate,
}

#[async_trait]
pub trait CaptureStore: Send + Sync {
    async fn find_by_ip(&self, ip_address: &str) -> Result<Option<CaptureRecord>, StoreError>;

    async fn insert(&self, capture: &NewCapture) -> Result<InsertOutcome, StoreError>;
}

pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

#[derive(Clone)]
pub struct PgCaptureStore {
    pool: PgPool,
}

impl PgCaptureStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CaptureStore for PgCaptureStore {
    async fn find_by_ip(&self, ip_address: &str) -> Result<Option<CaptureRecord>, StoreError> {
        Ok(captures_domain::find_capture_by_ip(&self.pool, ip_address).await?)
    }

    async fn insert(&self, capture: &NewCapture) -> Result<InsertOutcome, StoreError> {
        let inserted = captures_domain::insert_capture(&self.pool, capture).await?;
        Ok(match inserted {
            Some(record) => InsertOutcome::Inserted(record),
            None => InsertOutcome::Duplicate,
        })
    }
}

/// In-memory store used by handler and route tests.
#[cfg(test)]
pub mod memory {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use chrono::Utc;

    use super::*;

    #[derive(Default)]
    pub struct MemoryCaptureStore {
        records: Mutex<Vec<CaptureRecord>>,
        fail: AtomicBool,
        blind_find: AtomicBool,
        writes: AtomicUsize,
    }

    impl MemoryCaptureStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every call fails as if the database were unreachable.
        pub fn failing() -> Self {
            let store = Self::default();
            store.fail.store(true, Ordering::SeqCst);
            store
        }

        /// `find_by_ip` never sees existing rows, simulating a concurrent
        /// request that passed its check before this one wrote.
        pub fn with_blind_find(self) -> Self {
            self.blind_find.store(true, Ordering::SeqCst);
            self
        }

        pub fn records(&self) -> Vec<CaptureRecord> {
            self.records.lock().unwrap().clone()
        }

        pub fn count_for_ip(&self, ip_address: &str) -> usize {
            self.records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.ip_address == ip_address)
                .count()
        }

        pub fn write_attempts(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        pub fn seed(&self, capture: NewCapture) -> CaptureRecord {
            let mut records = self.records.lock().unwrap();
            let record = to_record(records.len() as i64 + 1, capture);
            records.push(record.clone());
            record
        }

        fn check_available(&self) -> Result<(), StoreError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            Ok(())
        }
    }

    fn to_record(id: i64, capture: NewCapture) -> CaptureRecord {
        let now = Utc::now();
        CaptureRecord {
            id,
            image_url: capture.image_url,
            latitude: capture.location.latitude,
            longitude: capture.location.longitude,
            device_info: capture.device_info,
            ip_address: capture.ip_address,
            created_at: now,
            updated_at: now,
        }
    }

    #[async_trait]
    impl CaptureStore for MemoryCaptureStore {
        async fn find_by_ip(
            &self,
            ip_address: &str,
        ) -> Result<Option<CaptureRecord>, StoreError> {
            self.check_available()?;
            if self.blind_find.load(Ordering::SeqCst) {
                return Ok(None);
            }
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.ip_address == ip_address)
                .cloned())
        }

        async fn insert(&self, capture: &NewCapture) -> Result<InsertOutcome, StoreError> {
            self.check_available()?;
            self.writes.fetch_add(1, Ordering::SeqCst);

            let mut records = self.records.lock().unwrap();
            let taken = !capture.ip_address.is_empty()
                && records.iter().any(|r| r.ip_address == capture.ip_address);
            if taken {
                return Ok(InsertOutcome::Duplicate);
            }
            let record = to_record(records.len() as i64 + 1, capture.clone());
            records.push(record.clone());
            Ok(InsertOutcome::Inserted(record))
        }
    }
}
