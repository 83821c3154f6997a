use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;
use rand::Rng;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct IssuedCode {
    code: String,
    ttl: Duration,
}

/// Each code lives exactly as long as the window it was issued for.
struct CodeExpiry;

impl Expiry<Uuid, IssuedCode> for CodeExpiry {
    fn expire_after_create(&self, _key: &Uuid, value: &IssuedCode, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &Uuid,
        value: &IssuedCode,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// One-time clock-in codes, one per employee.
#[derive(Clone)]
pub struct ClockInCodes {
    cache: Cache<Uuid, IssuedCode>,
}

impl ClockInCodes {
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(CodeExpiry)
            .build();
        Self { cache }
    }

    /// Issues a fresh 6-digit code, replacing any earlier one.
    pub async fn issue(&self, employee_id: Uuid, ttl: Duration) -> String {
        let code = format!("{:06}", rand::rng().random_range(0..1_000_000u32));
        self.cache
            .insert(
                employee_id,
                IssuedCode {
                    code: code.clone(),
                    ttl,
                },
            )
            .await;
        code
    }

    /// Checks the code and burns it on success.
    pub async fn consume(&self, employee_id: Uuid, code: &str) -> bool {
        match self.cache.get(&employee_id).await {
            Some(issued) if issued.code == code.trim() => {
                self.cache.invalidate(&employee_id).await;
                true
            }
            _ => false,
        }
    }
}

impl Default for ClockInCodes {
    fn default() -> Self {
        Self::new(10_000)
    }
}
