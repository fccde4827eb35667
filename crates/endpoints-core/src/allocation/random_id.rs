//! Random request id allocation.

use endpoints_types::application::Environment;
use endpoints_types::request_log::RandomRequestId;
use rand::Rng;

use crate::error::EngineError;
use crate::repository::AttemptTransaction;

/// Candidates drawn before allocation gives up.
pub const MAX_RANDOM_ID_ATTEMPTS: u32 = 100;

/// Source of candidate ids.
pub trait RandomIdSource: Send + Sync {
    fn candidate(&self) -> i64;
}

/// Leading digit uniform over 1-9, remaining nine digits uniform over 0-9.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngSource;

impl RandomIdSource for ThreadRngSource {
    fn candidate(&self) -> i64 {
        let mut rng = rand::thread_rng();
        rng.gen_range(1..=9i64) * 1_000_000_000 + rng.gen_range(0..1_000_000_000i64)
    }
}

/// Draw candidates until one is unused for (application, environment).
///
/// The caller must hold the application lock, otherwise two attempts can both
/// pass the existence check for the same candidate.
pub async fn allocate_random_id<X: AttemptTransaction>(
    tx: &X,
    source: &dyn RandomIdSource,
    application: &str,
    environment: Environment,
) -> Result<RandomRequestId, EngineError> {
    for attempt in 1..=MAX_RANDOM_ID_ATTEMPTS {
        let value = source.candidate();
        let id = RandomRequestId::new(value)
            .ok_or_else(|| EngineError::Internal(format!("random id candidate {value} is not 10 digits")))?;

        if !tx.random_id_exists(application, environment, id).await? {
            return Ok(id);
        }
        tracing::debug!(application, %environment, attempt, "random id collision");
    }

    Err(EngineError::RandomIdExhausted {
        attempts: MAX_RANDOM_ID_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::Utc;
    use endpoints_types::request_log::RequestLogRecord;

    use crate::repository::RequestStore;
    use crate::test_support::MemoryStore;

    struct FixedSource {
        value: i64,
        draws: AtomicU32,
    }

    impl RandomIdSource for FixedSource {
        fn candidate(&self) -> i64 {
            self.draws.fetch_add(1, Ordering::SeqCst);
            self.value
        }
    }

    #[test]
    fn test_thread_rng_candidates_are_ten_digits() {
        for _ in 0..10_000 {
            let value = ThreadRngSource.candidate();
            assert!((RandomRequestId::MIN..=RandomRequestId::MAX).contains(&value));
        }
    }

    #[tokio::test]
    async fn test_allocated_ids_are_unique() {
        let store = MemoryStore::new();
        let mut seen = HashSet::new();
        for _ in 0..50 {
            let tx = store.begin().await.unwrap();
            let id = allocate_random_id(&tx, &ThreadRngSource, "shop", Environment::Live)
                .await
                .unwrap();
            assert!(seen.insert(id));
            let mut record = RequestLogRecord::new("shop", Environment::Live, "e", Utc::now());
            record.random_id_per_application = Some(id);
            tx.insert_request_log(&record).await.unwrap();
            tx.commit().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_exhausted_space_fails_after_exactly_max_attempts() {
        let store = MemoryStore::new();
        let taken = RandomRequestId::new(1_234_567_890).unwrap();
        let mut record = RequestLogRecord::new("shop", Environment::Live, "e", Utc::now());
        record.random_id_per_application = Some(taken);
        store.insert_committed(record);

        let source = FixedSource {
            value: taken.value(),
            draws: AtomicU32::new(0),
        };
        let tx = store.begin().await.unwrap();
        let err = allocate_random_id(&tx, &source, "shop", Environment::Live)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::RandomIdExhausted { attempts: 100 }));
        assert_eq!(source.draws.load(Ordering::SeqCst), MAX_RANDOM_ID_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_same_id_allowed_in_other_environment() {
        let store = MemoryStore::new();
        let taken = RandomRequestId::new(1_234_567_890).unwrap();
        let mut record = RequestLogRecord::new("shop", Environment::Preview, "e", Utc::now());
        record.random_id_per_application = Some(taken);
        store.insert_committed(record);

        let source = FixedSource {
            value: taken.value(),
            draws: AtomicU32::new(0),
        };
        let tx = store.begin().await.unwrap();
        let id = allocate_random_id(&tx, &source, "shop", Environment::Live).await.unwrap();
        assert_eq!(id, taken);
    }
}
