//! The reference-code generator (C1): a monotonic, persistent, daily-reset
//! identifier allocator. Grounded on `tandem-core::storage`'s self-healing
//! JSON read and `tandem-core::storage_paths`'s atomic-write helper.

mod store;

pub use store::{FileSequenceStore, InMemorySequenceStore, SequenceStore};

use std::sync::Arc;

use chrono::Utc;
use cortex_types::refcode::{ReferenceCode, ReferenceCodeError, SequenceState};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum RefCodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("sequence exhausted for {date}")]
    SequenceExhausted { date: chrono::NaiveDate },
    #[error(transparent)]
    Invalid(#[from] ReferenceCodeError),
}

/// `GenerateAsync` (spec.md §4.1). A single internal mutex acts as the
/// exclusive token so concurrent callers within one process still produce
/// a strictly increasing sequence.
pub struct ReferenceCodeGenerator {
    store: Arc<dyn SequenceStore>,
    lock: Mutex<()>,
}

impl ReferenceCodeGenerator {
    pub fn new(store: Arc<dyn SequenceStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    pub async fn generate(&self) -> Result<ReferenceCode, RefCodeError> {
        let _token = self.lock.lock().await;

        let today = Utc::now().date_naive();
        let loaded = self.store.load().await?;

        let sequence = if loaded.date != today {
            1
        } else {
            loaded.sequence + 1
        };

        if sequence > 9999 {
            return Err(RefCodeError::SequenceExhausted { date: today });
        }

        self.store
            .save(&SequenceState {
                date: today,
                sequence,
            })
            .await?;

        Ok(ReferenceCode::new(today, sequence)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn sequence_is_strictly_increasing_within_a_day() {
        let store = Arc::new(InMemorySequenceStore::new());
        let gen = ReferenceCodeGenerator::new(store);
        let a = gen.generate().await.unwrap();
        let b = gen.generate().await.unwrap();
        let c = gen.generate().await.unwrap();
        assert!(a < b);
        assert!(b < c);
        assert_eq!(b.sequence(), a.sequence() + 1);
    }

    #[tokio::test]
    async fn rollover_resets_sequence_to_one() {
        let store = Arc::new(InMemorySequenceStore::seeded(SequenceState {
            date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            sequence: 42,
        }));
        let gen = ReferenceCodeGenerator::new(store);
        let code = gen.generate().await.unwrap();
        assert_eq!(code.sequence(), 1);
    }

    #[tokio::test]
    async fn exhaustion_fails_without_rollover() {
        let store = Arc::new(InMemorySequenceStore::seeded(SequenceState {
            date: Utc::now().date_naive(),
            sequence: 9999,
        }));
        let gen = ReferenceCodeGenerator::new(store);
        assert!(matches!(
            gen.generate().await,
            Err(RefCodeError::SequenceExhausted { .. })
        ));
    }

    #[tokio::test]
    async fn concurrent_callers_never_collide() {
        let store = Arc::new(InMemorySequenceStore::new());
        let gen = Arc::new(ReferenceCodeGenerator::new(store));
        let mut handles = Vec::new();
        for _ in 0..50 {
            let gen = gen.clone();
            handles.push(tokio::spawn(async move { gen.generate().await.unwrap() }));
        }
        let mut codes = Vec::new();
        for h in handles {
            codes.push(h.await.unwrap());
        }
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 50);
    }
}
