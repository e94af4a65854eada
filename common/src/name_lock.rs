//! Per-bucket-uname mutex (spec §5: "a non-reentrant per-(bucket-uname)
//! mutex ... to serialize create/destroy/rename/EC-enable against each
//! other and against concurrent PUTs in that bucket"). Same lazily-
//! populated DashMap-of-locks shape as `lom::LomLockTable`, keyed one
//! level up at the bucket rather than the object.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct BucketNameLockTable {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl BucketNameLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, bucket_uname: &str) -> Arc<Mutex<()>> {
        self.locks.entry(bucket_uname.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_same_lock_for_same_bucket_uname() {
        let table = BucketNameLockTable::new();
        let a = table.get("ais/b1");
        let b = table.get("ais/b1");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn concurrent_lockers_on_same_bucket_serialize() {
        let table = BucketNameLockTable::new();
        let lock = table.get("ais/b1");
        let guard = lock.lock().await;

        let lock2 = table.get("ais/b1");
        let attempt = lock2.try_lock();
        assert!(attempt.is_err(), "second locker must not acquire while the first holds the guard");
        drop(guard);
    }
}
