use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

/// FIFO lanes keyed by entity. Work holding a lane runs alone for that key;
/// later arrivals queue behind it. Different keys never wait on each other.
#[derive(Debug)]
pub struct Lanes<K> {
    lanes: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

/// Held for the duration of one queued operation.
#[derive(Debug)]
pub struct LaneGuard {
    _guard: OwnedMutexGuard<()>,
}

impl<K: Eq + Hash + Clone> Lanes<K> {
    pub fn new() -> Self {
        Self {
            lanes: Mutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(&self, key: &K) -> LaneGuard {
        let lane = {
            let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
            // Only the map holds idle lanes.
            lanes.retain(|_, lane| Arc::strong_count(lane) > 1);
            lanes.entry(key.clone()).or_default().clone()
        };
        LaneGuard {
            _guard: lane.lock_owned().await,
        }
    }

    /// Whether an operation currently holds or waits on this lane.
    pub fn is_busy(&self, key: &K) -> bool {
        let lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        lanes
            .get(key)
            .map(|lane| Arc::strong_count(lane) > 1)
            .unwrap_or(false)
    }
}

impl<K: Eq + Hash + Clone> Default for Lanes<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_serializes() {
        let lanes = Arc::new(Lanes::<u32>::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = lanes.acquire(&1).await;
        assert!(lanes.is_busy(&1));

        let task = {
            let lanes = lanes.clone();
            let order = order.clone();
            tokio::spawn(async move {
                let _g = lanes.acquire(&1).await;
                order.lock().unwrap().push("second");
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        order.lock().unwrap().push("first");
        drop(first);
        task.await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
        assert!(!lanes.is_busy(&1));
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let lanes = Lanes::<u32>::new();
        let _a = lanes.acquire(&1).await;
        let _b = lanes.acquire(&2).await;
        assert!(lanes.is_busy(&1));
        assert!(lanes.is_busy(&2));
    }
}
