use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use crate::error::Result;

type Flight<V> = watch::Receiver<Option<Result<V>>>;
type Flights<K, V> = Arc<Mutex<HashMap<K, Flight<V>>>>;

/// Single-flight cache: concurrent loads of the same key share one load task.
///
/// The load runs on its own task, so it completes even when every caller
/// that asked for it has gone away. Successes are kept for the cache's
/// lifetime; failures are handed to every waiter of that flight and then
/// evicted, so only a new request loads again.
pub(crate) struct Inflight<K, V> {
    flights: Flights<K, V>,
}

impl<K, V> Inflight<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Join the flight for `key`, starting it with `load` if there is none.
    ///
    /// Returns `None` if the load task ended without producing a result.
    pub(crate) async fn get_or_load<F, Fut>(&self, key: &K, load: F) -> Option<Result<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let mut flight = {
            let mut flights = lock(&self.flights);
            match flights.get(key) {
                Some(flight) => flight.clone(),
                None => {
                    let (tx, rx) = watch::channel(None);
                    flights.insert(key.clone(), rx.clone());
                    let shared = self.flights.clone();
                    let key = key.clone();
                    let own = rx.clone();
                    let load = load();
                    tokio::spawn(async move {
                        let result = load.await;
                        if result.is_err() {
                            let mut flights = lock(&shared);
                            if flights
                                .get(&key)
                                .is_some_and(|current| current.same_channel(&own))
                            {
                                flights.remove(&key);
                            }
                        }
                        tx.send_replace(Some(result));
                    });
                    rx
                }
            }
        };

        let outcome = flight
            .wait_for(Option::is_some)
            .await
            .map(|result| (*result).clone());
        match outcome {
            Ok(result) => result,
            Err(_) => {
                let mut flights = lock(&self.flights);
                if flights
                    .get(key)
                    .is_some_and(|current| current.same_channel(&flight))
                {
                    flights.remove(key);
                }
                None
            }
        }
    }

    /// Returns the cached value if the key has loaded successfully.
    pub(crate) fn get(&self, key: &K) -> Option<V> {
        lock(&self.flights)
            .get(key)
            .and_then(|flight| (*flight.borrow()).clone())
            .and_then(|result| result.ok())
    }
}

fn lock<K, V>(flights: &Flights<K, V>) -> MutexGuard<'_, HashMap<K, Flight<V>>> {
    flights.lock().unwrap_or_else(|e| e.into_inner())
}
