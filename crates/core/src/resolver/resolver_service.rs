//! Request coalescing in front of the resolver.
//!
//! At most one resolution runs per series key. A caller whose volumes are
//! covered by the running one joins it and receives its subset. A caller
//! that needs other volumes waits for it to finish, then resolves only
//! what is still missing.
//!
//! Interactive callers never queue behind background work: joining a
//! background resolution raises its priority, and an interactive caller
//! it does not cover resolves on its own.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, warn};
use shelfmark_metadata::Priority;
use tokio::time::Instant;

use super::{CacheSnapshot, Resolution, ResolveRequest, ResolverCore, SharedPriority};
use crate::catalog::SeriesKey;

type SharedResolution = Shared<BoxFuture<'static, Resolution>>;

struct InFlight {
    id: u64,
    volumes: Option<BTreeSet<u32>>,
    deadline: Instant,
    origin: Priority,
    priority: SharedPriority,
    future: SharedResolution,
}

enum Step {
    Lead(SharedResolution),
    Join(SharedResolution),
    Wait(SharedResolution),
    Alone,
}

/// Whether an in-flight request for `running` answers a request for `wanted`.
fn covers(running: Option<&BTreeSet<u32>>, wanted: Option<&BTreeSet<u32>>) -> bool {
    match (running, wanted) {
        (None, None) => true,
        (Some(running), Some(wanted)) => wanted.is_subset(running),
        _ => false,
    }
}

/// Coalescing resolver. Cheap to clone.
#[derive(Clone)]
pub struct Resolver {
    core: Arc<ResolverCore>,
    in_flight: Arc<Mutex<HashMap<SeriesKey, InFlight>>>,
    next_id: Arc<AtomicU64>,
}

impl Resolver {
    pub fn new(core: ResolverCore) -> Self {
        Self {
            core: Arc::new(core),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn core(&self) -> &ResolverCore {
        &self.core
    }

    /// Number of series with a resolution running.
    pub fn in_flight(&self) -> usize {
        lock_in_flight(&self.in_flight).len()
    }

    /// Resolve a request, joining an in-flight resolution for the same key
    /// when there is one.
    pub async fn resolve(&self, request: ResolveRequest, seed: Option<CacheSnapshot>) -> Resolution {
        let threshold = self.core.settings().completeness_threshold;
        let mut seed = seed;

        loop {
            let step = {
                let mut in_flight = lock_in_flight(&self.in_flight);
                match in_flight.get(&request.key) {
                    Some(running) if Instant::now() < running.deadline => {
                        let interactive = request.origin() == Priority::Interactive;
                        if covers(running.volumes.as_ref(), request.volumes.as_ref()) {
                            if interactive {
                                running.priority.escalate();
                            }
                            Step::Join(running.future.clone())
                        } else if interactive && running.origin == Priority::Background {
                            Step::Alone
                        } else {
                            Step::Wait(running.future.clone())
                        }
                    }
                    _ => {
                        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                        let future = self.lead(id, request.clone(), seed.take());
                        in_flight.insert(
                            request.key.clone(),
                            InFlight {
                                id,
                                volumes: request.volumes.clone(),
                                deadline: request.deadline,
                                origin: request.origin(),
                                priority: request.shared_priority().clone(),
                                future: future.clone(),
                            },
                        );
                        Step::Lead(future)
                    }
                }
            };

            match step {
                Step::Lead(future) => return future.await,
                Step::Alone => {
                    debug!(
                        "'{}' resolves beside a background resolution of other volumes",
                        request.key
                    );
                    return self.core.resolve(&request, seed).await;
                }
                Step::Join(future) => {
                    debug!("'{}' joins the in-flight resolution", request.key);
                    return match tokio::time::timeout_at(request.deadline, future).await {
                        Ok(resolution) => {
                            let mut joined = resolution.subset(request.volumes.as_ref(), threshold);
                            joined.coalesced = true;
                            joined.provider_calls = 0;
                            joined
                        }
                        Err(_) => Resolution::expired(request.key.clone(), seed, threshold),
                    };
                }
                Step::Wait(future) => {
                    debug!(
                        "'{}' waits for the in-flight resolution of other volumes",
                        request.key
                    );
                    if tokio::time::timeout_at(request.deadline, future).await.is_err() {
                        return Resolution::expired(request.key.clone(), seed, threshold);
                    }
                    // The cache changed underneath; read it again.
                    seed = None;
                }
            }
        }
    }

    fn lead(&self, id: u64, request: ResolveRequest, seed: Option<CacheSnapshot>) -> SharedResolution {
        let core = Arc::clone(&self.core);
        let in_flight = Arc::clone(&self.in_flight);
        async move {
            let resolution = core.resolve(&request, seed).await;
            let mut in_flight = lock_in_flight(&in_flight);
            if in_flight.get(&request.key).is_some_and(|f| f.id == id) {
                in_flight.remove(&request.key);
            }
            resolution
        }
        .boxed()
        .shared()
    }
}

fn lock_in_flight(
    in_flight: &Mutex<HashMap<SeriesKey, InFlight>>,
) -> MutexGuard<'_, HashMap<SeriesKey, InFlight>> {
    in_flight.lock().unwrap_or_else(|poisoned| {
        warn!("In-flight resolution map was poisoned, recovering");
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::resolver::ResolverSettings;
    use crate::test_support::*;

    #[test]
    fn test_covers() {
        let running = BTreeSet::from([1, 2, 3]);
        assert!(covers(Some(&running), Some(&BTreeSet::from([2, 3]))));
        assert!(!covers(Some(&running), Some(&BTreeSet::from([3, 4]))));
        assert!(covers(None, None));
        assert!(!covers(None, Some(&running)));
        assert!(!covers(Some(&running), None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interactive_joiner_raises_background_priority() {
        let a = ScriptedProvider::new("A")
            .otherwise(Answer::Fields(full_fields("A")))
            .with_delay(Duration::from_secs(1))
            .shared();
        let h = harness(&[a.clone()], ResolverSettings::default());
        let key = SeriesKey::normalize("Monster");

        let background = {
            let resolver = h.resolver.clone();
            tokio::spawn(async move {
                resolver
                    .resolve(
                        ResolveRequest::new(
                            "Monster",
                            volumes(&[1, 2, 3]),
                            Priority::Background,
                            deadline_in(60),
                        ),
                        None,
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let running_priority = |resolver: &Resolver| {
            lock_in_flight(&resolver.in_flight)
                .get(&key)
                .map(|running| running.priority.get())
        };
        assert_eq!(running_priority(&h.resolver), Some(Priority::Background));

        let joiner = {
            let resolver = h.resolver.clone();
            tokio::spawn(async move {
                resolver
                    .resolve(
                        ResolveRequest::new(
                            "Monster",
                            volumes(&[2]),
                            Priority::Interactive,
                            deadline_in(60),
                        ),
                        None,
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(running_priority(&h.resolver), Some(Priority::Interactive));

        let joined = joiner.await.unwrap();
        assert!(joined.coalesced);
        background.await.unwrap();
        assert_eq!(a.calls(), 3);
    }
}
