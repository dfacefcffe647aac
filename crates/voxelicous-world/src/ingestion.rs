//! Async ingestion queue (C4): a bounded MPSC ring buffer feeding a worker
//! pool that turns `VoxelCreationRequest`s into entities in a [`VoxelWorld`].
//!
//! `enqueue` only ever touches the lock-free ring; the worker pool is the
//! sole consumer, woken by a condvar rather than polling. This mirrors the
//! shape of the chunk streaming controller's background job channel, with
//! the channel replaced by a bounded ring (so producers get backpressure
//! instead of unbounded growth) and the job queue replaced by a simple
//! entity-creation closure.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::queue::ArrayQueue;
use tracing::{debug, instrument, warn};
use voxelicous_core::error::{Error, Result};
use voxelicous_entity::Entity;

use crate::entity_store::{morton_key_for, CreateRequest, VoxelWorld};

/// Construction-time configuration for an [`IngestionQueue`].
#[derive(Debug, Clone, Copy)]
pub struct InjectionConfig {
    pub capacity: usize,
    pub num_worker_threads: usize,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            capacity: 65536,
            num_worker_threads: 1,
        }
    }
}

/// A snapshot of the queue's counters, safe to read from any thread without
/// blocking a producer or a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub pending_count: usize,
    pub processed_count: u64,
    pub entities_created: u64,
    pub failed_count: u64,
    pub is_processing: bool,
}

/// A request tagged with the monotonic sequence number assigned at
/// `enqueue` time, so worker completions (which can race across a pool of
/// more than one thread) can be folded back into arrival order before
/// landing in the created-entities buffer.
struct SeqRequest {
    seq: u64,
    request: CreateRequest,
}

/// Completed-but-not-yet-drained results, keyed by sequence number.
///
/// `get_created_entities`/worker completion only ever append the
/// contiguous prefix starting at `next_seq` into `created`, so two
/// requests enqueued by the same producer thread -- whose sequence numbers
/// are therefore increasing -- always land in `created` in that same
/// relative order, regardless of which worker thread finishes first.
struct Results {
    next_seq: u64,
    pending: BTreeMap<u64, Option<Entity>>,
    created: Vec<Entity>,
}

impl Results {
    fn record(&mut self, seq: u64, entity: Option<Entity>) {
        self.pending.insert(seq, entity);
        while let Some(entry) = self.pending.remove(&self.next_seq) {
            if let Some(entity) = entry {
                self.created.push(entity);
            }
            self.next_seq += 1;
        }
    }
}

struct Shared {
    world: Arc<VoxelWorld>,
    ring: ArrayQueue<SeqRequest>,
    next_seq: AtomicU64,
    results: Mutex<Results>,
    in_flight: AtomicUsize,
    processed_count: AtomicU64,
    entities_created: AtomicU64,
    failed_count: AtomicU64,
    running: AtomicBool,
    wake_lock: Mutex<()>,
    not_empty: Condvar,
}

impl Shared {
    fn wake_one(&self) {
        // `ArrayQueue::push` never blocks; the notify below is best-effort
        // and paired with a bounded wait in the worker loop so a missed
        // wakeup only costs a short poll, never a stall.
        self.not_empty.notify_one();
    }

    fn stats(&self) -> QueueStats {
        let pending = self.ring.len();
        let in_flight = self.in_flight.load(Ordering::Acquire);
        QueueStats {
            pending_count: pending,
            processed_count: self.processed_count.load(Ordering::Relaxed),
            entities_created: self.entities_created.load(Ordering::Relaxed),
            failed_count: self.failed_count.load(Ordering::Relaxed),
            is_processing: pending > 0 || in_flight > 0,
        }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        match shared.ring.pop() {
            Some(SeqRequest { seq, request }) => {
                shared.in_flight.fetch_add(1, Ordering::AcqRel);
                let created = shared.world.create(request.position, request.components);
                if created.is_some() {
                    shared.entities_created.fetch_add(1, Ordering::Relaxed);
                } else {
                    let key = morton_key_for(request.position, shared.world.voxel_size());
                    warn!(?key, position = ?request.position, "ingestion request produced no entity");
                    shared.failed_count.fetch_add(1, Ordering::Relaxed);
                }
                shared.results.lock().unwrap().record(seq, created);
                shared.processed_count.fetch_add(1, Ordering::Relaxed);
                shared.in_flight.fetch_sub(1, Ordering::AcqRel);
            }
            None => {
                if !shared.running.load(Ordering::Acquire) {
                    return;
                }
                let guard = shared.wake_lock.lock().unwrap();
                if shared.ring.is_empty() && shared.running.load(Ordering::Acquire) {
                    // Bounded wait: a notify lost to the race between this
                    // check and the wait is recovered within the timeout.
                    let _ = shared.not_empty.wait_timeout(guard, Duration::from_millis(20)).unwrap();
                }
            }
        }
    }
}

/// Bounded, multi-producer ingestion queue feeding a [`VoxelWorld`].
///
/// Not `Clone`: a queue owns its worker pool and is the single owner of the
/// world handle it was built with.
pub struct IngestionQueue {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl IngestionQueue {
    /// Build a stopped queue around `world` with the given configuration.
    /// Call [`IngestionQueue::start`] to spawn its worker pool.
    pub fn new(world: Arc<VoxelWorld>, config: InjectionConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                world,
                ring: ArrayQueue::new(config.capacity.max(1)),
                next_seq: AtomicU64::new(0),
                results: Mutex::new(Results {
                    next_seq: 0,
                    pending: BTreeMap::new(),
                    created: Vec::new(),
                }),
                in_flight: AtomicUsize::new(0),
                processed_count: AtomicU64::new(0),
                entities_created: AtomicU64::new(0),
                failed_count: AtomicU64::new(0),
                running: AtomicBool::new(false),
                wake_lock: Mutex::new(()),
                not_empty: Condvar::new(),
            }),
            workers: Vec::new(),
        }
    }

    /// Spawn the worker pool. Idempotent: a second call while already
    /// running is a no-op, regardless of `num_threads`.
    pub fn start(&mut self, num_threads: usize) {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let threads = num_threads.max(1);
        debug!(threads, "starting ingestion worker pool");
        for _ in 0..threads {
            let shared = Arc::clone(&self.shared);
            self.workers.push(thread::spawn(move || worker_loop(shared)));
        }
    }

    /// Whether the worker pool is currently running.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Enqueue a creation request. Lock-free and non-blocking.
    ///
    /// Fails with `ErrorKind::QueueFull` if the ring has no free slot, or
    /// `ErrorKind::QueueStopped` if called after [`IngestionQueue::stop`].
    pub fn enqueue(&self, request: CreateRequest) -> Result<()> {
        if !self.is_running() {
            return Err(Error::queue_stopped());
        }
        let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);
        self.shared.ring.push(SeqRequest { seq, request }).map_err(|_| Error::queue_full())?;
        self.shared.wake_one();
        Ok(())
    }

    /// Drain and return entities created since the last call, clearing the
    /// internal buffer.
    ///
    /// Entities enqueued by the same producer thread appear here in the
    /// same relative order they were enqueued in, even when the queue runs
    /// more than one worker thread (the sequence number assigned at
    /// `enqueue` is what orders the buffer, not worker completion order).
    pub fn get_created_entities(&self) -> Vec<Entity> {
        std::mem::take(&mut self.shared.results.lock().unwrap().created)
    }

    /// Return a copy of the created-entity buffer without clearing it.
    pub fn peek_created_entities(&self) -> Vec<Entity> {
        self.shared.results.lock().unwrap().created.clone()
    }

    /// Number of entities currently held in the created-entity buffer,
    /// awaiting [`IngestionQueue::get_created_entities`].
    pub fn get_created_entity_count(&self) -> usize {
        self.shared.results.lock().unwrap().created.len()
    }

    /// A point-in-time snapshot of the queue's counters.
    pub fn stats(&self) -> QueueStats {
        self.shared.stats()
    }

    /// Block until the ring and every in-flight request have drained.
    pub fn flush(&self) {
        while self.shared.ring.len() > 0 || self.shared.in_flight.load(Ordering::Acquire) > 0 {
            self.shared.wake_one();
            thread::yield_now();
        }
    }

    /// Stop accepting work, drain everything already enqueued, and join the
    /// worker pool.
    ///
    /// After `stop`, `enqueue` fails with `ErrorKind::QueueStopped`.
    /// Idempotent: calling `stop` twice in a row is harmless.
    pub fn stop(&mut self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) && self.workers.is_empty() {
            return;
        }
        self.shared.not_empty.notify_all();
        self.flush();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for IngestionQueue {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use crate::entity_store::EntityComponents;

    fn components() -> EntityComponents {
        EntityComponents {
            density: Some(1.0),
            ..Default::default()
        }
    }

    #[test]
    fn enqueue_before_start_is_still_lock_free_but_fails() {
        let world = Arc::new(VoxelWorld::new(1.0));
        let queue = IngestionQueue::new(world, InjectionConfig::default());
        let result = queue.enqueue(CreateRequest {
            position: Vec3::ZERO,
            components: components(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn started_queue_creates_entities() {
        let world = Arc::new(VoxelWorld::new(1.0));
        let mut queue = IngestionQueue::new(Arc::clone(&world), InjectionConfig::default());
        queue.start(2);

        for i in 0..50 {
            queue
                .enqueue(CreateRequest {
                    position: Vec3::new(i as f32, 0.0, 0.0),
                    components: components(),
                })
                .unwrap();
        }

        queue.flush();
        let stats = queue.stats();
        assert_eq!(stats.pending_count, 0);
        assert_eq!(stats.entities_created, 50);
        assert_eq!(stats.failed_count, 0);
        assert_eq!(queue.get_created_entity_count(), 50);
        assert_eq!(world.len(), 50);

        let entities = queue.get_created_entities();
        assert_eq!(entities.len(), 50);
        assert_eq!(queue.get_created_entity_count(), 0);

        // Enqueued from this single producer thread in increasing-x order;
        // must come back in that same relative order even with 2 workers.
        let keys: Vec<_> = entities.iter().map(|&e| world.morton_key(e).unwrap().0).collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn stop_drains_and_rejects_further_enqueues() {
        let world = Arc::new(VoxelWorld::new(1.0));
        let mut queue = IngestionQueue::new(world, InjectionConfig::default());
        queue.start(1);
        queue
            .enqueue(CreateRequest {
                position: Vec3::ZERO,
                components: components(),
            })
            .unwrap();

        queue.stop();
        assert!(!queue.is_running());
        assert_eq!(queue.stats().pending_count, 0);

        let result = queue.enqueue(CreateRequest {
            position: Vec3::ZERO,
            components: components(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn capacity_is_enforced() {
        let world = Arc::new(VoxelWorld::new(1.0));
        let mut queue = IngestionQueue::new(world, InjectionConfig { capacity: 1, num_worker_threads: 1 });
        // Don't start workers, so the single slot stays occupied.
        queue.shared.running.store(true, Ordering::Release);
        queue
            .enqueue(CreateRequest {
                position: Vec3::ZERO,
                components: components(),
            })
            .unwrap();
        let result = queue.enqueue(CreateRequest {
            position: Vec3::ONE,
            components: components(),
        });
        assert!(result.is_err());
    }
}
