//! Frame-coherent octree snapshot publishing (§4.4's optional
//! "frame-coherent snapshot"), grounded in the clipmap streaming
//! controller's `edit_snapshot: Arc<HashMap<...>>` field: readers take a
//! cheap `Arc` clone under a short-lived lock, then hold an immutable
//! handle that a concurrent rebuild cannot mutate out from under them.

use std::sync::Arc;

use parking_lot::Mutex;
use voxelicous_voxel::Octree;

/// Publishes successive octree builds as atomically-swapped snapshots.
///
/// Intended for a single consumer (the render thread) calling
/// [`SnapshotPublisher::get_snapshot`] once per frame; multiple producers
/// may call [`SnapshotPublisher::publish`] concurrently, each publish
/// replacing the visible snapshot in one swap.
pub struct SnapshotPublisher {
    current: Mutex<Arc<Octree>>,
}

impl SnapshotPublisher {
    /// Publish `initial` as the first visible snapshot.
    pub fn new(initial: Octree) -> Self {
        Self {
            current: Mutex::new(Arc::new(initial)),
        }
    }

    /// Borrow the current snapshot. The returned handle is never mutated;
    /// a later `publish` only ever changes which handle is current.
    pub fn get_snapshot(&self) -> Arc<Octree> {
        self.current.lock().clone()
    }

    /// Publish `next` as the new current snapshot, atomically replacing
    /// whatever frames already in flight are still holding.
    pub fn publish(&self, next: Octree) {
        *self.current.lock() = Arc::new(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use voxelicous_voxel::{build, AttributeRegistry, AttributeType, AttributeValue, BuildConfig};

    fn empty_octree() -> Octree {
        let registry = AttributeRegistry::new();
        registry.register_key("density", AttributeType::F32, AttributeValue::F32(0.0)).unwrap();
        let config = BuildConfig {
            max_levels: 4,
            brick_depth: 3,
            ..BuildConfig::default()
        };
        build(&[], Vec3::ZERO, Vec3::splat(8.0), &config, &registry).unwrap()
    }

    #[test]
    fn snapshot_held_by_a_reader_survives_a_publish() {
        let publisher = SnapshotPublisher::new(empty_octree());
        let held = publisher.get_snapshot();

        publisher.publish(empty_octree());
        let fresh = publisher.get_snapshot();

        assert!(Arc::ptr_eq(&held, &held));
        assert!(!Arc::ptr_eq(&held, &fresh));
    }
}
