//! Voxel world entity store and async ingestion queue for the Voxelicous engine.
//!
//! - [`entity_store`]: a thread-safe, Morton-keyed `hecs` entity store (C3).
//! - [`ingestion`]: a bounded async ingestion queue feeding the entity store (C4).
//! - [`rebuild`]: the C3 -> C6 seam, rebuilding an octree from a world's solid entities.
//! - [`snapshot`]: frame-coherent octree snapshot publishing for a render thread.

pub mod entity_store;
pub mod ingestion;
pub mod rebuild;
pub mod snapshot;

pub use entity_store::{CreateRequest, EntityComponents, VoxelWorld};
pub use ingestion::{InjectionConfig, IngestionQueue, QueueStats};
pub use rebuild::build_from_world;
pub use snapshot::SnapshotPublisher;
