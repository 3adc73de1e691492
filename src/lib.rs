//! # Granary
//!
//! Disk-backed big collections for machine-learning components.
//!
//! Models frequently carry maps far larger than RAM: token counts, feature
//! statistics, embedding rows. Granary gives such components named,
//! map-shaped collections that live in an embedded store instead of the
//! heap, plus a save/load protocol for the aggregates that own them.
//!
//! An engine is created from a [`StoreConfig`] and bound to a logical name.
//! Inside it, collections are spread across four partitions (persistent or
//! temporary, cached or uncached) selected by a [`StorageHint`]; the files
//! open lazily on first use.
//!
//! # Example
//!
//! ```ignore
//! use granary::{MapSpec, StoreConfig};
//!
//! let store = StoreConfig::new()
//!     .directory("/var/lib/models")
//!     .create_engine("modelA");
//!
//! let counts = store.get_big_map::<String, u64>(&MapSpec::new("tokenCounts"))?;
//! counts.insert("the".to_string(), 1_204_981)?;
//!
//! store.close()?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod holder;
pub mod map;
pub mod snapshot;

pub use config::{StoreConfig, DEFAULT_CACHE_SIZE};
pub use engine::{BigMapStore, DiskStore, Partition};
pub use error::{StoreError, StoreResult};
pub use holder::{BigMapHolder, MapDescriptor};
pub use map::{BigKey, BigMap, BigValue, MapKind, MapSpec, StorageHint};
pub use snapshot::Persistable;
