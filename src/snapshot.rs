//! Whole-aggregate persistence.
//!
//! Aggregates that mix plain state with big-collection fields persist through
//! a snapshot: a plain-data shadow of the aggregate that carries everything
//! *except* the collection handles. Collection contents already live in the
//! engine's partitions, so the snapshot records only what the engine cannot
//! reconstruct, and rebuilding an aggregate reattaches its collections by
//! name through the engine.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::engine::BigMapStore;
use crate::error::StoreResult;
use crate::map::codec::{decode_fallback, encode_fallback, frame_bytes, unframe_bytes};

/// An aggregate that can be saved to and loaded from a named object slot.
///
/// # Example
///
/// ```ignore
/// struct Model {
///     epochs: u32,
///     weights: BigMap<i64, f64>,
/// }
///
/// #[derive(Serialize, Deserialize)]
/// struct ModelSnapshot {
///     epochs: u32,
/// }
///
/// impl Persistable for Model {
///     type Snapshot = ModelSnapshot;
///
///     fn to_snapshot(&self) -> ModelSnapshot {
///         ModelSnapshot { epochs: self.epochs }
///     }
///
///     fn from_snapshot<S: BigMapStore>(snapshot: ModelSnapshot, store: &S) -> StoreResult<Self> {
///         Ok(Self {
///             epochs: snapshot.epochs,
///             weights: store.get_big_map(&MapSpec::new("weights"))?,
///         })
///     }
/// }
/// ```
pub trait Persistable: Sized {
    /// The plain-data shadow of the aggregate. Collection handles cannot
    /// appear here: the type must be fully serde-serializable.
    type Snapshot: Serialize + DeserializeOwned;

    /// Extract the snapshot. Must not mutate the aggregate.
    fn to_snapshot(&self) -> Self::Snapshot;

    /// Rebuild the aggregate, reattaching every big-collection field
    /// through `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if reattaching a collection fails.
    fn from_snapshot<S: BigMapStore>(snapshot: Self::Snapshot, store: &S) -> StoreResult<Self>;
}

/// Encode an aggregate's snapshot into slot bytes.
pub(crate) fn encode_snapshot<T: Persistable>(value: &T, compressed: bool) -> StoreResult<Vec<u8>> {
    let raw = encode_fallback(&value.to_snapshot())?;
    frame_bytes(&raw, compressed)
}

/// Decode slot bytes back into a snapshot.
pub(crate) fn decode_snapshot<T: Persistable>(framed: &[u8]) -> StoreResult<T::Snapshot> {
    let raw = unframe_bytes(framed)?;
    decode_fallback(&raw)
}
