//! Secondary Index Bounded Context
//!
//! Category buckets over the loaded records so filters resolve without
//! scanning the whole collection.

pub mod index_set;
pub mod tiers;

pub use index_set::{BucketKey, Dimension, IndexSet, intersect_sorted};
pub use tiers::{LeverageTier, MarketCapTier, TierTable, VolumeTier};
