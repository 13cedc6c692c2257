//! # SLAM Core Library
//!
//! Per-entity arousal bookkeeping for game characters.
//!
//! Every tracked entity owns an [`EntityArousalState`]: a scalar `arousal`
//! that is always the sum of many independent contributions.
//!
//! - **Static effects** are addressed by a registry-wide [`EffectId`] that
//!   means the same thing on every entity.
//! - **Dynamic effects** are addressed by an entity-local name and vanish
//!   once dormant at zero.
//! - **Groups** bind static effects so that their product, not their sum,
//!   enters the aggregate.
//!
//! Each effect evolves in game time under a [`DecayLaw`]. The whole engine
//! round-trips through a compact little-endian [`SaveRecord`].
//!
//! ## Performance Contract
//!
//! - Registry lookups and effect mutations are O(1) per entity.
//! - An update pass touches only groups and effects that are still active.
//! - Registry fan-out is a single pass over live states.

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

pub mod codec;
pub mod config;
pub mod effect;
pub mod engine;
pub mod error;
pub mod group;
pub mod inspect;
pub mod law;
pub mod locks;
pub mod metrics;
pub mod registry;
pub mod sine;
pub mod state;
pub mod store;
pub mod types;
pub mod update;

pub use codec::{IdentifierResolver, IdentityResolver, SaveRecord};
pub use config::SlamConfig;
pub use effect::EffectRecord;
pub use engine::ArousalEngine;
pub use error::{Result, SlamError};
pub use state::EntityArousalState;
pub use store::SaveStore;
pub use types::*;
