//! Capacity-gated order claiming.
//!
//! Decides which unclaimed remote order a worker picks up next:
//! capacity and eligibility checks first, then oldest-first selection
//! with priority orders jumping the queue. Exclusivity is delegated to
//! the store's uniqueness guarantee, so losing a claim race is an
//! expected outcome here, not an error.

pub mod eligibility;
pub mod engine;
pub mod types;

pub use engine::CapacityAllocator;
pub use types::{
    AllocatorConfig, ClaimError, ClaimOutcome, PriorityProvider, StaticPriorityList,
};
