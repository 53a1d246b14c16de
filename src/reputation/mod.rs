//! Reputation Tracking for mix nodes and gateways
//!
//! Every observation nudges the observed node's reputation: up by the reward,
//! down by the penalty. Reputation never drops below zero through this path.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌───────────────────┐     ┌─────────────────┐
//! │ ReputationPolicy │────►│ ReputationManager │────►│ StatusStore     │
//! │ (deltas)         │     │ (adjustments)     │     │ (conditional    │
//! └──────────────────┘     └───────────────────┘     │  update)        │
//!                                                    └─────────────────┘
//! ```
//!
//! ## Score Model
//!
//! - A new node starts at 0, re-registration keeps the earned score
//! - `+up_reward` per up observation, `down_penalty` (negative) per down one
//! - A penalty that would go below zero is not applied at all
//! - Nodes at or above `active_threshold` form the active topology
//! - Removed nodes are not adjusted

mod manager;
mod score;

pub use manager::ReputationManager;
pub use score::ReputationPolicy;
