//! This module contains the core datatypes of the library.

mod emission;
mod engine;
mod events;
mod forest;
mod node;
mod pruning;
mod render;
mod sampler;
mod store;
mod surgery;
mod topology;

pub use emission::MAX_EMISSION_SAMPLES;
pub use engine::StepRecord;
pub use events::{Contemporary, ContemporaryHeap, Event, EventIterator};
pub use forest::Forest;
pub use node::{Parent, TreeStatus};
pub use sampler::{ActiveRoot, CoalescencePlan, CoalescenceTarget, PlannedCoalescence};
pub use store::NodeStore;
