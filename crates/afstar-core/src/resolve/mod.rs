//! Vnode to path resolution
//!
//! Vnodes only know their parent by id, and a directory only learns its own
//! name when its parent's directory blob is decoded. The registry collects
//! those names as directories stream past; vnodes that arrive before their
//! container is known wait in the orphan buffer.

mod orphans;
mod registry;

pub use orphans::{DrainOutcome, OrphanBuffer, OrphanRecord};
pub use registry::{PathRegistry, ROOT_PATH};
