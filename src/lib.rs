//! # taskdeck - hierarchical task engine
//!
//! Tracks hierarchical units of work: tasks nest via a single parent
//! pointer to model projects, milestones and subtasks, with time logged
//! against any node. The engine keeps the parent graph acyclic and
//! depth-bounded under edits, answers ancestor/descendant/children queries
//! with depth and path metadata, evaluates multi-criteria
//! filter/sort/pagination requests, and computes time-logged rollups and
//! date-span aggregates across subtrees.
//!
//! The engine reads and writes through the [`store::TaskStore`] trait; it
//! carries no transport, authentication or rendering concerns of its own.
//! The bundled `td` binary is a thin CLI over the same operations, backed
//! by [`store::JsonStore`].
//!
//! - [`hierarchy`]: parent-pointer guard and tree traversal
//! - [`query`]: filter/sort/pagination engine
//! - [`rollup`]: time rollups and timeline spans
//! - [`store`]: storage contract plus JSON-file and in-memory stores

pub mod cli;
pub mod cmd;
pub mod dates;
pub mod error;
pub mod fields;
pub mod hierarchy;
pub mod query;
pub mod rollup;
pub mod store;
pub mod task;

pub use error::{EngineError, EngineResult};
pub use hierarchy::MAX_DEPTH;
