//! Batch generation of OSL shader-group sources for a node definition library,
//! plus compilation of each source with an external `oslc`.

pub mod batch_log;
pub mod codegen;
pub mod config;
pub mod driver;
pub mod graph;
pub mod library;
pub mod naming;
pub mod oslc;
pub mod search_path;
pub mod value;
