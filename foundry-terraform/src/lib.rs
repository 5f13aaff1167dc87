//! Foundry Terraform
//!
//! Converts Terraform-produced state and dependency graphs into the
//! normalized resource subtrees the orchestrator persists: resources with
//! their agents, apps, and metadata attached.

pub mod convert;
pub mod graph;
pub mod state;

pub use convert::{convert_resources, ConvertError};
