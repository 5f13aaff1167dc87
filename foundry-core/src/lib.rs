//! Foundry Core
//!
//! Core types and abstractions for the Foundry provisioning system.
//!
//! This crate contains:
//! - Domain types: Core business entities (ProvisionerJob, WorkspaceBuild, etc.)
//! - DTOs: Data transfer objects exchanged with provisioner daemons
//! - Codec: Conversions between wire enums and storage enums
//! - Slug validation shared by the converter and the materializer

pub mod codec;
pub mod domain;
pub mod dto;
pub mod slug;
