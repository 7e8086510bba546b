//! Satellite agents known to the installer.
//!
//! Each agent is described by a compiled-in [`AgentDescriptor`]:
//! - **Sources**: build recipe, payload program, optional build script
//! - **Units**: declarative unit files installed for the supervisor
//! - **Env file**: the configurable keys, in the order they are written
//! - **Build**: delegated script or generic no-cache build, plus the
//!   failure policy for that build step
//!
//! The agent payloads themselves are opaque; the installer only knows them
//! through this interface.

pub mod definition;
pub mod registry;

pub use definition::{
    derived_service_name, AgentDescriptor, BuildStyle, FailurePolicy, Fallback, KeyKind, KeySpec,
};
