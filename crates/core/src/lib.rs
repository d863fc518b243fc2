//! Core types and collaborator seams for the medvoice backend.
//!
//! This crate defines the data carried through the voice pipeline and the
//! trait boundaries the session core depends on: the patient-context
//! provider, the tool catalogue, and the upstream realtime connection.
//! It performs no I/O of its own; concrete implementations live in the
//! API service.

pub mod context;
pub mod frame;
pub mod tool;
pub mod upstream;

pub use context::ContextProvider;
pub use frame::AudioFrame;
pub use tool::{ToolCallRequest, ToolCallResponse, ToolDeclaration, ToolHandler, ToolRegistry};
pub use upstream::{UpstreamConfig, UpstreamConnector, UpstreamEvent, UpstreamHandle};
