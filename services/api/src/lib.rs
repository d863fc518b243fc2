//! Medvoice API Library Crate
//!
//! This library contains all the core logic for the medvoice backend: the
//! session registry and duplex relay that bridge a clinical front-end to
//! the upstream realtime voice service, the REST front door for the
//! two-phase connection flow, and the concrete collaborators (Gemini Live
//! connector, clinical board client). The `api` binary is a thin wrapper
//! around this library.

pub mod board;
pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod voice;
