//! Upstream provider implementations.

pub mod gemini;
