//! Realtime voice sessions: lifecycle, relay, tools, and the upstream
//! provider.

pub mod dispatch;
pub mod establish;
pub mod instructions;
pub mod provider;
pub mod queue;
pub mod registry;
pub mod relay;
pub mod sweeper;

#[cfg(test)]
pub mod testutil;
