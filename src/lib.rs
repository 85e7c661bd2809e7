//! # Asset Telemetry Library
//!
//! Fault-tolerant sensor telemetry pipeline with a recovery supervisor.
//!
//! Three sensors share one bus and are sampled by independent capture tasks.
//! Readings are serialized and delivered to a cloud broker over a wireless
//! link. Every fault (bus hang, probe failure, link drop, publish failure) is
//! written to a shared status record, and a single supervisor decides whether
//! to recreate a task, reconnect, or shut the whole pipeline down.
//!
//! Start with [`pipeline::Pipeline::start`]; the [`sim`] module provides
//! host-side collaborators for running without hardware.

pub mod bus;
pub mod clock;
pub mod codec;
pub mod config;
pub mod display;
pub mod error;
pub mod net;
pub mod pipeline;
pub mod sensor;
pub mod sim;
pub mod status;
pub mod supervisor;
