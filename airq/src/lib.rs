//! Client and polling controller for the air-Q's local encrypted HTTP API.
//!
//! [`session::DeviceSession`] speaks the appliance protocol,
//! [`poller::Poller`] turns it into debounced [`model::DeviceState`] and
//! [`model::EdgeEvent`]s, and [`device::Device`] ties both to a settings bag.

pub mod config;
pub mod crypto;
pub mod device;
pub mod errors;
pub mod metrics;
pub mod model;
pub mod mqtt;
pub mod poller;
pub mod projector;
pub mod rest;
pub mod session;
pub mod transport;

pub use errors::{Error, Result};
