//! Parley Signaling Relay Library
//!
//! This library exposes the relay's modules for the `parleyd` binary and for
//! integration testing.

pub mod connection;
pub mod connection_tracker;
pub mod constants;
pub mod listener;
pub mod registry;
pub mod relay;
pub mod websocket;
