//! camlink: camera device agent for an Alink-style IoT platform.
//!
//! The agent keeps one supervised MQTT session to the platform (through the
//! `camlink-iot` crate) and, when enabled, periodically captures a frame,
//! stores it locally, and reports its public URL as a device property.
//!
//! ## Modules
//!
//! * `config`: TOML configuration for the `[logger]`, `[device]` and
//!   `[capture]` sections, validated with `validator`.
//!
//! * `core`: runtime components:
//!   - capture cycle and its collaborator traits
//!   - on-disk image store
//!   - readiness gating on the broker session
//!   - capture executor
//!
//! * `logger`: `tracing` subscriber setup with console output (compact,
//!   pretty, JSON) and optional systemd journald integration.

pub mod config;
pub mod core;
pub mod logger;
