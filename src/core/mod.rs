//! Runtime components of the agent.
//!
//! * `capture`: capture/store/upload/report cycle and its collaborator traits
//! * `storage`: timestamped on-disk image store
//! * `readiness`: broker-session gating
//! * `executor`: interval driver for capture cycles

pub mod capture;
pub mod executor;
pub mod readiness;
pub mod storage;
