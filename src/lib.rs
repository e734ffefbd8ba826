//! Bridge between the Dexcom Share service and a calling process.
//!
//! This package provides a small bridge that authenticates against the
//! Dexcom Share service and relays the most recent sensor readings to a
//! calling process. The bridge is not a monitoring system of its own: it
//! is a process boundary adapter. The caller invokes it with credentials
//! and an action and reads back exactly one JSON envelope on stdout,
//! regardless of whether the action succeeded or failed. Callers are
//! expected to parse the envelope and inspect its `success` field rather
//! than the process exit code.
//!
//! The main cli provided by this package is `dexcom_bridge`. It supports
//! two actions: `login`, which verifies credentials and reports the
//! account identifier, and `readings`, which fetches up to 24 hours of
//! glucose readings. While an action runs, anything written to stdout by
//! the transport stack is diverted to stderr so that the JSON channel
//! only ever carries the final envelope.
//!
//! A second cli available in this package is `probe_share`. This is a
//! manual diagnostic tool that tries a set of credentials against both
//! Share regions and logs which one accepts them, along with the latest
//! reading when one is available.
//!
#![doc = include_str!("../CHANGELOG.md")]

#[macro_use]
extern crate serde_derive;
pub mod dexcom_bridge;
pub mod diversion;
pub mod error;
pub mod region;
pub mod share;
