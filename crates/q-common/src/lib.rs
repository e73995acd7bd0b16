// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Qbitel OTA Common Library
//!
//! This crate provides the shared foundation for the firmware update and
//! secure boot crates: error definitions, version handling, byte-stream
//! abstractions, configuration and diagnostic logging.
//!
//! # Features
//!
//! - `std`: Enable standard library support (disabled by default for embedded)
//! - `defmt`: Enable defmt logging support for embedded debugging
//!
//! # Design
//!
//! No heap allocations are performed - all buffers use fixed-size arrays or
//! heapless collections. All persisted records carry a checksum so a torn
//! write after power loss reads back as corruption, never as valid state.

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(feature = "std")]
extern crate std;

pub mod config;
pub mod constants;
pub mod errors;
pub mod log;
pub mod stream;
pub mod version;

// Re-export commonly used items
pub use config::{BootConfig, DeltaConfig};
pub use errors::{Error, Result};
pub use stream::{ByteSink, ByteSource, SeekSource};
pub use version::Version;
