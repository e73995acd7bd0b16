// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Qbitel OTA Delta Library
//!
//! Binary delta generation and application for firmware images:
//!
//! - **Block**: offset-aligned block diff engine with run-length detection
//! - **Patch**: the "DPAT" wire format (header + tagged operation stream)
//! - **Apply**: streaming patch applier with progress reporting
//! - **Generate**: host-side patch generator (defines the wire format the
//!   applier accepts)
//!
//! The applier never mutates the old image and never reports an output as
//! verified unless its length and SHA-256 match the patch header.

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod apply;
pub mod block;
pub mod generate;
pub mod patch;

// Re-export commonly used items
pub use apply::{ApplyState, PatchApplier};
pub use block::{BlockDiffer, DiffStats};
pub use generate::{GenerateReport, PatchGenerator};
pub use patch::{PatchHeader, PatchOperation};
