// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! A/B slot management and the boot state machine
//!
//! [`BootContext`] owns the persisted [`BootFlag`] and is the only writer
//! of slot state. Exactly one slot is active at a time; the other is the
//! rollback target. Every mutation persists the whole record in a single
//! write so that a power loss mid-update leaves the prior record intact,
//! detectable by its checksum.

use q_common::constants::SLOT_COUNT;
use q_common::{BootConfig, Error, Result, Version};

use crate::boot_flag::BootFlag;

/// Flash offset of the persisted boot flag record
pub const BOOT_FLAG_OFFSET: u32 = 0x0000;

// ============================================================================
// Slot Identity and State
// ============================================================================

/// Firmware slot identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Slot {
    /// Slot A (factory default)
    A = 0,
    /// Slot B
    B = 1,
}

impl Slot {
    /// The other slot
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// Array index for per-slot fields
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Decode from a persisted byte
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::A),
            1 => Some(Self::B),
            _ => None,
        }
    }
}

/// Per-slot lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SlotState {
    /// Slot holds no committed image
    Inactive = 0,
    /// Slot is the one currently selected for boot
    Active = 1,
    /// Slot holds a verified image and can become active
    Bootable = 2,
    /// Slot exhausted its boot attempts or failed verification
    Unbootable = 3,
    /// Slot contents failed an integrity check
    Corrupted = 4,
}

impl SlotState {
    /// Decode from a persisted byte; unknown values read as `Corrupted`
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Inactive,
            1 => Self::Active,
            2 => Self::Bootable,
            3 => Self::Unbootable,
            _ => Self::Corrupted,
        }
    }
}

/// Diagnostics view of one slot
///
/// Derived from the persisted [`BootFlag`]; the version field is filled by
/// callers that have parsed the slot's firmware header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionInfo {
    /// Which slot this describes
    pub slot: Slot,
    /// Current lifecycle state
    pub state: SlotState,
    /// Image version, when the slot header has been read
    pub version: Option<Version>,
    /// Boot attempts since the last confirmed-good boot
    pub boot_count: u32,
    /// Confirmed-good boots of this slot
    pub successful_boots: u32,
}

// ============================================================================
// Flash Storage Seam
// ============================================================================

/// Persistent metadata storage
///
/// Abstracts the flash region holding boot metadata (boot flag, rollback
/// info, public key, boot log). Implementations map offsets onto real
/// flash sectors or a host-side buffer in tests.
pub trait FlashStore {
    /// Read `buf.len()` bytes starting at `offset`
    fn read(&self, offset: u32, buf: &mut [u8]) -> Result<()>;

    /// Write `data` starting at `offset`
    fn write(&mut self, offset: u32, data: &[u8]) -> Result<()>;
}

// ============================================================================
// Boot Context
// ============================================================================

/// The boot state machine
///
/// Owns the persisted boot flag and the flash store it lives in. All slot
/// state transitions go through this type.
pub struct BootContext<F: FlashStore> {
    flash: F,
    flag: BootFlag,
    config: BootConfig,
}

impl<F: FlashStore> BootContext<F> {
    /// Load boot state from flash
    ///
    /// A missing or corrupted boot flag record is not an error: the record
    /// is reinitialized to the slot A defaults and persisted, so a torn
    /// metadata write can never brick the device.
    pub fn load(flash: F, config: BootConfig) -> Result<Self> {
        let mut buf = [0u8; BootFlag::SIZE];
        let flag = match flash.read(BOOT_FLAG_OFFSET, &mut buf) {
            Ok(()) => match BootFlag::from_bytes(&buf) {
                Ok(flag) => flag,
                Err(_) => BootFlag::initial(),
            },
            Err(_) => BootFlag::initial(),
        };

        let mut ctx = Self {
            flash,
            flag,
            config,
        };
        ctx.save()?;
        Ok(ctx)
    }

    /// Persist the boot flag
    ///
    /// The checksum is recomputed as part of serialization, so the record
    /// and its checksum always land in the same write.
    pub fn save(&mut self) -> Result<()> {
        let bytes = self.flag.to_bytes();
        self.flash.write(BOOT_FLAG_OFFSET, &bytes)
    }

    /// The currently active slot
    #[must_use]
    pub const fn active_slot(&self) -> Slot {
        self.flag.active_slot
    }

    /// The rollback target slot
    #[must_use]
    pub const fn inactive_slot(&self) -> Slot {
        self.flag.active_slot.other()
    }

    /// The persisted record, read-only
    #[must_use]
    pub const fn flag(&self) -> &BootFlag {
        &self.flag
    }

    /// Record a boot attempt on the active slot
    ///
    /// Called once per boot, before the jump to the application.
    pub fn increment_boot_count(&mut self) -> Result<()> {
        let slot = self.flag.active_slot;
        self.flag.boot_slot = slot;
        self.flag.boot_count[slot.index()] = self.flag.boot_count[slot.index()].saturating_add(1);
        self.save()
    }

    /// Confirm a successful boot of `slot`
    ///
    /// Called by the application after it self-validates. Resets the boot
    /// count and is the sole mechanism that cancels a pending rollback.
    pub fn mark_boot_successful(&mut self, slot: Slot) -> Result<()> {
        self.flag.boot_count[slot.index()] = 0;
        self.flag.successful_boots[slot.index()] =
            self.flag.successful_boots[slot.index()].saturating_add(1);
        self.flag.slot_state[slot.index()] = SlotState::Active;
        self.save()
    }

    /// Mark a slot as holding a verified, bootable image
    pub fn mark_bootable(&mut self, slot: Slot) -> Result<()> {
        self.flag.slot_state[slot.index()] = SlotState::Bootable;
        self.flag.boot_count[slot.index()] = 0;
        self.save()
    }

    /// Mark a slot as unbootable
    pub fn mark_unbootable(&mut self, slot: Slot) -> Result<()> {
        self.flag.slot_state[slot.index()] = SlotState::Unbootable;
        self.save()
    }

    /// Whether the active slot has exhausted its boot attempts
    ///
    /// Polled once per boot, before the jump to the application.
    #[must_use]
    pub fn should_rollback(&self) -> bool {
        self.config.auto_rollback
            && self.flag.boot_count[self.flag.active_slot.index()]
                >= u32::from(self.config.max_boot_attempts)
    }

    /// Switch to the other slot
    ///
    /// The old active slot becomes `Unbootable`, the other slot becomes the
    /// active `Bootable` target, and the whole record is persisted in one
    /// write. The new slot keeps its prior boot count. Fails with
    /// [`Error::NoBootableSlot`] when the other slot is already known bad.
    pub fn perform_rollback(&mut self) -> Result<Slot> {
        let old = self.flag.active_slot;
        let new = old.other();

        match self.flag.slot_state[new.index()] {
            SlotState::Unbootable | SlotState::Corrupted => {
                return Err(Error::NoBootableSlot);
            }
            _ => {}
        }

        self.flag.slot_state[old.index()] = SlotState::Unbootable;
        self.flag.slot_state[new.index()] = SlotState::Bootable;
        self.flag.active_slot = new;
        self.flag.boot_slot = new;
        self.save().map_err(|_| Error::PartitionSwitchFailed)?;
        Ok(new)
    }

    /// Diagnostics snapshot of one slot
    #[must_use]
    pub fn partition_info(&self, slot: Slot) -> PartitionInfo {
        let state = if slot == self.flag.active_slot {
            SlotState::Active
        } else {
            self.flag.slot_state[slot.index()]
        };
        PartitionInfo {
            slot,
            state,
            version: None,
            boot_count: self.flag.boot_count[slot.index()],
            successful_boots: self.flag.successful_boots[slot.index()],
        }
    }

    /// Release the underlying flash store
    pub fn into_flash(self) -> F {
        self.flash
    }
}

// Compile-time tie between the slot enum and per-slot array widths
const _: () = assert!(SLOT_COUNT == 2);
