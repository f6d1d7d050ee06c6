//! Compute lifecycle status mapping.
//!
//! Compute notifications report a coarse `vm_state` and a fine-grained
//! `task_state`. Billing wants a single canonical status, resolved through a
//! static two-level table: the `vm_state` row picks a default and an
//! optional set of task-specific overrides.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical server status carried on compute usage records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    /// Running normally.
    Active,
    /// Soft reboot in progress.
    Reboot,
    /// Hard reboot in progress.
    HardReboot,
    /// Admin password being set.
    Password,
    /// Being rebuilt from an image.
    Rebuild,
    /// Live migration in progress.
    Migrating,
    /// Being resized or migrated.
    Resize,
    /// Not yet built.
    Build,
    /// Powered off.
    Shutoff,
    /// Resized, awaiting confirmation.
    VerifyResize,
    /// Resize being reverted.
    RevertResize,
    /// Paused in memory.
    Paused,
    /// Suspended to disk.
    Suspended,
    /// Booted in rescue mode.
    Rescue,
    /// Failed.
    Error,
    /// Deleted.
    Deleted,
    /// Deleted but still reclaimable.
    SoftDeleted,
    /// Shelved, still on its host.
    Shelved,
    /// Shelved and removed from its host.
    ShelvedOffloaded,
    /// The `vm_state` had no row in the table.
    Unknown,
}

impl ServerStatus {
    /// Wire spelling of the status.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Reboot => "REBOOT",
            Self::HardReboot => "HARD_REBOOT",
            Self::Password => "PASSWORD",
            Self::Rebuild => "REBUILD",
            Self::Migrating => "MIGRATING",
            Self::Resize => "RESIZE",
            Self::Build => "BUILD",
            Self::Shutoff => "SHUTOFF",
            Self::VerifyResize => "VERIFY_RESIZE",
            Self::RevertResize => "REVERT_RESIZE",
            Self::Paused => "PAUSED",
            Self::Suspended => "SUSPENDED",
            Self::Rescue => "RESCUE",
            Self::Error => "ERROR",
            Self::Deleted => "DELETED",
            Self::SoftDeleted => "SOFT_DELETED",
            Self::Shelved => "SHELVED",
            Self::ShelvedOffloaded => "SHELVED_OFFLOADED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `vm_state` row: its default status and task-specific overrides.
struct StateRow {
    vm_state: &'static str,
    default: ServerStatus,
    transitions: &'static [(&'static str, ServerStatus)],
}

const STATE_TABLE: &[StateRow] = &[
    StateRow {
        vm_state: "active",
        default: ServerStatus::Active,
        transitions: &[
            ("rebooting", ServerStatus::Reboot),
            ("rebooting_hard", ServerStatus::HardReboot),
            ("updating_password", ServerStatus::Password),
            ("rebuilding", ServerStatus::Rebuild),
            ("rebuild_block_device_mapping", ServerStatus::Rebuild),
            ("rebuild_spawning", ServerStatus::Rebuild),
            ("migrating", ServerStatus::Migrating),
            ("resize_prep", ServerStatus::Resize),
            ("resize_migrating", ServerStatus::Resize),
            ("resize_migrated", ServerStatus::Resize),
            ("resize_finish", ServerStatus::Resize),
        ],
    },
    StateRow { vm_state: "building", default: ServerStatus::Build, transitions: &[] },
    StateRow { vm_state: "stopped", default: ServerStatus::Shutoff, transitions: &[] },
    StateRow {
        vm_state: "resized",
        default: ServerStatus::VerifyResize,
        transitions: &[("resize_reverting", ServerStatus::RevertResize)],
    },
    StateRow { vm_state: "paused", default: ServerStatus::Paused, transitions: &[] },
    StateRow { vm_state: "suspended", default: ServerStatus::Suspended, transitions: &[] },
    StateRow { vm_state: "rescued", default: ServerStatus::Rescue, transitions: &[] },
    StateRow { vm_state: "error", default: ServerStatus::Error, transitions: &[] },
    StateRow { vm_state: "deleted", default: ServerStatus::Deleted, transitions: &[] },
    StateRow { vm_state: "soft-delete", default: ServerStatus::SoftDeleted, transitions: &[] },
    StateRow { vm_state: "shelved", default: ServerStatus::Shelved, transitions: &[] },
    StateRow {
        vm_state: "shelved_offloaded",
        default: ServerStatus::ShelvedOffloaded,
        transitions: &[],
    },
];

/// Resolved status lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLookup {
    /// The `vm_state` row exists; status is the override or the row default.
    Mapped(ServerStatus),
    /// No row for the `vm_state`.
    Unmapped,
}

impl StatusLookup {
    /// Status to put on the record; unmapped states become `Unknown`.
    pub const fn status(self) -> ServerStatus {
        match self {
            Self::Mapped(status) => status,
            Self::Unmapped => ServerStatus::Unknown,
        }
    }
}

/// Looks up the canonical status for a `(vm_state, task_state)` pair.
pub fn lookup_status(vm_state: &str, task_state: &str) -> StatusLookup {
    let Some(row) = STATE_TABLE.iter().find(|row| row.vm_state == vm_state) else {
        return StatusLookup::Unmapped;
    };

    let status = row
        .transitions
        .iter()
        .find(|(task, _)| *task == task_state)
        .map_or(row.default, |(_, status)| *status);

    StatusLookup::Mapped(status)
}

/// Canonical status for a `(vm_state, task_state)` pair.
///
/// An unmapped `vm_state` is logged as an error (it usually means a bad
/// upgrade or a corrupted database upstream) and returns `Unknown`.
pub fn server_status(vm_state: &str, task_state: &str) -> ServerStatus {
    let lookup = lookup_status(vm_state, task_state);
    if lookup == StatusLookup::Unmapped {
        tracing::error!(vm_state, task_state, "status is UNKNOWN for unmapped vm_state");
    }
    lookup.status()
}
