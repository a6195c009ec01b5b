//! Privileges and privilege sets.
//!
//! Privileges are special rights held by tokens. Most are disabled by
//! default and must be explicitly enabled before they count in a check.
//!
//! This module also owns the locally-unique-identifier (LUID) allocator
//! used for token IDs, modified IDs and operation IDs, and the audit
//! noise filter that keeps high-frequency privilege checks out of the
//! audit trail.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

/// Number of privilege slots embedded directly in an access state before
/// spilling to a heap-allocated set.
pub const INITIAL_PRIVILEGE_COUNT: usize = 3;

/// Privilege LUID (Locally Unique Identifier)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Luid {
    pub low_part: u32,
    pub high_part: i32,
}

impl Luid {
    pub const fn new(low: u32, high: i32) -> Self {
        Self {
            low_part: low,
            high_part: high,
        }
    }

    pub const fn from_u32(value: u32) -> Self {
        Self {
            low_part: value,
            high_part: 0,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.low_part == 0 && self.high_part == 0
    }
}

impl Default for Luid {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Monotonic LUID source. Starts above the well-known privilege values so
/// allocated LUIDs never collide with them.
static NEXT_LUID: AtomicU64 = AtomicU64::new(1000);

/// Allocate a locally unique identifier.
pub fn se_allocate_luid() -> Luid {
    let value = NEXT_LUID.fetch_add(1, Ordering::Relaxed);
    Luid::new(value as u32, (value >> 32) as i32)
}

/// Privilege attribute flags
pub mod privilege_attributes {
    /// Privilege is disabled
    pub const SE_PRIVILEGE_DISABLED: u32 = 0x00000000;
    /// Privilege is enabled by default
    pub const SE_PRIVILEGE_ENABLED_BY_DEFAULT: u32 = 0x00000001;
    /// Privilege is enabled
    pub const SE_PRIVILEGE_ENABLED: u32 = 0x00000002;
    /// Privilege is removed
    pub const SE_PRIVILEGE_REMOVED: u32 = 0x00000004;
    /// Privilege was used to gain access
    pub const SE_PRIVILEGE_USED_FOR_ACCESS: u32 = 0x80000000;
}

/// LUID and Attributes - a privilege with its current state
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LuidAndAttributes {
    /// The privilege LUID
    pub luid: Luid,
    /// Current attributes (enabled/disabled)
    pub attributes: u32,
}

impl LuidAndAttributes {
    pub const fn new() -> Self {
        Self {
            luid: Luid::new(0, 0),
            attributes: 0,
        }
    }

    pub const fn with_luid(luid: Luid, attributes: u32) -> Self {
        Self { luid, attributes }
    }

    /// Check if this privilege is enabled
    pub fn is_enabled(&self) -> bool {
        (self.attributes & privilege_attributes::SE_PRIVILEGE_ENABLED) != 0
    }

    /// Enable this privilege
    pub fn enable(&mut self) {
        self.attributes |= privilege_attributes::SE_PRIVILEGE_ENABLED;
    }

    /// Disable this privilege
    pub fn disable(&mut self) {
        self.attributes &= !privilege_attributes::SE_PRIVILEGE_ENABLED;
    }
}

impl Default for LuidAndAttributes {
    fn default() -> Self {
        Self::new()
    }
}

/// Privilege control flags for PrivilegeSet
pub mod privilege_control {
    /// All privileges must be held (AND); otherwise any one suffices.
    pub const PRIVILEGE_SET_ALL_NECESSARY: u32 = 1;
}

/// Privilege Set - a collection of privileges, used both for privilege
/// checks and to report the privileges consumed by an access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivilegeSet {
    /// Control flags
    pub control: u32,
    /// The privileges
    pub privilege: Vec<LuidAndAttributes>,
}

impl PrivilegeSet {
    pub const fn new() -> Self {
        Self {
            control: 0,
            privilege: Vec::new(),
        }
    }

    /// Build a single-privilege set.
    pub fn single(luid: Luid, attributes: u32) -> Self {
        let mut set = Self::new();
        set.control = privilege_control::PRIVILEGE_SET_ALL_NECESSARY;
        set.privilege.push(LuidAndAttributes::with_luid(luid, attributes));
        set
    }

    pub fn len(&self) -> usize {
        self.privilege.len()
    }

    pub fn is_empty(&self) -> bool {
        self.privilege.is_empty()
    }

    pub fn push(&mut self, entry: LuidAndAttributes) {
        self.privilege.push(entry);
    }

    pub fn contains(&self, luid: Luid) -> bool {
        self.privilege.iter().any(|p| p.luid == luid)
    }
}

// ============================================================================
// Well-Known Privilege LUIDs
// ============================================================================

/// Privilege values (used as LUID low parts)
pub mod privilege_values {
    pub const SE_CREATE_TOKEN_PRIVILEGE: u32 = 2;
    pub const SE_ASSIGNPRIMARYTOKEN_PRIVILEGE: u32 = 3;
    pub const SE_LOCK_MEMORY_PRIVILEGE: u32 = 4;
    pub const SE_INCREASE_QUOTA_PRIVILEGE: u32 = 5;
    pub const SE_MACHINE_ACCOUNT_PRIVILEGE: u32 = 6;
    pub const SE_TCB_PRIVILEGE: u32 = 7;
    pub const SE_SECURITY_PRIVILEGE: u32 = 8;
    pub const SE_TAKE_OWNERSHIP_PRIVILEGE: u32 = 9;
    pub const SE_LOAD_DRIVER_PRIVILEGE: u32 = 10;
    pub const SE_SYSTEM_PROFILE_PRIVILEGE: u32 = 11;
    pub const SE_SYSTEMTIME_PRIVILEGE: u32 = 12;
    pub const SE_PROF_SINGLE_PROCESS_PRIVILEGE: u32 = 13;
    pub const SE_INC_BASE_PRIORITY_PRIVILEGE: u32 = 14;
    pub const SE_CREATE_PAGEFILE_PRIVILEGE: u32 = 15;
    pub const SE_CREATE_PERMANENT_PRIVILEGE: u32 = 16;
    pub const SE_BACKUP_PRIVILEGE: u32 = 17;
    pub const SE_RESTORE_PRIVILEGE: u32 = 18;
    pub const SE_SHUTDOWN_PRIVILEGE: u32 = 19;
    pub const SE_DEBUG_PRIVILEGE: u32 = 20;
    pub const SE_AUDIT_PRIVILEGE: u32 = 21;
    pub const SE_SYSTEM_ENVIRONMENT_PRIVILEGE: u32 = 22;
    pub const SE_CHANGE_NOTIFY_PRIVILEGE: u32 = 23;
    pub const SE_REMOTE_SHUTDOWN_PRIVILEGE: u32 = 24;
    pub const SE_UNDOCK_PRIVILEGE: u32 = 25;
    pub const SE_SYNC_AGENT_PRIVILEGE: u32 = 26;
    pub const SE_ENABLE_DELEGATION_PRIVILEGE: u32 = 27;
    pub const SE_MANAGE_VOLUME_PRIVILEGE: u32 = 28;
    pub const SE_IMPERSONATE_PRIVILEGE: u32 = 29;
    pub const SE_CREATE_GLOBAL_PRIVILEGE: u32 = 30;
    pub const SE_TRUSTED_CREDMAN_ACCESS_PRIVILEGE: u32 = 31;
    pub const SE_RELABEL_PRIVILEGE: u32 = 32;
    pub const SE_INC_WORKING_SET_PRIVILEGE: u32 = 33;
    pub const SE_TIME_ZONE_PRIVILEGE: u32 = 34;
    pub const SE_CREATE_SYMBOLIC_LINK_PRIVILEGE: u32 = 35;
}

/// Well-known privilege LUIDs
pub mod privilege_luids {
    use super::{privilege_values::*, Luid};

    pub const SE_CREATE_TOKEN_LUID: Luid = Luid::from_u32(SE_CREATE_TOKEN_PRIVILEGE);
    pub const SE_ASSIGNPRIMARYTOKEN_LUID: Luid = Luid::from_u32(SE_ASSIGNPRIMARYTOKEN_PRIVILEGE);
    pub const SE_TCB_LUID: Luid = Luid::from_u32(SE_TCB_PRIVILEGE);
    pub const SE_SECURITY_LUID: Luid = Luid::from_u32(SE_SECURITY_PRIVILEGE);
    pub const SE_TAKE_OWNERSHIP_LUID: Luid = Luid::from_u32(SE_TAKE_OWNERSHIP_PRIVILEGE);
    pub const SE_SYSTEMTIME_LUID: Luid = Luid::from_u32(SE_SYSTEMTIME_PRIVILEGE);
    pub const SE_BACKUP_LUID: Luid = Luid::from_u32(SE_BACKUP_PRIVILEGE);
    pub const SE_RESTORE_LUID: Luid = Luid::from_u32(SE_RESTORE_PRIVILEGE);
    pub const SE_SHUTDOWN_LUID: Luid = Luid::from_u32(SE_SHUTDOWN_PRIVILEGE);
    pub const SE_DEBUG_LUID: Luid = Luid::from_u32(SE_DEBUG_PRIVILEGE);
    pub const SE_AUDIT_LUID: Luid = Luid::from_u32(SE_AUDIT_PRIVILEGE);
    pub const SE_CHANGE_NOTIFY_LUID: Luid = Luid::from_u32(SE_CHANGE_NOTIFY_PRIVILEGE);
    pub const SE_IMPERSONATE_LUID: Luid = Luid::from_u32(SE_IMPERSONATE_PRIVILEGE);
}

// ============================================================================
// Privilege Operations
// ============================================================================

/// Check a required privilege set against the privileges held by a token.
///
/// Honors `PRIVILEGE_SET_ALL_NECESSARY` and marks each required privilege
/// that was found enabled with `SE_PRIVILEGE_USED_FOR_ACCESS` so callers
/// can report which privileges carried the access.
pub fn se_privilege_check(
    required: &mut PrivilegeSet,
    held: &[LuidAndAttributes],
) -> bool {
    let mut matched = 0usize;

    for req in required.privilege.iter_mut() {
        let found = held
            .iter()
            .any(|h| h.luid == req.luid && h.is_enabled());
        if found {
            req.attributes |= privilege_attributes::SE_PRIVILEGE_USED_FOR_ACCESS;
            matched += 1;
        }
    }

    if required.control & privilege_control::PRIVILEGE_SET_ALL_NECESSARY != 0 {
        matched == required.privilege.len()
    } else {
        matched > 0
    }
}

/// Check if a single privilege LUID is held and enabled.
pub fn se_single_privilege_check(luid: Luid, held: &[LuidAndAttributes]) -> bool {
    held.iter().any(|p| p.luid == luid && p.is_enabled())
}

// ============================================================================
// Privilege audit noise filter
// ============================================================================

/// Flags for [`se_filter_privilege_audits`].
pub mod privilege_filter_flags {
    /// Additionally apply the service-account filter list.
    pub const SEP_SERVICES_FILTER: u32 = 0x00000001;
}

/// Privileges checked at high frequency during normal operation; auditing
/// their use singly or in combination with each other would swamp the
/// audit trail.
const FILTER_PRIVILEGES_LONG: &[Luid] = &[
    privilege_luids::SE_CHANGE_NOTIFY_LUID,
    privilege_luids::SE_AUDIT_LUID,
    privilege_luids::SE_CREATE_TOKEN_LUID,
    privilege_luids::SE_ASSIGNPRIMARYTOKEN_LUID,
    privilege_luids::SE_BACKUP_LUID,
    privilege_luids::SE_RESTORE_LUID,
    privilege_luids::SE_DEBUG_LUID,
];

/// Same as the long list minus backup and restore, so their use still
/// shows up when verbose privilege auditing is configured.
const FILTER_PRIVILEGES_SHORT: &[Luid] = &[
    privilege_luids::SE_CHANGE_NOTIFY_LUID,
    privilege_luids::SE_AUDIT_LUID,
    privilege_luids::SE_CREATE_TOKEN_LUID,
    privilege_luids::SE_ASSIGNPRIMARYTOKEN_LUID,
    privilege_luids::SE_DEBUG_LUID,
];

/// Privileges not audited for the service accounts. No overlap with the
/// lists above.
const SERVICES_FILTER_PRIVILEGES: &[Luid] = &[privilege_luids::SE_SYSTEMTIME_LUID];

/// Decide whether a privilege-use audit is worth emitting.
///
/// Returns false when every privilege in the set is on the active filter
/// list (plus the services list when `SEP_SERVICES_FILTER` is set), or
/// when the set is empty. Returns true when the audit should proceed
/// normally. `verbose` selects the short list so backup/restore use is
/// still audited.
pub fn se_filter_privilege_audits(
    flags: u32,
    privileges: &PrivilegeSet,
    verbose: bool,
) -> bool {
    if privileges.is_empty() {
        return false;
    }

    let filter: &[Luid] = if verbose {
        FILTER_PRIVILEGES_SHORT
    } else {
        FILTER_PRIVILEGES_LONG
    };

    let mut matched = 0usize;

    for entry in &privileges.privilege {
        if filter.contains(&entry.luid) {
            matched += 1;
        }
    }

    if flags & privilege_filter_flags::SEP_SERVICES_FILTER != 0 {
        for entry in &privileges.privilege {
            if SERVICES_FILTER_PRIVILEGES.contains(&entry.luid) {
                matched += 1;
            }
        }
    }

    matched != privileges.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luid_allocation_unique() {
        let a = se_allocate_luid();
        let b = se_allocate_luid();
        assert_ne!(a, b);
        assert!(!a.is_zero());
    }

    #[test]
    fn test_privilege_check_all_necessary() {
        let held = [
            LuidAndAttributes::with_luid(
                privilege_luids::SE_SECURITY_LUID,
                privilege_attributes::SE_PRIVILEGE_ENABLED,
            ),
            LuidAndAttributes::with_luid(privilege_luids::SE_DEBUG_LUID, 0),
        ];

        let mut required = PrivilegeSet::single(privilege_luids::SE_SECURITY_LUID, 0);
        assert!(se_privilege_check(&mut required, &held));
        assert_ne!(
            required.privilege[0].attributes & privilege_attributes::SE_PRIVILEGE_USED_FOR_ACCESS,
            0
        );

        // SeDebugPrivilege is held but not enabled.
        let mut required = PrivilegeSet::single(privilege_luids::SE_DEBUG_LUID, 0);
        assert!(!se_privilege_check(&mut required, &held));
    }

    #[test]
    fn test_privilege_check_any() {
        let held = [LuidAndAttributes::with_luid(
            privilege_luids::SE_RESTORE_LUID,
            privilege_attributes::SE_PRIVILEGE_ENABLED,
        )];

        let mut required = PrivilegeSet::new();
        required.push(LuidAndAttributes::with_luid(privilege_luids::SE_BACKUP_LUID, 0));
        required.push(LuidAndAttributes::with_luid(privilege_luids::SE_RESTORE_LUID, 0));

        // Control without ALL_NECESSARY: any match passes.
        assert!(se_privilege_check(&mut required, &held));

        required.control = privilege_control::PRIVILEGE_SET_ALL_NECESSARY;
        let mut required2 = required.clone();
        for p in required2.privilege.iter_mut() {
            p.attributes = 0;
        }
        assert!(!se_privilege_check(&mut required2, &held));
    }

    #[test]
    fn test_noise_filter_suppresses_denylisted_sets() {
        let mut set = PrivilegeSet::new();
        set.push(LuidAndAttributes::with_luid(privilege_luids::SE_CHANGE_NOTIFY_LUID, 0));
        set.push(LuidAndAttributes::with_luid(privilege_luids::SE_DEBUG_LUID, 0));

        assert!(!se_filter_privilege_audits(0, &set, false));

        // One privilege off the list makes the whole set auditable.
        set.push(LuidAndAttributes::with_luid(privilege_luids::SE_TCB_LUID, 0));
        assert!(se_filter_privilege_audits(0, &set, false));
    }

    #[test]
    fn test_noise_filter_verbose_keeps_backup() {
        let mut set = PrivilegeSet::new();
        set.push(LuidAndAttributes::with_luid(privilege_luids::SE_BACKUP_LUID, 0));

        assert!(!se_filter_privilege_audits(0, &set, false));
        assert!(se_filter_privilege_audits(0, &set, true));
    }

    #[test]
    fn test_noise_filter_services() {
        let mut set = PrivilegeSet::new();
        set.push(LuidAndAttributes::with_luid(privilege_luids::SE_SYSTEMTIME_LUID, 0));

        assert!(se_filter_privilege_audits(0, &set, false));
        assert!(!se_filter_privilege_audits(
            privilege_filter_flags::SEP_SERVICES_FILTER,
            &set,
            false
        ));
    }

    #[test]
    fn test_empty_set_never_audits() {
        let set = PrivilegeSet::new();
        assert!(!se_filter_privilege_audits(0, &set, false));
    }
}
