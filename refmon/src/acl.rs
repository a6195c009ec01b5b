//! Access Control Lists and object type lists.
//!
//! ACLs contain Access Control Entries (ACEs) naming a trustee SID, an
//! access mask and per-entry flags. The SACL flavor drives auditing:
//! SYSTEM_AUDIT ACEs fire on plain accesses, SYSTEM_AUDIT_OBJECT ACEs
//! carry an optional GUID and apply to individual entries of an object
//! type list (a flattened GUID tree used by directory-style objects).
//!
//! ACEs own their SIDs by value; an ACL is just a vector of ACEs.

use crate::error::{SeError, SeResult};
use crate::sid::Sid;
use alloc::vec::Vec;

/// ACL revision
pub const ACL_REVISION: u8 = 2;
/// ACL revision for ACLs carrying object ACEs
pub const ACL_REVISION_DS: u8 = 4;

/// ACE types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AceType {
    /// Access allowed
    AccessAllowed = 0,
    /// Access denied
    AccessDenied = 1,
    /// System audit
    SystemAudit = 2,
    /// System alarm
    SystemAlarm = 3,
    /// Access allowed (object-specific)
    AccessAllowedObject = 5,
    /// Access denied (object-specific)
    AccessDeniedObject = 6,
    /// System audit (object-specific)
    SystemAuditObject = 7,
    /// System alarm (object-specific)
    SystemAlarmObject = 8,
}

/// ACE flags
pub mod ace_flags {
    /// ACE is inherited by objects created in this container
    pub const OBJECT_INHERIT_ACE: u8 = 0x01;
    /// ACE is inherited by sub-containers
    pub const CONTAINER_INHERIT_ACE: u8 = 0x02;
    /// Don't propagate inherit flags
    pub const NO_PROPAGATE_INHERIT_ACE: u8 = 0x04;
    /// ACE exists only to be inherited; it does not apply to this object
    pub const INHERIT_ONLY_ACE: u8 = 0x08;
    /// ACE was inherited
    pub const INHERITED_ACE: u8 = 0x10;
    /// Audit on successful access
    pub const SUCCESSFUL_ACCESS_ACE_FLAG: u8 = 0x40;
    /// Audit on failed access
    pub const FAILED_ACCESS_ACE_FLAG: u8 = 0x80;
}

/// Access Control Entry with an owned trustee SID.
///
/// `object_type` is only meaningful for the object-specific ACE types; a
/// GUID-less object audit ACE behaves like a plain audit ACE that applies
/// to every object type list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ace {
    /// ACE type
    pub ace_type: AceType,
    /// ACE flags
    pub flags: u8,
    /// Access mask
    pub mask: u32,
    /// Trustee SID
    pub sid: Sid,
    /// Object type GUID (object ACEs only)
    pub object_type: Option<Guid>,
}

impl Ace {
    /// Create a system audit ACE.
    pub fn system_audit(sid: Sid, mask: u32, flags: u8) -> Self {
        Self {
            ace_type: AceType::SystemAudit,
            flags,
            mask,
            sid,
            object_type: None,
        }
    }

    /// Create an object-specific system audit ACE.
    pub fn system_audit_object(sid: Sid, mask: u32, flags: u8, object_type: Option<Guid>) -> Self {
        Self {
            ace_type: AceType::SystemAuditObject,
            flags,
            mask,
            sid,
            object_type,
        }
    }

    /// Create an access allowed ACE.
    pub fn access_allowed(sid: Sid, mask: u32) -> Self {
        Self {
            ace_type: AceType::AccessAllowed,
            flags: 0,
            mask,
            sid,
            object_type: None,
        }
    }

    /// Create an access denied ACE.
    pub fn access_denied(sid: Sid, mask: u32) -> Self {
        Self {
            ace_type: AceType::AccessDenied,
            flags: 0,
            mask,
            sid,
            object_type: None,
        }
    }

    /// Check if this ACE is inherit-only (does not apply to the object
    /// carrying it).
    pub fn is_inherit_only(&self) -> bool {
        (self.flags & ace_flags::INHERIT_ONLY_ACE) != 0
    }

    /// Check if this ACE audits successful access
    pub fn audits_success(&self) -> bool {
        (self.flags & ace_flags::SUCCESSFUL_ACCESS_ACE_FLAG) != 0
    }

    /// Check if this ACE audits failed access
    pub fn audits_failure(&self) -> bool {
        (self.flags & ace_flags::FAILED_ACCESS_ACE_FLAG) != 0
    }
}

/// Access Control List
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Acl {
    /// Revision
    pub revision: u8,
    /// The entries, in evaluation order
    pub aces: Vec<Ace>,
}

impl Acl {
    pub const fn new() -> Self {
        Self {
            revision: ACL_REVISION,
            aces: Vec::new(),
        }
    }

    /// Add an ACE to the end of the ACL.
    pub fn add_ace(&mut self, ace: Ace) {
        if ace.object_type.is_some() {
            self.revision = ACL_REVISION_DS;
        }
        self.aces.push(ace);
    }

    pub fn ace_count(&self) -> usize {
        self.aces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aces.is_empty()
    }
}

// ============================================================================
// Access Rights
// ============================================================================

/// Generic access rights (mapped to specific rights per object type)
pub mod generic_rights {
    pub const GENERIC_READ: u32 = 0x80000000;
    pub const GENERIC_WRITE: u32 = 0x40000000;
    pub const GENERIC_EXECUTE: u32 = 0x20000000;
    pub const GENERIC_ALL: u32 = 0x10000000;

    pub const GENERIC_RIGHTS_MASK: u32 =
        GENERIC_READ | GENERIC_WRITE | GENERIC_EXECUTE | GENERIC_ALL;
}

/// Standard access rights (apply to all object types)
pub mod standard_rights {
    pub const DELETE: u32 = 0x00010000;
    pub const READ_CONTROL: u32 = 0x00020000;
    pub const WRITE_DAC: u32 = 0x00040000;
    pub const WRITE_OWNER: u32 = 0x00080000;
    pub const SYNCHRONIZE: u32 = 0x00100000;

    pub const STANDARD_RIGHTS_REQUIRED: u32 = 0x000F0000;
    pub const STANDARD_RIGHTS_ALL: u32 = 0x001F0000;
}

/// Special access rights
pub mod special_rights {
    /// Right to read/write the SACL; granted only via SeSecurityPrivilege.
    pub const ACCESS_SYSTEM_SECURITY: u32 = 0x01000000;
    /// Request for the maximal grantable access.
    pub const MAXIMUM_ALLOWED: u32 = 0x02000000;
}

// ============================================================================
// Object type lists
// ============================================================================

/// Globally unique identifier for an object type (property set, property,
/// or object class).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Guid(pub [u8; 16]);

impl Guid {
    /// Build a GUID from a raw byte value.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

/// Deepest level an object type list entry may have.
pub const ACCESS_MAX_LEVEL: u16 = 4;

/// Per-entry audit marks set during SACL examination.
pub mod object_audit_flags {
    /// Entry needs a success audit
    pub const OBJECT_SUCCESS_AUDIT: u32 = 0x00000001;
    /// Entry needs a failure audit
    pub const OBJECT_FAILURE_AUDIT: u32 = 0x00000002;
}

/// One entry of a flattened object type tree.
///
/// The tree is given in depth-first order; `level` 0 is the object
/// itself, children follow their parent with a level exactly one deeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectTypeEntry {
    /// Object type GUID
    pub object_type: Guid,
    /// Depth in the flattened tree (0..=ACCESS_MAX_LEVEL)
    pub level: u16,
    /// Audit marks accumulated during examination
    pub flags: u32,
}

impl ObjectTypeEntry {
    pub const fn new(object_type: Guid, level: u16) -> Self {
        Self {
            object_type,
            level,
            flags: 0,
        }
    }
}

/// Validate a caller-supplied object type list and produce a working copy
/// with cleared audit marks.
///
/// The first entry must sit at level 0 and every later entry may descend
/// at most one level past its predecessor.
pub fn se_capture_object_type_list(list: &[ObjectTypeEntry]) -> SeResult<Vec<ObjectTypeEntry>> {
    let mut captured = Vec::with_capacity(list.len());
    let mut previous_level: Option<u16> = None;

    for entry in list {
        if entry.level > ACCESS_MAX_LEVEL {
            return Err(SeError::InvalidParameter);
        }

        match previous_level {
            None => {
                if entry.level != 0 {
                    return Err(SeError::InvalidParameter);
                }
            }
            Some(prev) => {
                if entry.level > prev + 1 {
                    return Err(SeError::InvalidParameter);
                }
            }
        }

        previous_level = Some(entry.level);
        captured.push(ObjectTypeEntry::new(entry.object_type, entry.level));
    }

    Ok(captured)
}

/// Find the index of a GUID in an object type list.
pub fn se_object_in_type_list(guid: &Guid, list: &[ObjectTypeEntry]) -> Option<usize> {
    list.iter().position(|entry| entry.object_type == *guid)
}
