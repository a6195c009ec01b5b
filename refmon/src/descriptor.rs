//! Security Descriptor.
//!
//! A security descriptor carries the security information for an object:
//! - Owner SID: who owns the object
//! - Group SID: primary group of the object
//! - DACL: Discretionary ACL - who can access the object
//! - SACL: System ACL - auditing information
//!
//! Descriptors are held in owned, absolute form; self-relative (wire)
//! serialization is out of scope here.

use crate::acl::Acl;
use crate::sid::Sid;

/// Security descriptor revision
pub const SECURITY_DESCRIPTOR_REVISION: u8 = 1;

/// Security descriptor control flags
pub mod sd_control {
    /// Owner defaulted (set by the monitor, not the creator)
    pub const SE_OWNER_DEFAULTED: u16 = 0x0001;
    /// Group defaulted
    pub const SE_GROUP_DEFAULTED: u16 = 0x0002;
    /// DACL present
    pub const SE_DACL_PRESENT: u16 = 0x0004;
    /// DACL defaulted
    pub const SE_DACL_DEFAULTED: u16 = 0x0008;
    /// SACL present
    pub const SE_SACL_PRESENT: u16 = 0x0010;
    /// SACL defaulted
    pub const SE_SACL_DEFAULTED: u16 = 0x0020;
}

/// Security Descriptor
#[derive(Debug, Clone, Default)]
pub struct SecurityDescriptor {
    /// Revision (always 1)
    pub revision: u8,
    /// Control flags
    pub control: u16,
    /// Owner SID
    pub owner: Option<Sid>,
    /// Group SID
    pub group: Option<Sid>,
    /// System ACL (auditing)
    pub sacl: Option<Acl>,
    /// Discretionary ACL (access control)
    pub dacl: Option<Acl>,
}

impl SecurityDescriptor {
    /// Create a new empty security descriptor
    pub const fn new() -> Self {
        Self {
            revision: SECURITY_DESCRIPTOR_REVISION,
            control: 0,
            owner: None,
            group: None,
            sacl: None,
            dacl: None,
        }
    }

    /// Set the owner SID
    pub fn set_owner(&mut self, owner: Sid) {
        self.owner = Some(owner);
    }

    /// Set the group SID
    pub fn set_group(&mut self, group: Sid) {
        self.group = Some(group);
    }

    /// Attach a DACL
    pub fn set_dacl(&mut self, dacl: Acl) {
        self.dacl = Some(dacl);
        self.control |= sd_control::SE_DACL_PRESENT;
    }

    /// Attach a SACL
    pub fn set_sacl(&mut self, sacl: Acl) {
        self.sacl = Some(sacl);
        self.control |= sd_control::SE_SACL_PRESENT;
    }

    /// Check if this security descriptor is valid
    pub fn is_valid(&self) -> bool {
        self.revision == SECURITY_DESCRIPTOR_REVISION
    }

    /// Check whether both owner and group are present. Audited access
    /// checks refuse descriptors without them.
    pub fn has_owner_and_group(&self) -> bool {
        self.owner.is_some() && self.group.is_some()
    }

    /// Get the SACL, if present
    pub fn sacl(&self) -> Option<&Acl> {
        if self.control & sd_control::SE_SACL_PRESENT != 0 {
            self.sacl.as_ref()
        } else {
            None
        }
    }

    /// Get the DACL, if present
    pub fn dacl(&self) -> Option<&Acl> {
        if self.control & sd_control::SE_DACL_PRESENT != 0 {
            self.dacl.as_ref()
        } else {
            None
        }
    }
}
