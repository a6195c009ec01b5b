//! Security Identifier (SID) model.
//!
//! A SID uniquely identifies a security principal (user, group, or
//! computer). SIDs have the format S-R-I-S-S-S...
//! - R: Revision level (always 1)
//! - I: Identifier authority (48-bit)
//! - S: Sub-authorities (32-bit each, variable count)
//!
//! SIDs are stored by value with an inline sub-authority array, so token
//! group lists own their SIDs outright and copying a token never involves
//! pointer fix-up.
//!
//! # Well-Known SIDs
//! - S-1-1-0: World (Everyone)
//! - S-1-5-7: Anonymous logon
//! - S-1-5-10: Principal self (placeholder, substituted per object)
//! - S-1-5-18: Local System
//! - S-1-5-32-544: Administrators

/// Maximum number of sub-authorities in a SID
pub const SID_MAX_SUB_AUTHORITIES: usize = 15;

/// SID revision
pub const SID_REVISION: u8 = 1;

/// Identifier Authority values
pub mod identifier_authority {
    /// Null authority
    pub const SECURITY_NULL_SID_AUTHORITY: [u8; 6] = [0, 0, 0, 0, 0, 0];
    /// World authority (Everyone)
    pub const SECURITY_WORLD_SID_AUTHORITY: [u8; 6] = [0, 0, 0, 0, 0, 1];
    /// Local authority
    pub const SECURITY_LOCAL_SID_AUTHORITY: [u8; 6] = [0, 0, 0, 0, 0, 2];
    /// Creator authority
    pub const SECURITY_CREATOR_SID_AUTHORITY: [u8; 6] = [0, 0, 0, 0, 0, 3];
    /// NT authority (most common)
    pub const SECURITY_NT_AUTHORITY: [u8; 6] = [0, 0, 0, 0, 0, 5];
}

/// Well-known relative identifiers (RIDs)
pub mod well_known_rids {
    /// World RID (Everyone)
    pub const SECURITY_WORLD_RID: u32 = 0;

    /// NT Authority sub-authorities
    pub const SECURITY_DIALUP_RID: u32 = 1;
    pub const SECURITY_NETWORK_RID: u32 = 2;
    pub const SECURITY_BATCH_RID: u32 = 3;
    pub const SECURITY_INTERACTIVE_RID: u32 = 4;
    pub const SECURITY_SERVICE_RID: u32 = 6;
    pub const SECURITY_ANONYMOUS_LOGON_RID: u32 = 7;
    pub const SECURITY_PRINCIPAL_SELF_RID: u32 = 10;
    pub const SECURITY_AUTHENTICATED_USER_RID: u32 = 11;
    pub const SECURITY_RESTRICTED_CODE_RID: u32 = 12;
    pub const SECURITY_LOCAL_SYSTEM_RID: u32 = 18;
    pub const SECURITY_LOCAL_SERVICE_RID: u32 = 19;
    pub const SECURITY_NETWORK_SERVICE_RID: u32 = 20;

    /// Built-in domain RID
    pub const SECURITY_BUILTIN_DOMAIN_RID: u32 = 32;

    /// Built-in group RIDs
    pub const DOMAIN_ALIAS_RID_ADMINS: u32 = 544;
    pub const DOMAIN_ALIAS_RID_USERS: u32 = 545;
}

/// Security Identifier (SID)
///
/// Fixed-capacity value type; `sub_authority_count` gives the live prefix
/// of `sub_authority`.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Sid {
    /// Revision (always 1)
    pub revision: u8,
    /// Number of sub-authorities
    pub sub_authority_count: u8,
    /// Identifier authority (6 bytes, big-endian)
    pub identifier_authority: [u8; 6],
    /// Sub-authorities
    pub sub_authority: [u32; SID_MAX_SUB_AUTHORITIES],
}

impl Sid {
    /// Create a new empty SID
    pub const fn new() -> Self {
        Self {
            revision: SID_REVISION,
            sub_authority_count: 0,
            identifier_authority: [0; 6],
            sub_authority: [0; SID_MAX_SUB_AUTHORITIES],
        }
    }

    /// Create a SID with the given authority and sub-authorities
    pub fn create(authority: [u8; 6], sub_authorities: &[u32]) -> Option<Self> {
        if sub_authorities.len() > SID_MAX_SUB_AUTHORITIES {
            return None;
        }

        let mut sid = Self::new();
        sid.identifier_authority = authority;
        sid.sub_authority_count = sub_authorities.len() as u8;

        for (i, &sa) in sub_authorities.iter().enumerate() {
            sid.sub_authority[i] = sa;
        }

        Some(sid)
    }

    /// Size of this SID in its wire form, in bytes.
    pub fn length(&self) -> usize {
        // Header (revision + count + authority) + sub-authorities
        8 + (self.sub_authority_count as usize * 4)
    }

    /// Check if this is a valid SID
    pub fn is_valid(&self) -> bool {
        self.revision == SID_REVISION
            && self.sub_authority_count <= SID_MAX_SUB_AUTHORITIES as u8
    }

    /// Get the last sub-authority (RID)
    pub fn rid(&self) -> Option<u32> {
        if self.sub_authority_count > 0 {
            Some(self.sub_authority[(self.sub_authority_count - 1) as usize])
        } else {
            None
        }
    }

    /// Compare two SIDs for equality.
    ///
    /// The revision and sub-authority count live in the first two bytes,
    /// so mismatched SIDs bail out before the authority and sub-authority
    /// comparison. This is the hot path of every membership scan.
    pub fn equal(&self, other: &Sid) -> bool {
        if self.revision != other.revision
            || self.sub_authority_count != other.sub_authority_count
        {
            return false;
        }

        if self.identifier_authority != other.identifier_authority {
            return false;
        }

        self.sub_authority[..self.sub_authority_count as usize]
            == other.sub_authority[..other.sub_authority_count as usize]
    }
}

impl Default for Sid {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Sid {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other)
    }
}

impl Eq for Sid {}

// ============================================================================
// Well-Known SIDs
// ============================================================================

/// Everyone SID (S-1-1-0)
pub const SID_WORLD: Sid = Sid {
    revision: SID_REVISION,
    sub_authority_count: 1,
    identifier_authority: identifier_authority::SECURITY_WORLD_SID_AUTHORITY,
    sub_authority: [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
};

/// Anonymous logon SID (S-1-5-7)
pub const SID_ANONYMOUS_LOGON: Sid = Sid {
    revision: SID_REVISION,
    sub_authority_count: 1,
    identifier_authority: identifier_authority::SECURITY_NT_AUTHORITY,
    sub_authority: [well_known_rids::SECURITY_ANONYMOUS_LOGON_RID, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
};

/// Principal-self placeholder SID (S-1-5-10)
pub const SID_PRINCIPAL_SELF: Sid = Sid {
    revision: SID_REVISION,
    sub_authority_count: 1,
    identifier_authority: identifier_authority::SECURITY_NT_AUTHORITY,
    sub_authority: [well_known_rids::SECURITY_PRINCIPAL_SELF_RID, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
};

/// Restricted code SID (S-1-5-12)
pub const SID_RESTRICTED: Sid = Sid {
    revision: SID_REVISION,
    sub_authority_count: 1,
    identifier_authority: identifier_authority::SECURITY_NT_AUTHORITY,
    sub_authority: [well_known_rids::SECURITY_RESTRICTED_CODE_RID, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
};

/// Local System SID (S-1-5-18)
pub const SID_LOCAL_SYSTEM: Sid = Sid {
    revision: SID_REVISION,
    sub_authority_count: 1,
    identifier_authority: identifier_authority::SECURITY_NT_AUTHORITY,
    sub_authority: [well_known_rids::SECURITY_LOCAL_SYSTEM_RID, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
};

/// Local Service SID (S-1-5-19)
pub const SID_LOCAL_SERVICE: Sid = Sid {
    revision: SID_REVISION,
    sub_authority_count: 1,
    identifier_authority: identifier_authority::SECURITY_NT_AUTHORITY,
    sub_authority: [well_known_rids::SECURITY_LOCAL_SERVICE_RID, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
};

/// Network Service SID (S-1-5-20)
pub const SID_NETWORK_SERVICE: Sid = Sid {
    revision: SID_REVISION,
    sub_authority_count: 1,
    identifier_authority: identifier_authority::SECURITY_NT_AUTHORITY,
    sub_authority: [well_known_rids::SECURITY_NETWORK_SERVICE_RID, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
};

/// Authenticated Users SID (S-1-5-11)
pub const SID_AUTHENTICATED_USERS: Sid = Sid {
    revision: SID_REVISION,
    sub_authority_count: 1,
    identifier_authority: identifier_authority::SECURITY_NT_AUTHORITY,
    sub_authority: [well_known_rids::SECURITY_AUTHENTICATED_USER_RID, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
};

/// Administrators group SID (S-1-5-32-544)
pub const SID_BUILTIN_ADMINISTRATORS: Sid = Sid {
    revision: SID_REVISION,
    sub_authority_count: 2,
    identifier_authority: identifier_authority::SECURITY_NT_AUTHORITY,
    sub_authority: [well_known_rids::SECURITY_BUILTIN_DOMAIN_RID, well_known_rids::DOMAIN_ALIAS_RID_ADMINS, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
};

/// Users group SID (S-1-5-32-545)
pub const SID_BUILTIN_USERS: Sid = Sid {
    revision: SID_REVISION,
    sub_authority_count: 2,
    identifier_authority: identifier_authority::SECURITY_NT_AUTHORITY,
    sub_authority: [well_known_rids::SECURITY_BUILTIN_DOMAIN_RID, well_known_rids::DOMAIN_ALIAS_RID_USERS, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
};

// ============================================================================
// SID and Attributes (group membership entries)
// ============================================================================

/// SID attribute flags
pub mod sid_attributes {
    /// SID is mandatory (cannot be disabled)
    pub const SE_GROUP_MANDATORY: u32 = 0x00000001;
    /// SID is enabled by default
    pub const SE_GROUP_ENABLED_BY_DEFAULT: u32 = 0x00000002;
    /// SID is enabled
    pub const SE_GROUP_ENABLED: u32 = 0x00000004;
    /// SID may be assigned as owner of new objects
    pub const SE_GROUP_OWNER: u32 = 0x00000008;
    /// SID is evaluated only for access-denied entries
    pub const SE_GROUP_USE_FOR_DENY_ONLY: u32 = 0x00000010;
    /// SID is a logon ID
    pub const SE_GROUP_LOGON_ID: u32 = 0xC0000000;
    /// SID identifies a resource group
    pub const SE_GROUP_RESOURCE: u32 = 0x20000000;
}

/// A SID together with its membership attributes, as stored in tokens.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SidAndAttributes {
    /// The SID (owned)
    pub sid: Sid,
    /// Attributes for this SID
    pub attributes: u32,
}

impl SidAndAttributes {
    pub const fn new() -> Self {
        Self {
            sid: Sid::new(),
            attributes: 0,
        }
    }

    pub const fn with_sid(sid: Sid, attributes: u32) -> Self {
        Self { sid, attributes }
    }

    /// Check if this group is enabled
    pub fn is_enabled(&self) -> bool {
        (self.attributes & sid_attributes::SE_GROUP_ENABLED) != 0
    }

    /// Check if this is a mandatory group
    pub fn is_mandatory(&self) -> bool {
        (self.attributes & sid_attributes::SE_GROUP_MANDATORY) != 0
    }

    /// Check if this is used for deny-only
    pub fn is_deny_only(&self) -> bool {
        (self.attributes & sid_attributes::SE_GROUP_USE_FOR_DENY_ONLY) != 0
    }
}

impl Default for SidAndAttributes {
    fn default() -> Self {
        Self::new()
    }
}

/// Test whether `sid` appears in a SID-and-attributes list, ignoring the
/// entries' attributes.
///
/// If `principal_self` is supplied, a target equal to the principal-self
/// placeholder (S-1-5-10) is replaced by it before scanning. Used by the
/// token filter to intersect restricted-SID lists.
pub fn se_sid_in_sid_and_attributes(
    entries: &[SidAndAttributes],
    principal_self: Option<&Sid>,
    sid: &Sid,
) -> bool {
    let target = match principal_self {
        Some(ps) if sid.equal(&SID_PRINCIPAL_SELF) => ps,
        _ => sid,
    };

    entries.iter().any(|entry| entry.sid.equal(target))
}
