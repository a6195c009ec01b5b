//! Access tokens.
//!
//! Tokens represent the security context of a process or thread:
//! - User SID: identity of the user (always the first entry of the
//!   user-and-groups list)
//! - Group SIDs: group memberships, each with attribute flags
//! - Restricted SIDs: present on restricted (filtered) tokens
//! - Privileges: special rights, mostly disabled by default
//! - Default DACL / owner / primary group: applied to new objects
//!
//! A token splits into an immutable identity (IDs, type, impersonation
//! level, source, logon session) and a variable part (`TokenBody`) behind
//! a `spin::RwLock`. Examination paths take the read lock for the whole
//! decision so the group and privilege state cannot shift midway.
//!
//! # Token Types
//! - Primary: assigned to processes
//! - Impersonation: used by threads to temporarily assume another identity
//!
//! # Impersonation Levels
//! - Anonymous: server cannot identify or impersonate the client
//! - Identification: server can identify but not impersonate
//! - Impersonation: server can impersonate locally
//! - Delegation: server can impersonate on remote systems

use crate::acl::Acl;
use crate::privilege::{se_allocate_luid, Luid, LuidAndAttributes};
use crate::sid::{sid_attributes, Sid, SidAndAttributes, SID_PRINCIPAL_SELF};
use alloc::sync::Arc;
use alloc::vec::Vec;
use bitflags::bitflags;
use spin::RwLock;

/// Token type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
#[derive(Default)]
pub enum TokenType {
    /// Primary token (for processes)
    #[default]
    Primary = 1,
    /// Impersonation token (for threads)
    Impersonation = 2,
}

/// Impersonation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
#[derive(Default)]
pub enum SecurityImpersonationLevel {
    /// Cannot obtain identification or impersonation
    Anonymous = 0,
    /// Can obtain identity but not impersonate
    Identification = 1,
    /// Can impersonate on the local system
    #[default]
    Impersonation = 2,
    /// Can impersonate on remote systems
    Delegation = 3,
}

/// Token source (identifies the creator)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TokenSource {
    /// Source name (8 characters)
    pub source_name: [u8; 8],
    /// Source identifier
    pub source_identifier: Luid,
}

impl TokenSource {
    pub const fn new() -> Self {
        Self {
            source_name: [0; 8],
            source_identifier: Luid::new(0, 0),
        }
    }

    pub fn with_name(name: &[u8]) -> Self {
        let mut source = Self::new();
        let len = name.len().min(8);
        source.source_name[..len].copy_from_slice(&name[..len]);
        source
    }
}

impl Default for TokenSource {
    fn default() -> Self {
        Self::new()
    }
}

bitflags! {
    /// Fast-path token flags, kept consistent with the group and
    /// privilege lists by the transform engine.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TokenFlags: u32 {
        const HAS_TRAVERSE_PRIVILEGE    = 0x01;
        const HAS_BACKUP_PRIVILEGE      = 0x02;
        const HAS_RESTORE_PRIVILEGE     = 0x04;
        const HAS_ADMIN_GROUP           = 0x08;
        const IS_RESTRICTED             = 0x10;
        const SESSION_NOT_REFERENCED    = 0x20;
        const SANDBOX_INERT             = 0x40;
        const HAS_IMPERSONATE_PRIVILEGE = 0x80;
    }
}

/// Bits of a per-token, per-category audit policy override mask.
pub mod token_audit_mask {
    /// Audit successful events even if global policy says not to
    pub const TOKEN_AUDIT_SUCCESS_INCLUDE: u32 = 0x1;
    /// Suppress success audits even if global policy asks for them
    pub const TOKEN_AUDIT_SUCCESS_EXCLUDE: u32 = 0x2;
    /// Audit failed events even if global policy says not to
    pub const TOKEN_AUDIT_FAILURE_INCLUDE: u32 = 0x4;
    /// Suppress failure audits even if global policy asks for them
    pub const TOKEN_AUDIT_FAILURE_EXCLUDE: u32 = 0x8;
}

/// Per-user audit policy carried by a token, one override mask per audit
/// category. A zero mask defers entirely to global policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenAuditPolicy {
    masks: [u32; crate::audit::AUDIT_CATEGORY_COUNT],
}

impl TokenAuditPolicy {
    pub const fn new() -> Self {
        Self {
            masks: [0; crate::audit::AUDIT_CATEGORY_COUNT],
        }
    }

    pub fn mask(&self, category: crate::audit::AuditCategory) -> u32 {
        self.masks[category as usize]
    }

    pub fn set_mask(&mut self, category: crate::audit::AuditCategory, mask: u32) {
        self.masks[category as usize] = mask;
    }
}

/// Per-token object-access audit masks, consulted by the open alarm
/// before the SACL is examined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenAuditData {
    /// Audit when any of these rights are granted
    pub grant_mask: u32,
    /// Audit when any of these rights are denied
    pub deny_mask: u32,
}

/// A logon session. Tokens hold it through `Arc`; cloning the handle on
/// token derivation is the session reference, so a session outlives its
/// tokens and never loses a reference it still needs.
#[derive(Debug)]
pub struct LogonSession {
    /// Logon session identifier (the tokens' authentication ID)
    pub logon_id: Luid,
}

impl LogonSession {
    pub fn new(logon_id: Luid) -> Arc<Self> {
        Arc::new(Self { logon_id })
    }
}

/// The variable part of a token, guarded by the token's lock.
#[derive(Debug, Clone)]
pub struct TokenBody {
    /// User (index 0, always present) followed by the groups
    pub user_and_groups: Vec<SidAndAttributes>,
    /// Restricted SIDs (non-empty only on restricted tokens)
    pub restricted_sids: Vec<SidAndAttributes>,
    /// Privileges
    pub privileges: Vec<LuidAndAttributes>,
    /// Index into `user_and_groups` of the default owner for new objects
    pub default_owner_index: usize,
    /// Primary group for new objects
    pub primary_group: Sid,
    /// Default DACL for new objects
    pub default_dacl: Option<Acl>,
    /// Fast-path flags
    pub flags: TokenFlags,
    /// Per-user audit policy overrides
    pub audit_policy: TokenAuditPolicy,
    /// Changes every time the variable part changes
    pub modified_id: Luid,
}

impl TokenBody {
    fn new(user: Sid) -> Self {
        Self {
            user_and_groups: alloc::vec![SidAndAttributes::with_sid(user, 0)],
            restricted_sids: Vec::new(),
            privileges: Vec::new(),
            default_owner_index: 0,
            primary_group: user,
            default_dacl: None,
            flags: TokenFlags::empty(),
            audit_policy: TokenAuditPolicy::new(),
            modified_id: se_allocate_luid(),
        }
    }

    /// The user entry.
    pub fn user(&self) -> &SidAndAttributes {
        &self.user_and_groups[0]
    }

    /// The group entries (everything after the user).
    pub fn groups(&self) -> &[SidAndAttributes] {
        &self.user_and_groups[1..]
    }

    /// The SID new objects will be owned by.
    pub fn default_owner(&self) -> &Sid {
        &self.user_and_groups[self.default_owner_index].sid
    }

    /// Check if the token holds a privilege, enabled or not.
    pub fn has_privilege(&self, luid: Luid) -> bool {
        self.privileges.iter().any(|p| p.luid == luid)
    }

    /// Check if a privilege is held and enabled.
    pub fn is_privilege_enabled(&self, luid: Luid) -> bool {
        crate::privilege::se_single_privilege_check(luid, &self.privileges)
    }

    /// Enable a held privilege. Returns false if it is not held.
    pub fn enable_privilege(&mut self, luid: Luid) -> bool {
        for entry in self.privileges.iter_mut() {
            if entry.luid == luid {
                entry.enable();
                self.modified_id = se_allocate_luid();
                return true;
            }
        }
        false
    }

    /// Disable a held privilege. Returns false if it is not held.
    pub fn disable_privilege(&mut self, luid: Luid) -> bool {
        for entry in self.privileges.iter_mut() {
            if entry.luid == luid {
                entry.disable();
                self.modified_id = se_allocate_luid();
                return true;
            }
        }
        false
    }

    /// Membership predicate used by ACE evaluation.
    ///
    /// The user entry always matches. A group entry matches when it is
    /// enabled, or - for deny/failure evaluation (`deny_ace`) - when it
    /// is marked use-for-deny-only. If `principal_self` is supplied, a
    /// target equal to the principal-self placeholder is replaced by it
    /// before scanning.
    pub fn sid_in_token(
        &self,
        principal_self: Option<&Sid>,
        sid: &Sid,
        deny_ace: bool,
    ) -> bool {
        let target = match principal_self {
            Some(ps) if sid.equal(&SID_PRINCIPAL_SELF) => ps,
            _ => sid,
        };

        for (i, entry) in self.user_and_groups.iter().enumerate() {
            if !entry.sid.equal(target) {
                continue;
            }

            if i == 0 {
                return true;
            }

            if entry.attributes & sid_attributes::SE_GROUP_ENABLED != 0 {
                return true;
            }

            if deny_ace && entry.attributes & sid_attributes::SE_GROUP_USE_FOR_DENY_ONLY != 0 {
                return true;
            }
        }

        false
    }

    /// Check whether this token can act as the owner named by a security
    /// descriptor: the SID must be the user or an enabled group.
    pub fn is_owner(&self, owner: &Sid) -> bool {
        self.sid_in_token(None, owner, false)
    }
}

/// Access token.
pub struct Token {
    /// Unique identifier
    pub token_id: Luid,
    /// Logon session identifier
    pub authentication_id: Luid,
    /// ID of the token this one was filtered from (zero otherwise)
    pub parent_token_id: Luid,
    /// Expiration time (0 = never)
    pub expiration_time: u64,
    /// Primary or impersonation
    pub token_type: TokenType,
    /// Impersonation level (meaningful for impersonation tokens)
    pub impersonation_level: SecurityImpersonationLevel,
    /// Creator identification
    pub token_source: TokenSource,
    /// Terminal-services session
    pub session_id: u32,
    /// Shared logon session handle
    pub logon_session: Arc<LogonSession>,
    /// Optional per-token object-access audit masks
    pub audit_data: Option<TokenAuditData>,
    /// Variable part
    body: RwLock<TokenBody>,
}

impl Token {
    /// Create a token for `user` tied to a logon session.
    pub fn new(
        user: Sid,
        logon_session: Arc<LogonSession>,
        token_type: TokenType,
        impersonation_level: SecurityImpersonationLevel,
    ) -> Self {
        Self {
            token_id: se_allocate_luid(),
            authentication_id: logon_session.logon_id,
            parent_token_id: Luid::new(0, 0),
            expiration_time: 0,
            token_type,
            impersonation_level,
            token_source: TokenSource::new(),
            session_id: 0,
            logon_session,
            audit_data: None,
            body: RwLock::new(TokenBody::new(user)),
        }
    }

    /// Rebuild a token around an already-derived body. Used by the
    /// transform engine; identity fields are filled in by the caller.
    pub(crate) fn from_body(
        body: TokenBody,
        logon_session: Arc<LogonSession>,
        token_type: TokenType,
        impersonation_level: SecurityImpersonationLevel,
    ) -> Self {
        Self {
            token_id: se_allocate_luid(),
            authentication_id: logon_session.logon_id,
            parent_token_id: Luid::new(0, 0),
            expiration_time: 0,
            token_type,
            impersonation_level,
            token_source: TokenSource::new(),
            session_id: 0,
            logon_session,
            audit_data: None,
            body: RwLock::new(body),
        }
    }

    /// Lock the variable part for reading.
    pub fn read(&self) -> spin::RwLockReadGuard<'_, TokenBody> {
        self.body.read()
    }

    /// Lock the variable part for writing.
    pub fn write(&self) -> spin::RwLockWriteGuard<'_, TokenBody> {
        self.body.write()
    }

    /// Add a group to the token.
    pub fn add_group(&self, sid: Sid, attributes: u32) {
        let mut body = self.body.write();
        body.user_and_groups.push(SidAndAttributes::with_sid(sid, attributes));
        if attributes & sid_attributes::SE_GROUP_ENABLED != 0
            && sid.equal(&crate::sid::SID_BUILTIN_ADMINISTRATORS)
        {
            body.flags |= TokenFlags::HAS_ADMIN_GROUP;
        }
        body.modified_id = se_allocate_luid();
    }

    /// Add a privilege to the token.
    pub fn add_privilege(&self, luid: Luid, attributes: u32) {
        let mut body = self.body.write();
        body.privileges.push(LuidAndAttributes::with_luid(luid, attributes));
        if luid == crate::privilege::privilege_luids::SE_CHANGE_NOTIFY_LUID {
            body.flags |= TokenFlags::HAS_TRAVERSE_PRIVILEGE;
        }
        if luid == crate::privilege::privilege_luids::SE_IMPERSONATE_LUID {
            body.flags |= TokenFlags::HAS_IMPERSONATE_PRIVILEGE;
        }
        if luid == crate::privilege::privilege_luids::SE_BACKUP_LUID {
            body.flags |= TokenFlags::HAS_BACKUP_PRIVILEGE;
        }
        if luid == crate::privilege::privilege_luids::SE_RESTORE_LUID {
            body.flags |= TokenFlags::HAS_RESTORE_PRIVILEGE;
        }
        body.modified_id = se_allocate_luid();
    }

    /// Copy of the user SID.
    pub fn user_sid(&self) -> Sid {
        self.body.read().user().sid
    }

    /// Check if this token carries restricted SIDs.
    pub fn is_restricted(&self) -> bool {
        self.body.read().flags.contains(TokenFlags::IS_RESTRICTED)
    }
}
