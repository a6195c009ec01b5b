//! Access state and the subject context.
//!
//! An `AccessState` tracks one open operation from the first desire for
//! access until the handle exists: which rights are still wanted, which
//! were already granted (and by what privilege), and what auditing the
//! open has earned so far. The deferred half of object auditing lives
//! here - the open decides, the handle-creation step emits, and the
//! close honors `generate_on_close`.
//!
//! The discretionary access check itself is a collaborator behind the
//! [`AccessCheck`] trait; this module owns everything around it.

use crate::acl::{generic_rights, special_rights, standard_rights};
use crate::descriptor::SecurityDescriptor;
use crate::error::{SeError, SeResult};
use crate::privilege::{
    privilege_attributes, privilege_luids, se_allocate_luid, Luid, LuidAndAttributes,
    PrivilegeSet, INITIAL_PRIVILEGE_COUNT,
};
use crate::sid::Sid;
use crate::token::{SecurityImpersonationLevel, Token};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// Mapping from generic rights to object-specific rights.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenericMapping {
    pub generic_read: u32,
    pub generic_write: u32,
    pub generic_execute: u32,
    pub generic_all: u32,
}

impl GenericMapping {
    pub const fn new(read: u32, write: u32, execute: u32, all: u32) -> Self {
        Self {
            generic_read: read,
            generic_write: write,
            generic_execute: execute,
            generic_all: all,
        }
    }

    /// Replace generic bits in `mask` with their object-specific rights.
    pub fn map_generic(&self, mask: u32) -> u32 {
        let mut mapped = mask & !generic_rights::GENERIC_RIGHTS_MASK;
        if mask & generic_rights::GENERIC_READ != 0 {
            mapped |= self.generic_read;
        }
        if mask & generic_rights::GENERIC_WRITE != 0 {
            mapped |= self.generic_write;
        }
        if mask & generic_rights::GENERIC_EXECUTE != 0 {
            mapped |= self.generic_execute;
        }
        if mask & generic_rights::GENERIC_ALL != 0 {
            mapped |= self.generic_all;
        }
        mapped
    }
}

/// The security context an operation runs under: the process's primary
/// token plus, when the thread impersonates, the client token.
#[derive(Clone)]
pub struct SecuritySubjectContext {
    /// Primary (process) token
    pub primary_token: Arc<Token>,
    /// Client token when impersonating
    pub client_token: Option<Arc<Token>>,
    /// Level at which the client token may be used
    pub impersonation_level: SecurityImpersonationLevel,
    /// Audit identifier of the owning process
    pub process_audit_id: u64,
}

impl SecuritySubjectContext {
    pub fn new(primary_token: Arc<Token>) -> Self {
        Self {
            primary_token,
            client_token: None,
            impersonation_level: SecurityImpersonationLevel::Anonymous,
            process_audit_id: 0,
        }
    }

    pub fn with_client(
        primary_token: Arc<Token>,
        client_token: Arc<Token>,
        impersonation_level: SecurityImpersonationLevel,
    ) -> Self {
        Self {
            primary_token,
            client_token: Some(client_token),
            impersonation_level,
            process_audit_id: 0,
        }
    }

    /// The token access decisions are made against: the client token when
    /// impersonating, the primary token otherwise.
    pub fn effective_token(&self) -> &Arc<Token> {
        self.client_token.as_ref().unwrap_or(&self.primary_token)
    }
}

/// Privileges consumed so far by an access. Small opens stay inline;
/// the rare privilege-heavy open spills to the heap.
#[derive(Debug, Clone)]
enum PrivilegesUsed {
    Inline {
        entries: [LuidAndAttributes; INITIAL_PRIVILEGE_COUNT],
        count: usize,
    },
    Heap(Vec<LuidAndAttributes>),
}

impl PrivilegesUsed {
    const fn new() -> Self {
        Self::Inline {
            entries: [LuidAndAttributes::new(); INITIAL_PRIVILEGE_COUNT],
            count: 0,
        }
    }

    fn as_slice(&self) -> &[LuidAndAttributes] {
        match self {
            Self::Inline { entries, count } => &entries[..*count],
            Self::Heap(vec) => vec,
        }
    }

    fn push(&mut self, entry: LuidAndAttributes) {
        match self {
            Self::Inline { entries, count } => {
                if *count < INITIAL_PRIVILEGE_COUNT {
                    entries[*count] = entry;
                    *count += 1;
                } else {
                    let mut vec: Vec<LuidAndAttributes> = entries.to_vec();
                    vec.push(entry);
                    *self = Self::Heap(vec);
                }
            }
            Self::Heap(vec) => vec.push(entry),
        }
    }
}

/// Running state of one open operation.
pub struct AccessState {
    /// Ties the open audit to the handle-creation audit
    pub operation_id: Luid,
    /// Set once an access check ran against a security descriptor
    pub security_evaluated: bool,
    /// The open earned an object-access audit
    pub generate_audit: bool,
    /// A privilege-use audit stands in for the object-access audit
    pub audit_privileges: bool,
    /// The eventual handle close must be audited
    pub generate_on_close: bool,
    /// Rights still wanted
    pub remaining_desired_access: u32,
    /// Rights already granted (by privilege or ownership)
    pub previously_granted_access: u32,
    /// The full request, after generic mapping
    pub original_desired_access: u32,
    /// Rights whose audit was requested by success ACEs, for the close
    pub maximum_audit_mask: u32,
    /// Mapping for the object type being opened
    pub generic_mapping: GenericMapping,
    /// Name of the object, captured for the deferred audit
    pub object_name: Option<String>,
    /// Type name of the object, captured for the deferred audit
    pub object_type_name: Option<String>,
    /// Who is opening
    pub subject: SecuritySubjectContext,
    privileges_used: PrivilegesUsed,
}

impl AccessState {
    /// Begin an open operation.
    ///
    /// Generic bits are mapped up front so every later comparison works
    /// in object-specific rights. Fails if the subject carries a client
    /// token the server is not entitled to use for access decisions.
    pub fn new(
        subject: SecuritySubjectContext,
        desired_access: u32,
        generic_mapping: GenericMapping,
    ) -> SeResult<Self> {
        if subject.client_token.is_some()
            && subject.impersonation_level < SecurityImpersonationLevel::Identification
        {
            return Err(SeError::BadImpersonationLevel);
        }

        let mapped = generic_mapping.map_generic(desired_access);

        Ok(Self {
            operation_id: se_allocate_luid(),
            security_evaluated: false,
            generate_audit: false,
            audit_privileges: false,
            generate_on_close: false,
            remaining_desired_access: mapped,
            previously_granted_access: 0,
            original_desired_access: mapped,
            maximum_audit_mask: 0,
            generic_mapping,
            object_name: None,
            object_type_name: None,
            subject,
            privileges_used: PrivilegesUsed::new(),
        })
    }

    /// The token this open is decided against.
    pub fn effective_token(&self) -> &Arc<Token> {
        self.subject.effective_token()
    }

    /// Record privileges that carried part of this access.
    pub fn append_privileges(&mut self, privileges: &PrivilegeSet) {
        for entry in &privileges.privilege {
            self.privileges_used.push(*entry);
        }
    }

    /// Privileges recorded so far.
    pub fn privileges_used(&self) -> &[LuidAndAttributes] {
        self.privileges_used.as_slice()
    }

    /// Privileges recorded so far as an owned set, for audit records.
    pub fn privilege_set(&self) -> PrivilegeSet {
        let mut set = PrivilegeSet::new();
        for entry in self.privileges_used.as_slice() {
            set.push(*entry);
        }
        set
    }
}

/// Grant the policy-controlled rights a privilege can carry.
///
/// ACCESS_SYSTEM_SECURITY requires SeSecurityPrivilege; asking for it
/// without the privilege fails the whole open. WRITE_OWNER is granted
/// when SeTakeOwnershipPrivilege is enabled. Granted bits move from
/// remaining to previously-granted and the privileges are recorded as
/// used.
pub fn se_privilege_policy_check(access_state: &mut AccessState) -> SeResult<()> {
    let token = Arc::clone(access_state.effective_token());
    let body = token.read();
    let mut used = PrivilegeSet::new();

    if access_state.remaining_desired_access & special_rights::ACCESS_SYSTEM_SECURITY != 0 {
        if !body.is_privilege_enabled(privilege_luids::SE_SECURITY_LUID) {
            return Err(SeError::PrivilegeNotHeld);
        }
        used.push(LuidAndAttributes::with_luid(
            privilege_luids::SE_SECURITY_LUID,
            privilege_attributes::SE_PRIVILEGE_ENABLED
                | privilege_attributes::SE_PRIVILEGE_USED_FOR_ACCESS,
        ));
        access_state.remaining_desired_access &= !special_rights::ACCESS_SYSTEM_SECURITY;
        access_state.previously_granted_access |= special_rights::ACCESS_SYSTEM_SECURITY;
    }

    if access_state.remaining_desired_access & standard_rights::WRITE_OWNER != 0
        && body.is_privilege_enabled(privilege_luids::SE_TAKE_OWNERSHIP_LUID)
    {
        used.push(LuidAndAttributes::with_luid(
            privilege_luids::SE_TAKE_OWNERSHIP_LUID,
            privilege_attributes::SE_PRIVILEGE_ENABLED
                | privilege_attributes::SE_PRIVILEGE_USED_FOR_ACCESS,
        ));
        access_state.remaining_desired_access &= !standard_rights::WRITE_OWNER;
        access_state.previously_granted_access |= standard_rights::WRITE_OWNER;
    }
    drop(body);

    if !used.is_empty() {
        access_state.append_privileges(&used);
    }

    Ok(())
}

/// One discretionary access check request.
pub struct AccessCheckRequest<'a> {
    /// Descriptor of the object being opened
    pub security_descriptor: &'a SecurityDescriptor,
    /// Token the check runs against
    pub token: &'a Token,
    /// Rights still wanted (may include MAXIMUM_ALLOWED)
    pub desired_access: u32,
    /// Rights already granted by policy
    pub previously_granted_access: u32,
    /// Mapping for the object type
    pub generic_mapping: GenericMapping,
    /// Principal to substitute for the self placeholder SID
    pub principal_self: Option<Sid>,
}

/// Outcome of a discretionary access check.
#[derive(Debug, Clone, Default)]
pub struct AccessCheckResult {
    /// Whether the full request was granted
    pub access_granted: bool,
    /// Rights granted (the full resolved set on success)
    pub granted_access: u32,
    /// Privileges the checker consumed, if any
    pub privileges_used: Option<PrivilegeSet>,
}

/// The discretionary access check collaborator. The decision core calls
/// it, merges its grants into the access state, and audits the outcome;
/// the DACL walk itself lives behind this seam.
pub trait AccessCheck {
    fn check_access(&self, request: &AccessCheckRequest<'_>) -> AccessCheckResult;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sid::identifier_authority;
    use crate::token::{LogonSession, TokenType};

    pub(crate) fn test_user() -> Sid {
        Sid::create(identifier_authority::SECURITY_NT_AUTHORITY, &[21, 4, 4, 4, 1003]).unwrap()
    }

    pub(crate) fn test_subject() -> SecuritySubjectContext {
        let session = LogonSession::new(se_allocate_luid());
        let token = Arc::new(Token::new(
            test_user(),
            session,
            TokenType::Primary,
            SecurityImpersonationLevel::Impersonation,
        ));
        SecuritySubjectContext::new(token)
    }

    const FILE_MAPPING: GenericMapping = GenericMapping::new(
        0x0012_0089,
        0x0012_0116,
        0x0012_00A0,
        0x001F_01FF,
    );

    #[test]
    fn test_generic_mapping() {
        let mapped = FILE_MAPPING.map_generic(generic_rights::GENERIC_READ | 0x1);
        assert_eq!(mapped, 0x0012_0089 | 0x1);
        assert_eq!(mapped & generic_rights::GENERIC_RIGHTS_MASK, 0);

        // MAXIMUM_ALLOWED passes through untouched.
        let mapped = FILE_MAPPING.map_generic(special_rights::MAXIMUM_ALLOWED);
        assert_eq!(mapped, special_rights::MAXIMUM_ALLOWED);
    }

    #[test]
    fn test_access_state_rejects_anonymous_client() {
        let subject = test_subject();
        let client = Arc::clone(&subject.primary_token);
        let anon = SecuritySubjectContext::with_client(
            Arc::clone(&subject.primary_token),
            client,
            SecurityImpersonationLevel::Anonymous,
        );
        assert_eq!(
            AccessState::new(anon, 0x1, GenericMapping::default()).err(),
            Some(SeError::BadImpersonationLevel)
        );
    }

    #[test]
    fn test_privilege_policy_check_requires_security_privilege() {
        let subject = test_subject();
        let mut state = AccessState::new(
            subject,
            special_rights::ACCESS_SYSTEM_SECURITY,
            GenericMapping::default(),
        )
        .unwrap();

        assert_eq!(
            se_privilege_policy_check(&mut state).err(),
            Some(SeError::PrivilegeNotHeld)
        );
    }

    #[test]
    fn test_privilege_policy_check_grants_by_privilege() {
        let subject = test_subject();
        subject.primary_token.add_privilege(
            privilege_luids::SE_SECURITY_LUID,
            privilege_attributes::SE_PRIVILEGE_ENABLED,
        );
        subject.primary_token.add_privilege(
            privilege_luids::SE_TAKE_OWNERSHIP_LUID,
            privilege_attributes::SE_PRIVILEGE_ENABLED,
        );

        let mut state = AccessState::new(
            subject,
            special_rights::ACCESS_SYSTEM_SECURITY | standard_rights::WRITE_OWNER | 0x1,
            GenericMapping::default(),
        )
        .unwrap();

        se_privilege_policy_check(&mut state).unwrap();
        assert_eq!(state.remaining_desired_access, 0x1);
        assert_eq!(
            state.previously_granted_access,
            special_rights::ACCESS_SYSTEM_SECURITY | standard_rights::WRITE_OWNER
        );
        let used = state.privileges_used();
        assert_eq!(used.len(), 2);
        assert!(used
            .iter()
            .all(|p| p.attributes & privilege_attributes::SE_PRIVILEGE_USED_FOR_ACCESS != 0));
    }

    #[test]
    fn test_privileges_used_spills_to_heap() {
        let subject = test_subject();
        let mut state =
            AccessState::new(subject, 0x1, GenericMapping::default()).unwrap();

        let mut set = PrivilegeSet::new();
        for low in 2..7u32 {
            set.push(LuidAndAttributes::with_luid(Luid::from_u32(low), 0));
        }
        state.append_privileges(&set);

        assert_eq!(state.privileges_used().len(), 5);
        assert_eq!(state.privilege_set().len(), 5);
    }
}
