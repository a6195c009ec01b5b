//! Security reference monitor decision core.
//!
//! Implements the decision half of an NT-style reference monitor:
//! - Tokens: user, groups, privileges, restricted SIDs, audit policy
//! - Token derivation: duplication, effective-only reduction, filtering
//! - SACL examination: plain and object-type-list auditing decisions
//! - Access state: per-open bookkeeping with deferred object auditing
//! - Audit alarms: open/close/delete lifecycle and privilege-use audits
//!
//! Enforcement collaborators stay outside: the discretionary access
//! check sits behind [`access::AccessCheck`] and audit delivery behind
//! [`audit::AuditSink`]. The crate decides; the host grants handles and
//! writes logs.
//!
//! # Architecture
//!
//! ```text
//! alarm ──> access ──> token ──> sid, privilege
//!   │          │
//!   ├──> sacl ─┴──> acl, descriptor
//!   └──> audit
//! ```

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod access;
pub mod acl;
pub mod alarm;
pub mod audit;
pub mod descriptor;
pub mod error;
pub mod privilege;
pub mod sacl;
pub mod sid;
pub mod token;
pub mod transform;

pub use access::{
    AccessCheck, AccessCheckRequest, AccessCheckResult, AccessState, GenericMapping,
    SecuritySubjectContext,
};
pub use alarm::{
    se_access_check_and_audit_alarm, se_audit_handle_creation, se_check_audit_privilege,
    se_close_object_audit_alarm, se_delete_object_audit_alarm, se_open_object_audit_alarm,
    se_open_object_for_delete_audit_alarm, se_privilege_object_audit_alarm,
    se_privileged_service_audit_alarm, AuditedCheckOutcome,
};
pub use audit::{AuditCategory, AuditQueue, AuditRecord, AuditSink, AuditingState};
pub use error::{SeError, SeResult};
pub use privilege::{Luid, LuidAndAttributes, PrivilegeSet};
pub use sacl::{se_examine_sacl, se_examine_sacl_ex, se_maximum_audit_mask, SaclAuditResult};
pub use sid::{Sid, SidAndAttributes};
pub use token::{
    LogonSession, SecurityImpersonationLevel, Token, TokenBody, TokenFlags, TokenType,
};
pub use transform::{se_duplicate_token, se_filter_token, se_make_token_effective_only};
