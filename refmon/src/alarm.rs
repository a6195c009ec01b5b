//! Audit alarms: the object-access and privilege-use audit lifecycle.
//!
//! Object auditing is deferred across the open. The open alarm decides
//! whether an audit is owed and stashes everything the record needs in
//! the access state; handle creation emits the record once the handle ID
//! exists and arms close auditing only if the record was delivered; the
//! close and delete alarms fire against that armed flag. A refused open
//! has no handle to wait for, so its audit goes out immediately.
//!
//! The audited access check ties the pieces together for callers without
//! an object manager: privilege gate, descriptor validation, the
//! discretionary check through the [`AccessCheck`] seam, SACL
//! examination, and immediate emission.

use crate::access::{
    se_privilege_policy_check, AccessCheck, AccessCheckRequest, AccessState,
    GenericMapping, SecuritySubjectContext,
};
use crate::acl::{generic_rights, se_capture_object_type_list, standard_rights, ObjectTypeEntry};
use crate::audit::{
    se_audit_this_event, AuditCategory, AuditRecord, AuditSink, AuditingState,
};
use crate::descriptor::SecurityDescriptor;
use crate::error::{SeError, SeResult};
use crate::privilege::{
    privilege_control, privilege_filter_flags, privilege_luids, se_filter_privilege_audits,
    se_privilege_check, PrivilegeSet,
};
use crate::sacl::{se_examine_sacl, se_examine_sacl_ex, se_maximum_audit_mask};
use crate::sid::{Sid, SID_LOCAL_SERVICE, SID_LOCAL_SYSTEM, SID_NETWORK_SERVICE};
use crate::token::Token;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use log::debug;

/// Name the decision core reports as the auditing subsystem.
pub const SUBSYSTEM_NAME: &str = "Security";

/// Flags for [`se_access_check_and_audit_alarm`].
pub mod audit_flags {
    /// Let a caller without SeAuditPrivilege get the access decision;
    /// no audit is generated for it.
    pub const AUDIT_ALLOW_NO_PRIVILEGE: u32 = 0x1;
}

fn token_override(token: &Token, category: AuditCategory) -> u32 {
    token.read().audit_policy.mask(category)
}

/// Build the open record for the deferred or immediate emission. Only
/// the object type entries the SACL examination marked are carried.
fn open_record(
    access_state: &AccessState,
    handle_id: Option<u64>,
    object_type_list: &[ObjectTypeEntry],
    success: bool,
    for_delete: bool,
) -> AuditRecord {
    let token = access_state.effective_token();
    let privileges = if access_state.privileges_used().is_empty() {
        None
    } else {
        Some(access_state.privilege_set())
    };

    let object_type_name = access_state.object_type_name.clone();
    let object_name = access_state.object_name.clone();
    let user_sid = token.user_sid();
    let authentication_id = token.authentication_id;
    let desired_access = access_state.original_desired_access;
    let operation_id = access_state.operation_id;
    let object_types: Vec<ObjectTypeEntry> = object_type_list
        .iter()
        .filter(|entry| entry.flags != 0)
        .copied()
        .collect();

    if for_delete {
        AuditRecord::ObjectOpenForDelete {
            object_type_name,
            object_name,
            handle_id,
            operation_id,
            user_sid,
            authentication_id,
            desired_access,
            privileges,
            object_types,
            success,
        }
    } else {
        AuditRecord::ObjectOpen {
            object_type_name,
            object_name,
            handle_id,
            operation_id,
            user_sid,
            authentication_id,
            desired_access,
            privileges,
            object_types,
            success,
        }
    }
}

fn open_object_audit_alarm(
    state: &AuditingState,
    sink: &dyn AuditSink,
    access_state: &mut AccessState,
    object_type_name: &str,
    object_name: Option<&str>,
    security_descriptor: Option<&SecurityDescriptor>,
    access_granted: bool,
    for_delete: bool,
) {
    let token = Arc::clone(access_state.effective_token());
    let requested_access =
        access_state.remaining_desired_access | access_state.previously_granted_access;

    let mut generate_audit = false;

    if se_audit_this_event(
        state,
        AuditCategory::ObjectAccess,
        access_granted,
        token_override(&token, AuditCategory::ObjectAccess),
    ) {
        // Per-token audit masks answer before the SACL is walked.
        if let Some(audit_data) = token.audit_data {
            let mask = if access_granted {
                access_state.generic_mapping.map_generic(audit_data.grant_mask)
            } else {
                access_state.generic_mapping.map_generic(audit_data.deny_mask)
            };
            if requested_access & mask != 0 {
                generate_audit = true;
            }
        }

        let body = token.read();
        if !generate_audit {
            if let Some(sacl) = security_descriptor.and_then(|sd| sd.sacl()) {
                generate_audit = se_examine_sacl(sacl, &body, requested_access, access_granted);
            }
        }

        if generate_audit && access_granted {
            if let Some(sacl) = security_descriptor.and_then(|sd| sd.sacl()) {
                access_state.maximum_audit_mask =
                    se_maximum_audit_mask(sacl, requested_access, &body);
            }
        }
    }

    // An open that owes no object audit may still owe a privilege-use
    // audit for the rights its privileges carried.
    if !generate_audit && access_granted {
        let privileges = access_state.privilege_set();
        if se_audit_this_event(
            state,
            AuditCategory::PrivilegeUse,
            access_granted,
            token_override(&token, AuditCategory::PrivilegeUse),
        ) && !privileges.is_empty()
            && se_filter_privilege_audits(0, &privileges, state.verbose_privilege_auditing)
        {
            generate_audit = true;
            access_state.audit_privileges = true;
        }
    }

    if !generate_audit {
        return;
    }

    access_state.object_type_name = Some(object_type_name.to_string());
    access_state.object_name = object_name.map(String::from);

    if access_granted {
        // Defer: the record needs the handle ID, which does not exist
        // yet. Handle creation emits it.
        access_state.generate_audit = true;
        debug!(
            "open audit deferred for {:?} (operation {:?})",
            access_state.object_name, access_state.operation_id
        );
    } else {
        // A refused open never reaches handle creation.
        let _ = sink.record(open_record(access_state, None, &[], false, for_delete));
    }
}

/// Determine the auditing a granted or refused open has earned.
///
/// On a grant nothing is emitted yet; `access_state.generate_audit` is
/// armed for [`se_audit_handle_creation`]. On a refusal the record is
/// emitted here.
pub fn se_open_object_audit_alarm(
    state: &AuditingState,
    sink: &dyn AuditSink,
    access_state: &mut AccessState,
    object_type_name: &str,
    object_name: Option<&str>,
    security_descriptor: Option<&SecurityDescriptor>,
    access_granted: bool,
) {
    open_object_audit_alarm(
        state,
        sink,
        access_state,
        object_type_name,
        object_name,
        security_descriptor,
        access_granted,
        false,
    );
}

/// Like [`se_open_object_audit_alarm`] but for opens that will delete the
/// object, so the trail distinguishes delete-intent opens.
pub fn se_open_object_for_delete_audit_alarm(
    state: &AuditingState,
    sink: &dyn AuditSink,
    access_state: &mut AccessState,
    object_type_name: &str,
    object_name: Option<&str>,
    security_descriptor: Option<&SecurityDescriptor>,
    access_granted: bool,
) {
    open_object_audit_alarm(
        state,
        sink,
        access_state,
        object_type_name,
        object_name,
        security_descriptor,
        access_granted,
        true,
    );
}

/// Emit the audit a successful open deferred, now that the handle
/// exists.
///
/// Close auditing is armed only when an object-access record was
/// actually delivered; a privilege-use stand-in never earns a close
/// audit, and neither does a record lost to queue pressure.
pub fn se_audit_handle_creation(
    sink: &dyn AuditSink,
    access_state: &mut AccessState,
    handle_id: u64,
) {
    let mut audit_performed = false;

    if access_state.generate_audit {
        if access_state.audit_privileges {
            let token = access_state.effective_token();
            let _ = sink.record(AuditRecord::PrivilegeObjectUse {
                handle_id: Some(handle_id),
                user_sid: token.user_sid(),
                authentication_id: token.authentication_id,
                desired_access: access_state.original_desired_access,
                privileges: access_state.privilege_set(),
                success: true,
            });
        } else {
            audit_performed = sink
                .record(open_record(access_state, Some(handle_id), &[], true, false))
                .is_ok();
        }
    }

    access_state.generate_on_close = audit_performed;
}

/// Audit the close of a handle whose open was audited.
pub fn se_close_object_audit_alarm(
    state: &AuditingState,
    sink: &dyn AuditSink,
    subject: &SecuritySubjectContext,
    handle_id: u64,
    generate_on_close: bool,
) {
    if !generate_on_close || state.do_not_audit_close_object_events {
        return;
    }

    let token = subject.effective_token();
    if !se_audit_this_event(
        state,
        AuditCategory::ObjectAccess,
        true,
        token_override(token, AuditCategory::ObjectAccess),
    ) {
        return;
    }

    let _ = sink.record(AuditRecord::HandleClose {
        handle_id,
        user_sid: token.user_sid(),
        authentication_id: token.authentication_id,
    });
}

/// Audit the deletion of an object whose open was audited.
pub fn se_delete_object_audit_alarm(
    state: &AuditingState,
    sink: &dyn AuditSink,
    subject: &SecuritySubjectContext,
    handle_id: u64,
    generate_on_close: bool,
) {
    if !generate_on_close {
        return;
    }

    let token = subject.effective_token();
    if !se_audit_this_event(
        state,
        AuditCategory::ObjectAccess,
        true,
        token_override(token, AuditCategory::ObjectAccess),
    ) {
        return;
    }

    let _ = sink.record(AuditRecord::ObjectDelete {
        handle_id,
        user_sid: token.user_sid(),
        authentication_id: token.authentication_id,
    });
}

/// Audit privilege use against an object.
pub fn se_privilege_object_audit_alarm(
    state: &AuditingState,
    sink: &dyn AuditSink,
    subject: &SecuritySubjectContext,
    handle_id: Option<u64>,
    desired_access: u32,
    privileges: &PrivilegeSet,
    access_granted: bool,
) {
    let token = subject.effective_token();
    if !se_audit_this_event(
        state,
        AuditCategory::PrivilegeUse,
        access_granted,
        token_override(token, AuditCategory::PrivilegeUse),
    ) {
        return;
    }

    let _ = sink.record(AuditRecord::PrivilegeObjectUse {
        handle_id,
        user_sid: token.user_sid(),
        authentication_id: token.authentication_id,
        desired_access,
        privileges: privileges.clone(),
        success: access_granted,
    });
}

/// Audit privilege use for a system service.
///
/// The local system account is never audited here; the service accounts
/// are audited only when the privilege set survives the service noise
/// filter.
pub fn se_privileged_service_audit_alarm(
    state: &AuditingState,
    sink: &dyn AuditSink,
    service_name: Option<&str>,
    subject: &SecuritySubjectContext,
    privileges: &PrivilegeSet,
    access_granted: bool,
) {
    let token = subject.effective_token();
    let user_sid = token.user_sid();

    if user_sid.equal(&SID_LOCAL_SYSTEM) {
        return;
    }

    if (user_sid.equal(&SID_LOCAL_SERVICE) || user_sid.equal(&SID_NETWORK_SERVICE))
        && !se_filter_privilege_audits(
            privilege_filter_flags::SEP_SERVICES_FILTER,
            privileges,
            state.verbose_privilege_auditing,
        )
    {
        return;
    }

    if !se_audit_this_event(
        state,
        AuditCategory::PrivilegeUse,
        access_granted,
        token_override(token, AuditCategory::PrivilegeUse),
    ) {
        return;
    }

    let _ = sink.record(AuditRecord::PrivilegedServiceUse {
        service_name: service_name.map(String::from),
        user_sid,
        authentication_id: token.authentication_id,
        privileges: privileges.clone(),
        success: access_granted,
    });
}

/// Verify the caller holds SeAuditPrivilege, auditing the check itself.
///
/// The check runs against the primary token: impersonating an audit-
/// privileged client does not let a server generate audits.
pub fn se_check_audit_privilege(
    state: &AuditingState,
    sink: &dyn AuditSink,
    subject: &SecuritySubjectContext,
) -> SeResult<()> {
    let mut required = PrivilegeSet::single(privilege_luids::SE_AUDIT_LUID, 0);
    required.control = privilege_control::PRIVILEGE_SET_ALL_NECESSARY;

    let held = {
        let body = subject.primary_token.read();
        body.privileges.clone()
    };
    let granted = se_privilege_check(&mut required, &held);

    se_privileged_service_audit_alarm(
        state,
        sink,
        Some(SUBSYSTEM_NAME),
        subject,
        &required,
        granted,
    );

    if granted {
        Ok(())
    } else {
        Err(SeError::PrivilegeNotHeld)
    }
}

/// Outcome of an audited access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditedCheckOutcome {
    /// Whether the full request was granted
    pub access_granted: bool,
    /// Rights granted
    pub granted_access: u32,
    /// The caller must audit the eventual close of whatever handle it
    /// creates from this grant
    pub generate_on_close: bool,
}

/// Run a discretionary access check and audit its outcome in one step.
///
/// This is the path for servers that hold no object manager handle: the
/// audit cannot be deferred, so it is emitted here, and the caller is
/// told whether to audit the close. The caller needs SeAuditPrivilege on
/// its primary token; with `AUDIT_ALLOW_NO_PRIVILEGE` an unprivileged
/// caller still gets the access decision, just without the audit.
#[allow(clippy::too_many_arguments)]
pub fn se_access_check_and_audit_alarm(
    state: &AuditingState,
    sink: &dyn AuditSink,
    checker: &dyn AccessCheck,
    subject: &SecuritySubjectContext,
    security_descriptor: &SecurityDescriptor,
    object_type_name: &str,
    object_name: Option<&str>,
    desired_access: u32,
    generic_mapping: GenericMapping,
    object_type_list: &[ObjectTypeEntry],
    principal_self: Option<Sid>,
    flags: u32,
) -> SeResult<AuditedCheckOutcome> {
    let mut avoid_audit = false;
    if let Err(err) = se_check_audit_privilege(state, sink, subject) {
        if flags & audit_flags::AUDIT_ALLOW_NO_PRIVILEGE != 0 {
            avoid_audit = true;
        } else {
            return Err(err);
        }
    }

    // Callers of this interface map generic rights themselves; the
    // mapping is still needed for the audit masks.
    if desired_access & generic_rights::GENERIC_RIGHTS_MASK != 0 {
        return Err(SeError::GenericNotMapped);
    }

    if !security_descriptor.is_valid() || !security_descriptor.has_owner_and_group() {
        return Err(SeError::InvalidSecurityDescriptor);
    }

    let mut captured_list = se_capture_object_type_list(object_type_list)?;

    if subject.client_token.is_none() {
        return Err(SeError::NoImpersonationToken);
    }
    let mut access_state =
        AccessState::new(subject.clone(), desired_access, generic_mapping)?;
    access_state.object_type_name = Some(object_type_name.to_string());
    access_state.object_name = object_name.map(String::from);

    let token = Arc::clone(access_state.effective_token());

    // Privileged rights first. A missing SeSecurityPrivilege refuses the
    // whole request, but as an audited denial rather than an error.
    let mut access_granted = true;
    if se_privilege_policy_check(&mut access_state).is_err() {
        access_granted = false;
    }

    if access_granted {
        let body = token.read();

        // The owner can always read and rewrite their own protection.
        let owner_rights = standard_rights::READ_CONTROL | standard_rights::WRITE_DAC;
        if access_state.remaining_desired_access != 0
            && access_state.remaining_desired_access & !owner_rights == 0
        {
            if let Some(owner) = security_descriptor.owner.as_ref() {
                if body.is_owner(owner) {
                    access_state.previously_granted_access |=
                        access_state.remaining_desired_access;
                    access_state.remaining_desired_access = 0;
                }
            }
        }
        drop(body);

        if access_state.remaining_desired_access != 0 {
            let request = AccessCheckRequest {
                security_descriptor,
                token: &token,
                desired_access: access_state.remaining_desired_access,
                previously_granted_access: access_state.previously_granted_access,
                generic_mapping,
                principal_self,
            };
            let result = checker.check_access(&request);
            access_granted = result.access_granted;
            if access_granted {
                access_state.previously_granted_access |= result.granted_access;
                access_state.remaining_desired_access = 0;
            }
            if let Some(privileges) = result.privileges_used {
                access_state.append_privileges(&privileges);
            }
        }
    }
    access_state.security_evaluated = true;

    let granted_access = if access_granted {
        access_state.previously_granted_access
    } else {
        0
    };

    // Audit over everything that was at stake, not just what survived.
    let audited_access = access_state.original_desired_access | granted_access;
    let mut generate_on_close = false;

    if avoid_audit {
        return Ok(AuditedCheckOutcome {
            access_granted,
            granted_access,
            generate_on_close,
        });
    }

    if let Some(sacl) = security_descriptor.sacl() {
        let body = token.read();
        let result = se_examine_sacl_ex(
            sacl,
            &body,
            audited_access,
            &mut captured_list,
            false,
            &[access_granted],
            &[granted_access],
            principal_self.as_ref(),
        );
        drop(body);

        let wants_audit = (access_granted && result.generate_success_audit)
            || (!access_granted && result.generate_failure_audit);

        if wants_audit
            && se_audit_this_event(
                state,
                AuditCategory::ObjectAccess,
                access_granted,
                token_override(&token, AuditCategory::ObjectAccess),
            )
        {
            let delivered = sink
                .record(open_record(
                    &access_state,
                    None,
                    &captured_list,
                    access_granted,
                    false,
                ))
                .is_ok();
            generate_on_close = access_granted && delivered;
        }
    }

    Ok(AuditedCheckOutcome {
        access_granted,
        granted_access,
        generate_on_close,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::tests::{test_subject, test_user};
    use crate::access::AccessCheckResult;
    use crate::acl::{ace_flags, object_audit_flags, Ace, Acl, Guid};
    use crate::audit::AuditQueue;
    use crate::privilege::{privilege_attributes, se_allocate_luid, LuidAndAttributes};
    use crate::sid::{SID_BUILTIN_USERS, SID_WORLD};
    use crate::token::{
        LogonSession, SecurityImpersonationLevel, TokenAuditData, TokenType,
    };

    fn audit_all_object_access() -> AuditingState {
        let mut state = AuditingState::new();
        state.set_policy(AuditCategory::ObjectAccess, true, true);
        state.set_policy(AuditCategory::PrivilegeUse, true, true);
        state
    }

    fn descriptor_with_audit_sacl(mask: u32, flags: u8) -> SecurityDescriptor {
        let mut sd = SecurityDescriptor::new();
        sd.set_owner(test_user());
        sd.set_group(SID_BUILTIN_USERS);
        let mut sacl = Acl::new();
        sacl.add_ace(Ace::system_audit(test_user(), mask, flags));
        sd.set_sacl(sacl);
        sd
    }

    fn open_state(desired: u32) -> AccessState {
        AccessState::new(test_subject(), desired, GenericMapping::default()).unwrap()
    }

    /// Grants everything it is asked for.
    struct GrantAll;
    impl AccessCheck for GrantAll {
        fn check_access(&self, request: &AccessCheckRequest<'_>) -> AccessCheckResult {
            AccessCheckResult {
                access_granted: true,
                granted_access: request.desired_access | request.previously_granted_access,
                privileges_used: None,
            }
        }
    }

    /// Refuses everything.
    struct DenyAll;
    impl AccessCheck for DenyAll {
        fn check_access(&self, _request: &AccessCheckRequest<'_>) -> AccessCheckResult {
            AccessCheckResult::default()
        }
    }

    #[test]
    fn test_granted_open_defers_until_handle_creation() {
        let state = audit_all_object_access();
        let queue = AuditQueue::new();
        let sd = descriptor_with_audit_sacl(0x1, ace_flags::SUCCESSFUL_ACCESS_ACE_FLAG);
        let mut access_state = open_state(0x1);

        se_open_object_audit_alarm(
            &state,
            &queue,
            &mut access_state,
            "File",
            Some("\\secrets.txt"),
            Some(&sd),
            true,
        );

        // Nothing emitted yet; the audit is armed.
        assert!(queue.is_empty());
        assert!(access_state.generate_audit);
        assert_eq!(access_state.maximum_audit_mask, 0x1);

        se_audit_handle_creation(&queue, &mut access_state, 42);
        assert!(access_state.generate_on_close);
        assert_eq!(queue.len(), 1);
        match queue.pop().unwrap() {
            AuditRecord::ObjectOpen {
                handle_id,
                object_name,
                success,
                ..
            } => {
                assert_eq!(handle_id, Some(42));
                assert_eq!(object_name.as_deref(), Some("\\secrets.txt"));
                assert!(success);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_refused_open_audits_immediately() {
        let state = audit_all_object_access();
        let queue = AuditQueue::new();
        let sd = descriptor_with_audit_sacl(0x1, ace_flags::FAILED_ACCESS_ACE_FLAG);
        let mut access_state = open_state(0x1);

        se_open_object_audit_alarm(
            &state,
            &queue,
            &mut access_state,
            "File",
            None,
            Some(&sd),
            false,
        );

        assert!(!access_state.generate_audit);
        assert_eq!(queue.len(), 1);
        match queue.pop().unwrap() {
            AuditRecord::ObjectOpen {
                handle_id, success, ..
            } => {
                assert_eq!(handle_id, None);
                assert!(!success);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_unaudited_open_is_silent_end_to_end() {
        let state = audit_all_object_access();
        let queue = AuditQueue::new();
        // SACL audits a right nobody asked for.
        let sd = descriptor_with_audit_sacl(0x8, ace_flags::SUCCESSFUL_ACCESS_ACE_FLAG);
        let mut access_state = open_state(0x1);

        se_open_object_audit_alarm(
            &state,
            &queue,
            &mut access_state,
            "File",
            None,
            Some(&sd),
            true,
        );
        se_audit_handle_creation(&queue, &mut access_state, 7);
        let subject = access_state.subject.clone();
        se_close_object_audit_alarm(&state, &queue, &subject, 7, access_state.generate_on_close);

        assert!(queue.is_empty());
        assert!(!access_state.generate_on_close);
    }

    #[test]
    fn test_token_audit_data_overrides_sacl() {
        let state = audit_all_object_access();
        let queue = AuditQueue::new();

        let session = LogonSession::new(se_allocate_luid());
        let mut token = Token::new(
            test_user(),
            session,
            TokenType::Primary,
            SecurityImpersonationLevel::Impersonation,
        );
        token.audit_data = Some(TokenAuditData {
            grant_mask: 0x1,
            deny_mask: 0,
        });
        let subject = SecuritySubjectContext::new(Arc::new(token));
        let mut access_state =
            AccessState::new(subject, 0x1, GenericMapping::default()).unwrap();

        // No security descriptor at all; the token's own mask asks for
        // the audit.
        se_open_object_audit_alarm(&state, &queue, &mut access_state, "Key", None, None, true);
        assert!(access_state.generate_audit);
    }

    #[test]
    fn test_privilege_use_stands_in_for_object_audit() {
        let state = audit_all_object_access();
        let queue = AuditQueue::new();
        let mut access_state = open_state(0x1);

        // SeTcbPrivilege is not on the noise filter list.
        let mut used = PrivilegeSet::new();
        used.push(LuidAndAttributes::with_luid(
            privilege_luids::SE_TCB_LUID,
            privilege_attributes::SE_PRIVILEGE_USED_FOR_ACCESS,
        ));
        access_state.append_privileges(&used);

        se_open_object_audit_alarm(&state, &queue, &mut access_state, "File", None, None, true);
        assert!(access_state.generate_audit);
        assert!(access_state.audit_privileges);

        se_audit_handle_creation(&queue, &mut access_state, 9);
        // The stand-in is emitted but never arms close auditing.
        assert!(!access_state.generate_on_close);
        assert!(matches!(
            queue.pop(),
            Some(AuditRecord::PrivilegeObjectUse { success: true, .. })
        ));
    }

    #[test]
    fn test_noise_privileges_do_not_stand_in() {
        let state = audit_all_object_access();
        let queue = AuditQueue::new();
        let mut access_state = open_state(0x1);

        let mut used = PrivilegeSet::new();
        used.push(LuidAndAttributes::with_luid(
            privilege_luids::SE_CHANGE_NOTIFY_LUID,
            0,
        ));
        access_state.append_privileges(&used);

        se_open_object_audit_alarm(&state, &queue, &mut access_state, "File", None, None, true);
        assert!(!access_state.generate_audit);
    }

    #[test]
    fn test_close_and_delete_alarms() {
        let state = audit_all_object_access();
        let queue = AuditQueue::new();
        let subject = test_subject();

        // Not armed: silent.
        se_close_object_audit_alarm(&state, &queue, &subject, 3, false);
        assert!(queue.is_empty());

        se_close_object_audit_alarm(&state, &queue, &subject, 3, true);
        se_delete_object_audit_alarm(&state, &queue, &subject, 3, true);
        assert!(matches!(queue.pop(), Some(AuditRecord::HandleClose { handle_id: 3, .. })));
        assert!(matches!(queue.pop(), Some(AuditRecord::ObjectDelete { handle_id: 3, .. })));

        // Close suppression switch.
        let mut muted = state;
        muted.do_not_audit_close_object_events = true;
        se_close_object_audit_alarm(&muted, &queue, &subject, 3, true);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_privileged_service_alarm_account_gates() {
        let state = audit_all_object_access();
        let queue = AuditQueue::new();
        let mut privileges = PrivilegeSet::single(privilege_luids::SE_TCB_LUID, 0);
        privileges.control = 0;

        // Local system is never audited here.
        let session = LogonSession::new(se_allocate_luid());
        let system = SecuritySubjectContext::new(Arc::new(Token::new(
            SID_LOCAL_SYSTEM,
            session,
            TokenType::Primary,
            SecurityImpersonationLevel::Impersonation,
        )));
        se_privileged_service_audit_alarm(&state, &queue, None, &system, &privileges, true);
        assert!(queue.is_empty());

        // A service account is audited for off-filter privileges...
        let session = LogonSession::new(se_allocate_luid());
        let service = SecuritySubjectContext::new(Arc::new(Token::new(
            SID_LOCAL_SERVICE,
            session,
            TokenType::Primary,
            SecurityImpersonationLevel::Impersonation,
        )));
        se_privileged_service_audit_alarm(&state, &queue, None, &service, &privileges, true);
        assert_eq!(queue.len(), 1);
        let _ = queue.pop();

        // ...but not for the filtered ones.
        let systemtime = PrivilegeSet::single(privilege_luids::SE_SYSTEMTIME_LUID, 0);
        se_privileged_service_audit_alarm(&state, &queue, None, &service, &systemtime, true);
        assert!(queue.is_empty());

        // A normal user is audited either way.
        se_privileged_service_audit_alarm(
            &state,
            &queue,
            None,
            &test_subject(),
            &systemtime,
            true,
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_check_audit_privilege() {
        let state = audit_all_object_access();
        let queue = AuditQueue::new();

        let subject = test_subject();
        assert_eq!(
            se_check_audit_privilege(&state, &queue, &subject).err(),
            Some(SeError::PrivilegeNotHeld)
        );
        // The failed check is itself audited.
        assert!(matches!(
            queue.pop(),
            Some(AuditRecord::PrivilegedServiceUse { success: false, .. })
        ));

        subject.primary_token.add_privilege(
            privilege_luids::SE_AUDIT_LUID,
            privilege_attributes::SE_PRIVILEGE_ENABLED,
        );
        assert!(se_check_audit_privilege(&state, &queue, &subject).is_ok());
    }

    /// Only object-access auditing on, so the SeAuditPrivilege check
    /// made on entry stays out of the queue.
    fn object_access_only() -> AuditingState {
        let mut state = AuditingState::new();
        state.set_policy(AuditCategory::ObjectAccess, true, true);
        state
    }

    fn impersonating_subject() -> SecuritySubjectContext {
        let base = test_subject();
        base.primary_token.add_privilege(
            privilege_luids::SE_AUDIT_LUID,
            privilege_attributes::SE_PRIVILEGE_ENABLED,
        );
        let client = Arc::clone(&base.primary_token);
        SecuritySubjectContext::with_client(
            base.primary_token,
            client,
            SecurityImpersonationLevel::Impersonation,
        )
    }

    /// Like [`impersonating_subject`] but without SeAuditPrivilege.
    fn unprivileged_subject() -> SecuritySubjectContext {
        let base = test_subject();
        let client = Arc::clone(&base.primary_token);
        SecuritySubjectContext::with_client(
            base.primary_token,
            client,
            SecurityImpersonationLevel::Impersonation,
        )
    }

    #[test]
    fn test_audited_check_grant_with_audit() {
        let state = object_access_only();
        let queue = AuditQueue::new();
        let sd = descriptor_with_audit_sacl(
            0x1,
            ace_flags::SUCCESSFUL_ACCESS_ACE_FLAG | ace_flags::FAILED_ACCESS_ACE_FLAG,
        );

        let subject = impersonating_subject();
        let outcome = se_access_check_and_audit_alarm(
            &state,
            &queue,
            &GrantAll,
            &subject,
            &sd,
            "File",
            Some("\\audited.txt"),
            0x1,
            GenericMapping::default(),
            &[],
            None,
            0,
        )
        .unwrap();

        assert!(outcome.access_granted);
        assert_eq!(outcome.granted_access, 0x1);
        assert!(outcome.generate_on_close);
        assert!(matches!(
            queue.pop(),
            Some(AuditRecord::ObjectOpen { success: true, handle_id: None, .. })
        ));
    }

    #[test]
    fn test_audited_check_denial() {
        let state = object_access_only();
        let queue = AuditQueue::new();
        let sd = descriptor_with_audit_sacl(0x1, ace_flags::FAILED_ACCESS_ACE_FLAG);

        let subject = impersonating_subject();
        let outcome = se_access_check_and_audit_alarm(
            &state,
            &queue,
            &DenyAll,
            &subject,
            &sd,
            "File",
            None,
            0x1,
            GenericMapping::default(),
            &[],
            None,
            0,
        )
        .unwrap();

        assert!(!outcome.access_granted);
        assert_eq!(outcome.granted_access, 0);
        assert!(!outcome.generate_on_close);
        assert!(matches!(
            queue.pop(),
            Some(AuditRecord::ObjectOpen { success: false, .. })
        ));
    }

    #[test]
    fn test_audited_check_attaches_object_type_marks() {
        let state = object_access_only();
        let queue = AuditQueue::new();

        let mut guid_bytes = [0u8; 16];
        guid_bytes[0] = 5;
        let property_set = Guid::from_bytes(guid_bytes);
        guid_bytes[0] = 6;
        let property = Guid::from_bytes(guid_bytes);

        let mut sd = SecurityDescriptor::new();
        sd.set_owner(SID_BUILTIN_USERS);
        sd.set_group(SID_BUILTIN_USERS);
        let mut sacl = Acl::new();
        sacl.add_ace(Ace::system_audit_object(
            test_user(),
            0x1,
            ace_flags::SUCCESSFUL_ACCESS_ACE_FLAG,
            Some(property_set),
        ));
        sd.set_sacl(sacl);

        let list = [
            ObjectTypeEntry::new(property_set, 0),
            ObjectTypeEntry::new(property, 1),
        ];

        let subject = impersonating_subject();
        let outcome = se_access_check_and_audit_alarm(
            &state,
            &queue,
            &GrantAll,
            &subject,
            &sd,
            "DS Object",
            None,
            0x1,
            GenericMapping::default(),
            &list,
            None,
            0,
        )
        .unwrap();

        assert!(outcome.access_granted);
        // The record names the marked entry and only that one.
        match queue.pop().unwrap() {
            AuditRecord::ObjectOpen {
                object_types,
                success: true,
                ..
            } => {
                assert_eq!(object_types.len(), 1);
                assert_eq!(object_types[0].object_type, property_set);
                assert_eq!(
                    object_types[0].flags,
                    object_audit_flags::OBJECT_SUCCESS_AUDIT
                );
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_audited_check_owner_fast_path() {
        let state = object_access_only();
        let queue = AuditQueue::new();
        // Owner matches the subject's user; no SACL, so no audit.
        let mut sd = SecurityDescriptor::new();
        sd.set_owner(test_user());
        sd.set_group(SID_WORLD);

        let subject = impersonating_subject();
        // DenyAll never runs: the owner fast path grants the request.
        let outcome = se_access_check_and_audit_alarm(
            &state,
            &queue,
            &DenyAll,
            &subject,
            &sd,
            "File",
            None,
            standard_rights::READ_CONTROL | standard_rights::WRITE_DAC,
            GenericMapping::default(),
            &[],
            None,
            0,
        )
        .unwrap();

        assert!(outcome.access_granted);
        assert_eq!(
            outcome.granted_access,
            standard_rights::READ_CONTROL | standard_rights::WRITE_DAC
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_audited_check_validation_errors() {
        let state = object_access_only();
        let queue = AuditQueue::new();
        let sd = descriptor_with_audit_sacl(0x1, ace_flags::FAILED_ACCESS_ACE_FLAG);
        let subject = impersonating_subject();

        // Unmapped generic bits are refused.
        assert_eq!(
            se_access_check_and_audit_alarm(
                &state,
                &queue,
                &GrantAll,
                &subject,
                &sd,
                "File",
                None,
                generic_rights::GENERIC_READ,
                GenericMapping::default(),
                &[],
                None,
                0,
            )
            .err(),
            Some(SeError::GenericNotMapped)
        );

        // A descriptor without owner and group cannot be audited against.
        let bare = SecurityDescriptor::new();
        assert_eq!(
            se_access_check_and_audit_alarm(
                &state,
                &queue,
                &GrantAll,
                &subject,
                &bare,
                "File",
                None,
                0x1,
                GenericMapping::default(),
                &[],
                None,
                0,
            )
            .err(),
            Some(SeError::InvalidSecurityDescriptor)
        );

        // Without a client token there is nobody to check on behalf of.
        let no_client = test_subject();
        no_client.primary_token.add_privilege(
            privilege_luids::SE_AUDIT_LUID,
            privilege_attributes::SE_PRIVILEGE_ENABLED,
        );
        assert_eq!(
            se_access_check_and_audit_alarm(
                &state,
                &queue,
                &GrantAll,
                &no_client,
                &sd,
                "File",
                None,
                0x1,
                GenericMapping::default(),
                &[],
                None,
                0,
            )
            .err(),
            Some(SeError::NoImpersonationToken)
        );

        // Without SeAuditPrivilege the caller may not use this interface.
        assert_eq!(
            se_access_check_and_audit_alarm(
                &state,
                &queue,
                &GrantAll,
                &unprivileged_subject(),
                &sd,
                "File",
                None,
                0x1,
                GenericMapping::default(),
                &[],
                None,
                0,
            )
            .err(),
            Some(SeError::PrivilegeNotHeld)
        );
    }

    #[test]
    fn test_audited_check_allow_no_privilege_suppresses_audit() {
        let state = object_access_only();
        let queue = AuditQueue::new();
        let sd = descriptor_with_audit_sacl(0x1, ace_flags::FAILED_ACCESS_ACE_FLAG);

        // No SeAuditPrivilege: the decision is still made, the denial
        // audit the SACL asks for is not.
        let outcome = se_access_check_and_audit_alarm(
            &state,
            &queue,
            &DenyAll,
            &unprivileged_subject(),
            &sd,
            "File",
            None,
            0x1,
            GenericMapping::default(),
            &[],
            None,
            audit_flags::AUDIT_ALLOW_NO_PRIVILEGE,
        )
        .unwrap();

        assert!(!outcome.access_granted);
        assert!(!outcome.generate_on_close);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_audited_check_privilege_policy_denial_is_audited() {
        let state = object_access_only();
        let queue = AuditQueue::new();
        let sd = descriptor_with_audit_sacl(
            crate::acl::special_rights::ACCESS_SYSTEM_SECURITY,
            ace_flags::FAILED_ACCESS_ACE_FLAG,
        );

        // The subject lacks SeSecurityPrivilege.
        let subject = impersonating_subject();
        let outcome = se_access_check_and_audit_alarm(
            &state,
            &queue,
            &GrantAll,
            &subject,
            &sd,
            "File",
            None,
            crate::acl::special_rights::ACCESS_SYSTEM_SECURITY,
            GenericMapping::default(),
            &[],
            None,
            0,
        )
        .unwrap();

        // Denied as an outcome, not an error, and the denial is audited.
        assert!(!outcome.access_granted);
        assert_eq!(queue.len(), 1);
        assert!(matches!(
            queue.pop(),
            Some(AuditRecord::ObjectOpen { success: false, .. })
        ));
    }
}
