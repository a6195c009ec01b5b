//! SACL examination.
//!
//! Given the outcome of an access check, these routines walk the system
//! ACL and decide whether the outcome must be audited. The plain form
//! answers a single yes/no for the whole object; the extended form works
//! over an object type list, marks each entry that needs auditing, and
//! reports success and failure auditing separately.
//!
//! A request for MAXIMUM_ALLOWED is special: the caller could have asked
//! for anything, so an audit ACE matches on its flags alone without an
//! access-mask overlap.

use crate::acl::{
    ace_flags, object_audit_flags, se_object_in_type_list, Ace, AceType, Acl, ObjectTypeEntry,
    special_rights,
};
use crate::sid::{Sid, SID_ANONYMOUS_LOGON, SID_WORLD};
use crate::token::TokenBody;

/// Outcome of an extended SACL examination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaclAuditResult {
    pub generate_success_audit: bool,
    pub generate_failure_audit: bool,
}

/// Which audit flag a MAXIMUM_ALLOWED request arms for a given outcome.
fn maximum_allowed_flag(desired_access: u32, access_granted: bool) -> u8 {
    if desired_access & special_rights::MAXIMUM_ALLOWED != 0 {
        if access_granted {
            ace_flags::SUCCESSFUL_ACCESS_ACE_FLAG
        } else {
            ace_flags::FAILED_ACCESS_ACE_FLAG
        }
    } else {
        0
    }
}

/// The anonymous user gets World's audit ACEs as well, so auditing of
/// anonymous access cannot be dodged by ACLing only Everyone.
fn ace_sid_matches(token: &TokenBody, ace: &Ace, principal_self: Option<&Sid>, deny_ace: bool) -> bool {
    if token.sid_in_token(principal_self, &ace.sid, deny_ace) {
        return true;
    }
    token.user().sid.equal(&SID_ANONYMOUS_LOGON) && ace.sid.equal(&SID_WORLD)
}

/// Examine a SACL for a plain (non-object) access and decide whether the
/// outcome is audited.
pub fn se_examine_sacl(
    sacl: &Acl,
    token: &TokenBody,
    desired_access: u32,
    access_granted: bool,
) -> bool {
    let maximum_allowed = maximum_allowed_flag(desired_access, access_granted);

    for ace in &sacl.aces {
        if ace.ace_type != AceType::SystemAudit || ace.is_inherit_only() {
            continue;
        }
        if !ace_sid_matches(token, ace, None, false) {
            continue;
        }

        if ace.mask & desired_access != 0 {
            if access_granted && ace.audits_success() {
                return true;
            }
            if !access_granted && ace.audits_failure() {
                return true;
            }
        } else if maximum_allowed & ace.flags != 0 {
            return true;
        }
    }

    false
}

/// Examine a SACL against an object type list.
///
/// `access_status` and `granted_access` give the per-entry outcome when
/// `return_result_list` is set, otherwise a single outcome for the whole
/// list (index 0). Entries that need auditing get their audit flags set
/// in place; with per-entry results, children of an audited node whose
/// outcome differs from it are stamped too, so the emitted audit shows
/// where the subtree diverged.
pub fn se_examine_sacl_ex(
    sacl: &Acl,
    token: &TokenBody,
    desired_access: u32,
    object_type_list: &mut [ObjectTypeEntry],
    return_result_list: bool,
    access_status: &[bool],
    granted_access: &[u32],
    principal_self: Option<&Sid>,
) -> SaclAuditResult {
    let mut result = SaclAuditResult::default();

    let status_at = |i: usize| -> bool {
        let idx = if return_result_list { i } else { 0 };
        access_status.get(idx).copied().unwrap_or(false)
    };
    let granted_at = |i: usize| -> u32 {
        let idx = if return_result_list { i } else { 0 };
        granted_access.get(idx).copied().unwrap_or(0)
    };

    // With at most one entry the scan can stop as soon as both audit
    // kinds are armed; a longer list must be walked fully so every entry
    // gets its marks.
    let may_exit_early = object_type_list.len() <= 1;

    for ace in &sacl.aces {
        if may_exit_early && result.generate_success_audit && result.generate_failure_audit {
            break;
        }
        if ace.is_inherit_only() {
            continue;
        }

        let deny_ace = ace.audits_failure();

        match ace.ace_type {
            AceType::SystemAudit => {
                if !ace_sid_matches(token, ace, principal_self, deny_ace) {
                    continue;
                }
                if object_type_list.is_empty() {
                    examine_flat(
                        ace,
                        desired_access,
                        status_at(0),
                        granted_at(0),
                        &mut result,
                    );
                } else {
                    for index in 0..object_type_list.len() {
                        set_audit_info_for_object_type(
                            ace,
                            desired_access,
                            object_type_list,
                            index,
                            return_result_list,
                            &status_at,
                            &granted_at,
                            &mut result,
                        );
                    }
                }
            }
            AceType::SystemAuditObject => {
                if !ace_sid_matches(token, ace, principal_self, deny_ace) {
                    continue;
                }
                if object_type_list.is_empty() {
                    examine_flat(
                        ace,
                        desired_access,
                        status_at(0),
                        granted_at(0),
                        &mut result,
                    );
                    continue;
                }
                match ace.object_type {
                    // A GUID-less object ACE applies everywhere, like a
                    // plain audit ACE.
                    None => {
                        for index in 0..object_type_list.len() {
                            set_audit_info_for_object_type(
                                ace,
                                desired_access,
                                object_type_list,
                                index,
                                return_result_list,
                                &status_at,
                                &granted_at,
                                &mut result,
                            );
                        }
                    }
                    Some(guid) => {
                        if let Some(index) = se_object_in_type_list(&guid, object_type_list) {
                            set_audit_info_for_object_type(
                                ace,
                                desired_access,
                                object_type_list,
                                index,
                                return_result_list,
                                &status_at,
                                &granted_at,
                                &mut result,
                            );
                        }
                    }
                }
            }
            _ => {}
        }
    }

    result
}

/// Plain-ACE evaluation when there is no object type list to mark.
fn examine_flat(
    ace: &Ace,
    desired_access: u32,
    access_granted: bool,
    granted_access: u32,
    result: &mut SaclAuditResult,
) {
    let maximum_allowed = maximum_allowed_flag(desired_access, access_granted);

    if ace.audits_success()
        && (ace.mask & granted_access != 0
            || maximum_allowed == ace_flags::SUCCESSFUL_ACCESS_ACE_FLAG)
    {
        result.generate_success_audit = true;
    }
    if ace.audits_failure()
        && (ace.mask & desired_access != 0
            || maximum_allowed == ace_flags::FAILED_ACCESS_ACE_FLAG)
    {
        result.generate_failure_audit = true;
    }
}

/// Apply one audit ACE to one object type list entry.
#[allow(clippy::too_many_arguments)]
fn set_audit_info_for_object_type(
    ace: &Ace,
    desired_access: u32,
    object_type_list: &mut [ObjectTypeEntry],
    index: usize,
    return_result_list: bool,
    status_at: &dyn Fn(usize) -> bool,
    granted_at: &dyn Fn(usize) -> u32,
    result: &mut SaclAuditResult,
) {
    let access_granted = status_at(index);
    let maximum_allowed = maximum_allowed_flag(desired_access, access_granted);

    if ace.mask & (desired_access | granted_at(index)) != 0 {
        if ace.audits_success() && access_granted {
            object_type_list[index].flags |= object_audit_flags::OBJECT_SUCCESS_AUDIT;
            result.generate_success_audit = true;
            if return_result_list {
                audit_type_list(object_type_list, index, true, status_at);
            }
        } else if ace.audits_failure() && !access_granted {
            object_type_list[index].flags |= object_audit_flags::OBJECT_FAILURE_AUDIT;
            result.generate_failure_audit = true;
            if return_result_list {
                audit_type_list(object_type_list, index, false, status_at);
            }
        }
    } else if maximum_allowed & ace.flags != 0 {
        // A MAXIMUM_ALLOWED match marks the matched entry only; there
        // are no per-entry statuses to diverge from.
        if maximum_allowed == ace_flags::SUCCESSFUL_ACCESS_ACE_FLAG {
            object_type_list[index].flags |= object_audit_flags::OBJECT_SUCCESS_AUDIT;
            result.generate_success_audit = true;
        } else {
            object_type_list[index].flags |= object_audit_flags::OBJECT_FAILURE_AUDIT;
            result.generate_failure_audit = true;
        }
    }
}

/// Stamp subtree entries whose outcome disagrees with the matched node.
///
/// Every entry after `start_index` with a deeper level belongs to the
/// subtree; the first entry at or above the start level ends it. A child
/// whose outcome agrees with the matched node is covered by the mark on
/// its ancestor; only the disagreeing ones get stamped, each with the
/// flag opposite to the matched outcome.
fn audit_type_list(
    object_type_list: &mut [ObjectTypeEntry],
    start_index: usize,
    was_success: bool,
    status_at: &dyn Fn(usize) -> bool,
) {
    let start_level = object_type_list[start_index].level;

    for index in start_index + 1..object_type_list.len() {
        if object_type_list[index].level <= start_level {
            break;
        }
        if status_at(index) != was_success {
            if was_success {
                object_type_list[index].flags |= object_audit_flags::OBJECT_FAILURE_AUDIT;
            } else {
                object_type_list[index].flags |= object_audit_flags::OBJECT_SUCCESS_AUDIT;
            }
        }
    }
}

/// Compute the rights whose exercise a token's audit ACEs care about:
/// the union of all success-audit masks matching the token, clipped to
/// the requested access. Stored at open time so the handle close can be
/// audited without the descriptor.
pub fn se_maximum_audit_mask(sacl: &Acl, desired_access: u32, token: &TokenBody) -> u32 {
    let mut mask = 0;

    for ace in &sacl.aces {
        if ace.ace_type != AceType::SystemAudit || ace.is_inherit_only() {
            continue;
        }
        if !ace.audits_success() {
            continue;
        }
        if ace_sid_matches(token, ace, None, false) {
            mask |= ace.mask & desired_access;
        }
    }

    mask
}
