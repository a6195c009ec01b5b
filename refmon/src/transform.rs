//! Token derivation: duplication, effective-only reduction, and
//! restricted filtering.
//!
//! All three operations produce a new token and leave the source token
//! untouched. The derived token gets fresh token and modified IDs and
//! shares the source's logon session handle, so session lifetime follows
//! the last token referencing it.
//!
//! A filtered token can only ever see less than its source: disabled
//! groups become deny-only, deleted privileges are gone for good, and a
//! restricted source only passes on restricted SIDs it already carries.

use crate::error::{SeError, SeResult};
use crate::privilege::{privilege_luids, Luid};
use crate::sid::{se_sid_in_sid_and_attributes, sid_attributes, Sid, SidAndAttributes};
use crate::token::{
    SecurityImpersonationLevel, Token, TokenBody, TokenFlags, TokenType,
};
use alloc::sync::Arc;
use alloc::vec::Vec;
use log::debug;

/// Flags for [`se_filter_token`].
pub mod filter_flags {
    /// Delete every privilege except SeChangeNotifyPrivilege.
    pub const DISABLE_MAX_PRIVILEGE: u32 = 0x1;
    /// Mark the new token sandbox-inert (skips restriction checks made
    /// on behalf of software restriction policies).
    pub const SANDBOX_INERT: u32 = 0x2;
}

/// Attributes forced onto every restricted SID of a filtered token.
const RESTRICTED_SID_ATTRIBUTES: u32 = sid_attributes::SE_GROUP_ENABLED
    | sid_attributes::SE_GROUP_ENABLED_BY_DEFAULT
    | sid_attributes::SE_GROUP_MANDATORY;

/// Duplicate a token.
///
/// An impersonation source cannot be duplicated at a level above its own,
/// and a primary token can only be made from an impersonation token at
/// Impersonation level or better.
pub fn se_duplicate_token(
    source: &Token,
    token_type: TokenType,
    impersonation_level: SecurityImpersonationLevel,
    effective_only: bool,
) -> SeResult<Token> {
    if source.token_type == TokenType::Impersonation {
        if token_type == TokenType::Impersonation
            && impersonation_level > source.impersonation_level
        {
            return Err(SeError::BadImpersonationLevel);
        }
        if token_type == TokenType::Primary
            && source.impersonation_level < SecurityImpersonationLevel::Impersonation
        {
            return Err(SeError::BadImpersonationLevel);
        }
    }

    let mut body = source.read().clone();
    if effective_only {
        se_make_token_effective_only(&mut body);
    }
    body.modified_id = crate::privilege::se_allocate_luid();

    let mut token = Token::from_body(
        body,
        Arc::clone(&source.logon_session),
        token_type,
        impersonation_level,
    );
    token.parent_token_id = source.parent_token_id;
    token.expiration_time = source.expiration_time;
    token.token_source = source.token_source;
    token.session_id = source.session_id;
    token.audit_data = source.audit_data;

    debug!(
        "token {:?} duplicated as {:?} (type {:?}, effective_only {})",
        source.token_id, token.token_id, token_type, effective_only
    );

    Ok(token)
}

/// Reduce a token body to its effective parts: disabled privileges and
/// disabled groups are removed instead of merely staying off.
///
/// The user entry is never removed. Deny-only groups stay because they
/// still matter to denial evaluation. If the default owner was a removed
/// group, ownership falls back to the user.
pub fn se_make_token_effective_only(body: &mut TokenBody) {
    body.privileges.retain(|p| p.is_enabled());

    let owner_sid = *body.default_owner();
    let mut admins_dropped = false;

    let user = body.user_and_groups[0];
    body.user_and_groups.retain(|entry| {
        if entry.sid.equal(&user.sid) && entry.attributes == user.attributes {
            return true;
        }
        let keep = entry.attributes & sid_attributes::SE_GROUP_ENABLED != 0
            || entry.attributes & sid_attributes::SE_GROUP_USE_FOR_DENY_ONLY != 0;
        if !keep && entry.sid.equal(&crate::sid::SID_BUILTIN_ADMINISTRATORS) {
            admins_dropped = true;
        }
        keep
    });

    body.default_owner_index = body
        .user_and_groups
        .iter()
        .position(|entry| entry.sid.equal(&owner_sid))
        .unwrap_or(0);

    if admins_dropped {
        body.flags &= !TokenFlags::HAS_ADMIN_GROUP;
    }

    // Flags for dropped disabled privileges no longer hold.
    if !body
        .privileges
        .iter()
        .any(|p| p.luid == privilege_luids::SE_CHANGE_NOTIFY_LUID)
    {
        body.flags &= !TokenFlags::HAS_TRAVERSE_PRIVILEGE;
    }
    if !body
        .privileges
        .iter()
        .any(|p| p.luid == privilege_luids::SE_IMPERSONATE_LUID)
    {
        body.flags &= !TokenFlags::HAS_IMPERSONATE_PRIVILEGE;
    }
    if !body
        .privileges
        .iter()
        .any(|p| p.luid == privilege_luids::SE_BACKUP_LUID)
    {
        body.flags &= !TokenFlags::HAS_BACKUP_PRIVILEGE;
    }
    if !body
        .privileges
        .iter()
        .any(|p| p.luid == privilege_luids::SE_RESTORE_LUID)
    {
        body.flags &= !TokenFlags::HAS_RESTORE_PRIVILEGE;
    }
}

/// Create a restricted token from `source`.
///
/// - `sids_to_disable`: user/group entries matching these SIDs are
///   converted to use-for-deny-only.
/// - `privileges_to_delete`: these privileges are removed outright. With
///   `DISABLE_MAX_PRIVILEGE` the list is ignored and everything except
///   SeChangeNotifyPrivilege goes.
/// - `restricted_sids`: the restricting SID list of the new token. Input
///   entries must carry no attributes. If the source is itself
///   restricted, the new list is the intersection with the source's list;
///   an empty intersection (including an empty request) would yield a
///   token broader than its parent, which is refused.
pub fn se_filter_token(
    source: &Token,
    flags: u32,
    sids_to_disable: &[Sid],
    privileges_to_delete: &[Luid],
    restricted_sids: &[SidAndAttributes],
) -> SeResult<Token> {
    if restricted_sids.iter().any(|entry| entry.attributes != 0) {
        return Err(SeError::InvalidParameter);
    }

    let source_body = source.read();
    let mut body = source_body.clone();

    let new_restricted: Vec<SidAndAttributes> = if source_body
        .flags
        .contains(TokenFlags::IS_RESTRICTED)
    {
        let intersection: Vec<SidAndAttributes> = restricted_sids
            .iter()
            .filter(|entry| {
                se_sid_in_sid_and_attributes(&source_body.restricted_sids, None, &entry.sid)
            })
            .map(|entry| SidAndAttributes::with_sid(entry.sid, RESTRICTED_SID_ATTRIBUTES))
            .collect();

        // An empty intersection leaves no restricting SIDs at all, which
        // is a broader token than the restricted source.
        if intersection.is_empty() {
            return Err(SeError::InvalidRestriction);
        }
        intersection
    } else {
        restricted_sids
            .iter()
            .map(|entry| SidAndAttributes::with_sid(entry.sid, RESTRICTED_SID_ATTRIBUTES))
            .collect()
    };
    drop(source_body);

    for (index, entry) in body.user_and_groups.iter_mut().enumerate() {
        if sids_to_disable.iter().any(|sid| sid.equal(&entry.sid)) {
            entry.attributes &= !(sid_attributes::SE_GROUP_ENABLED
                | sid_attributes::SE_GROUP_ENABLED_BY_DEFAULT);
            entry.attributes |= sid_attributes::SE_GROUP_USE_FOR_DENY_ONLY;
            if entry.sid.equal(&crate::sid::SID_BUILTIN_ADMINISTRATORS) {
                body.flags &= !TokenFlags::HAS_ADMIN_GROUP;
            }
            // A deny-only group cannot stay the default owner; ownership
            // falls back to the user.
            if index == body.default_owner_index {
                body.default_owner_index = 0;
            }
        }
    }

    if flags & filter_flags::DISABLE_MAX_PRIVILEGE != 0 {
        body.privileges
            .retain(|p| p.luid == privilege_luids::SE_CHANGE_NOTIFY_LUID);
        body.flags &= !(TokenFlags::HAS_IMPERSONATE_PRIVILEGE
            | TokenFlags::HAS_BACKUP_PRIVILEGE
            | TokenFlags::HAS_RESTORE_PRIVILEGE);
    } else {
        for luid in privileges_to_delete {
            body.privileges.retain(|p| p.luid != *luid);
            if *luid == privilege_luids::SE_CHANGE_NOTIFY_LUID {
                body.flags &= !TokenFlags::HAS_TRAVERSE_PRIVILEGE;
            }
            if *luid == privilege_luids::SE_IMPERSONATE_LUID {
                body.flags &= !TokenFlags::HAS_IMPERSONATE_PRIVILEGE;
            }
            if *luid == privilege_luids::SE_BACKUP_LUID {
                body.flags &= !TokenFlags::HAS_BACKUP_PRIVILEGE;
            }
            if *luid == privilege_luids::SE_RESTORE_LUID {
                body.flags &= !TokenFlags::HAS_RESTORE_PRIVILEGE;
            }
        }
    }

    body.restricted_sids = new_restricted;
    if body.restricted_sids.is_empty() {
        body.flags &= !TokenFlags::IS_RESTRICTED;
    } else {
        body.flags |= TokenFlags::IS_RESTRICTED;
    }
    if flags & filter_flags::SANDBOX_INERT != 0 {
        body.flags |= TokenFlags::SANDBOX_INERT;
    }
    body.modified_id = crate::privilege::se_allocate_luid();

    let mut token = Token::from_body(
        body,
        Arc::clone(&source.logon_session),
        source.token_type,
        source.impersonation_level,
    );
    token.parent_token_id = source.token_id;
    token.expiration_time = source.expiration_time;
    token.token_source = source.token_source;
    token.session_id = source.session_id;
    token.audit_data = source.audit_data;

    debug!(
        "token {:?} filtered as {:?} (flags {:#x}, {} restricted SIDs)",
        source.token_id,
        token.token_id,
        flags,
        token.read().restricted_sids.len()
    );

    Ok(token)
}
