//! Audit policy, audit records, and the audit queue.
//!
//! The decision core does not format or persist audit events; it decides
//! whether an event is auditable, builds a typed record, and hands it to
//! an [`AuditSink`]. [`AuditQueue`] is the default sink: a bounded queue
//! with water marks that counts discarded records and reports the count
//! once the backlog drains, so a flooded trail shows the gap instead of
//! silently losing it.
//!
//! Policy has two layers. [`AuditingState`] holds the global per-category
//! success/failure switches; tokens may carry per-category override masks
//! that include or exclude their events regardless of the global setting.

use crate::acl::ObjectTypeEntry;
use crate::privilege::{Luid, PrivilegeSet};
use crate::sid::Sid;
use crate::token::token_audit_mask;
use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;
use log::warn;
use spin::Mutex;

/// Number of audit categories.
pub const AUDIT_CATEGORY_COUNT: usize = 9;

/// Audit event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum AuditCategory {
    System = 0,
    Logon = 1,
    ObjectAccess = 2,
    PrivilegeUse = 3,
    DetailedTracking = 4,
    PolicyChange = 5,
    AccountManagement = 6,
    DirectoryServiceAccess = 7,
    AccountLogon = 8,
}

/// Audit event IDs, matching the classic security event log numbering.
pub mod audit_event_id {
    /// Internal audits lost to queue pressure
    pub const AUDITS_DISCARDED: u32 = 516;
    /// Object opened
    pub const OBJECT_OPEN: u32 = 560;
    /// Handle closed
    pub const HANDLE_CLOSED: u32 = 562;
    /// Object open for delete
    pub const OBJECT_OPEN_FOR_DELETE: u32 = 563;
    /// Object deleted
    pub const OBJECT_DELETED: u32 = 564;
    /// Privileged service called
    pub const PRIVILEGED_SERVICE: u32 = 577;
    /// Privileged object operation
    pub const PRIVILEGED_OBJECT: u32 = 578;
}

/// Per-category policy: audit successes, failures, both, or neither.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditPolicy {
    pub audit_success: bool,
    pub audit_failure: bool,
}

/// Global auditing configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditingState {
    /// Per-category success/failure switches
    pub policies: [AuditPolicy; AUDIT_CATEGORY_COUNT],
    /// Suppress handle-close events (they are high volume and rarely
    /// useful without the matching open)
    pub do_not_audit_close_object_events: bool,
    /// Audit privileged object access by backup/restore privilege
    pub full_privilege_auditing: bool,
    /// Audit backup/restore privilege use despite the noise filter
    pub verbose_privilege_auditing: bool,
}

impl AuditingState {
    pub const fn new() -> Self {
        Self {
            policies: [AuditPolicy {
                audit_success: false,
                audit_failure: false,
            }; AUDIT_CATEGORY_COUNT],
            do_not_audit_close_object_events: false,
            full_privilege_auditing: false,
            verbose_privilege_auditing: false,
        }
    }

    /// Enable success and/or failure auditing for a category.
    pub fn set_policy(&mut self, category: AuditCategory, success: bool, failure: bool) {
        self.policies[category as usize] = AuditPolicy {
            audit_success: success,
            audit_failure: failure,
        };
    }

    pub fn policy(&self, category: AuditCategory) -> AuditPolicy {
        self.policies[category as usize]
    }
}

/// Decide whether an event in `category` with the given outcome should be
/// audited.
///
/// The global policy answers first; a non-zero per-token override mask
/// can then force the event in or out. Include bits win over the global
/// "off", exclude bits win over the global "on", and include is tested
/// before exclude.
pub fn se_audit_this_event(
    state: &AuditingState,
    category: AuditCategory,
    granted: bool,
    override_mask: u32,
) -> bool {
    let policy = state.policy(category);
    let mut audit = (granted && policy.audit_success) || (!granted && policy.audit_failure);

    if override_mask != 0 {
        if (granted && override_mask & token_audit_mask::TOKEN_AUDIT_SUCCESS_INCLUDE != 0)
            || (!granted && override_mask & token_audit_mask::TOKEN_AUDIT_FAILURE_INCLUDE != 0)
        {
            audit = true;
        } else if (granted && override_mask & token_audit_mask::TOKEN_AUDIT_SUCCESS_EXCLUDE != 0)
            || (!granted && override_mask & token_audit_mask::TOKEN_AUDIT_FAILURE_EXCLUDE != 0)
        {
            audit = false;
        }
    }

    audit
}

/// A typed audit record.
///
/// Records carry the identity of the acting user (SID plus logon session
/// ID) and whatever names the caller supplied; name resolution and text
/// formatting belong to the consumer of the sink.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditRecord {
    /// An object was opened (or the open was refused)
    ObjectOpen {
        object_type_name: Option<String>,
        object_name: Option<String>,
        handle_id: Option<u64>,
        operation_id: Luid,
        user_sid: Sid,
        authentication_id: Luid,
        desired_access: u32,
        privileges: Option<PrivilegeSet>,
        /// Object type entries the SACL marked for auditing; empty when
        /// the object has no type tree
        object_types: Vec<ObjectTypeEntry>,
        success: bool,
    },
    /// An object was opened with DELETE access
    ObjectOpenForDelete {
        object_type_name: Option<String>,
        object_name: Option<String>,
        handle_id: Option<u64>,
        operation_id: Luid,
        user_sid: Sid,
        authentication_id: Luid,
        desired_access: u32,
        privileges: Option<PrivilegeSet>,
        object_types: Vec<ObjectTypeEntry>,
        success: bool,
    },
    /// A handle to an audited object was closed
    HandleClose {
        handle_id: u64,
        user_sid: Sid,
        authentication_id: Luid,
    },
    /// An audited object was deleted
    ObjectDelete {
        handle_id: u64,
        user_sid: Sid,
        authentication_id: Luid,
    },
    /// Privileges were used on an object
    PrivilegeObjectUse {
        handle_id: Option<u64>,
        user_sid: Sid,
        authentication_id: Luid,
        desired_access: u32,
        privileges: PrivilegeSet,
        success: bool,
    },
    /// Privileges were used for a system service
    PrivilegedServiceUse {
        service_name: Option<String>,
        user_sid: Sid,
        authentication_id: Luid,
        privileges: PrivilegeSet,
        success: bool,
    },
    /// Records were discarded under queue pressure
    AuditsDiscarded { count: usize },
}

impl AuditRecord {
    /// Event log ID for this record.
    pub fn event_id(&self) -> u32 {
        match self {
            AuditRecord::ObjectOpen { .. } => audit_event_id::OBJECT_OPEN,
            AuditRecord::ObjectOpenForDelete { .. } => audit_event_id::OBJECT_OPEN_FOR_DELETE,
            AuditRecord::HandleClose { .. } => audit_event_id::HANDLE_CLOSED,
            AuditRecord::ObjectDelete { .. } => audit_event_id::OBJECT_DELETED,
            AuditRecord::PrivilegeObjectUse { .. } => audit_event_id::PRIVILEGED_OBJECT,
            AuditRecord::PrivilegedServiceUse { .. } => audit_event_id::PRIVILEGED_SERVICE,
            AuditRecord::AuditsDiscarded { .. } => audit_event_id::AUDITS_DISCARDED,
        }
    }

    /// Category this record belongs to.
    pub fn category(&self) -> AuditCategory {
        match self {
            AuditRecord::ObjectOpen { .. }
            | AuditRecord::ObjectOpenForDelete { .. }
            | AuditRecord::HandleClose { .. }
            | AuditRecord::ObjectDelete { .. } => AuditCategory::ObjectAccess,
            AuditRecord::PrivilegeObjectUse { .. }
            | AuditRecord::PrivilegedServiceUse { .. } => AuditCategory::PrivilegeUse,
            AuditRecord::AuditsDiscarded { .. } => AuditCategory::System,
        }
    }

    /// Whether this record reports a successful outcome. Close, delete
    /// and discard records are always success-typed.
    pub fn is_success(&self) -> bool {
        match self {
            AuditRecord::ObjectOpen { success, .. }
            | AuditRecord::ObjectOpenForDelete { success, .. }
            | AuditRecord::PrivilegeObjectUse { success, .. }
            | AuditRecord::PrivilegedServiceUse { success, .. } => *success,
            AuditRecord::HandleClose { .. }
            | AuditRecord::ObjectDelete { .. }
            | AuditRecord::AuditsDiscarded { .. } => true,
        }
    }
}

/// Destination for audit records.
pub trait AuditSink {
    /// Deliver one record. An error means the record was not accepted;
    /// callers that promise delivery (handle creation) surface it.
    fn record(&self, record: AuditRecord) -> crate::error::SeResult<()>;
}

/// Queue bounds.
const AUDIT_QUEUE_LOW_WATER: usize = 16;
const AUDIT_QUEUE_HIGH_WATER: usize = 256;

struct AuditQueueInner {
    records: VecDeque<AuditRecord>,
    /// Records dropped since the queue last fell below the low water mark
    discarded: usize,
}

/// Bounded in-memory audit sink.
///
/// Above the high water mark new records are counted and dropped. Once a
/// reader drains the queue below the low water mark, a single
/// [`AuditRecord::AuditsDiscarded`] is emitted carrying the count.
pub struct AuditQueue {
    inner: Mutex<AuditQueueInner>,
}

impl AuditQueue {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(AuditQueueInner {
                records: VecDeque::new(),
                discarded: 0,
            }),
        }
    }

    /// Number of queued records.
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().records.is_empty()
    }

    /// Remove and return the oldest record.
    pub fn pop(&self) -> Option<AuditRecord> {
        let mut inner = self.inner.lock();
        let record = inner.records.pop_front();

        if inner.discarded > 0 && inner.records.len() < AUDIT_QUEUE_LOW_WATER {
            let count = inner.discarded;
            inner.discarded = 0;
            inner.records.push_back(AuditRecord::AuditsDiscarded { count });
        }

        record
    }
}

impl Default for AuditQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for AuditQueue {
    fn record(&self, record: AuditRecord) -> crate::error::SeResult<()> {
        let mut inner = self.inner.lock();
        if inner.records.len() >= AUDIT_QUEUE_HIGH_WATER {
            inner.discarded += 1;
            warn!(
                "audit queue full, discarding event {} ({} dropped)",
                record.event_id(),
                inner.discarded
            );
            return Err(crate::error::SeError::AuditNotPerformed);
        }
        inner.records.push_back(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sid::SID_WORLD;

    fn close_record(handle_id: u64) -> AuditRecord {
        AuditRecord::HandleClose {
            handle_id,
            user_sid: SID_WORLD,
            authentication_id: Luid::new(99, 0),
        }
    }

    #[test]
    fn test_policy_gates_by_outcome() {
        let mut state = AuditingState::new();
        state.set_policy(AuditCategory::ObjectAccess, true, false);

        assert!(se_audit_this_event(&state, AuditCategory::ObjectAccess, true, 0));
        assert!(!se_audit_this_event(&state, AuditCategory::ObjectAccess, false, 0));
        assert!(!se_audit_this_event(&state, AuditCategory::PrivilegeUse, true, 0));
    }

    #[test]
    fn test_token_override_wins() {
        let mut state = AuditingState::new();
        state.set_policy(AuditCategory::ObjectAccess, true, false);

        // Include forces an event the global policy would skip.
        assert!(se_audit_this_event(
            &state,
            AuditCategory::ObjectAccess,
            false,
            token_audit_mask::TOKEN_AUDIT_FAILURE_INCLUDE,
        ));
        // Exclude suppresses one the global policy wants.
        assert!(!se_audit_this_event(
            &state,
            AuditCategory::ObjectAccess,
            true,
            token_audit_mask::TOKEN_AUDIT_SUCCESS_EXCLUDE,
        ));
        // Include is considered before exclude.
        assert!(se_audit_this_event(
            &state,
            AuditCategory::ObjectAccess,
            true,
            token_audit_mask::TOKEN_AUDIT_SUCCESS_INCLUDE
                | token_audit_mask::TOKEN_AUDIT_SUCCESS_EXCLUDE,
        ));
    }

    #[test]
    fn test_record_metadata() {
        let record = close_record(1);
        assert_eq!(record.event_id(), audit_event_id::HANDLE_CLOSED);
        assert_eq!(record.category(), AuditCategory::ObjectAccess);
        assert!(record.is_success());
    }

    #[test]
    fn test_queue_fifo() {
        let queue = AuditQueue::new();
        queue.record(close_record(1)).unwrap();
        queue.record(close_record(2)).unwrap();

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(close_record(1)));
        assert_eq!(queue.pop(), Some(close_record(2)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_discards_and_reports() {
        let queue = AuditQueue::new();
        for i in 0..260 {
            let _ = queue.record(close_record(i));
        }
        assert_eq!(queue.len(), 256);

        // Drain. Once below the low water mark the discard count shows up
        // as a single synthetic record.
        let mut drained = 0;
        let mut discard_reports = 0;
        while let Some(record) = queue.pop() {
            if let AuditRecord::AuditsDiscarded { count } = record {
                assert_eq!(count, 4);
                discard_reports += 1;
            } else {
                drained += 1;
            }
        }
        assert_eq!(drained, 256);
        assert_eq!(discard_reports, 1);
    }
}
