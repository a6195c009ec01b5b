//! Status codes returned by the reference monitor.
//!
//! Every fallible operation in the crate returns `Result<T, SeError>`.
//! The variants map one-to-one onto the status values the decision core
//! can produce; callers that sit at a syscall-style boundary are expected
//! to translate them into their own status space.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type SeResult<T> = Result<T, SeError>;

/// Security reference monitor status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SeError {
    /// A parameter failed validation (malformed object type list,
    /// restricted SIDs carrying attributes, and similar).
    #[error("invalid parameter")]
    InvalidParameter,

    /// The security descriptor is missing its owner or group.
    #[error("security descriptor has no owner or group")]
    InvalidSecurityDescriptor,

    /// The desired access mask still contains generic rights; they must
    /// be mapped through the object type's generic mapping first.
    #[error("generic rights were not mapped")]
    GenericNotMapped,

    /// A required privilege is not held (or not enabled) by the subject.
    #[error("a required privilege is not held")]
    PrivilegeNotHeld,

    /// The client token's impersonation level is too low for the
    /// requested operation.
    #[error("impersonation level is too low")]
    BadImpersonationLevel,

    /// The operation requires an impersonation token and the subject is
    /// not impersonating anyone.
    #[error("no impersonation token is present")]
    NoImpersonationToken,

    /// A token filter would produce a token less restricted than its
    /// source (for example, an empty restricted-SID intersection on an
    /// already restricted source).
    #[error("token filter would widen access")]
    InvalidRestriction,

    /// An audit record could not be delivered to the sink. The access
    /// decision stands; the condition is reported so operators can react.
    #[error("audit record was not delivered")]
    AuditNotPerformed,

    /// Access denied.
    #[error("access denied")]
    AccessDenied,
}
