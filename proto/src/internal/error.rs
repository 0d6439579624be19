use std::fmt::{Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::*;

/// LDAP result codes that this operation can produce. The discriminants are
/// the values sent on the wire.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    Success = 0,
    OperationsError = 1,
    ProtocolError = 2,
    StrongerAuthRequired = 8,
    Referral = 10,
    InvalidDnSyntax = 34,
    InsufficientAccessRights = 50,
    Busy = 51,
    UnwillingToPerform = 53,
    Other = 80,
}

impl Display for ResultCode {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{:?} ({})", self, u8::from(*self))
    }
}

/* ===== errors ===== */

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{}", MSG_EMPTY_REQUEST)]
    EmptyRequest,
    #[error("{}", MSG_DECODING_ERROR)]
    Malformed,
    /// The field is valid but not permitted in this context.
    #[error("{0}")]
    Disallowed(&'static str),
    /// A password field was present with a zero length value.
    #[error("{0}")]
    EmptyValue(&'static str),
}

impl DecodeError {
    pub fn result_code(&self) -> ResultCode {
        match self {
            DecodeError::EmptyRequest | DecodeError::Malformed => ResultCode::ProtocolError,
            DecodeError::Disallowed(_) | DecodeError::EmptyValue(_) => {
                ResultCode::UnwillingToPerform
            }
        }
    }
}

/// The BER writer refused a value while building a payload.
#[derive(Debug, Error)]
#[error("unable to encode payload: {0}")]
pub struct EncodeError(#[from] std::io::Error);

/// Referral URIs handed back to the caller. An empty set is still a
/// referral, distinct from `None` meaning no referral is needed.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferralSet(Vec<String>);

impl ReferralSet {
    pub fn new(refs: Vec<String>) -> Self {
        ReferralSet(refs)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for ReferralSet {
    fn from(refs: Vec<String>) -> Self {
        ReferralSet(refs)
    }
}

/// An outcome reported by a storage backend or another collaborator. It is
/// relayed to the caller verbatim.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Error)]
pub struct BackendError {
    pub code: ResultCode,
    pub text: Option<String>,
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match &self.text {
            Some(text) => write!(f, "{} - {}", self.code, text),
            None => write!(f, "{}", self.code),
        }
    }
}

impl BackendError {
    pub fn new(code: ResultCode, text: impl Into<String>) -> Self {
        BackendError {
            code,
            text: Some(text.into()),
        }
    }

    pub fn code(code: ResultCode) -> Self {
        BackendError { code, text: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswdModifyError {
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),
    #[error("authentication required")]
    AuthRequired,
    #[error("not authorised: {0}")]
    Authz(String),
    /// Old password verification failed. Why it failed is never carried.
    #[error("old password verification failed")]
    Verification,
    #[error("referral required")]
    ReferralRequired(ReferralSet),
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("invalid dn")]
    InvalidDn,
    #[error("unwilling to perform: {0}")]
    Unwilling(String),
    #[error("hashing failed: {0}")]
    Hashing(String),
    #[error("other: {0}")]
    Other(String),
    #[error("storage: {0}")]
    Storage(#[from] BackendError),
    #[error("rejected: {code}")]
    Rejected {
        code: ResultCode,
        text: Option<String>,
    },
}

impl PasswdModifyError {
    /// The result code and caller visible text for this error.
    pub fn to_result(&self) -> (ResultCode, Option<String>) {
        match self {
            PasswdModifyError::Decode(de) => (de.result_code(), Some(de.to_string())),
            PasswdModifyError::AuthRequired => (
                ResultCode::StrongerAuthRequired,
                Some(MSG_AUTH_REQUIRED.to_string()),
            ),
            PasswdModifyError::Authz(msg) | PasswdModifyError::Unwilling(msg) => {
                (ResultCode::UnwillingToPerform, Some(msg.clone()))
            }
            PasswdModifyError::Verification => (
                ResultCode::UnwillingToPerform,
                Some(MSG_VERIFY_OLD.to_string()),
            ),
            PasswdModifyError::ReferralRequired(_) => (ResultCode::Referral, None),
            PasswdModifyError::BackendUnavailable(msg)
            | PasswdModifyError::Hashing(msg)
            | PasswdModifyError::Other(msg) => (ResultCode::Other, Some(msg.clone())),
            PasswdModifyError::InvalidDn => {
                (ResultCode::InvalidDnSyntax, Some(MSG_INVALID_DN.to_string()))
            }
            PasswdModifyError::Storage(BackendError { code, text })
            | PasswdModifyError::Rejected { code, text } => (*code, text.clone()),
        }
    }
}

/// The final outcome of one password modify operation, as handed back to the
/// surrounding server for framing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PasswdModifyReply {
    pub code: ResultCode,
    pub text: Option<String>,
    pub referrals: Vec<String>,
    pub rspdata: Option<Vec<u8>>,
}

impl PasswdModifyReply {
    pub fn success(rspdata: Option<Vec<u8>>) -> Self {
        PasswdModifyReply {
            code: ResultCode::Success,
            text: None,
            referrals: Vec::new(),
            rspdata,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == ResultCode::Success
    }
}

impl From<PasswdModifyError> for PasswdModifyReply {
    fn from(e: PasswdModifyError) -> Self {
        let (code, text) = e.to_result();
        let referrals = match e {
            PasswdModifyError::ReferralRequired(refs) => refs.into_inner(),
            _ => Vec::new(),
        };
        PasswdModifyReply {
            code,
            text,
            referrals,
            rspdata: None,
        }
    }
}
