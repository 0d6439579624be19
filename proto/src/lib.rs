//! Protocol bindings for the LDAP Password Modify extended operation (RFC 3062).
//!
//! This crate holds everything that crosses the wire: the request and response
//! payload codec, the result codes returned to the caller and the error
//! taxonomy the server maps onto them.

#![deny(warnings)]
#![warn(unused_extern_crates)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]

pub mod constants;
pub mod exop;
pub mod internal;

pub use crate::exop::{
    decode_response, encode_response, PasswdModifyAllow, PasswdModifyRequest,
};
pub use crate::internal::{
    BackendError, DecodeError, EncodeError, PasswdModifyError, PasswdModifyReply, ReferralSet,
    ResultCode,
};
