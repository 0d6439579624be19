//! The password change operations layered on top of the storage backends.
//! Requests arrive here from the protocol layer, are checked against the
//! server's access controls and policy and then lowered into a modification
//! on the backend that holds the target.

pub mod passwd;

pub use self::passwd::{PasswdModifyServer, SaslSetPass};
