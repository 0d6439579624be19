// Server side constants. Wire level constants live in pwmod_proto.

/// A DN containing this is a machine account, exempt from quality and history
/// checks.
pub const COMPUTER_RDN_MARKER: &str = "cn=computer";

pub const DEFAULT_PW_MIN_LENGTH: usize = 8;
pub const DEFAULT_PW_MIN_CLASSES: usize = 1;
pub const DEFAULT_PW_HISTORY_DEPTH: usize = 0;

/// Scheme used to remember previous passwords for history checks.
pub const PW_HISTORY_SCHEME: &str = "{SSHA512}";

pub const MSG_USER_DISABLED: &str = "user is disabled";
pub const MSG_POLICY_VIOLATION: &str = "policy violation";
pub const MSG_QUALITY_FAILED: &str = "password fails quality checks";
pub const MSG_HISTORY_FAILED: &str = "password was used recently";
