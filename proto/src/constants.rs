//! Because consistency is great!

/// The OID of the password modify extended operation.
pub const OID_EXOP_MODIFY_PASSWD: &str = "1.3.6.1.4.1.4203.1.11.1";

/// Universal constructed SEQUENCE.
pub const TAG_SEQUENCE: u8 = 0x30;

// Request fields, context specific and primitive.
pub const TAG_EXOP_MODIFY_PASSWD_ID: u8 = 0x80;
pub const TAG_EXOP_MODIFY_PASSWD_OLD: u8 = 0x81;
pub const TAG_EXOP_MODIFY_PASSWD_NEW: u8 = 0x82;
// Response field.
pub const TAG_EXOP_MODIFY_PASSWD_GEN: u8 = 0x80;

// Context tag numbers of the same fields.
pub const PASSWD_FIELD_ID: u64 = 0;
pub const PASSWD_FIELD_OLD: u64 = 1;
pub const PASSWD_FIELD_NEW: u64 = 2;
pub const PASSWD_FIELD_GEN: u64 = 0;

/// The attribute that holds hashed credentials.
pub const ATTR_USERPASSWORD: &str = "userPassword";

// Caller visible reasons.
pub const MSG_EMPTY_REQUEST: &str = "empty request data field";
pub const MSG_DECODING_ERROR: &str = "data decoding error";
pub const MSG_ID_NOT_ALLOWED: &str = "user must change own password";
pub const MSG_OLD_NOT_ALLOWED: &str = "use bind to verify old password";
pub const MSG_NEW_NOT_ALLOWED: &str = "user specified passwords disallowed";
pub const MSG_OLD_EMPTY: &str = "old password value is empty";
pub const MSG_NEW_EMPTY: &str = "new password value is empty";
pub const MSG_AUTH_REQUIRED: &str = "only authenticated users may change passwords";
pub const MSG_INVALID_DN: &str = "Invalid DN";
pub const MSG_ROOT_ENTRY: &str = "no password is associated with the root entry";
pub const MSG_VERIFY_OLD: &str = "unwilling to verify old password";
pub const MSG_NO_AUTHZ_BACKEND: &str = "no authz backend";
pub const MSG_SHADOW_NO_REFERRAL: &str = "shadow context; no update referral";
pub const MSG_GENERATION_FAILED: &str = "password generation failed";
pub const MSG_NOT_SUPPORTED: &str = "operation not supported for current user";
pub const MSG_HASH_FAILED: &str = "password hash failed";
pub const MSG_PERMISSION_DENIED: &str = "permission denied";
