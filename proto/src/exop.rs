//! Codec for the password modify request and response payloads.
//!
//! ```text
//! PasswdModifyRequestValue ::= SEQUENCE {
//!     userIdentity    [0]  OCTET STRING OPTIONAL
//!     oldPasswd       [1]  OCTET STRING OPTIONAL
//!     newPasswd       [2]  OCTET STRING OPTIONAL }
//!
//! PasswdModifyResponseValue ::= SEQUENCE {
//!     genPasswd       [0]     OCTET STRING OPTIONAL }
//! ```

use bytes::BytesMut;
use lber::common::TagClass;
use lber::parse::parse_tag;
use lber::structure::{StructureTag, PL};
use lber::write;
use tracing::trace;

use crate::constants::*;
use crate::internal::{DecodeError, EncodeError};

const UNIVERSAL_SEQUENCE: u64 = 16;

/// Which request fields the server is willing to accept in the current
/// context. A field that is present but not allowed is rejected with a
/// context specific reason rather than a generic decoding error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswdModifyAllow {
    pub identity: bool,
    pub old_password: bool,
    pub new_password: bool,
}

impl Default for PasswdModifyAllow {
    fn default() -> Self {
        PasswdModifyAllow {
            identity: true,
            old_password: true,
            new_password: true,
        }
    }
}

/// Split the element at the front of `input`, returning it parsed, the bytes
/// it occupied and whatever follows it.
fn split_element(input: &[u8]) -> Result<(StructureTag, &[u8], &[u8]), DecodeError> {
    let (rest, tag) = parse_tag(input).map_err(|e| {
        trace!(?e, "passwd_parse: decoding error");
        DecodeError::Malformed
    })?;
    let raw = &input[..input.len() - rest.len()];
    Ok((tag, raw, rest))
}

/// The contents of the SEQUENCE that makes up the whole of `input`. Only the
/// single octet identifier is accepted, and nothing may follow the sequence.
fn sequence_contents(input: &[u8]) -> Result<&[u8], DecodeError> {
    let (seq, raw, trailing) = split_element(input)?;
    if !trailing.is_empty() {
        trace!(trailing = %trailing.len(), "passwd_parse: data after sequence");
        return Err(DecodeError::Malformed);
    }
    if raw.first() != Some(&TAG_SEQUENCE) || !matches!(seq.payload, PL::C(_)) {
        trace!(id = %seq.id, "passwd_parse: not a sequence");
        return Err(DecodeError::Malformed);
    }

    // Skip the identifier and length octets that lber accepted.
    let len_octets = match raw.get(1) {
        Some(first) if first & 0x80 != 0 => 1 + (first & 0x7f) as usize,
        _ => 1,
    };
    raw.get(1 + len_octets..).ok_or(DecodeError::Malformed)
}

/// Take the primitive element at the front of `body`. The returned value
/// points into the same buffer as `body`.
fn take_primitive<'a>(body: &mut &'a [u8]) -> Result<&'a [u8], DecodeError> {
    let (tag, raw, rest) = split_element(*body)?;
    let id = tag.id;
    let PL::P(value) = tag.payload else {
        trace!(%id, "passwd_parse: constructed field");
        return Err(DecodeError::Malformed);
    };
    *body = rest;
    Ok(&raw[raw.len() - value.len()..])
}

fn context_field(id: u64, value: &[u8]) -> StructureTag {
    StructureTag {
        class: TagClass::Context,
        id,
        payload: PL::P(value.to_vec()),
    }
}

fn encode_sequence(fields: Vec<StructureTag>) -> Result<Vec<u8>, EncodeError> {
    let seq = StructureTag {
        class: TagClass::Universal,
        id: UNIVERSAL_SEQUENCE,
        payload: PL::C(fields),
    };
    let mut buf = BytesMut::new();
    write::encode_into(&mut buf, seq)?;
    Ok(buf.to_vec())
}

/// A decoded request. Every field borrows from the payload it was decoded
/// from, and none of them are null terminated.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PasswdModifyRequest<'a> {
    pub identity: Option<&'a [u8]>,
    pub old_password: Option<&'a [u8]>,
    pub new_password: Option<&'a [u8]>,
}

impl<'a> PasswdModifyRequest<'a> {
    /// Decode a request payload. An absent payload is a request with every
    /// field absent. A present but zero length payload is a protocol error.
    pub fn decode(
        reqdata: Option<&'a [u8]>,
        allow: PasswdModifyAllow,
    ) -> Result<Self, DecodeError> {
        let Some(reqdata) = reqdata else {
            return Ok(PasswdModifyRequest::default());
        };

        if reqdata.is_empty() {
            return Err(DecodeError::EmptyRequest);
        }

        let mut body = sequence_contents(reqdata)?;
        let mut req = PasswdModifyRequest::default();

        if body.first() == Some(&TAG_EXOP_MODIFY_PASSWD_ID) {
            if !allow.identity {
                trace!("passwd_parse: ID not allowed.");
                return Err(DecodeError::Disallowed(MSG_ID_NOT_ALLOWED));
            }
            req.identity = Some(take_primitive(&mut body)?);
        }

        if body.first() == Some(&TAG_EXOP_MODIFY_PASSWD_OLD) {
            if !allow.old_password {
                trace!("passwd_parse: OLD not allowed.");
                return Err(DecodeError::Disallowed(MSG_OLD_NOT_ALLOWED));
            }
            let old = take_primitive(&mut body)?;
            if old.is_empty() {
                trace!("passwd_parse: OLD empty.");
                return Err(DecodeError::EmptyValue(MSG_OLD_EMPTY));
            }
            req.old_password = Some(old);
        }

        if body.first() == Some(&TAG_EXOP_MODIFY_PASSWD_NEW) {
            if !allow.new_password {
                trace!("passwd_parse: NEW not allowed.");
                return Err(DecodeError::Disallowed(MSG_NEW_NOT_ALLOWED));
            }
            let new = take_primitive(&mut body)?;
            if new.is_empty() {
                trace!("passwd_parse: NEW empty.");
                return Err(DecodeError::EmptyValue(MSG_NEW_EMPTY));
            }
            req.new_password = Some(new);
        }

        if !body.is_empty() {
            trace!(len = %body.len(), "passwd_parse: decoding error");
            return Err(DecodeError::Malformed);
        }

        Ok(req)
    }

    /// Client side encoding of the request.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let fields = [
            (PASSWD_FIELD_ID, self.identity),
            (PASSWD_FIELD_OLD, self.old_password),
            (PASSWD_FIELD_NEW, self.new_password),
        ]
        .into_iter()
        .filter_map(|(id, value)| value.map(|v| context_field(id, v)))
        .collect();
        encode_sequence(fields)
    }
}

/// Wrap a server chosen password in the response value.
pub fn encode_response(generated: &[u8]) -> Result<Vec<u8>, EncodeError> {
    trace!(len = %generated.len(), "passwd_return");
    encode_sequence(vec![context_field(PASSWD_FIELD_GEN, generated)])
}

/// Peer side decoding of the response value.
pub fn decode_response(rspdata: &[u8]) -> Result<Option<&[u8]>, DecodeError> {
    let mut body = sequence_contents(rspdata)?;

    let generated = if body.first() == Some(&TAG_EXOP_MODIFY_PASSWD_GEN) {
        Some(take_primitive(&mut body)?)
    } else {
        None
    };

    if !body.is_empty() {
        return Err(DecodeError::Malformed);
    }
    Ok(generated)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    use super::*;

    fn b(s: &str) -> Option<&[u8]> {
        Some(s.as_bytes())
    }

    fn req<'a>(
        identity: Option<&'a [u8]>,
        old_password: Option<&'a [u8]>,
        new_password: Option<&'a [u8]>,
    ) -> PasswdModifyRequest<'a> {
        PasswdModifyRequest {
            identity,
            old_password,
            new_password,
        }
    }

    #[test]
    fn test_passwd_decode_absent_payload() {
        let r = PasswdModifyRequest::decode(None, PasswdModifyAllow::default()).unwrap();
        assert_eq!(r, PasswdModifyRequest::default());
    }

    #[test]
    fn test_passwd_decode_zero_length_payload() {
        let r = PasswdModifyRequest::decode(Some(&[]), PasswdModifyAllow::default());
        assert_eq!(r, Err(DecodeError::EmptyRequest));
    }

    #[test]
    fn test_passwd_decode_empty_sequence() {
        let r = PasswdModifyRequest::decode(Some(&[0x30, 0x00]), PasswdModifyAllow::default())
            .unwrap();
        assert_eq!(r, PasswdModifyRequest::default());
    }

    #[test]
    fn test_passwd_decode_all_fields() {
        let data = req(
            b("uid=bob,dc=example,dc=com"),
            b("old secret"),
            b("new secret"),
        )
        .encode().unwrap();
        let r = PasswdModifyRequest::decode(Some(data.as_slice()), PasswdModifyAllow::default()).unwrap();
        assert_eq!(r.identity, Some(&b"uid=bob,dc=example,dc=com"[..]));
        assert_eq!(r.old_password, Some(&b"old secret"[..]));
        assert_eq!(r.new_password, Some(&b"new secret"[..]));

        // The values borrow from the payload.
        let base = data.as_ptr() as usize;
        let id_ptr = r.identity.unwrap().as_ptr() as usize;
        assert!(id_ptr > base && id_ptr < base + data.len());

        // Re-encoding what was extracted gives back the same payload.
        assert_eq!(r.encode().unwrap(), data);
    }

    #[test]
    fn test_passwd_decode_each_field_optional() {
        let cases = [
            req(b("uid=a"), None, None),
            req(None, b("o"), None),
            req(None, None, b("n")),
            req(b("uid=a"), None, b("n")),
            req(b(""), b("o"), None),
        ];
        for case in cases {
            let data = case.encode().unwrap();
            let r =
                PasswdModifyRequest::decode(Some(data.as_slice()), PasswdModifyAllow::default()).unwrap();
            assert_eq!(r, case);
        }
    }

    #[test]
    fn test_passwd_decode_empty_values_rejected() {
        let data = req(None, b(""), b("new")).encode().unwrap();
        let r = PasswdModifyRequest::decode(Some(data.as_slice()), PasswdModifyAllow::default());
        assert_eq!(r, Err(DecodeError::EmptyValue(MSG_OLD_EMPTY)));

        let data = req(b("uid=a"), b("old"), b("")).encode().unwrap();
        let r = PasswdModifyRequest::decode(Some(data.as_slice()), PasswdModifyAllow::default());
        assert_eq!(r, Err(DecodeError::EmptyValue(MSG_NEW_EMPTY)));
    }

    #[test]
    fn test_passwd_decode_out_of_order() {
        // new before old
        let data = [0x30, 0x06, 0x82, 0x01, b'n', 0x81, 0x01, b'o'];
        let r = PasswdModifyRequest::decode(Some(data.as_slice()), PasswdModifyAllow::default());
        assert_eq!(r, Err(DecodeError::Malformed));

        // old before identity
        let data = [0x30, 0x06, 0x81, 0x01, b'o', 0x80, 0x01, b'i'];
        let r = PasswdModifyRequest::decode(Some(data.as_slice()), PasswdModifyAllow::default());
        assert_eq!(r, Err(DecodeError::Malformed));

        // duplicated field
        let data = [0x30, 0x06, 0x82, 0x01, b'n', 0x82, 0x01, b'n'];
        let r = PasswdModifyRequest::decode(Some(data.as_slice()), PasswdModifyAllow::default());
        assert_eq!(r, Err(DecodeError::Malformed));
    }

    #[test]
    fn test_passwd_decode_malformed() {
        let allow = PasswdModifyAllow::default();
        // Not a sequence.
        assert_eq!(
            PasswdModifyRequest::decode(Some(&[0x04, 0x00]), allow),
            Err(DecodeError::Malformed)
        );
        // Unknown inner tag.
        assert_eq!(
            PasswdModifyRequest::decode(Some(&[0x30, 0x03, 0x83, 0x01, b'x']), allow),
            Err(DecodeError::Malformed)
        );
        // Inner length exceeds the sequence.
        assert_eq!(
            PasswdModifyRequest::decode(Some(&[0x30, 0x03, 0x82, 0x05, b'x']), allow),
            Err(DecodeError::Malformed)
        );
        // Bytes trailing the sequence.
        assert_eq!(
            PasswdModifyRequest::decode(Some(&[0x30, 0x00, 0x00]), allow),
            Err(DecodeError::Malformed)
        );
    }

    #[test]
    fn test_passwd_decode_length_forms() {
        let allow = PasswdModifyAllow::default();
        // Long form lengths are valid BER even where short form would do.
        let data = [0x30, 0x81, 0x05, 0x82, 0x81, 0x02, b'n', b'w'];
        let r = PasswdModifyRequest::decode(Some(data.as_slice()), allow).unwrap();
        assert_eq!(r.new_password, Some(&b"nw"[..]));
        assert_eq!(r.identity, None);

        // Indefinite length sequence.
        let data = [0x30, 0x80, 0x82, 0x01, b'n', 0x00, 0x00];
        assert_eq!(
            PasswdModifyRequest::decode(Some(data.as_slice()), allow),
            Err(DecodeError::Malformed)
        );

        // Constructed rather than primitive field.
        let data = [0x30, 0x05, 0xa2, 0x03, 0x04, 0x01, b'n'];
        assert_eq!(
            PasswdModifyRequest::decode(Some(data.as_slice()), allow),
            Err(DecodeError::Malformed)
        );

        // Truncated field.
        let data = [0x30, 0x02, 0x82, 0x01];
        assert_eq!(
            PasswdModifyRequest::decode(Some(data.as_slice()), allow),
            Err(DecodeError::Malformed)
        );
    }

    #[test]
    fn test_passwd_decode_disallowed_fields() {
        let data = req(b("uid=a"), b("o"), b("n")).encode().unwrap();

        let allow = PasswdModifyAllow {
            identity: false,
            ..Default::default()
        };
        assert_eq!(
            PasswdModifyRequest::decode(Some(data.as_slice()), allow),
            Err(DecodeError::Disallowed(MSG_ID_NOT_ALLOWED))
        );

        let allow = PasswdModifyAllow {
            old_password: false,
            ..Default::default()
        };
        assert_eq!(
            PasswdModifyRequest::decode(Some(data.as_slice()), allow),
            Err(DecodeError::Disallowed(MSG_OLD_NOT_ALLOWED))
        );

        let allow = PasswdModifyAllow {
            new_password: false,
            ..Default::default()
        };
        assert_eq!(
            PasswdModifyRequest::decode(Some(data.as_slice()), allow),
            Err(DecodeError::Disallowed(MSG_NEW_NOT_ALLOWED))
        );

        // A disallowed field that is absent is fine.
        let data = req(None, None, b("n")).encode().unwrap();
        let allow = PasswdModifyAllow {
            identity: false,
            old_password: false,
            new_password: true,
        };
        assert!(PasswdModifyRequest::decode(Some(data.as_slice()), allow).is_ok());
    }

    #[test]
    fn test_passwd_response_round_trip() {
        let rsp = encode_response(b"abc12345").unwrap();
        assert_eq!(
            rsp,
            vec![0x30, 0x0a, 0x80, 0x08, b'a', b'b', b'c', b'1', b'2', b'3', b'4', b'5']
        );
        let gen = decode_response(&rsp).unwrap();
        assert_eq!(gen, Some(&b"abc12345"[..]));
    }

    #[test]
    fn test_passwd_response_without_value() {
        assert_eq!(decode_response(&[0x30, 0x00]), Ok(None));
        assert_eq!(
            decode_response(&[0x30, 0x02, 0x81, 0x00]),
            Err(DecodeError::Malformed)
        );
    }
}
