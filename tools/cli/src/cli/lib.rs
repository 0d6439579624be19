#![deny(warnings)]
#![warn(unused_extern_crates)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]
// We allow expect since it forces good error messages at the least.
#![allow(clippy::expect_used)]

#[macro_use]
extern crate tracing;

use anyhow::{anyhow, Context};
use pwmod_lib_crypto::{
    generate_password, CryptAdapter, HashSchemeRegistry, DEFAULT_CRYPT_SALT_FORMAT,
};
use pwmod_proto::{PasswdModifyAllow, PasswdModifyRequest};
use pwmodd_lib::config::ServerConfig;
use sketching::LogLevel;

include!("../opt/pwmod_passwd.rs");

impl PasswdOpt {
    pub fn debug(&self) -> bool {
        match self {
            PasswdOpt::Hash { copt, .. }
            | PasswdOpt::Verify { copt, .. }
            | PasswdOpt::Generate { copt }
            | PasswdOpt::DecodeRequest { copt, .. }
            | PasswdOpt::CheckConfig { copt, .. }
            | PasswdOpt::Schemes { copt } => copt.debug,
        }
    }

    /// `--debug` wins over the level a loaded configuration asks for.
    pub fn log_level(&self, config: Option<&ServerConfig>) -> LogLevel {
        if self.debug() {
            LogLevel::Debug
        } else {
            config.and_then(|c| c.log_level).unwrap_or_default()
        }
    }

    /// Load the server configuration this command works on, if it takes one.
    pub fn load_config(&self) -> anyhow::Result<Option<ServerConfig>> {
        match self {
            PasswdOpt::CheckConfig { path, .. } => ServerConfig::new(path)
                .map(Some)
                .with_context(|| format!("unable to load {}", path.display())),
            _ => Ok(None),
        }
    }

    /// Run the command, returning what should be printed.
    pub fn exec(&self, config: Option<&ServerConfig>) -> anyhow::Result<String> {
        match self {
            PasswdOpt::Hash {
                secret,
                generate,
                scheme,
                crypt_salt_format,
                ..
            } => {
                let registry =
                    HashSchemeRegistry::with_crypt(CryptAdapter::default(), crypt_salt_format);
                let scheme = scheme
                    .as_deref()
                    .unwrap_or_else(|| HashSchemeRegistry::default_scheme());

                match (secret, generate) {
                    (_, true) => {
                        let secret = generate_password();
                        let hashed = hash_secret(&registry, &secret, scheme)?;
                        Ok(format!("{}\n{}", secret, hashed))
                    }
                    (Some(secret), false) => hash_secret(&registry, secret, scheme),
                    (None, false) => Err(anyhow!("a secret or --generate is required")),
                }
            }
            PasswdOpt::Verify { hash, secret, .. } => {
                let registry = HashSchemeRegistry::new();
                if registry.verify(hash.as_bytes(), secret.as_bytes()) {
                    Ok("valid".to_string())
                } else {
                    Err(anyhow!("secret does not match"))
                }
            }
            PasswdOpt::Generate { .. } => Ok(generate_password()),
            PasswdOpt::DecodeRequest { hex, .. } => {
                let raw = hex::decode(hex.trim()).context("request value is not valid hex")?;
                describe_request(&raw)
            }
            PasswdOpt::CheckConfig { path, .. } => {
                let config = config
                    .ok_or_else(|| anyhow!("{} has not been loaded", path.display()))?;
                let registry = config.hash_registry()?;
                Ok(format!(
                    "ok: schemes={} require_authentication={} log_level={}",
                    registry.active_schemes().join(","),
                    config.require_authentication,
                    config.log_level.unwrap_or_default()
                ))
            }
            PasswdOpt::Schemes { .. } => {
                Ok(HashSchemeRegistry::new().supported_schemes().join("\n"))
            }
        }
    }
}

fn hash_secret(registry: &HashSchemeRegistry, secret: &str, scheme: &str) -> anyhow::Result<String> {
    if !registry.is_supported(scheme) {
        return Err(anyhow!("password hash scheme not supported: {}", scheme));
    }
    debug!(%scheme, "hashing secret");
    registry.hash(secret.as_bytes(), scheme).map_err(|e| {
        let diag = e
            .diagnostic()
            .map(str::to_string)
            .unwrap_or_else(|| e.to_string());
        anyhow!("password hash failed: {}", diag)
    })
}

/// Show which fields a request carries. Password values are never printed.
fn describe_request(raw: &[u8]) -> anyhow::Result<String> {
    let req = PasswdModifyRequest::decode(Some(raw), PasswdModifyAllow::default())
        .map_err(|e| anyhow!("{} ({})", e, e.result_code()))?;

    let identity = req
        .identity
        .map(|id| format!("\"{}\"", String::from_utf8_lossy(id)))
        .unwrap_or_else(|| "-".to_string());
    let present = |v: Option<&[u8]>| match v {
        Some(v) => format!("present ({} bytes)", v.len()),
        None => "-".to_string(),
    };

    Ok(format!(
        "identity: {}\nold password: {}\nnew password: {}",
        identity,
        present(req.old_password),
        present(req.new_password)
    ))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn parse(args: &[&str]) -> PasswdOpt {
        PwmodPasswdParser::try_parse_from(args).unwrap().commands
    }

    #[test]
    fn test_hash_and_verify() {
        let out = parse(&["pwmod_passwd", "hash", "-s", "secret", "-H", "{SSHA512}"])
            .exec(None)
            .unwrap();
        assert!(out.starts_with("{SSHA512}"));

        let ok = parse(&["pwmod_passwd", "verify", "-H", out.as_str(), "-s", "secret"]).exec(None);
        assert_eq!(ok.unwrap(), "valid");
        let bad = parse(&["pwmod_passwd", "verify", "-H", out.as_str(), "-s", "nope"]).exec(None);
        assert!(bad.is_err());
    }

    #[test]
    fn test_hash_generate() {
        let out = parse(&["pwmod_passwd", "hash", "-g", "-H", "{SMD5}"])
            .exec(None)
            .unwrap();
        let (secret, hashed) = out.split_once('\n').unwrap();
        assert_eq!(secret.len(), 8);
        assert!(HashSchemeRegistry::new().verify(hashed.as_bytes(), secret.as_bytes()));
    }

    #[test]
    fn test_hash_rejects() {
        assert!(parse(&["pwmod_passwd", "hash", "-s", "x", "-H", "{ROT13}"])
            .exec(None)
            .is_err());
        // Needs one of the two.
        assert!(PwmodPasswdParser::try_parse_from(["pwmod_passwd", "hash"]).is_err());
        assert!(
            PwmodPasswdParser::try_parse_from(["pwmod_passwd", "hash", "-s", "x", "-g"]).is_err()
        );
    }

    #[test]
    fn test_decode_request() {
        let out = parse(&[
            "pwmod_passwd",
            "decode-request",
            "300f8003753d61810361626382036e6577",
        ])
        .exec(None)
        .unwrap();
        assert_eq!(
            out,
            "identity: \"u=a\"\nold password: present (3 bytes)\nnew password: present (3 bytes)"
        );

        let empty = parse(&["pwmod_passwd", "decode-request", "3000"])
            .exec(None)
            .unwrap();
        assert_eq!(empty, "identity: -\nold password: -\nnew password: -");

        assert!(parse(&["pwmod_passwd", "decode-request", "zz"]).exec(None).is_err());
        assert!(parse(&["pwmod_passwd", "decode-request", "30028200"])
            .exec(None)
            .is_err());
    }

    #[test]
    fn test_debug_flag() {
        let opt = parse(&["pwmod_passwd", "generate", "--debug"]);
        assert!(opt.debug());
        assert_eq!(opt.log_level(None), LogLevel::Debug);
        assert_eq!(opt.exec(None).unwrap().len(), 8);
    }

    #[test]
    fn test_check_config_log_level() {
        let config = ServerConfig::from_toml(
            r#"
            password_hash = ["{SSHA512}"]
            log_level = "trace"
            "#,
        )
        .unwrap();

        let opt = parse(&["pwmod_passwd", "check-config", "/etc/pwmod/server.toml"]);
        assert_eq!(opt.log_level(None), LogLevel::Info);
        assert_eq!(opt.log_level(Some(&config)), LogLevel::Trace);
        assert_eq!(
            opt.exec(Some(&config)).unwrap(),
            "ok: schemes={SSHA512} require_authentication=true log_level=trace"
        );
        assert!(opt.exec(None).is_err());

        let opt = parse(&[
            "pwmod_passwd",
            "check-config",
            "--debug",
            "/etc/pwmod/server.toml",
        ]);
        assert_eq!(opt.log_level(Some(&config)), LogLevel::Debug);

        let missing = parse(&["pwmod_passwd", "check-config", "/nonexistent/pwmod.toml"]);
        assert!(missing.load_config().is_err());
        assert!(parse(&["pwmod_passwd", "generate"])
            .load_config()
            .unwrap()
            .is_none());
    }
}
