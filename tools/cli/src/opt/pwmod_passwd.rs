use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Args, Clone)]
pub struct DebugOpt {
    /// Enable debugging of the pwmod tool
    #[clap(short, long, env = "PWMOD_DEBUG")]
    pub debug: bool,
}

#[derive(Debug, Subcommand, Clone)]
pub enum PasswdOpt {
    /// Hash a secret, printing the value that would be stored
    Hash {
        #[clap(flatten)]
        copt: DebugOpt,
        /// The secret to hash
        #[clap(short, long, conflicts_with = "generate", required_unless_present = "generate")]
        secret: Option<String>,
        /// Generate the secret instead, it is printed before the hash
        #[clap(short, long)]
        generate: bool,
        /// Hash scheme such as {SSHA}. Defaults to the built in default.
        #[clap(short = 'H', long)]
        scheme: Option<String>,
        /// Salt format used with {CRYPT}
        #[clap(short, long, default_value = DEFAULT_CRYPT_SALT_FORMAT)]
        crypt_salt_format: String,
    },
    /// Check a secret against a stored value
    Verify {
        #[clap(flatten)]
        copt: DebugOpt,
        /// The stored value, for example {SSHA}...
        #[clap(short = 'H', long)]
        hash: String,
        #[clap(short, long)]
        secret: String,
    },
    /// Generate a password the same way the server does
    Generate {
        #[clap(flatten)]
        copt: DebugOpt,
    },
    /// Show the fields of a hex encoded password modify request value
    #[clap(name = "decode-request")]
    DecodeRequest {
        #[clap(flatten)]
        copt: DebugOpt,
        hex: String,
    },
    /// Load and validate a server configuration file
    #[clap(name = "check-config")]
    CheckConfig {
        #[clap(flatten)]
        copt: DebugOpt,
        #[clap(value_parser)]
        path: PathBuf,
    },
    /// List the supported hash schemes
    Schemes {
        #[clap(flatten)]
        copt: DebugOpt,
    },
}

#[derive(Debug, Parser)]
#[clap(about = "Password modify helper tool")]
pub struct PwmodPasswdParser {
    #[clap(subcommand)]
    pub commands: PasswdOpt,
}
