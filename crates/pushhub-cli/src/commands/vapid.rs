//! VAPID key tooling.

use clap::{Args, Subcommand};

use crate::output::{self, OutputFormat};
use pushhub_core::error::AppError;
use pushhub_provider::webpush::{VapidKeyPair, verify_key_pair};

/// Arguments for vapid commands
#[derive(Debug, Args)]
pub struct VapidArgs {
    /// Vapid subcommand
    #[command(subcommand)]
    pub command: VapidCommand,
}

/// Vapid subcommands
#[derive(Debug, Subcommand)]
pub enum VapidCommand {
    /// Generate a new P-256 key pair (base64url)
    Generate,
    /// Check that a private key derives the given public key
    Verify {
        /// Uncompressed public key, base64url
        #[arg(long)]
        public_key: String,
        /// PKCS#8 private key, base64url
        #[arg(long)]
        private_key: String,
    },
}

/// Execute vapid commands
pub fn execute(args: &VapidArgs, format: OutputFormat) -> Result<(), AppError> {
    match &args.command {
        VapidCommand::Generate => {
            let pair = VapidKeyPair::generate()?;
            output::print_item(&pair, format);
        }
        VapidCommand::Verify {
            public_key,
            private_key,
        } => {
            verify_key_pair(public_key, private_key)?;
            output::print_success("VAPID key pair is consistent");
        }
    }
    Ok(())
}
