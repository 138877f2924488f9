use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "rejection-sorter")]
#[command(author, version, about)]
pub struct Cli {
    /// Settings file. Defaults to settings.json in the platform config directory.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Keep invoking the sweep until every candidate has been processed.
    Run,
    /// Run a single invocation and exit, for an external scheduler.
    Once,
    /// Check that the mailbox is reachable and not quota-limited.
    Check,
    /// Forget the saved page-token cursor.
    Reset,
    /// Save credentials to the OS keychain.
    StoreCredentials(StoreCredentialsArgs),
}

#[derive(Debug, clap::Args)]
pub struct StoreCredentialsArgs {
    /// OAuth client ID for the Gmail API.
    #[arg(long, requires_all = ["client_secret", "refresh_token"])]
    pub client_id: Option<String>,
    /// OAuth client secret for the Gmail API.
    #[arg(long, requires_all = ["client_id", "refresh_token"])]
    pub client_secret: Option<String>,
    /// OAuth refresh token for the Gmail API.
    #[arg(long, requires_all = ["client_id", "client_secret"])]
    pub refresh_token: Option<String>,
    /// Inference API key.
    #[arg(long)]
    pub api_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["rejection-sorter", "once", "--verbose", "-c", "x.json"])
            .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("x.json")));
        assert!(matches!(cli.command, Command::Once));
    }

    #[test]
    fn store_credentials_requires_complete_oauth_triple() {
        let result = Cli::try_parse_from([
            "rejection-sorter",
            "store-credentials",
            "--client-id",
            "id",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn store_credentials_accepts_api_key_alone() {
        let cli =
            Cli::try_parse_from(["rejection-sorter", "store-credentials", "--api-key", "k"])
                .unwrap();
        match cli.command {
            Command::StoreCredentials(args) => assert_eq!(args.api_key.as_deref(), Some("k")),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
