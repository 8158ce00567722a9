//! Command-line interface definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

/// Gmail mailbox archiver.
#[derive(Debug, Parser)]
#[command(name = "mailvault", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Mirror the remote account into the local archive.
    Sync(SyncArgs),
    /// Replay the local archive into a (possibly different) account.
    Restore(RestoreArgs),
    /// Inspect the archive offline: owners, partitions, broken pairs.
    Check(CheckArgs),
}

/// Connection and credential flags shared by sync and restore.
#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// Account email address.
    #[arg(long)]
    pub account: String,

    /// IMAP server hostname.
    #[arg(long, default_value = "imap.gmail.com")]
    pub host: String,

    /// IMAP server port.
    #[arg(long, default_value_t = 993)]
    pub port: u16,

    /// Environment variable holding the account password or app password.
    #[arg(long, group = "credential")]
    pub password_env: Option<String>,

    /// JSON file with OAuth2 client_id, client_secret and refresh_token.
    #[arg(long, group = "credential")]
    pub oauth_file: Option<PathBuf>,

    /// Skip COMPRESS=DEFLATE negotiation.
    #[arg(long)]
    pub no_stream_compression: bool,
}

/// `mailvault sync` flags.
#[derive(Debug, Args)]
#[command(group = clap::ArgGroup::new("mode").multiple(false))]
#[allow(clippy::struct_excessive_bools)]
pub struct SyncArgs {
    /// Archive root directory.
    #[arg(long, short = 'd')]
    pub db_dir: PathBuf,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Only messages received on or after this date (YYYY-MM-DD).
    #[arg(long, group = "mode")]
    pub since: Option<NaiveDate>,

    /// Gmail free-text search query instead of a full enumeration.
    #[arg(long, group = "mode")]
    pub query: Option<String>,

    /// Store content files uncompressed.
    #[arg(long)]
    pub no_compress: bool,

    /// Encrypt content files with a key kept inside the archive.
    #[arg(long)]
    pub encrypt: bool,

    /// After a full sync, move remotely-deleted records to the bin.
    #[arg(long)]
    pub clean: bool,

    /// Permit syncing a second account into this archive.
    #[arg(long)]
    pub allow_multi_owner: bool,

    /// Ignore any existing checkpoint and start from the beginning.
    #[arg(long)]
    pub no_resume: bool,

    /// Sync only ordinary messages.
    #[arg(long, conflicts_with = "chats_only")]
    pub emails_only: bool,

    /// Sync only chat transcripts.
    #[arg(long)]
    pub chats_only: bool,

    /// Ids per fetch round trip.
    #[arg(long, default_value_t = 500)]
    pub batch_size: usize,

    /// Checkpoint after this many processed items.
    #[arg(long, default_value_t = 100)]
    pub checkpoint_every: usize,

    /// Chat transcripts per bucket before rotating to a new one.
    #[arg(long, default_value_t = 1000)]
    pub chat_bucket_cap: usize,
}

/// `mailvault restore` flags.
#[derive(Debug, Args)]
#[allow(clippy::struct_excessive_bools)]
pub struct RestoreArgs {
    /// Archive root directory.
    #[arg(long, short = 'd')]
    pub db_dir: PathBuf,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Restore only the most recent partitions.
    #[arg(long)]
    pub quick: bool,

    /// Ignore any existing checkpoint and start from the beginning.
    #[arg(long)]
    pub no_resume: bool,

    /// Restore only ordinary messages.
    #[arg(long, conflicts_with = "chats_only")]
    pub emails_only: bool,

    /// Restore only chat transcripts.
    #[arg(long)]
    pub chats_only: bool,

    /// Records pushed per batch.
    #[arg(long, default_value_t = 100)]
    pub batch_size: usize,

    /// Checkpoint after this many pushed items.
    #[arg(long, default_value_t = 50)]
    pub checkpoint_every: usize,

    /// Uids per label-application command.
    #[arg(long, default_value_t = 500)]
    pub apply_label_batch: usize,
}

/// `mailvault check` flags.
#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Archive root directory.
    #[arg(long, short = 'd')]
    pub db_dir: PathBuf,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn sync_flags_parse() {
        let cli = Cli::try_parse_from([
            "mailvault",
            "sync",
            "--db-dir",
            "/tmp/archive",
            "--account",
            "a@gmail.com",
            "--password-env",
            "MAILVAULT_PASSWORD",
            "--since",
            "2021-03-01",
            "--encrypt",
        ])
        .unwrap();

        let Command::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert_eq!(args.connection.account, "a@gmail.com");
        assert_eq!(args.since, NaiveDate::from_ymd_opt(2021, 3, 1));
        assert!(args.encrypt);
        assert!(!args.clean);
    }

    #[test]
    fn since_and_query_are_mutually_exclusive() {
        let result = Cli::try_parse_from([
            "mailvault",
            "sync",
            "--db-dir",
            "/tmp/archive",
            "--account",
            "a@gmail.com",
            "--since",
            "2021-03-01",
            "--query",
            "from:bob",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn credential_sources_are_mutually_exclusive() {
        let result = Cli::try_parse_from([
            "mailvault",
            "restore",
            "--db-dir",
            "/tmp/archive",
            "--account",
            "a@gmail.com",
            "--password-env",
            "P",
            "--oauth-file",
            "token.json",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn check_needs_only_the_archive() {
        let cli = Cli::try_parse_from(["mailvault", "check", "-d", "/tmp/archive"]).unwrap();
        assert!(matches!(cli.command, Command::Check(_)));
    }
}
