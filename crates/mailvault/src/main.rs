//! `mailvault` - mirror a Gmail account into a local archive and back.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;

use anyhow::{Context, bail};
use clap::Parser;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mailvault_core::{ArchiveStore, OpReport, RestoreOptions, SyncMode, SyncOptions};
use mailvault_imap::{Credential, RetryPolicy, RetrySession, SessionConfig};
use mailvault_oauth::RefreshConfig;

use cli::{CheckArgs, Cli, Command, ConnectionArgs, RestoreArgs, SyncArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailvault=info,mailvault_core=info,mailvault_imap=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Sync(args) => run_sync(args).await,
        Command::Restore(args) => run_restore(args).await,
        Command::Check(args) => run_check(&args),
    }
}

async fn run_sync(args: SyncArgs) -> anyhow::Result<()> {
    let store = ArchiveStore::open(&args.db_dir)
        .with_context(|| format!("cannot open archive at {}", args.db_dir.display()))?;

    let mode = match (args.since, args.query) {
        (Some(date), None) => SyncMode::Since(date),
        (None, Some(query)) => SyncMode::Query(query),
        _ => SyncMode::Full,
    };
    let options = SyncOptions {
        mode,
        compress: !args.no_compress,
        encrypt: args.encrypt,
        clean: args.clean,
        allow_multi_owner: args.allow_multi_owner,
        resume: !args.no_resume,
        emails: !args.chats_only,
        chats: !args.emails_only,
        batch_size: args.batch_size,
        checkpoint_every: args.checkpoint_every,
        chat_bucket_cap: args.chat_bucket_cap,
    };

    let account = args.connection.account.clone();
    let mut session = connect(&args.connection).await?;
    let result = mailvault_core::sync(&mut session, &store, &account, &options).await;
    let _ = session.logout().await;

    let report = result.context("sync failed")?;
    render(&report);
    Ok(())
}

async fn run_restore(args: RestoreArgs) -> anyhow::Result<()> {
    let store = ArchiveStore::open(&args.db_dir)
        .with_context(|| format!("cannot open archive at {}", args.db_dir.display()))?;

    let options = RestoreOptions {
        resume: !args.no_resume,
        quick: args.quick,
        emails: !args.chats_only,
        chats: !args.emails_only,
        batch_size: args.batch_size,
        checkpoint_every: args.checkpoint_every,
        apply_label_batch: args.apply_label_batch,
    };

    let account = args.connection.account.clone();
    let mut session = connect(&args.connection).await?;
    let result = mailvault_core::restore(&mut session, &store, &account, &options).await;
    let _ = session.logout().await;

    let report = result.context("restore failed")?;
    render(&report);
    Ok(())
}

fn run_check(args: &CheckArgs) -> anyhow::Result<()> {
    let store = ArchiveStore::open(&args.db_dir)
        .with_context(|| format!("cannot open archive at {}", args.db_dir.display()))?;

    let owners = store.owners()?;
    let mail = store.mail_ids(None)?;
    let chats = store.chat_ids()?;

    let mut missing_content = Vec::new();
    for &id in mail.iter().chain(&chats) {
        if !store.has_content(id)? {
            missing_content.push(id);
        }
    }

    println!("archive:          {}", args.db_dir.display());
    println!("owners:           {}", owners.join(", "));
    println!("messages:         {}", mail.len());
    println!("chats:            {}", chats.len());
    println!("missing content:  {}", missing_content.len());
    for id in &missing_content {
        println!("  metadata without content: {id}");
    }

    if missing_content.is_empty() {
        Ok(())
    } else {
        bail!("{} record(s) have metadata but no content", missing_content.len())
    }
}

/// Builds credentials, connects and resolves the account's folders.
async fn connect(args: &ConnectionArgs) -> anyhow::Result<RetrySession> {
    let credential = credential(args)?;
    let config = SessionConfig::new(&args.host, args.port, &args.account)
        .credential(credential)
        .compress(!args.no_stream_compression);

    info!(host = %args.host, account = %args.account, "connecting");
    let mut session = RetrySession::new(config, RetryPolicy::default());
    session
        .connect()
        .await
        .with_context(|| format!("cannot connect to {}:{}", args.host, args.port))?;
    Ok(session)
}

/// OAuth2 material as stored on disk by the grant flow.
#[derive(Deserialize)]
struct OauthFile {
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

fn credential(args: &ConnectionArgs) -> anyhow::Result<Credential> {
    if let Some(var) = &args.password_env {
        let password = std::env::var(var)
            .with_context(|| format!("environment variable {var} is not set"))?;
        return Ok(Credential::Password(password));
    }
    if let Some(path) = &args.oauth_file {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let file: OauthFile = serde_json::from_str(&json)
            .with_context(|| format!("{} is not a valid OAuth file", path.display()))?;
        return Ok(Credential::OAuth(RefreshConfig::gmail(
            file.client_id,
            file.client_secret,
            file.refresh_token,
        )));
    }
    bail!("one of --password-env or --oauth-file is required");
}

fn render(report: &OpReport) {
    println!("fetched:        {}", report.fetched);
    println!("pushed:         {}", report.pushed);
    println!("skipped:        {}", report.skipped);
    println!("cleaned:        {}", report.cleaned);
    println!("quarantined:    {}", report.quarantined);
    println!("reconnections:  {}", report.reconnections);
    if !report.cannot_fetched_ids.is_empty() {
        println!("could not fetch: {:?}", report.cannot_fetched_ids);
    }
    if !report.empty_ids.is_empty() {
        println!("empty items:     {:?}", report.empty_ids);
    }
}
