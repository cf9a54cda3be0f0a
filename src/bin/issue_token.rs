//! Issue (or reuse) a file token from the command line.
//!
//! Used by page renderers that shell out instead of linking the library.
//! Prints the `/getfilesrc/<token>` URL on stdout.

use clap::Parser;
use file_token_gateway::{config::Config, services::token_issuer::TokenIssuer, store};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "issue-token", about = "Issue a time-limited token for a stored file")]
struct Args {
    /// File reference, e.g. `/system/files/report.pdf` or `sites/default/files/a%20b.png`
    #[arg(long)]
    file_reference: String,

    /// Entity that owns the file reference
    #[arg(long)]
    owner_entity_id: i64,

    /// Override the configured token lifetime
    #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
    ttl_secs: Option<i64>,

    /// Print the bare token instead of the URL
    #[arg(long)]
    token_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only the token
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    if config.database_url.is_none() {
        anyhow::bail!("DATABASE_URL must be set; tokens issued in memory would never resolve");
    }

    let store = store::connect(&config).await?;
    let issuer = TokenIssuer::new(store, &config)?;

    let issued = match args.ttl_secs {
        Some(secs) => {
            let ttl = chrono::Duration::try_seconds(secs)
                .ok_or_else(|| anyhow::anyhow!("--ttl-secs out of range: {secs}"))?;
            issuer
                .issue_or_reuse(&args.file_reference, args.owner_entity_id, ttl)
                .await
        }
        None => issuer.issue(&args.file_reference, args.owner_entity_id).await,
    };

    if !issued.is_durable() {
        tracing::warn!(token = %issued.token, "Token was not persisted and will not resolve");
    }

    if args.token_only {
        println!("{}", issued.token);
    } else {
        println!("{}", issued.url);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        let mut argv = vec![
            "issue-token",
            "--file-reference",
            "/system/files/report.pdf",
            "--owner-entity-id",
            "7",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv)
    }

    #[test]
    fn negative_ttl_is_rejected() {
        assert!(parse(&["--ttl-secs", "-5"]).is_err());
        assert!(parse(&["--ttl-secs=-1"]).is_err());
    }

    #[test]
    fn ttl_override_is_optional() {
        assert_eq!(parse(&["--ttl-secs", "60"]).unwrap().ttl_secs, Some(60));
        assert_eq!(parse(&["--ttl-secs", "0"]).unwrap().ttl_secs, Some(0));
        assert_eq!(parse(&[]).unwrap().ttl_secs, None);
    }
}
