use std::{num::NonZeroUsize, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

use crate::{
    api::client::{ApiClient, ClientConfig},
    drain::{Collection, DrainOptions, Drainer, RecordStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// Empties a backend of all users and tasks, re-listing each collection until it comes back empty
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// The host of the API server to clean
    #[arg(short = 'u', long = "url", env = "DB_CLEAN_URL", default_value = "localhost")]
    pub host: String,

    /// The port of the API server to clean
    #[arg(short, long, env = "DB_CLEAN_PORT", default_value_t = 4000)]
    pub port: u16,

    /// The scheme used to reach the API server
    #[arg(long, value_enum, env = "DB_CLEAN_SCHEME", default_value_t = Scheme::Https)]
    pub scheme: Scheme,

    /// Whether to skip SSL verification when talking to the API server - only use against
    /// servers with self-signed certificates
    #[arg(long, env = "DB_CLEAN_SKIP_SSL_VERIFICATION", default_value = "false")]
    pub skip_ssl_verification: bool,

    /// Give up on a collection that still lists records after this many passes. Unbounded by
    /// default
    #[arg(long, env = "DB_CLEAN_MAX_PASSES")]
    pub max_passes: Option<NonZeroUsize>,

    /// Only drain these collections, in the order given. Defaults to users, then tasks
    #[arg(long = "collection", value_enum)]
    pub collections: Vec<Collection>,

    /// Report how many records each collection holds without deleting anything
    #[arg(long, default_value = "false")]
    pub dry_run: bool,

    /// Per-request timeout. Requests wait indefinitely by default
    #[arg(long, env = "DB_CLEAN_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let client = ApiClient::from_config(self.client_config()?)
            .context("Failed to build HTTP client")?;
        let collections = self.selected_collections();

        if self.dry_run {
            for collection in &collections {
                let count = client
                    .count(*collection)
                    .with_context(|| format!("Failed to count {collection}"))?;
                println!("{collection}: {count} record(s) would be removed");
            }
            return Ok(());
        }

        let drainer = Drainer::new(&client, self.drain_options());
        for collection in &collections {
            let report = drainer.drain(*collection)?;
            info!(
                %collection,
                passes = report.passes,
                deleted = report.deleted,
                "finished collection"
            );
        }
        drop(client);

        println!("{}", confirmation(&collections, &self.host, self.port));
        Ok(())
    }

    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::from_parts(self.scheme.as_str(), &self.host, self.port)?;
        config.verify_server_certificate = !self.skip_ssl_verification;
        config.timeout = self.timeout_secs.map(Duration::from_secs);
        Ok(config)
    }

    pub fn drain_options(&self) -> DrainOptions {
        DrainOptions {
            max_passes: self.max_passes,
        }
    }

    /// The collections to drain, without repeats, in the order they were asked for.
    pub fn selected_collections(&self) -> Vec<Collection> {
        if self.collections.is_empty() {
            return Collection::ALL.to_vec();
        }
        let mut selected: Vec<Collection> = Vec::with_capacity(self.collections.len());
        for collection in &self.collections {
            if !selected.contains(collection) {
                selected.push(*collection);
            }
        }
        selected
    }
}

/// The line printed once every selected collection has been drained.
pub fn confirmation(collections: &[Collection], host: &str, port: u16) -> String {
    format!("All {} removed at {host}:{port}", describe(collections))
}

fn describe(collections: &[Collection]) -> String {
    collections
        .iter()
        .map(Collection::as_str)
        .collect::<Vec<_>>()
        .join(" and ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("db-clean").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_target_local_backend() {
        let cli = parse(&[]).unwrap();
        assert_eq!(cli.host, "localhost");
        assert_eq!(cli.port, 4000);
        assert_eq!(cli.scheme, Scheme::Https);
        assert!(!cli.skip_ssl_verification);
        assert!(!cli.dry_run);
        assert_eq!(cli.max_passes, None);
        assert_eq!(
            cli.selected_collections(),
            vec![Collection::Users, Collection::Tasks]
        );

        let config = cli.client_config().unwrap();
        assert_eq!(config.endpoint.as_str(), "https://localhost:4000/");
        assert!(config.verify_server_certificate);
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn short_and_long_flags() {
        let cli = parse(&["-u", "api.example.com", "-p", "8443"]).unwrap();
        assert_eq!(cli.host, "api.example.com");
        assert_eq!(cli.port, 8443);

        let cli = parse(&["--url=api.example.com", "--port=8443"]).unwrap();
        assert_eq!(cli.host, "api.example.com");
        assert_eq!(cli.port, 8443);
    }

    #[test]
    fn certificate_checks_are_opt_out() {
        let cli = parse(&["--skip-ssl-verification", "--timeout-secs", "5"]).unwrap();
        let config = cli.client_config().unwrap();
        assert!(!config.verify_server_certificate);
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn collections_keep_order_and_drop_repeats() {
        let cli = parse(&[
            "--collection",
            "tasks",
            "--collection",
            "users",
            "--collection",
            "tasks",
        ])
        .unwrap();
        assert_eq!(
            cli.selected_collections(),
            vec![Collection::Tasks, Collection::Users]
        );
        assert_eq!(describe(&cli.selected_collections()), "tasks and users");
        assert_eq!(describe(&[Collection::Users]), "users");
    }

    #[test]
    fn confirmation_names_drained_collections_and_target() {
        assert_eq!(
            confirmation(&Collection::ALL, "localhost", 4000),
            "All users and tasks removed at localhost:4000"
        );
        assert_eq!(
            confirmation(&[Collection::Tasks], "api.example.com", 443),
            "All tasks removed at api.example.com:443"
        );
    }

    #[test]
    fn max_passes_must_be_positive() {
        let cli = parse(&["--max-passes", "3"]).unwrap();
        assert_eq!(cli.drain_options().max_passes, NonZeroUsize::new(3));

        let err = parse(&["--max-passes", "0"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn bad_arguments_exit_with_status_two() {
        let err = parse(&["-p", "not-a-port"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let err = parse(&["-p", "70000"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let err = parse(&["--bogus"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn help_exits_successfully() {
        let err = parse(&["-h"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        assert_eq!(err.exit_code(), 0);
    }
}
