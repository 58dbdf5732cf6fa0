//! meridian - trust and ticket management for meridian servers

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use meridian_client::{
    ClientConfig, DefaultCatalog, Endpoint, Error, RpcClient, TlsTransport, TrustOptions,
};

/// Meridian - server trust and ticket management
#[derive(Parser)]
#[command(name = "meridian", version, about)]
struct Cli {
    /// Server address as host:port
    #[arg(short = 'p', long, default_value = "localhost:1666", global = true)]
    server: String,

    /// Connect without TLS
    #[arg(long, global = true)]
    insecure: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage pinned server fingerprints
    Trust {
        #[command(subcommand)]
        action: TrustAction,
    },

    /// Manage stored authentication tickets
    Ticket {
        #[command(subcommand)]
        action: TicketAction,
    },
}

#[derive(Subcommand)]
enum TrustAction {
    /// Print the fingerprint the server currently presents
    Get,

    /// Establish trust in the server
    Add {
        /// Install without prompting
        #[arg(short = 'y', long)]
        yes: bool,

        /// Report what would be asked, install nothing
        #[arg(short = 'n', long, conflicts_with = "yes")]
        no: bool,

        /// Overwrite a mismatching installed fingerprint
        #[arg(short, long)]
        force: bool,

        /// Stage into the replacement slot instead of installing
        #[arg(short, long)]
        replacement: bool,

        /// Install this fingerprint instead of the live one
        #[arg(short = 'i', long)]
        fingerprint: Option<String>,
    },

    /// Remove the installed fingerprint
    Remove {
        /// Remove the staged replacement instead
        #[arg(short, long)]
        replacement: bool,
    },

    /// List pinned fingerprints
    List {
        /// List staged replacements instead
        #[arg(short, long)]
        replacements: bool,
    },
}

#[derive(Subcommand)]
enum TicketAction {
    /// Print the stored ticket for a user
    Get {
        /// User name
        user: String,

        /// Server id to look under (defaults to host:port)
        #[arg(long)]
        server_id: Option<String>,
    },

    /// Store (or, with no value, delete) a ticket for a user
    Set {
        /// User name
        user: String,

        /// Ticket value; omit to delete
        value: Option<String>,

        /// Server id to store under (defaults to host:port)
        #[arg(long)]
        server_id: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let result = run(cli);

    if let Err(e) = &result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ClientConfig::default(),
    };
    let endpoint = parse_endpoint(&cli.server, !cli.insecure)?;
    let client = RpcClient::new(
        config,
        endpoint,
        Arc::new(TlsTransport::new()),
        Arc::new(DefaultCatalog),
    )?;

    match cli.command {
        Commands::Trust { action } => run_trust(&client, action),
        Commands::Ticket { action } => run_ticket(&client, action),
    }
}

fn run_trust(client: &RpcClient, action: TrustAction) -> Result<()> {
    match action {
        TrustAction::Get => {
            println!("{}", client.get_trust()?);
            Ok(())
        }

        TrustAction::Add {
            yes,
            no,
            force,
            replacement,
            fingerprint,
        } => {
            let options = TrustOptions {
                auto_accept: yes,
                auto_refuse: no,
                force,
                replacement,
            };
            match client.add_trust(fingerprint.as_deref(), &options) {
                Ok(message) => {
                    print!("{message}");
                    Ok(())
                }
                // A refusal carries the full operator message; show it
                // verbatim rather than through the error chain.
                Err(Error::Trust(e)) => {
                    print!("{}", e.message);
                    std::process::exit(1);
                }
                Err(e) => Err(e.into()),
            }
        }

        TrustAction::Remove { replacement } => {
            let options = TrustOptions {
                replacement,
                ..TrustOptions::default()
            };
            print!("{}", client.remove_trust(&options)?);
            Ok(())
        }

        TrustAction::List { replacements } => {
            let entries = if replacements {
                client.get_replacement_trusts()?
            } else {
                client.get_trusts()?
            };
            for entry in entries {
                println!("{} {}", entry.server_key, entry.value);
            }
            Ok(())
        }
    }
}

fn run_ticket(client: &RpcClient, action: TicketAction) -> Result<()> {
    match action {
        TicketAction::Get { user, server_id } => {
            match client.load_ticket(server_id.as_deref(), &user) {
                Some(ticket) => {
                    println!("{ticket}");
                    Ok(())
                }
                None => bail!("no ticket stored for user '{user}'"),
            }
        }

        TicketAction::Set {
            user,
            value,
            server_id,
        } => {
            client.save_ticket(&user, server_id.as_deref(), value.as_deref())?;
            Ok(())
        }
    }
}

fn parse_endpoint(server: &str, secure: bool) -> Result<Endpoint> {
    let (host, port) = match server.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => (host, port),
        // A bare port means the local host, same as in credential files.
        _ => ("localhost", server),
    };
    let port: u16 = port
        .parse()
        .with_context(|| format!("invalid port in server address '{server}'"))?;
    Ok(Endpoint::new(host, port, secure))
}
