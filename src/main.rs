use clap::error::ErrorKind;
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use env_logger::Env;
use log::debug;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use p3ipam::commands;
use p3ipam::config_loader::{self, PingCliOverrides};
use p3ipam::id::RecordId;
use p3ipam::ip::SystemPing;
use p3ipam::types::{HostChanges, NewHost, NewSubnet, SubnetChanges};
use p3ipam::utils::duration::parse_duration;

/// Lightweight IP address management
#[derive(Parser, Debug)]
#[command(name = "p3ipam", author, version, about, long_about = None)]
#[command(after_help = "Parent references (--parent) accept a subnet ID, name or CIDR.\n\
Examples:\n  \
p3ipam add subnet --cidr 192.168.1.0/24 --name home-network\n  \
p3ipam add host --parent home-network --address 192.168.1.1 --name router\n  \
p3ipam search 192.168.1\n  \
p3ipam ping subnet home-network")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding p3ipam.db [env: P3IPAM_DATADIR, default: /opt/p3ipam/.data]
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the database
    Init,

    /// Show version information
    Version,

    /// Add a new subnet or host
    Add {
        #[command(subcommand)]
        object: AddObject,
    },

    /// List records of one kind
    List {
        #[arg(value_enum)]
        object: ListObject,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Delete a subnet or host by ID
    Delete {
        #[arg(value_enum)]
        object: RecordObject,

        id: RecordId,
    },

    /// Change fields of a subnet or host
    Edit {
        #[command(subcommand)]
        object: EditObject,
    },

    /// Ping every address of a subnet and record what answers
    Ping {
        #[command(subcommand)]
        object: PingObject,
    },

    /// Search across all records (case-sensitive substring match)
    Search {
        query: String,

        /// Print JSON instead of grouped text
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum AddObject {
    /// Network subnet (e.g. 192.168.1.0/24)
    Subnet {
        #[arg(long)]
        cidr: String,
        #[arg(long)]
        name: Option<String>,
        /// Parent subnet ID, name or CIDR
        #[arg(long, default_value = "")]
        parent: String,
        #[arg(long, default_value = "")]
        comment: String,
    },

    /// Network host (e.g. 192.168.1.1)
    Host {
        #[arg(long)]
        address: String,
        #[arg(long)]
        name: Option<String>,
        /// Parent subnet ID, name or CIDR
        #[arg(long, default_value = "")]
        parent: String,
        #[arg(long, default_value = "")]
        comment: String,
    },
}

#[derive(Subcommand, Debug)]
enum EditObject {
    /// Edit a subnet; an empty --parent detaches it
    #[command(group(
        ArgGroup::new("changes")
            .required(true)
            .multiple(true)
            .args(["cidr", "name", "parent", "comment"])
    ))]
    Subnet {
        id: RecordId,
        #[arg(long)]
        cidr: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        parent: Option<String>,
        #[arg(long)]
        comment: Option<String>,
    },

    /// Edit a host; an empty --parent detaches it
    #[command(group(
        ArgGroup::new("changes")
            .required(true)
            .multiple(true)
            .args(["address", "name", "parent", "comment"])
    ))]
    Host {
        id: RecordId,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        parent: Option<String>,
        #[arg(long)]
        comment: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum PingObject {
    /// Sweep a subnet given by ID, name or CIDR
    Subnet {
        reference: String,

        /// Per-address timeout (e.g. 500ms, 2s)
        #[arg(long, value_parser = parse_duration)]
        timeout: Option<Duration>,

        /// Concurrent probes
        #[arg(long)]
        workers: Option<usize>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ListObject {
    Subnets,
    Hosts,
    Discoveries,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum RecordObject {
    Subnet,
    Host,
}

/// Help and version requests keep clap's own handling; every other parse
/// failure is a usage message on standard output.
fn is_usage_error(err: &clap::Error) -> bool {
    !matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion)
}

/// Writes the rendered usage message and returns the exit status to use.
fn report_usage_error(err: &clap::Error, out: &mut impl Write) -> io::Result<i32> {
    write!(out, "{}", err.render())?;
    out.flush()?;
    Ok(err.exit_code())
}

fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if is_usage_error(&err) => {
            let code = report_usage_error(&err, &mut io::stdout().lock()).unwrap_or(2);
            std::process::exit(code)
        }
        Err(err) => err.exit(),
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = parse_cli();

    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();
    debug!("Parsed command line: {:?}", cli);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if let Commands::Version = cli.command {
        return commands::version(&mut out);
    }

    let mut config = config_loader::load_config(cli.data_dir.as_deref())?;
    if let Commands::Init = cli.command {
        return commands::init(&config, &mut out);
    }

    let mut store = commands::open_store(&config)?;
    match cli.command {
        Commands::Init | Commands::Version => Ok(()),
        Commands::Add { object } => match object {
            AddObject::Subnet {
                cidr,
                name,
                parent,
                comment,
            } => commands::add_subnet(
                &mut store,
                NewSubnet {
                    cidr,
                    name,
                    parent,
                    comment,
                },
                &mut out,
            ),
            AddObject::Host {
                address,
                name,
                parent,
                comment,
            } => commands::add_host(
                &mut store,
                NewHost {
                    address,
                    name,
                    parent,
                    comment,
                },
                &mut out,
            ),
        },
        Commands::List { object, json } => match object {
            ListObject::Subnets => commands::list_subnets(&store, json, &mut out),
            ListObject::Hosts => commands::list_hosts(&store, json, &mut out),
            ListObject::Discoveries => commands::list_discoveries(&store, json, &mut out),
        },
        Commands::Delete { object, id } => match object {
            RecordObject::Subnet => commands::delete_subnet(&mut store, &id, &mut out),
            RecordObject::Host => commands::delete_host(&mut store, &id, &mut out),
        },
        Commands::Edit { object } => match object {
            EditObject::Subnet {
                id,
                cidr,
                name,
                parent,
                comment,
            } => commands::edit_subnet(
                &mut store,
                &id,
                SubnetChanges {
                    cidr,
                    name,
                    parent,
                    comment,
                },
                &mut out,
            ),
            EditObject::Host {
                id,
                address,
                name,
                parent,
                comment,
            } => commands::edit_host(
                &mut store,
                &id,
                HostChanges {
                    address,
                    name,
                    parent,
                    comment,
                },
                &mut out,
            ),
        },
        Commands::Ping { object } => match object {
            PingObject::Subnet {
                reference,
                timeout,
                workers,
            } => {
                config_loader::apply_ping_overrides(&mut config, &PingCliOverrides { timeout, workers })?;
                let prober = SystemPing::from_config(&config.ping);
                commands::ping_subnet(&mut store, &config, &reference, &prober, &mut out)
            }
        },
        Commands::Search { query, json } => commands::search(&store, &query, json, &mut out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add_subnet() {
        let cli = Cli::try_parse_from([
            "p3ipam", "add", "subnet", "--cidr", "10.0.0.0/24", "--name", "lab",
        ])
        .unwrap();
        match cli.command {
            Commands::Add {
                object: AddObject::Subnet { cidr, name, parent, comment },
            } => {
                assert_eq!(cidr, "10.0.0.0/24");
                assert_eq!(name.as_deref(), Some("lab"));
                assert!(parent.is_empty());
                assert!(comment.is_empty());
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(cli.log_level, "warn");
    }

    #[test]
    fn test_missing_required_flag_is_usage_error() {
        let err = Cli::try_parse_from(["p3ipam", "add", "host", "--name", "x"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_unknown_object_is_usage_error() {
        assert!(Cli::try_parse_from(["p3ipam", "list", "routers"]).is_err());
        assert!(Cli::try_parse_from(["p3ipam", "frobnicate"]).is_err());
    }

    #[test]
    fn test_usage_errors_are_written_to_the_given_stream() {
        let err = Cli::try_parse_from(["p3ipam", "add", "host", "--name", "x"]).unwrap_err();
        assert!(is_usage_error(&err));
        let mut out = Vec::new();
        assert_eq!(report_usage_error(&err, &mut out).unwrap(), 2);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("--address"));
        assert!(text.contains("Usage"));

        let err = Cli::try_parse_from(["p3ipam", "frobnicate"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        assert!(is_usage_error(&err));
        let mut out = Vec::new();
        assert_ne!(report_usage_error(&err, &mut out).unwrap(), 0);
        assert!(String::from_utf8(out).unwrap().contains("frobnicate"));
    }

    #[test]
    fn test_help_and_version_keep_clap_handling() {
        let err = Cli::try_parse_from(["p3ipam", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        assert!(!is_usage_error(&err));

        let err = Cli::try_parse_from(["p3ipam", "--version"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayVersion);
        assert!(!is_usage_error(&err));
    }

    #[test]
    fn test_malformed_id_is_rejected() {
        assert!(Cli::try_parse_from(["p3ipam", "delete", "host", "12"]).is_err());

        let cli = Cli::try_parse_from(["p3ipam", "delete", "host", "abc123"]).unwrap();
        match cli.command {
            Commands::Delete { object, id } => {
                assert_eq!(object, RecordObject::Host);
                assert_eq!(id.as_str(), "ABC123");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_edit_requires_a_change() {
        assert!(Cli::try_parse_from(["p3ipam", "edit", "subnet", "ABC123"]).is_err());
        assert!(Cli::try_parse_from(["p3ipam", "edit", "subnet", "ABC123", "--parent", ""]).is_ok());
    }

    #[test]
    fn test_ping_options_and_global_flags() {
        let cli = Cli::try_parse_from([
            "p3ipam", "ping", "subnet", "lab", "--timeout", "500ms", "--workers", "4",
            "--data-dir", "/tmp/ipam",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/ipam")));
        match cli.command {
            Commands::Ping {
                object: PingObject::Subnet { reference, timeout, workers },
            } => {
                assert_eq!(reference, "lab");
                assert_eq!(timeout, Some(Duration::from_millis(500)));
                assert_eq!(workers, Some(4));
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Cli::try_parse_from(["p3ipam", "ping", "subnet", "lab", "--timeout", "soon"]).is_err());
    }

    #[test]
    fn test_search_and_list_json() {
        let cli = Cli::try_parse_from(["p3ipam", "search", "192.168", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Search { ref query, json: true } if query == "192.168"));

        let cli = Cli::try_parse_from(["p3ipam", "list", "discoveries"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::List { object: ListObject::Discoveries, json: false }
        ));
    }
}
