//! These structs provide the CLI interface for the ledger CLI.

use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// ledger: a command-line tool for building a deduplicated expense ledger.
///
/// The purpose of this program is to take the CSV statement exports that
/// banks and card issuers produce, normalize them into one canonical
/// transaction schema, and merge them into a durable per-user ledger that
/// never gains duplicates no matter how often overlapping statements are
/// re-uploaded. Categorizing the resulting transactions is left to human
/// review in whatever tool reads the ledger.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the data directory and initialize the configuration files.
    ///
    /// This is the first command you should run. Decide what directory you
    /// want ledger data stored in and pass it as --ledger-home (default
    /// $HOME/ledger). The blob store the pipeline reads and writes defaults
    /// to a `store` subdirectory; point --store somewhere else to share a
    /// store between machines.
    Init(InitArgs),
    /// Normalize a statement CSV and merge it into a user's ledger.
    Ingest(IngestArgs),
    /// Summarize a user's ledger: row counts and per-issuer latest dates.
    Status(StatusArgs),
    /// List the registered issuers and their statement schemas.
    Issuers,
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where ledger data and configuration is held.
    /// Defaults to ~/ledger
    #[arg(long, env = "LEDGER_HOME", default_value_t = default_ledger_home())]
    ledger_home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, ledger_home: PathBuf) -> Self {
        Self {
            log_level,
            ledger_home: ledger_home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn ledger_home(&self) -> &DisplayPath {
        &self.ledger_home
    }
}

/// Args for the `ledger init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// Directory for the blob store. Relative paths resolve against the
    /// ledger home directory.
    #[arg(long)]
    store: Option<PathBuf>,
}

impl InitArgs {
    pub fn new(store: Option<PathBuf>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Option<&PathBuf> {
        self.store.as_ref()
    }
}

/// Args for the `ledger ingest` command.
#[derive(Debug, Parser, Clone)]
pub struct IngestArgs {
    /// The statement CSV file to ingest.
    #[arg(long, short = 'f')]
    file: PathBuf,

    /// The issuer the statement came from, e.g. "amex" or "chase".
    /// Matched against the registry after lower-casing.
    #[arg(long)]
    issuer: String,

    /// The user whose ledger receives the transactions.
    #[arg(long)]
    user: String,
}

impl IngestArgs {
    pub fn new(file: PathBuf, issuer: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            file,
            issuer: issuer.into(),
            user: user.into(),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

/// Args for the `ledger status` command.
#[derive(Debug, Parser, Clone)]
pub struct StatusArgs {
    /// The user whose ledger to summarize.
    #[arg(long)]
    user: String,
}

impl StatusArgs {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

fn default_ledger_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("ledger"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --ledger-home or LEDGER_HOME instead of relying on the default \
                ledger home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("ledger")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}
