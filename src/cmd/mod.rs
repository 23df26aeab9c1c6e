mod dump;
mod restore;

use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::{generate, Shell};
use std::io;

const AFTER_HELP: &str = "\x1b[1mCommon workflows:\x1b[0m
  Dump a database into per-table compressed files:
    mysql-backup dump -u root -p secret -d shop --dir backups/

  Dump straight to a remote host:
    mysql-backup dump -u root -d shop --dir sftp://backup@vault/dumps/shop

  Restore, creating missing tables from schema.sql:
    mysql-backup restore -u root -d shop_copy --dir backups/ --create-tables

  Restore a filtered subset of rows:
    mysql-backup restore -u root -d shop --dir backups/ \\
        --filter 'orders(total > 100 AND status != \"cancelled\")'

\x1b[1mMore info:\x1b[0m
  Run 'mysql-backup <command> --help' for command-specific options.";

// Help heading constants for consistency
const CONNECTION: &str = "Connection";
const INPUT_OUTPUT: &str = "Input/Output";
const FILTERING: &str = "Filtering";
const BEHAVIOR: &str = "Behavior";
const OUTPUT_FORMAT: &str = "Output";

#[derive(Parser)]
#[command(name = "mysql-backup")]
#[command(version)]
#[command(about = "Parallel per-table logical backup and restore for MySQL-family databases")]
#[command(after_help = AFTER_HELP)]
#[command(arg_required_else_help = true)]
#[command(max_term_width = 100)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Database connection options shared by dump and restore.
#[derive(clap::Args, Clone)]
pub struct ConnArgs {
    /// Host name
    #[arg(long, default_value = "localhost", help_heading = CONNECTION)]
    pub hostname: String,

    /// Port number
    #[arg(long, default_value_t = 3306, help_heading = CONNECTION)]
    pub port: u16,

    /// User name
    #[arg(short, long, help_heading = CONNECTION)]
    pub username: String,

    /// Password
    #[arg(short, long, default_value = "", help_heading = CONNECTION)]
    pub password: String,

    /// Database name
    #[arg(short, long, help_heading = CONNECTION)]
    pub database: String,
}

impl ConnArgs {
    /// Build driver options, with optional per-connection init commands.
    pub fn to_opts(&self, init: Vec<String>) -> mysql::Opts {
        let builder = mysql::OptsBuilder::new()
            .ip_or_hostname(Some(self.hostname.clone()))
            .tcp_port(self.port)
            .user(Some(self.username.clone()))
            .pass(Some(self.password.clone()))
            .db_name(Some(self.database.clone()))
            .init(init);
        mysql::Opts::from(builder)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Dump all base tables into per-table compressed csjson files
    #[command(visible_alias = "dp")]
    #[command(after_help = "\x1b[1mExamples:\x1b[0m
  mysql-backup dump -u root -d shop --dir backups/
  mysql-backup dump -u root -d shop --dir backups/ --tables users,orders
  mysql-backup dump -u root -d shop --dir sftp://backup@vault/dumps --streams 4
  mysql-backup dump -u root -d shop --dir backups/ --post-file-cmd 'scp %FILE_PATH% offsite:'")]
    Dump {
        #[command(flatten)]
        conn: ConnArgs,

        /// Destination directory path or sftp:// URL
        #[arg(long, default_value = ".", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        dir: String,

        /// Only dump specific tables (comma-separated)
        #[arg(short, long, help_heading = FILTERING)]
        tables: Option<String>,

        /// Table names to skip (comma-separated)
        #[arg(long, conflicts_with = "tables", help_heading = FILTERING)]
        skip_tables: Option<String>,

        /// How many tables to dump in parallel (default: CPU count)
        #[arg(short, long, help_heading = BEHAVIOR)]
        streams: Option<usize>,

        /// Output compression: bzip2, gzip
        #[arg(long, default_value = "bzip2", help_heading = INPUT_OUTPUT)]
        compression: String,

        /// Omit the column-name header line from dump files
        #[arg(long, help_heading = INPUT_OUTPUT)]
        no_header: bool,

        /// Shell command run after each file; %FILE_NAME% and %FILE_PATH%
        /// are substituted
        #[arg(long, help_heading = BEHAVIOR)]
        post_file_cmd: Option<String>,

        /// Accept unknown SFTP host keys without verification
        #[arg(long, help_heading = BEHAVIOR)]
        sftp_insecure: bool,

        /// Show progress bar
        #[arg(long, help_heading = OUTPUT_FORMAT)]
        progress: bool,

        /// Output results as JSON
        #[arg(long, help_heading = OUTPUT_FORMAT)]
        json: bool,
    },

    /// Restore per-table dump files into a database
    #[command(visible_alias = "rs")]
    #[command(after_help = "\x1b[1mExamples:\x1b[0m
  mysql-backup restore -u root -d shop --dir backups/
  mysql-backup restore -u root -d shop --dir backups/ --create-tables --truncate-tables
  mysql-backup restore -u root -d shop --dir backups/ --filter 'users(age >= 18)'
  mysql-backup restore -u root -d shop --dir backups/ --dry-run")]
    Restore {
        #[command(flatten)]
        conn: ConnArgs,

        /// Source directory path or sftp:// URL
        #[arg(long, default_value = ".", value_hint = ValueHint::DirPath, help_heading = INPUT_OUTPUT)]
        dir: String,

        /// Only restore specific tables (comma-separated)
        #[arg(short, long, help_heading = FILTERING)]
        tables: Option<String>,

        /// Table names to skip (comma-separated)
        #[arg(long, conflicts_with = "tables", help_heading = FILTERING)]
        skip_tables: Option<String>,

        /// Row filter expression, e.g. 'table1(a == 1),table2(b IS NULL)'
        #[arg(short, long, help_heading = FILTERING)]
        filter: Option<String>,

        /// How many tables to restore in parallel (default: CPU count)
        #[arg(short, long, help_heading = BEHAVIOR)]
        streams: Option<usize>,

        /// Create tables that do not exist from schema.sql
        #[arg(long, help_heading = BEHAVIOR)]
        create_tables: bool,

        /// Clear existing tables before restoring
        #[arg(long, help_heading = BEHAVIOR)]
        truncate_tables: bool,

        /// Print INSERT statements instead of executing them
        #[arg(long, help_heading = BEHAVIOR)]
        dry_run: bool,

        /// Accept unknown SFTP host keys without verification
        #[arg(long, help_heading = BEHAVIOR)]
        sftp_insecure: bool,

        /// Show progress bar
        #[arg(long, help_heading = OUTPUT_FORMAT)]
        progress: bool,

        /// Output results as JSON
        #[arg(long, help_heading = OUTPUT_FORMAT)]
        json: bool,
    },

    /// Generate shell completions
    #[command(after_help = "\x1b[1mExamples:\x1b[0m
  mysql-backup completions bash > /etc/bash_completion.d/mysql-backup
  mysql-backup completions zsh > ~/.zfunc/_mysql-backup")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Dump {
            conn,
            dir,
            tables,
            skip_tables,
            streams,
            compression,
            no_header,
            post_file_cmd,
            sftp_insecure,
            progress,
            json,
        } => dump::run(
            conn,
            dir,
            tables,
            skip_tables,
            streams,
            compression,
            no_header,
            post_file_cmd,
            sftp_insecure,
            progress,
            json,
        ),
        Commands::Restore {
            conn,
            dir,
            tables,
            skip_tables,
            filter,
            streams,
            create_tables,
            truncate_tables,
            dry_run,
            sftp_insecure,
            progress,
            json,
        } => restore::run(
            conn,
            dir,
            tables,
            skip_tables,
            filter,
            streams,
            create_tables,
            truncate_tables,
            dry_run,
            sftp_insecure,
            progress,
            json,
        ),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    }
}

/// Number of parallel streams, defaulting to the host CPU count.
pub(crate) fn resolve_streams(streams: Option<usize>) -> usize {
    streams.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(4)
    })
}

/// Split a comma-separated table list into trimmed names.
pub(crate) fn parse_table_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Apply --tables / --skip-tables selection to the full table list.
pub(crate) fn select_tables(
    all: Vec<String>,
    tables: Option<&str>,
    skip_tables: Option<&str>,
) -> Vec<String> {
    if let Some(explicit) = tables {
        return parse_table_list(explicit);
    }
    let skip: ahash::AHashSet<String> = skip_tables
        .map(|s| parse_table_list(s).into_iter().collect())
        .unwrap_or_default();
    all.into_iter().filter(|t| !skip.contains(t)).collect()
}

/// Progress bar over table count, hidden unless requested.
pub(crate) fn table_progress(enabled: bool, total: u64) -> indicatif::ProgressBar {
    if !enabled {
        return indicatif::ProgressBar::hidden();
    }
    let pb = indicatif::ProgressBar::new(total);
    pb.set_style(
        indicatif::ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tables {msg}",
        )
        .unwrap()
        .progress_chars("█▓▒░  "),
    );
    pb
}
