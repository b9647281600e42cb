//! Leaseline CLI: lease version chains and CAM-rule aggregation.
//!
//! Usage:
//!   leaseline group create --owner O --name N
//!   leaseline submit --owner O --group G --kind primary --file lease.pdf --delta '{"rent":100}'
//!   leaseline timeline --owner O --group G
//!   leaseline aggregate --dir ./cam_result

use clap::{Parser, Subcommand};
use leaseline::{Config, DocumentMetadata, GroupId, LeaseApi, OwnerId};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "leaseline",
    version,
    about = "Versioned lease details and CAM-rule aggregation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Root directory for uploaded documents
    #[arg(long, global = true)]
    blob_root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage groups (leases)
    Group {
        #[command(subcommand)]
        action: GroupAction,
    },
    /// Upload a document and advance the group's version chain
    Submit {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        group: String,
        /// Document kind: primary (or "main lease") or amendment
        #[arg(long)]
        kind: String,
        /// Document file to upload
        #[arg(long)]
        file: PathBuf,
        /// Delta as JSON, or @path to read it from a file
        #[arg(long, default_value = "{}")]
        delta: String,
        /// Content type recorded for the blob
        #[arg(long, default_value = "application/pdf")]
        content_type: String,
    },
    /// List a group's versions with their source documents, newest first
    Timeline {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        group: String,
    },
    /// Print a snapshot (the active one unless --version is given)
    Show {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        group: String,
        #[arg(long)]
        version: Option<u32>,
        /// Print every version instead of one
        #[arg(long, conflicts_with = "version")]
        all: bool,
    },
    /// Correct a historical version in place
    Amend {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        group: String,
        #[arg(long)]
        version: u32,
        /// Delta as JSON, or @path to read it from a file
        #[arg(long)]
        delta: String,
    },
    /// Fold a directory of numbered fragments and print the result
    Aggregate {
        /// Fragment directory (defaults to the configured one)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum GroupAction {
    /// Create a new group
    Create {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        name: String,
    },
    /// List an owner's groups
    List {
        #[arg(long)]
        owner: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("leaseline=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Parse a delta argument: inline JSON, or `@path` naming a JSON file.
fn read_delta(arg: &str) -> Result<serde_json::Value, String> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read delta file '{}': {}", path, e))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&text).map_err(|e| format!("delta is not valid JSON: {}", e))
}

fn print_json<T: serde::Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_group_create(api: &LeaseApi, owner: &str, name: &str) -> i32 {
    match api.create_group(&OwnerId::from(owner), name) {
        Ok(group) => {
            println!("Created group '{}' ({})", group.name, group.id);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_group_list(api: &LeaseApi, owner: &str) -> i32 {
    let groups = match api.groups(&OwnerId::from(owner)) {
        Ok(groups) => groups,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if groups.is_empty() {
        println!("No groups defined.");
        return 0;
    }
    println!("{:<36}  {:<24}  {:<20}", "ID", "NAME", "CREATED");
    println!("{}", "-".repeat(84));
    for group in groups {
        println!(
            "{:<36}  {:<24}  {:<20}",
            group.id.as_str(),
            group.name,
            group.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    0
}

async fn cmd_submit(
    api: &LeaseApi,
    owner: &str,
    group: &str,
    kind: &str,
    file: &Path,
    delta: &str,
    content_type: &str,
) -> i32 {
    let delta = match read_delta(delta) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let blob = match tokio::fs::read(file).await {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error: cannot read '{}': {}", file.display(), e);
            return 1;
        }
    };
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let metadata = DocumentMetadata::new(name, kind).with_content_type(content_type);

    match api
        .submit(&OwnerId::from(owner), &GroupId::from(group), blob, metadata, delta)
        .await
    {
        Ok(outcome) => print_json(&outcome),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_timeline(api: &LeaseApi, owner: &str, group: &str) -> i32 {
    let entries = match api.timeline(&OwnerId::from(owner), &GroupId::from(group)) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if entries.is_empty() {
        println!("No versions yet.");
        return 0;
    }
    println!("{:>7}  {:<6}  {:<10}  {:<36}  {}", "VERSION", "ACTIVE", "KIND", "DOCUMENT", "NAME");
    println!("{}", "-".repeat(90));
    for entry in entries {
        println!(
            "{:>7}  {:<6}  {:<10}  {:<36}  {}",
            entry.version,
            if entry.is_active { "yes" } else { "" },
            entry.document_kind.map(|k| k.to_string()).unwrap_or_default(),
            entry.document_id.map(|d| d.to_string()).unwrap_or_default(),
            entry.document_name.unwrap_or_default()
        );
    }
    0
}

fn cmd_show(api: &LeaseApi, owner: &str, group: &str, version: Option<u32>, all: bool) -> i32 {
    let owner = OwnerId::from(owner);
    let group = GroupId::from(group);
    let printed = if all {
        api.history(&owner, &group).map(|h| print_json(&h))
    } else {
        api.show(&owner, &group, version).map(|s| print_json(&s))
    };
    match printed {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_amend(api: &LeaseApi, owner: &str, group: &str, version: u32, delta: &str) -> i32 {
    let delta = match read_delta(delta) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match api.amend(&OwnerId::from(owner), &GroupId::from(group), version, delta) {
        Ok(snapshot) => {
            eprintln!("Warning: version {} was rewritten in place", snapshot.version);
            print_json(&snapshot)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_aggregate(dir: &Path) -> i32 {
    match LeaseApi::aggregate_directory(dir) {
        Ok(aggregation) => {
            for diagnostic in &aggregation.diagnostics {
                eprintln!("Skipped fragment {}: {}", diagnostic.sequence, diagnostic.reason);
            }
            print_json(&aggregation.result)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::from_env()
        .with_db_path(cli.db)
        .with_blob_root(cli.blob_root);

    // Aggregation needs no database
    let command = match cli.command {
        Commands::Aggregate { dir } => {
            let dir = dir.unwrap_or_else(|| config.fragment_dir.clone());
            std::process::exit(cmd_aggregate(&dir));
        }
        command => command,
    };

    let api = match LeaseApi::open(&config) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("Error: failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let code = match command {
        Commands::Group { action } => match action {
            GroupAction::Create { owner, name } => cmd_group_create(&api, &owner, &name),
            GroupAction::List { owner } => cmd_group_list(&api, &owner),
        },
        Commands::Submit {
            owner,
            group,
            kind,
            file,
            delta,
            content_type,
        } => cmd_submit(&api, &owner, &group, &kind, &file, &delta, &content_type).await,
        Commands::Timeline { owner, group } => cmd_timeline(&api, &owner, &group),
        Commands::Show {
            owner,
            group,
            version,
            all,
        } => cmd_show(&api, &owner, &group, version, all),
        Commands::Amend {
            owner,
            group,
            version,
            delta,
        } => cmd_amend(&api, &owner, &group, version, &delta),
        Commands::Aggregate { .. } => unreachable!("handled before opening the store"),
    };
    std::process::exit(code);
}
