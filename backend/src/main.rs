//! BGSTrans CLI - coordinate and height transformations
//!
//! # Main Commands
//!
//! ```bash
//! bgstrans serve                                       # Start HTTP server (port 3000)
//! bgstrans transform --ics cs1 --ocs cs2 \
//!          --ihs hs1 --ohs hs2 points.txt              # Transform a point file
//! bgstrans route --kind hs hs1 hs6 hs4                 # Show a forwarding tree
//! bgstrans check-config                                # Schema + consistency report
//! ```
//!
//! The configuration file comes from `--config`, then `BGSTRANS_CONFIG`, then
//! `config.json`. The grid directory comes from `--grid-dir`, then
//! `BGSTRANS_GRID_DIR`, then the configuration.

use clap::{Parser, Subcommand, ValueEnum};
use bgstrans::config::{resolve_config_path, resolve_grid_directory, AppConfig, Repository};
use bgstrans::graph::{dual_target_path, ForwardingPath};
use bgstrans::parser::{read_point_file, write_point_file, write_rows, Delimiter};
use bgstrans::server::start_server;
use bgstrans::transform::{transform_rows, SystemSelection};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "bgstrans")]
#[command(about = "Transform coordinates and heights between reference systems", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding grid height models
    #[arg(long, global = true)]
    grid_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum GraphKind {
    Cs,
    Hs,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Transform a point file
    Transform {
        /// Input point file
        input: PathBuf,

        /// Input coordinate system
        #[arg(long)]
        ics: String,

        /// Input coordinate system variant
        #[arg(long)]
        icsv: Option<String>,

        /// Output coordinate system
        #[arg(long)]
        ocs: String,

        /// Output coordinate system variant
        #[arg(long)]
        ocsv: Option<String>,

        /// Input height system
        #[arg(long)]
        ihs: String,

        /// Output height system
        #[arg(long)]
        ohs: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the forwarding tree between systems
    Route {
        /// Graph to search
        #[arg(long, value_enum, default_value = "cs")]
        kind: GraphKind,

        /// Source system
        from: String,

        /// Target system
        to: String,

        /// Optional second target
        second: Option<String>,
    },

    /// Validate the configuration file
    CheckConfig,
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let grid_dir = resolve_grid_directory(cli.grid_dir.as_deref());

    let result = match cli.command {
        Commands::Serve { port } => cmd_serve(&config_path, grid_dir, port).await,

        Commands::Transform {
            input,
            ics,
            icsv,
            ocs,
            ocsv,
            ihs,
            ohs,
            output,
        } => {
            let selection = SystemSelection {
                ics,
                icsv,
                ihs,
                ocs,
                ocsv,
                ohs,
            };
            cmd_transform(&config_path, grid_dir, &input, &selection, output.as_deref()).await
        }

        Commands::Route {
            kind,
            from,
            to,
            second,
        } => cmd_route(&config_path, kind, &from, &to, second.as_deref()),

        Commands::CheckConfig => cmd_check_config(&config_path),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn open_repository(
    config_path: &Path,
    grid_dir: Option<PathBuf>,
) -> Result<Repository, Box<dyn std::error::Error>> {
    eprintln!("📄 Config: {}", config_path.display());
    let (repo, warnings) = Repository::open(config_path, grid_dir)?;
    for warning in &warnings {
        eprintln!("   ⚠️  {}", warning);
    }
    eprintln!(
        "   {} CS, {} HS, {} CS edges, {} HS edges",
        repo.valid_cs().len(),
        repo.valid_hs().len(),
        repo.cs_graph().edge_count(),
        repo.hs_graph().edge_count()
    );
    Ok(repo)
}

async fn cmd_serve(
    config_path: &Path,
    grid_dir: Option<PathBuf>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let repo = open_repository(config_path, grid_dir)?;
    start_server(port, Arc::new(repo)).await?;
    Ok(())
}

async fn cmd_transform(
    config_path: &Path,
    grid_dir: Option<PathBuf>,
    input: &Path,
    selection: &SystemSelection,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let repo = open_repository(config_path, grid_dir)?;

    eprintln!("📄 Processing: {}", input.display());
    let file = read_point_file(input)?;
    eprintln!("   Encoding: {}", file.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(file.delimiter));
    eprintln!("   Rows: {}", file.rows.len());

    let rows = transform_rows(&repo, selection, &file.rows, None).await?;

    match output {
        Some(path) => {
            write_point_file(path, &rows, file.delimiter)?;
            eprintln!("   💾 Saved to: {}", path.display());
        }
        None => write_rows(std::io::stdout().lock(), &rows, file.delimiter)?,
    }

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_route(
    config_path: &Path,
    kind: GraphKind,
    from: &str,
    to: &str,
    second: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(config_path)?;
    let repo = Repository::from_config(
        &config,
        Arc::new(bgstrans::elevation::MemoryElevationProvider::new()),
    );

    let tree = match kind {
        GraphKind::Cs => dual_target_path(repo.cs_graph(), from, to, second)?,
        GraphKind::Hs => dual_target_path(repo.hs_graph(), from, to, second)?,
    };

    if tree.is_empty() {
        println!("{from} (no hops)");
    } else {
        print_tree(&tree, from, 0);
    }
    Ok(())
}

fn print_tree(tree: &ForwardingPath, node: &str, depth: usize) {
    println!("{}{}", "  ".repeat(depth), node);
    for next in tree.next(node) {
        print_tree(tree, next, depth + 1);
    }
}

fn cmd_check_config(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Checking: {}", config_path.display());
    let config = AppConfig::load(config_path)?;
    eprintln!("   ✅ Schema valid");

    let report = config.check();
    for warning in &report.warnings {
        eprintln!("   ⚠️  {}", warning);
    }
    for error in &report.errors {
        eprintln!("   ❌ {}", error);
    }

    if report.is_ok() {
        eprintln!(
            "\n✨ {} CS, {} HS, {} warnings",
            config.valid_css.len(),
            config.valid_hss.len(),
            report.warnings.len()
        );
        Ok(())
    } else {
        Err(format!("{} consistency errors", report.errors.len()).into())
    }
}

fn format_delimiter(d: Delimiter) -> String {
    match d {
        Delimiter::Char(b'\t') => "\\t".to_string(),
        Delimiter::Char(c) => (c as char).to_string(),
        Delimiter::Whitespace => "whitespace".to_string(),
    }
}
