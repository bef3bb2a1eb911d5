//! dartscope - CLI for the Dart code-intelligence engine.
//!
//! Designed for automation: `--json` flags machine-readable output, errors
//! go to stderr, results to stdout, and exit codes are stable:
//!
//! | command | exit |
//! |---|---|
//! | `open <path>` | 0 ok / 2 not-found / 3 missing manifest |
//! | `query <dsl>` | 0 ok / 4 not-found / 5 bad-query |
//! | `stats`, `list-packages`, `list-indexes` | 0 |
//! | `index-sdk`, `index-deps`, `index-framework` | 0 / 6 partial failure |

use clap::{Parser, Subcommand};
use dartscope::dsl::executor::QueryExecutor;
use dartscope::error::EngineError;
use dartscope::external::ExternalIndexBuilder;
use dartscope::registry::{PackageRegistry, RegistryOptions};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dartscope")]
#[command(version)]
#[command(about = "Semantic code intelligence for Dart workspaces")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a workspace and print an index summary
    Open {
        /// Workspace root
        path: PathBuf,
    },

    /// Execute a query against a workspace
    Query {
        /// Query string, e.g. "refs AuthService.login"
        query: String,

        /// Workspace root
        #[arg(short, long, default_value = ".")]
        root: PathBuf,

        /// Also load pre-built external indexes (SDK, dependencies)
        #[arg(long)]
        deps: bool,
    },

    /// Print index statistics for a workspace
    Stats {
        /// Workspace root
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
    },

    /// Discover packages under a root and print them as JSON
    ListPackages {
        /// Directory to scan
        root: PathBuf,
    },

    /// Build an immutable index for a Dart SDK checkout
    IndexSdk {
        /// SDK root
        path: PathBuf,
    },

    /// Build indexes for the hosted dependencies of a project
    IndexDeps {
        /// Project root (defaults to the current directory)
        root: Option<PathBuf>,

        /// Rebuild even when an index already exists
        #[arg(long)]
        force: bool,
    },

    /// Build indexes for every package bundled with a framework checkout
    IndexFramework {
        /// Framework root (e.g. a Flutter checkout)
        path: PathBuf,
    },

    /// Enumerate pre-built indexes in the global cache
    ListIndexes,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let code = run(&cli).await;
    std::process::exit(code);
}

fn open_failure_code(err: &EngineError) -> i32 {
    match err {
        EngineError::RootNotFound(_) => 2,
        EngineError::MissingPackageManifest(_) | EngineError::MissingResolvedConfig(_) => 3,
        _ => 1,
    }
}

async fn run(cli: &Cli) -> i32 {
    match &cli.command {
        Commands::Open { path } => {
            let registry = match PackageRegistry::open(
                path,
                RegistryOptions {
                    watch: false,
                    load_external: true,
                },
            )
            .await
            {
                Ok(registry) => registry,
                Err(e) => {
                    eprintln!("Error: {e}");
                    return open_failure_code(&e);
                }
            };
            print_summary(&registry, cli.json);
            0
        }

        Commands::Query { query, root, deps } => {
            let registry = match PackageRegistry::open(
                root,
                RegistryOptions {
                    watch: false,
                    load_external: *deps,
                },
            )
            .await
            {
                Ok(registry) => registry,
                Err(e) => {
                    eprintln!("Error: {e}");
                    return open_failure_code(&e);
                }
            };
            let executor = QueryExecutor::new(&registry);
            let result = executor.execute(query);
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&result.to_json()).unwrap_or_default()
                );
            } else {
                print!("{}", result.to_text());
            }
            if result.is_not_found() {
                4
            } else if result.is_error() {
                5
            } else {
                0
            }
        }

        Commands::Stats { root } => {
            let registry = match PackageRegistry::open(
                root,
                RegistryOptions {
                    watch: false,
                    load_external: false,
                },
            )
            .await
            {
                Ok(registry) => registry,
                Err(e) => {
                    eprintln!("Error: {e}");
                    return open_failure_code(&e);
                }
            };
            let executor = QueryExecutor::new(&registry);
            let result = executor.execute("stats");
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&result.to_json()).unwrap_or_default()
                );
            } else {
                print!("{}", result.to_text());
            }
            0
        }

        Commands::ListPackages { root } => {
            let packages = dartscope::discovery::discover_packages(root).unwrap_or_default();
            println!(
                "{}",
                serde_json::to_string_pretty(&packages).unwrap_or_default()
            );
            0
        }

        Commands::IndexSdk { path } => {
            let builder = ExternalIndexBuilder::with_default_root();
            match builder.index_sdk(path) {
                Ok(stats) => {
                    eprintln!(
                        "indexed SDK: {} files, {} symbols",
                        stats.documents, stats.symbols
                    );
                    0
                }
                Err(e) => {
                    eprintln!("Error: {e}");
                    6
                }
            }
        }

        Commands::IndexDeps { root, force } => {
            let root = root.clone().unwrap_or_else(|| PathBuf::from("."));
            let builder = ExternalIndexBuilder::with_default_root();
            match builder.index_dependencies(&root, *force) {
                Ok(report) => {
                    eprintln!(
                        "dependencies indexed: {} built, {} skipped, {} failed",
                        report.built, report.skipped, report.failed
                    );
                    if report.failed > 0 { 6 } else { 0 }
                }
                Err(e) => {
                    eprintln!("Error: {e}");
                    6
                }
            }
        }

        Commands::IndexFramework { path } => {
            let builder = ExternalIndexBuilder::with_default_root();
            match builder.index_framework(path) {
                Ok((version, packages)) => {
                    eprintln!(
                        "indexed framework {version}: {} package(s)",
                        packages.len()
                    );
                    0
                }
                Err(e) => {
                    eprintln!("Error: {e}");
                    6
                }
            }
        }

        Commands::ListIndexes => {
            let builder = ExternalIndexBuilder::with_default_root();
            let indexes = builder.list_indexes();
            if cli.json {
                let entries: Vec<serde_json::Value> = indexes
                    .iter()
                    .map(|(path, manifest)| {
                        serde_json::json!({
                            "path": path.display().to_string(),
                            "type": manifest.kind,
                            "name": manifest.name,
                            "version": manifest.version,
                            "indexed_at": manifest.indexed_at,
                        })
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&entries).unwrap_or_default()
                );
            } else {
                for (path, manifest) in &indexes {
                    println!(
                        "{} {} {} ({})",
                        manifest.kind,
                        manifest.name,
                        manifest.version,
                        path.display()
                    );
                }
            }
            0
        }
    }
}

fn print_summary(registry: &PackageRegistry, json: bool) {
    let stats = registry.stats();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "root": registry.root().display().to_string(),
                "stats": stats,
                "warnings": registry.warnings(),
            }))
            .unwrap_or_default()
        );
        return;
    }
    println!("workspace: {}", registry.root().display());
    for (name, s) in &stats.packages {
        println!(
            "  {name}: {} files, {} symbols, {} call edges",
            s.documents, s.symbols, s.call_edges
        );
    }
    println!("  external indexes loaded: {}", stats.external_indexes);
    for warning in registry.warnings() {
        println!("  warning: {warning}");
    }
}
