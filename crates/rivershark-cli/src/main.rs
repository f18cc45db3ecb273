use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rivershark_config::{init_tracing, RiversharkConfig};
use rivershark_obr::{read_index, IndexDocument, Repository, RepositoryError, INDEX_FILE_NAME};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "rivershark", version, about = "Rivershark OSGi bundle repository tool")]
struct Cli {
    /// TOML config file supplying defaults (falls back to `$RIVERSHARK_CONFIG`)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Log level or `EnvFilter` directives; overrides the config file
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate bundles, copy them into the repository and rebuild its index
    InstallBundles(InstallArgs),
    /// Regenerate the index from the bundles currently in storage
    RebuildIndex(RepositoryArgs),
    /// Print the bundles listed in the repository index
    List(ListArgs),
}

#[derive(Args)]
struct RepositoryArgs {
    /// Repository directory (defaults to `[repository] directory` in the config file)
    #[arg(long, value_name = "DIR")]
    repository: Option<PathBuf>,
    /// Repository name recorded in the index
    #[arg(long)]
    name: Option<String>,
}

#[derive(Args)]
struct InstallArgs {
    #[command(flatten)]
    repository: RepositoryArgs,
    /// Bundle to install (repeatable)
    #[arg(long = "file", value_name = "FILE")]
    files: Vec<PathBuf>,
    /// Further bundles to install
    #[arg(value_name = "BUNDLE")]
    bundles: Vec<PathBuf>,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ListArgs {
    /// Repository directory (defaults to `[repository] directory` in the config file)
    #[arg(long, value_name = "DIR")]
    repository: Option<PathBuf>,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_code_for(&err)
        }
    };

    std::process::exit(exit_code);
}

/// Rejected input bundles exit with 1; everything else that fails exits with 2.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<RepositoryError>() {
        Some(RepositoryError::BatchValidationFailed(_)) => 1,
        _ => 2,
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config = load_config(cli.config.as_deref())?;
    let mut logging = config.logging.clone();
    if let Some(level) = cli.log_level {
        logging.level = level;
    }
    init_tracing(&logging);

    match cli.command {
        Command::InstallBundles(args) => {
            let mut files = args.files;
            files.extend(args.bundles);
            if files.is_empty() {
                bail!("no bundles given (pass --file FILE or positional paths)");
            }

            let repo = open_repository(&config, &args.repository)?;
            let report = repo.install(files.as_slice())?;
            tracing::info!(
                target: "rivershark.cli",
                installed = report.installed.len(),
                indexed = report.indexed,
                "install-bundles finished"
            );

            if args.json {
                let installed: Vec<_> = report
                    .installed
                    .iter()
                    .map(|stored| InstalledJson {
                        symbolic_name: &stored.identity.symbolic_name,
                        version: stored.identity.version.to_string(),
                        path: &stored.path,
                    })
                    .collect();
                print_json(&InstallJson {
                    installed,
                    indexed: report.indexed,
                })?;
            } else {
                for stored in &report.installed {
                    println!("installed: {} -> {}", stored.identity, stored.path.display());
                }
                println!("indexed: {} resource(s)", report.indexed);
            }
            repo.close();
            Ok(0)
        }
        Command::RebuildIndex(args) => {
            let repo = open_repository(&config, &args)?;
            let document = repo.rebuild_index()?;
            println!(
                "indexed: {} resource(s) in {}",
                document.resources.len(),
                repo.layout().index_path().display()
            );
            repo.close();
            Ok(0)
        }
        Command::List(args) => {
            let directory = config
                .repository_config(args.repository.as_deref(), None)?
                .directory()
                .to_path_buf();
            let Some(document) = load_index(&directory)? else {
                if args.json {
                    print_json(&ListJson {
                        name: None,
                        base: None,
                        resources: Vec::new(),
                    })?;
                } else {
                    println!("no index at {}", directory.join(INDEX_FILE_NAME).display());
                }
                return Ok(0);
            };
            print_listing(&document, args.json)?;
            Ok(0)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<RiversharkConfig> {
    let config = match path {
        Some(path) => RiversharkConfig::load_from_path(path)?,
        None => RiversharkConfig::load_from_env()?,
    };
    Ok(config)
}

fn open_repository(config: &RiversharkConfig, args: &RepositoryArgs) -> Result<Repository> {
    let repo_config =
        config.repository_config(args.repository.as_deref(), args.name.as_deref())?;
    let directory = repo_config.directory().to_path_buf();
    Repository::open(repo_config)
        .with_context(|| format!("cannot use repository {}", directory.display()))
}

/// The index of the repository at `directory`, or `None` if it was never built.
fn load_index(directory: &Path) -> Result<Option<IndexDocument>> {
    let path = directory.join(INDEX_FILE_NAME);
    if !path.is_file() {
        return Ok(None);
    }
    let document = read_index(&path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Some(document))
}

#[derive(Serialize)]
struct InstallJson<'a> {
    installed: Vec<InstalledJson<'a>>,
    indexed: usize,
}

#[derive(Serialize)]
struct InstalledJson<'a> {
    symbolic_name: &'a str,
    version: String,
    path: &'a Path,
}

#[derive(Serialize)]
struct ListJson<'a> {
    name: Option<&'a str>,
    base: Option<&'a str>,
    resources: Vec<ResourceJson<'a>>,
}

#[derive(Serialize)]
struct ResourceJson<'a> {
    symbolic_name: String,
    version: String,
    url: Option<&'a str>,
    sha256: Option<&'a str>,
    size: Option<u64>,
}

fn print_listing(document: &IndexDocument, json: bool) -> Result<()> {
    let resources: Vec<_> = document
        .resources
        .iter()
        .filter_map(|resource| {
            let identity = resource.identity()?;
            Some(ResourceJson {
                symbolic_name: identity.symbolic_name,
                version: identity.version.to_string(),
                url: resource.url(),
                sha256: resource.sha256(),
                size: resource.size(),
            })
        })
        .collect();

    if json {
        return print_json(&ListJson {
            name: Some(&document.name),
            base: Some(document.base.as_str()),
            resources,
        });
    }

    println!("repository: {} ({})", document.name, document.base);
    for resource in &resources {
        println!(
            "  {} {}  {}",
            resource.symbolic_name,
            resource.version,
            resource.url.unwrap_or("-")
        );
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}
