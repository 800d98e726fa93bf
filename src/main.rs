use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use prompt_search::config::Config;
use prompt_search::index::{FileWatcher, Folder, PromptStructure};
use prompt_search::search::{SearchQuery, SearchResult, SearchScope};
use prompt_search::telemetry;
use prompt_search::utils::{format_bytes, format_number};
use prompt_search::PromptLibrary;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};

/// Prompt Search - browse and search a directory of markdown prompts
#[derive(Parser, Debug)]
#[command(name = "prompt_search")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Prompt root directory (overrides config file and PROMPT_SEARCH_ROOT)
    #[arg(short, long, value_name = "DIR", global = true)]
    root: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Generate a template configuration file and exit
    #[arg(long, value_name = "FILE")]
    init: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the folder and prompt tree
    Tree,
    /// List tags with their prompt counts
    Tags,
    /// Search prompts
    Search {
        query: String,
        #[arg(long, value_enum, default_value_t = ScopeArg::All)]
        scope: ScopeArg,
        #[arg(long)]
        case_sensitive: bool,
        #[arg(long)]
        whole_word: bool,
        /// Match words within this edit distance
        #[arg(long, value_name = "N")]
        fuzzy: Option<u8>,
        /// With --fuzzy, also accept words starting with the query
        #[arg(long)]
        prefix: bool,
        /// Also search the raw front matter block
        #[arg(long)]
        front_matter: bool,
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Suggest titles and tags for a partial query
    Suggest { query: String },
    /// Create a prompt from the default template
    New {
        name: String,
        /// Folder relative to the root
        #[arg(long, value_name = "DIR")]
        folder: Option<PathBuf>,
    },
    /// Create a folder
    Mkdir {
        name: String,
        /// Parent folder relative to the root
        #[arg(long, value_name = "DIR")]
        parent: Option<PathBuf>,
    },
    /// Delete a prompt or folder
    Rm { path: PathBuf },
    /// Watch the root and log index rebuilds until Ctrl-C
    Watch,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScopeArg {
    Titles,
    Content,
    All,
}

impl From<ScopeArg> for SearchScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::Titles => SearchScope::Titles,
            ScopeArg::Content => SearchScope::Content,
            ScopeArg::All => SearchScope::All,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    telemetry::init_logging(log_level)?;

    if let Some(init_path) = args.init.clone() {
        let path = if init_path.as_os_str().is_empty() {
            PathBuf::from("prompt_search.toml")
        } else {
            init_path
        };

        if path.exists() {
            eprintln!("Error: Config file already exists: {}", path.display());
            eprintln!("Remove it first or choose a different path.");
            std::process::exit(1);
        }

        Config::write_template(&path)?;
        println!("✓ Generated config file: {}", path.display());
        println!("\nEdit the file to point at your prompt directory, then run:");
        println!("  prompt_search --config {} tree", path.display());
        return Ok(());
    }

    let config = load_config(&args)?;
    info!(root = %config.library.root_path().display(), "Configuration loaded");
    let library = PromptLibrary::new(&config)?;

    let command = args.command.unwrap_or(if config.library.watch {
        Command::Watch
    } else {
        Command::Tree
    });

    match command {
        Command::Tree => {
            let structure = library.structure().await;
            print_tree(&structure, library.root());
        }
        Command::Tags => {
            let structure = library.structure().await;
            for (tag, count) in structure.tag_counts() {
                println!("{:<24} {}", tag, count);
            }
        }
        Command::Search {
            query,
            scope,
            case_sensitive,
            whole_word,
            fuzzy,
            prefix,
            front_matter,
            limit,
            json,
        } => {
            let mut search = SearchQuery::new(query)
                .scope(scope.into())
                .case_sensitive(case_sensitive)
                .whole_word(whole_word)
                .include_front_matter(front_matter);
            if let Some(distance) = fuzzy {
                search = search.fuzzy(distance, prefix);
            }
            if let Some(limit) = limit {
                search = search.limit(limit);
            }

            let results = library.search(&search).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_results(&results, library.root());
            }
        }
        Command::Suggest { query } => {
            for suggestion in library.suggestions(&SearchQuery::new(query)).await {
                println!("{}", suggestion);
            }
        }
        Command::New { name, folder } => {
            let path = library.create_prompt(folder.as_deref(), &name).await?;
            println!("Created {}", path.display());
        }
        Command::Mkdir { name, parent } => {
            let path = library.create_folder(parent.as_deref(), &name).await?;
            println!("Created {}", path.display());
        }
        Command::Rm { path } => {
            let absolute = if path.is_absolute() {
                path.clone()
            } else {
                library.root().join(&path)
            };
            if absolute.is_dir() {
                library.delete_folder(&path).await?;
            } else {
                library.delete_prompt(&path).await?;
            }
            println!("Deleted {}", absolute.display());
        }
        Command::Watch => watch(&library, &config).await?,
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let base_config = if let Some(ref config_path) = args.config {
        if !config_path.exists() {
            anyhow::bail!(
                "Config file not found: {}\nUse --init {} to generate a template.",
                config_path.display(),
                config_path.display()
            );
        }
        info!(path = %config_path.display(), "Loading config from file");
        Config::from_file(config_path)?
    } else {
        match Config::from_default_locations()? {
            Some((config, path)) => {
                info!(path = %path.display(), "Loading config from default location");
                config
            }
            None => {
                info!("No config file found, using defaults");
                Config::default()
            }
        }
    };

    let watch = matches!(args.command, Some(Command::Watch));
    Ok(base_config
        .with_env_overrides()
        .with_overrides(args.root.clone(), watch))
}

async fn watch(library: &PromptLibrary, config: &Config) -> Result<()> {
    let structure = library.structure().await;
    println!(
        "Watching {} ({} prompts in {} folders), Ctrl-C to stop",
        library.root().display(),
        format_number(structure.prompt_count()),
        format_number(structure.folders.len())
    );

    let mut watcher = FileWatcher::new(
        library.root(),
        config.library.debounce(),
        &config.library.exclude_patterns,
    )?;

    loop {
        tokio::select! {
            batch = watcher.recv_batch() => {
                let Some(changes) = batch else {
                    warn!("File watcher stopped");
                    break;
                };
                for change in &changes {
                    library.invalidate(change.reason(), Some(change.path()));
                    println!("{} {}", change.reason(), change.path().display());
                }
                // One debounced rebuild for the whole batch
                let structure = library.rebuild().await;
                println!(
                    "{} changes -> {} prompts",
                    format_number(changes.len()),
                    format_number(structure.prompt_count())
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, stopping watcher");
                break;
            }
        }
    }

    Ok(())
}

fn print_tree(structure: &PromptStructure, root: &Path) {
    println!("{}", root.display());
    for prompt in &structure.root_prompts {
        println!("  {}", prompt.title);
    }
    for folder in structure.child_folders(root) {
        print_folder(structure, folder, 1);
    }
    println!(
        "\n{} prompts, {} folders, {}",
        format_number(structure.prompt_count()),
        format_number(structure.folders.len()),
        format_bytes(structure.total_size())
    );
}

fn print_folder(structure: &PromptStructure, folder: &Folder, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{}{}/", indent, folder.name);
    for prompt in &folder.prompts {
        println!("{}  {}", indent, prompt.title);
    }
    for child in structure.child_folders(&folder.path) {
        print_folder(structure, child, depth + 1);
    }
}

fn print_results(results: &[SearchResult], root: &Path) {
    if results.is_empty() {
        println!("No matches");
        return;
    }
    for result in results {
        let relative = Path::new(&result.id)
            .strip_prefix(root)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| result.id.clone());
        println!("{:>4}  {}  ({})", result.score, result.title, relative);
        if let Some(snippet) = &result.snippet {
            println!("      {}", snippet);
        }
    }
}
