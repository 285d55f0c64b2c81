use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use shelfindex::config::{IndexConfig, IndexPaths, DEFAULT_NUM_BUCKETS};
use shelfindex::error::Result;
use shelfindex::hash::DEFAULT_HASH_SEED;
use shelfindex::index::FieldIndex;
use shelfindex::query::fifo::{ensure_fifo, open_pipe};
use shelfindex::query::render::render_response;
use shelfindex::query::server::serve;
use shelfindex::query::RESPONSE_END;
use shelfindex::storage::buckets::BucketTable;
use shelfindex::types::{Field, MatchMode};
use shelfindex::{build_all, build_index, BuildStats, Catalog};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FieldArg {
    Title,
    Author,
}

impl From<FieldArg> for Field {
    fn from(value: FieldArg) -> Self {
        match value {
            FieldArg::Title => Field::Title,
            FieldArg::Author => Field::Author,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MatchArg {
    Exact,
    Normalized,
}

impl From<MatchArg> for MatchMode {
    fn from(value: MatchArg) -> Self {
        match value {
            MatchArg::Exact => MatchMode::Exact,
            MatchArg::Normalized => MatchMode::Normalized,
        }
    }
}

#[derive(Parser)]
#[command(name = "shelfindex", about = "ShelfIndex - hash index over a book catalog")]
struct Cli {
    /// Directory holding the index files
    #[arg(long, env = "SHELFINDEX_DIR", default_value = "data/index")]
    index_dir: PathBuf,

    /// Tabular source file (header row + one book per line)
    #[arg(long, env = "SHELFINDEX_SOURCE", default_value = "data/dataset/books_data.csv")]
    source: PathBuf,

    /// Key comparison used by lookups
    #[arg(long = "match", value_enum, default_value = "exact")]
    match_mode: MatchArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the title and author indexes (or just one)
    Build {
        #[arg(long, value_enum)]
        field: Option<FieldArg>,

        /// Bucket count for the title index (rounded up to a power of two)
        #[arg(long, default_value_t = DEFAULT_NUM_BUCKETS)]
        title_buckets: u64,

        /// Bucket count for the author index (rounded up to a power of two)
        #[arg(long, default_value_t = DEFAULT_NUM_BUCKETS)]
        author_buckets: u64,

        /// Hash seed stored in the bucket table headers
        #[arg(long, default_value_t = DEFAULT_HASH_SEED)]
        seed: u64,
    },
    /// Print the record offsets stored under a key
    Lookup {
        #[arg(long, value_enum, default_value = "title")]
        field: FieldArg,
        key: String,
    },
    /// Run one "<title>|<author>" request and print the matching rows
    Search { request: String },
    /// Answer "<title>|<author>" requests line by line
    Serve {
        /// Request pipe (default: stdin)
        #[arg(long)]
        requests: Option<PathBuf>,
        /// Response pipe (default: stdout)
        #[arg(long)]
        responses: Option<PathBuf>,
    },
    /// Interactive search prompt
    Client {
        /// Send requests to a running server through this pipe instead of
        /// searching in-process
        #[arg(long, requires = "responses")]
        requests: Option<PathBuf>,
        #[arg(long, requires = "requests")]
        responses: Option<PathBuf>,
    },
    /// Print header fields and chain statistics
    Inspect,
}

fn fail(context: &str, e: impl std::fmt::Display) -> ! {
    eprintln!("ERROR: {}: {}", context, e);
    process::exit(1);
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("shelfindex=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Create the server's pipe if needed, then open it.
fn serve_pipe(path: &Path) -> File {
    ensure_fifo(path)
        .unwrap_or_else(|e| fail(&format!("Failed to set up pipe {}", path.display()), e));
    open_or_fail(path)
}

fn open_or_fail(path: &Path) -> File {
    open_pipe(path).unwrap_or_else(|e| fail(&format!("Failed to open {}", path.display()), e))
}

fn print_stats(field: Field, stats: &BuildStats) {
    println!(
        "{}: {} row(s) indexed, {} skipped, {} failed",
        field, stats.rows_indexed, stats.rows_skipped, stats.rows_failed
    );
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

/// Where the interactive client sends its requests.
enum Transport {
    Local(Catalog),
    Pipes { requests: File, responses: BufReader<File> },
}

impl Transport {
    fn exchange(&mut self, line: &str) -> Result<Vec<String>> {
        match self {
            Transport::Local(catalog) => Ok(catalog.respond(line)),
            Transport::Pipes { requests, responses } => {
                writeln!(requests, "{}", line)?;
                requests.flush()?;
                let mut out = Vec::new();
                loop {
                    let mut buf = String::new();
                    if responses.read_line(&mut buf)? == 0 {
                        break;
                    }
                    let reply = buf.trim_end_matches(['\n', '\r']).to_string();
                    let done = reply == RESPONSE_END;
                    out.push(reply);
                    if done {
                        break;
                    }
                }
                Ok(out)
            }
        }
    }
}

fn run_client(mut transport: Transport) {
    let mut rl = rustyline::DefaultEditor::new()
        .unwrap_or_else(|e| fail("Failed to initialize prompt", e));

    let mut title = String::new();
    let mut author = String::new();
    let show = |s: &str| if s.is_empty() { "(empty)".to_string() } else { s.to_string() };

    loop {
        println!();
        println!("Title:  {}", show(&title));
        println!("Author: {}", show(&author));
        println!("1. Enter title");
        println!("2. Enter author");
        println!("3. Search");
        println!("4. Quit");

        let choice = match rl.readline("> ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted) => continue,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("ERROR: {}", e);
                break;
            }
        };

        match choice.trim() {
            "1" | "2" => {
                let prompt = if choice.trim() == "1" { "title> " } else { "author> " };
                match rl.readline(prompt) {
                    Ok(value) => {
                        let _ = rl.add_history_entry(value.as_str());
                        // The separator cannot appear inside a field.
                        let value = value.trim().replace('|', " ");
                        if choice.trim() == "1" {
                            title = value;
                        } else {
                            author = value;
                        }
                    }
                    Err(rustyline::error::ReadlineError::Eof) => break,
                    Err(_) => continue,
                }
            }
            "3" => match transport.exchange(&format!("{}|{}", title, author)) {
                Ok(lines) => print!("{}", render_response(&lines)),
                Err(e) => eprintln!("ERROR: {}", e),
            },
            "4" | "quit" | "exit" => break,
            "" => {}
            other => println!("Unknown option: {}", other),
        }
    }
}

fn inspect(index_dir: &Path) {
    for field in Field::ALL {
        let paths = IndexPaths::new(index_dir, field);
        println!("{} index:", field);
        if !paths.exists() {
            println!("  (not built)");
            continue;
        }
        let table = BucketTable::open_read_only(&paths.buckets)
            .unwrap_or_else(|e| fail(&format!("Failed to open {}", paths.buckets.display()), e));
        let header = *table.header();
        drop(table);
        let index = FieldIndex::open_paths(&paths)
            .unwrap_or_else(|e| fail(&format!("Failed to open {} index", field), e));
        let stats = index
            .stats()
            .unwrap_or_else(|e| fail(&format!("Failed to scan {} index", field), e));

        println!("  version:          {}", header.version);
        println!("  header size:      {}", header.header_size);
        println!("  hash seed:        {:#018x}", header.hash_seed);
        println!("  buckets:          {}", stats.num_buckets);
        println!("  occupied buckets: {}", stats.occupied_buckets);
        println!("  nodes:            {}", stats.total_nodes);
        println!("  longest chain:    {}", stats.longest_chain);
        println!("  node log bytes:   {}", stats.log_bytes);
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let config = IndexConfig {
        match_mode: cli.match_mode.into(),
        ..IndexConfig::default()
    };

    match cli.command {
        Command::Build {
            field,
            title_buckets,
            author_buckets,
            seed,
        } => {
            let config = IndexConfig {
                title_buckets,
                author_buckets,
                hash_seed: seed,
                ..config
            };
            match field {
                Some(field) => {
                    let field: Field = field.into();
                    std::fs::create_dir_all(&cli.index_dir)
                        .unwrap_or_else(|e| fail("Failed to create index directory", e));
                    let stats = build_index(
                        &cli.source,
                        &cli.index_dir,
                        field,
                        config.buckets_for(field),
                        config.hash_seed,
                    )
                    .unwrap_or_else(|e| fail(&format!("Failed to build {} index", field), e));
                    print_stats(field, &stats);
                }
                None => {
                    let report = build_all(&cli.source, &cli.index_dir, &config)
                        .unwrap_or_else(|e| fail("Failed to build indexes", e));
                    print_stats(Field::Title, &report.title);
                    print_stats(Field::Author, &report.author);
                }
            }
        }
        Command::Lookup { field, key } => {
            let field: Field = field.into();
            let index = FieldIndex::open(&cli.index_dir, field)
                .unwrap_or_else(|e| fail(&format!("Failed to open {} index", field), e))
                .with_match_mode(config.match_mode);
            let offsets = index
                .lookup(&key)
                .unwrap_or_else(|e| fail("Lookup failed", e));
            if offsets.is_empty() {
                println!("No results for {}: \"{}\"", field, key);
            }
            for off in offsets {
                println!("{}", off);
            }
        }
        Command::Search { request } => {
            let catalog = Catalog::open(&cli.index_dir, &cli.source, &config);
            print_lines(&catalog.respond(&request));
        }
        Command::Serve {
            requests,
            responses,
        } => {
            let catalog = Catalog::open(&cli.index_dir, &cli.source, &config);
            let result = match (requests, responses) {
                (Some(req), Some(rsp)) => {
                    serve(&catalog, BufReader::new(serve_pipe(&req)), serve_pipe(&rsp))
                }
                (Some(req), None) => {
                    serve(&catalog, BufReader::new(serve_pipe(&req)), io::stdout().lock())
                }
                (None, Some(rsp)) => serve(&catalog, io::stdin().lock(), serve_pipe(&rsp)),
                (None, None) => serve(&catalog, io::stdin().lock(), io::stdout().lock()),
            };
            if let Err(e) = result {
                fail("Server stopped", e);
            }
        }
        Command::Client {
            requests,
            responses,
        } => {
            let transport = match (requests, responses) {
                (Some(req), Some(rsp)) => Transport::Pipes {
                    requests: open_or_fail(&req),
                    responses: BufReader::new(open_or_fail(&rsp)),
                },
                _ => Transport::Local(Catalog::open(&cli.index_dir, &cli.source, &config)),
            };
            run_client(transport);
        }
        Command::Inspect => inspect(&cli.index_dir),
    }
}
