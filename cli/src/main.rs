mod config;
mod report;
mod runner;
mod test_runner;
mod verifiers;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use tracing_subscriber::filter::EnvFilter;

use fence::{Document, decode};
use sandbox::{QuickJs, Sandbox};

use crate::config::Overrides;

const SUBCOMMANDS: &[&str] = &["run", "test", "help"];

/// Flags valid before the subcommand.
const GLOBAL_FLAGS: &[&str] = &["--no-color", "-v", "--verbose"];

/// Flags answered by the top-level command itself.
const TOP_LEVEL_FLAGS: &[&str] = &["-h", "--help", "-V", "--version"];

#[derive(Parser)]
#[command(name = "fence", version, about = "Run the code blocks of a document in a sandbox")]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log bridge calls and context lifecycle (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every block of a document
    Run(RunArgs),

    /// Run every document under a directory as a test suite
    Test(TestArgs),
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(clap::Args)]
struct RunArgs {
    /// Document to run
    #[arg(default_value = "index.md")]
    file: String,

    /// Decode only, don't execute (exit 0 if every block decodes)
    #[arg(long)]
    check: bool,

    /// List all blocks in the document
    #[arg(long)]
    list_blocks: bool,

    /// Report format
    #[arg(long, value_enum, default_value = "text")]
    format: Format,

    /// Exit 1 when any block fails
    #[arg(long)]
    strict: bool,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a document or a directory containing them
    path: String,

    /// Run only documents in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,

    #[command(flatten)]
    overrides: Overrides,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = with_implicit_run(std::env::args().collect());

    let cli = Cli::parse_from(&args);
    init_tracing(cli.verbose);

    let exit_code = match cli.command {
        Command::Run(run_args) => do_run(run_args, cli.no_color).await,
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            test_runner::run_tests(path, cli.no_color, &test_args.category, &test_args.overrides)
                .await
        }
    };
    process::exit(exit_code);
}

/// `fence doc.md` works like `fence run doc.md`, and a bare `fence` runs index.md.
/// `run` goes right after the leading global flags unless a subcommand is already there.
fn with_implicit_run(mut args: Vec<String>) -> Vec<String> {
    let pos = args
        .iter()
        .skip(1)
        .position(|a| !GLOBAL_FLAGS.contains(&a.as_str()))
        .map_or(args.len(), |p| p + 1);
    match args.get(pos).map(String::as_str) {
        Some(first) if SUBCOMMANDS.contains(&first) || TOP_LEVEL_FLAGS.contains(&first) => {}
        _ => args.insert(pos, "run".to_string()),
    }
    args
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn do_run(args: RunArgs, no_color: bool) -> i32 {
    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    let source = match std::fs::read_to_string(&args.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", args.file, e);
            return 1;
        }
    };

    let base_dir = Path::new(&args.file)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    let mut config = match args.overrides.resolve(&base_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };
    config.strict |= args.strict;

    let mut files = SimpleFiles::new();
    let file_id = files.add(args.file.clone(), source.clone());
    let document = Document::scan(&source, file_id, &config.delimiters());

    if args.list_blocks {
        for (index, block) in document.blocks.iter().enumerate() {
            let tag = match decode(block) {
                Ok(decoded) => decoded.language_tag.trim().to_string(),
                Err(_) => "(no language line)".to_string(),
            };
            println!("#{} line {}: {}", index + 1, document.line_of(block.start), tag);
        }
        return 0;
    }

    if args.check {
        let writer = StandardStream::stderr(color_choice);
        let term_config = term::Config::default();
        let mut failed = false;
        for block in &document.blocks {
            if let Err(err) = decode(block) {
                failed = true;
                let diagnostic = err.to_diagnostic(file_id);
                let _ =
                    term::emit_to_write_style(&mut writer.lock(), &term_config, &files, &diagnostic);
            }
        }
        if failed {
            return 1;
        }
        eprintln!("ok: {} blocks in {} decoded successfully", document.blocks.len(), args.file);
        return 0;
    }

    let sandbox =
        Sandbox::new(QuickJs::with_limits(config.limits())).with_bridge_name(&config.bridge);
    let verifier = config.verifier.build();
    let reports = runner::run_document(&sandbox, &document, &config.selection(), &verifier).await;

    match args.format {
        Format::Text => report::print_text(&reports, &files, file_id, no_color),
        Format::Json => {
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = report::write_json(&mut stdout, &args.file, &reports) {
                eprintln!("error: cannot write report: {}", e);
                return 1;
            }
        }
    }

    if config.strict && reports.iter().any(|r| r.is_failure()) {
        1
    } else {
        0
    }
}
