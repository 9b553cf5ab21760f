//! The Z# compiler executable.
//!
//! `zs c [--validate] [-e run] [-o OUTPUT] SOURCE` compiles one document
//! through the full pipeline; `zs init` and `zs new` create project
//! skeletons. Every diagnostic prints as a rich annotated snippet followed
//! by the `[phase] [severity] origin -> message` summary lines; the exit
//! code is non-zero whenever the shared state recorded an error.

use std::{path::{Path, PathBuf}, process::exit};

use clap::{Args, Parser, Subcommand};
use libzs::{
    error::{CodeSpanReportGenerator, ReportGenerator},
    file::DocumentInfo,
    toolchain::{Toolchain, ToolchainResult},
};
use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, ConfigBuilder, LevelPadding, TermLogger, TerminalMode};

#[derive(Parser)]
#[command(name = "zs", about = "The Z# programming language compiler & interpreter bundle")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a source document
    C(CompileOptions),
    /// Initialize a project in the current directory
    Init(InitOptions),
    /// Create a new project directory
    New(NewOptions),
}

#[derive(Args)]
struct CompileOptions {
    /// Stop after validation; do not run top-level code
    #[arg(short, long, default_value_t = false)]
    validate: bool,

    /// Evaluation engine
    #[arg(short, long, default_value = "run")]
    engine: String,

    /// Output path for the back-end emitter
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// The source document to compile
    source: PathBuf,
}

#[derive(Args)]
struct InitOptions {
    /// Place sources under a src/ directory
    #[arg(long, default_value_t = false)]
    src: bool,

    project_name: Option<String>,
}

#[derive(Args)]
struct NewOptions {
    project_name: String,
}

fn main() {
    let config = ConfigBuilder::new()
        .set_location_level(LevelFilter::Error)
        .set_level_padding(LevelPadding::Off)
        .set_thread_level(LevelFilter::Off)
        .build();
    CombinedLogger::init(vec![TermLogger::new(
        LevelFilter::Error,
        config,
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )])
    .unwrap();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::C(options) => compile(options),
        Command::Init(options) => {
            let name = options.project_name.unwrap_or_else(|| {
                std::env::current_dir()
                    .ok()
                    .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
                    .unwrap_or_else(|| "project".to_string())
            });
            init_project(Path::new("."), &name, options.src)
        }
        Command::New(options) => {
            let root = PathBuf::from(&options.project_name);
            if root.exists() {
                eprintln!("'{}' already exists", root.display());
                1
            } else if std::fs::create_dir_all(&root).is_err() {
                eprintln!("cannot create '{}'", root.display());
                1
            } else {
                init_project(&root, &options.project_name, true)
            }
        }
    };
    exit(code);
}

fn compile(options: CompileOptions) -> i32 {
    let mut toolchain = Toolchain::new();

    if options.engine != "run" {
        eprintln!("unknown engine '{}'", options.engine);
        return 1;
    }

    let info = DocumentInfo::from_path(&options.source);
    let stage = if options.validate {
        ToolchainResult::BuildOrder
    } else {
        ToolchainResult::DocumentContext
    };
    toolchain.execute_document(&info, stage);

    for error in toolchain.context.state.errors() {
        CodeSpanReportGenerator::generate(error);
    }
    for message in toolchain.context.state.messages() {
        eprintln!("{}", message.format_line());
    }

    if toolchain.context.has_errors() {
        return 1;
    }

    if let Some(output) = options.output {
        // the in-memory module object is the compiler's product; emitting
        // a target executable is the back-end's job
        log::debug!("output path '{}' is reserved for the back-end emitter", output.display());
    }

    0
}

fn init_project(root: &Path, name: &str, src: bool) -> i32 {
    let source_directory = if src { root.join("src") } else { root.to_path_buf() };
    if std::fs::create_dir_all(&source_directory).is_err() {
        eprintln!("cannot create '{}'", source_directory.display());
        return 1;
    }

    let entry = source_directory.join(format!("{name}.zs"));
    let manifest = root.join("zsproject.toml");

    let entry_content = format!(
        "module {name};\n\nimport {{ print }} from \"module:core\";\n\nfun main() {{\n    print(\"hello from {name}\");\n}}\n"
    );
    let manifest_content = format!(
        "[project]\nname = \"{name}\"\nversion = \"0.1.0\"\nentry = \"{}\"\n",
        entry.strip_prefix(root).unwrap_or(&entry).display()
    );

    if entry.exists() || manifest.exists() {
        eprintln!("project files already exist");
        return 1;
    }
    if std::fs::write(&entry, entry_content).is_err() || std::fs::write(&manifest, manifest_content).is_err() {
        eprintln!("cannot write project files");
        return 1;
    }

    println!("created '{}'", entry.display());
    println!("created '{}'", manifest.display());
    0
}
