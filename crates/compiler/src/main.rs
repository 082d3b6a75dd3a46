//! lua2cpp CLI
//!
//! Command-line interface for transpiling Lua sources to C++17.
//!
//! ```text
//! l2c input.lua                      # standalone executable mode
//! l2c input.lua --lib                # library mode
//! l2c input.lua -o myapp             # output basename override
//! l2c --main path/to/main.lua        # project mode (all modules)
//! l2c input.lua --output-dir build/  # destination directory
//! ```

use clap::{CommandFactory, Parser as ClapParser};
use clap_complete::{generate, Shell};
use l2c::{validate, BuildOutput, CompilerConfig};
use std::io;
use std::path::PathBuf;
use std::process;

#[derive(ClapParser)]
#[command(name = "l2c")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Lua to C++17 transpiler", long_about = None)]
struct Cli {
    /// Input Lua file (the project main file with --main)
    input: Option<PathBuf>,

    /// Treat the input as a project main file and transpile all modules
    #[arg(long)]
    main: bool,

    /// Generate as a library (no main.cpp, no `arg` state member)
    #[arg(long)]
    lib: bool,

    /// Custom output basename (default: input filename)
    #[arg(short, long)]
    output: Option<String>,

    /// Output directory (default: current directory)
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Diagnostics severity configuration (TOML)
    #[arg(long, value_name = "PATH")]
    diagnostics_config: Option<PathBuf>,

    /// Enable verbose progress output
    #[arg(short, long)]
    verbose: bool,

    /// Generate shell completions and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<Shell>,
}

fn main() {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "l2c", &mut io::stdout());
        return;
    }

    let Some(input) = cli.input.clone() else {
        eprintln!("Error: no input file given (see --help)");
        process::exit(1);
    };
    if !input.exists() {
        eprintln!("Error: input file not found: {}", input.display());
        process::exit(1);
    }

    let mut config = CompilerConfig::new()
        .with_library_mode(cli.lib)
        .with_output_dir(cli.output_dir.clone())
        .with_verbose(cli.verbose);
    if let Some(name) = &cli.output {
        config = config.with_output_name(name.clone());
    }
    if let Some(path) = &cli.diagnostics_config {
        config = match config.load_diagnostics(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        };
    }

    let result = if cli.main {
        l2c::transpile_project(&input, &config)
    } else {
        l2c::transpile_single_file(&input, &config)
    };

    let build = match result {
        Ok(build) => build,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    report_build(&build, &config);

    match l2c::write_output(&config.output_dir, &build.files) {
        Ok(written) => {
            for path in &written {
                println!("Generated: {}", path.display());
            }
            print_compile_hint(&build, &config);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }

    if validate::has_errors(&build.diagnostics) {
        process::exit(1);
    }
}

/// Print diagnostics and verbose statistics to stderr.
fn report_build(build: &BuildOutput, config: &CompilerConfig) {
    if !build.diagnostics.is_empty() {
        eprintln!(
            "{}",
            validate::format_report(&build.diagnostics, config.diagnostics.max_issues)
        );
        eprintln!("{}", validate::format_summary(&build.diagnostics));
    }
    for block in &build.statistics {
        eprintln!("{}", block);
    }
}

/// Remind the user how to compile what was just generated.
fn print_compile_hint(build: &BuildOutput, config: &CompilerConfig) {
    let Some(main_file) = build
        .files
        .iter()
        .find(|f| f.name.ends_with("_main.cpp"))
    else {
        if let Some(header) = build.files.iter().find(|f| f.name.ends_with("_module.hpp")) {
            println!("\nTo use as a library, include:");
            println!("  #include \"{}\"", header.name);
        }
        return;
    };
    let binary = main_file.name.trim_end_matches("_main.cpp");
    println!("\nTo compile:");
    println!("  cd {}", config.output_dir.display());
    println!(
        "  g++ -std=c++17 -I <l2c-runtime> -o {} {} *_module.cpp",
        binary, main_file.name
    );
}
