use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    time::Duration,
};

use anyhow::Result;
use osl_nodes_codegen::{
    codegen::CodegenOptions,
    config,
    driver::{BatchReport, DriverConfig, LibraryCodegenDriver},
    graph::GraphOptions,
    library::{self, OSL_TARGET},
    oslc::{DEFAULT_TIMEOUT, OslcCompiler},
    search_path::FileSearchPath,
};

const USAGE: &str = "    Options: \n\
    \x20       --outputPath [DIRPATH]          Directory receiving the .osl/.oso files and the log\n\
    \x20       --oslCompilerPath [FILEPATH]    Path to the oslc executable\n\
    \x20       --oslIncludePath [DIRPATH]      Extra include directory passed to oslc\n\
    \x20       --libraries [STRING]            Comma separated library folders to load (default: all)\n\
    \x20       --prefix [STRING]               Prefix added to every generated shader name\n\
    \x20       --librariesRoot [DIRPATH]       Root containing the libraries folder (repeatable)\n\
    \x20       --timeout [SECONDS]             Time limit for a single oslc run\n\
    \x20       --wrap                          Append a setCi sink to every unit (test harnesses)\n\
    \x20       --help                          Display the complete list of command-line options\n";

const GENOSL_INCLUDE: &str = "libraries/stdlib/genosl/include";

#[derive(Debug, Default, Clone)]
struct Cli {
    output_path: String,
    osl_compiler_path: String,
    osl_include_path: String,
    libraries: Vec<String>,
    prefix: Option<String>,
    library_roots: Vec<PathBuf>,
    timeout: Option<Duration>,
    wrap: bool,
    help: bool,
    warnings: Vec<String>,
}

fn parse_cli(args: &[String]) -> Cli {
    let mut cli = Cli::default();
    let mut i = 0;
    while i < args.len() {
        let token = args[i].as_str();
        let value = args.get(i + 1).map(String::as_str);

        let takes_value = match token {
            "--outputPath" | "--oslCompilerPath" | "--oslIncludePath" | "--libraries"
            | "--prefix" | "--librariesRoot" | "--timeout" => true,
            "--wrap" => {
                cli.wrap = true;
                false
            }
            "--help" => {
                cli.help = true;
                return cli;
            }
            other => {
                cli.warnings.push(format!(
                    "unrecognized command-line option: {other} (use --help for the list of options)"
                ));
                false
            }
        };

        if !takes_value {
            i += 1;
            continue;
        }
        let Some(v) = value.filter(|v| !v.is_empty()) else {
            cli.warnings
                .push(format!("expected another token following command-line option: {token}"));
            i += 1;
            continue;
        };

        match token {
            "--outputPath" => cli.output_path = v.to_string(),
            "--oslCompilerPath" => cli.osl_compiler_path = v.to_string(),
            "--oslIncludePath" => cli.osl_include_path = v.to_string(),
            "--libraries" => {
                cli.libraries = v
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "--prefix" => cli.prefix = Some(v.to_string()),
            "--librariesRoot" => cli.library_roots.push(PathBuf::from(v)),
            "--timeout" => match v.parse::<f64>() {
                Ok(secs) if secs.is_finite() && secs > 0.0 => {
                    cli.timeout = Some(Duration::from_secs_f64(secs));
                }
                _ => cli
                    .warnings
                    .push(format!("invalid --timeout value {v}; using the default")),
            },
            _ => unreachable!("option list above is exhaustive"),
        }
        i += 2;
    }
    cli
}

fn run(cli: Cli) -> Result<BatchReport> {
    let output_path = config::prepare_output_path(Path::new(&cli.output_path))?;
    let oslc = config::validate_compiler_path(Path::new(&cli.osl_compiler_path))?;
    let include = config::validate_include_path(Path::new(&cli.osl_include_path))?;

    let search_path = if cli.library_roots.is_empty() {
        FileSearchPath::from_env()
    } else {
        FileSearchPath::from_roots(cli.library_roots)
    };

    let folders = library::library_folders(&cli.libraries);
    let mut doc = library::load_libraries(&folders, &search_path)?;
    log::info!(
        "[startup] loaded {} node definitions from {:?}",
        doc.nodedefs.len(),
        search_path.roots()
    );

    let mut include_paths = vec![include];
    if let Some(genosl_include) = search_path.find(GENOSL_INCLUDE) {
        include_paths.push(genosl_include);
    }

    // Implementation files are declared relative to the libraries folder.
    let mut object_search_path = FileSearchPath::new();
    for root in search_path.roots() {
        object_search_path.append(root.join("libraries"));
        object_search_path.append(root.clone());
    }

    let driver_config = DriverConfig {
        output_path,
        target: OSL_TARGET.to_string(),
        prefix: cli.prefix,
        include_paths,
        codegen: CodegenOptions {
            wrapper_mode: cli.wrap,
            object_search_path,
        },
        graph: GraphOptions::default(),
    };
    let compiler = OslcCompiler::new(oslc).with_timeout(cli.timeout.unwrap_or(DEFAULT_TIMEOUT));

    LibraryCodegenDriver::new(&driver_config, &compiler).run_to_file(&mut doc)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli(&argv);
    for warning in &cli.warnings {
        log::warn!("[cli] {warning}");
    }

    if cli.help {
        println!(
            "libs-to-oso {} - generate and compile OSL nodes for a node library",
            env!("CARGO_PKG_VERSION")
        );
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    match run(cli) {
        Ok(report) if !report.failed() => ExitCode::SUCCESS,
        Ok(report) => {
            eprintln!(
                "Failed to generate and compile {} of {} node definitions, see the log file for details.",
                report.failures.len(),
                report.attempted()
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
