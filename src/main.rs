//! taskflow-units - Synthesizes and manages systemd units for taskflow services.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use taskflow_units::config::{Manifest, Settings};
use taskflow_units::container::DockerCli;
use taskflow_units::error::UnitError;
use taskflow_units::history::open_run_logger;
use taskflow_units::ipc::SystemdBus;
use taskflow_units::lifecycle::LifecycleManager;
use taskflow_units::query::{UnitQuery, UnitType};
use taskflow_units::synth::UnitSynthesizer;
use taskflow_units::templates::TemplateEngine;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

/// A parsed command line verb.
#[derive(Debug)]
enum Command {
    Apply { manifest: PathBuf, start: bool },
    Render { manifest: PathBuf },
    Remove { names: Vec<String> },
    List {
        filter: Option<String>,
        unit_type: Option<UnitType>,
    },
    Files {
        filter: Option<String>,
        unit_type: Option<UnitType>,
    },
    Schedule { unit: String },
    Escape { path: String },
    Reload,
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{} {}", NAME, VERSION);
        return ExitCode::SUCCESS;
    }

    let (config_path, rest) = split_config_path(&args);

    let settings = match config_path {
        Some(path) => Settings::load(&path),
        None => {
            let defaults = Settings::default();
            defaults.validate().map(|()| defaults)
        }
    };
    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&settings) {
        eprintln!("Error initializing logging: {}", e);
        return ExitCode::FAILURE;
    }

    let command = match parse_command(&rest) {
        Some(c) => c,
        None => {
            print_help();
            return ExitCode::FAILURE;
        }
    };

    info!(version = VERSION, scope = ?settings.units.scope, "Starting {}", NAME);

    match run(&settings, command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}

/// Run one command. `Ok(false)` means it finished with reported failures.
fn run(settings: &Settings, command: Command) -> Result<bool, UnitError> {
    let unit_dir = settings.units.resolved_dir()?;
    let templates = match &settings.units.templates_dir {
        Some(dir) => TemplateEngine::with_overrides(dir)?,
        None => TemplateEngine::builtin()?,
    };
    let synthesizer = UnitSynthesizer::new(&unit_dir, settings.units.scope, templates);

    if let Command::Render { manifest } = &command {
        let plan = Manifest::load(manifest)?.into_plan(&settings.container.run_launcher)?;
        let specs = plan
            .services
            .iter()
            .chain(plan.containers.iter().map(|c| &c.service));
        for spec in specs {
            for (path, content) in synthesizer.synthesize(spec)? {
                println!("# {}\n{}", path.display(), content);
            }
        }
        return Ok(true);
    }

    let bus = SystemdBus::connect(settings.units.scope)?;

    match command {
        Command::Apply { manifest, start } => {
            let plan = Manifest::load(&manifest)?.into_plan(&settings.container.run_launcher)?;
            let history = open_run_logger(&settings.history.url)?;
            let docker = DockerCli::new(&settings.container.runtime, settings.container.timeout());
            let lifecycle = LifecycleManager::new(&bus, synthesizer)
                .with_containers(&docker)
                .with_history(history.as_ref());

            let mut created = Vec::with_capacity(plan.len());
            for spec in &plan.services {
                created.push(lifecycle.create(spec, true)?);
            }
            for service in &plan.containers {
                created.push(lifecycle.create_container_service(service, true)?);
            }
            lifecycle.reload()?;
            info!(services = created.len(), "Manifest applied");

            if start {
                for artifacts in &created {
                    // Timers drive scheduled services; everything else starts now.
                    let files = if artifacts.timer_files.is_empty() {
                        &artifacts.service_files
                    } else {
                        &artifacts.timer_files
                    };
                    lifecycle.start(files)?;
                }
            }
            Ok(true)
        }
        Command::Remove { names } => {
            let docker = DockerCli::new(&settings.container.runtime, settings.container.timeout());
            let lifecycle = LifecycleManager::new(&bus, synthesizer).with_containers(&docker);
            let mut clean = true;
            for name in &names {
                let report = lifecycle.remove_service(name)?;
                for failure in &report.failures {
                    warn!(service = %name, failure = %failure, "Removal step failed");
                }
                println!(
                    "{}: {} file(s), {} container(s) removed",
                    name,
                    report.deleted_files.len(),
                    report.deleted_containers.len()
                );
                clean &= report.is_clean();
            }
            Ok(clean)
        }
        Command::List { filter, unit_type } => {
            let query = UnitQuery::new(&bus);
            for unit in query.get_units(unit_type, filter.as_deref(), &[])? {
                println!(
                    "{:<48} {:<10} {:<10} {}",
                    unit.unit_name, unit.active_state, unit.sub_state, unit.description
                );
            }
            Ok(true)
        }
        Command::Files { filter, unit_type } => {
            let query = UnitQuery::new(&bus);
            for (path, state) in query.get_unit_file_states(unit_type, filter.as_deref(), &[])? {
                println!("{:<64} {}", path, state);
            }
            Ok(true)
        }
        Command::Schedule { unit } => {
            let query = UnitQuery::new(&bus);
            let info = query.get_schedule_info(&unit)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(true)
        }
        Command::Escape { path } => {
            println!("{}", UnitQuery::new(&bus).escape_path(&path)?);
            Ok(true)
        }
        Command::Reload => {
            LifecycleManager::new(&bus, synthesizer).reload()?;
            Ok(true)
        }
        Command::Render { .. } => Ok(true),
    }
}

fn parse_command(args: &[String]) -> Option<Command> {
    let (verb, rest) = args.split_first()?;
    let positional: Vec<&String> = rest.iter().filter(|a| !a.starts_with("--")).collect();
    let unit_type = if rest.iter().any(|a| a == "--timers") {
        Some(UnitType::Timer)
    } else if rest.iter().any(|a| a == "--services") {
        Some(UnitType::Service)
    } else {
        None
    };
    let command = match verb.as_str() {
        "apply" => Command::Apply {
            manifest: PathBuf::from(positional.first()?.as_str()),
            start: rest.iter().any(|a| a == "--start"),
        },
        "render" => Command::Render {
            manifest: PathBuf::from(positional.first()?.as_str()),
        },
        "remove" if !positional.is_empty() => Command::Remove {
            names: positional.into_iter().cloned().collect(),
        },
        "list" => Command::List {
            filter: positional.first().map(|s| s.to_string()),
            unit_type,
        },
        "files" => Command::Files {
            filter: positional.first().map(|s| s.to_string()),
            unit_type,
        },
        "schedule" => Command::Schedule {
            unit: positional.first()?.to_string(),
        },
        "escape" => Command::Escape {
            path: positional.first()?.to_string(),
        },
        "reload" => Command::Reload,
        _ => return None,
    };
    Some(command)
}

/// Split `--config <PATH>` / `--config=<PATH>` off the argument list.
fn split_config_path(args: &[String]) -> (Option<String>, Vec<String>) {
    let mut config = None;
    let mut rest = Vec::with_capacity(args.len());
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" || arg == "-c" {
            config = iter.next().cloned();
        } else if let Some(path) = arg.strip_prefix("--config=") {
            config = Some(path.to_string());
        } else {
            rest.push(arg.clone());
        }
    }
    (config, rest)
}

/// Print help message.
fn print_help() {
    println!(
        r#"{} {}
Synthesizes systemd units for taskflow services and manages their lifecycle.

USAGE:
    {} [OPTIONS] <COMMAND>

COMMANDS:
    apply <MANIFEST> [--start]  Create, enable and optionally start services
    render <MANIFEST>           Print the unit files a manifest produces
    remove <NAME>...            Stop, disable and delete services
    list [MATCH] [--timers|--services]
                                List loaded managed units
    files [MATCH] [--timers|--services]
                                List managed unit files and their state
    schedule <UNIT>             Show last and next run times as JSON
    escape <PATH>               Escape a path for use in a unit name
    reload                      Reload the service manager configuration

OPTIONS:
    -c, --config <PATH>    Path to configuration file
    -h, --help             Print help information
    -V, --version          Print version information
"#,
        NAME, VERSION, NAME
    );
}

/// Initialize logging based on settings.
fn init_logging(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    match settings.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}
