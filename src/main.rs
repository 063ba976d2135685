//! plughost - inspect extension packages and exercise the plugin runtime.
//!
//! Usage:
//!   plughost packages [ARCHIVE]...      List modules in archives
//!   plughost resolve NAME               Show where a module resolves from
//!   plughost load NAME...               Load modules into a headless host
//!   plughost compile SOURCE -o OUT      Write a compiled module
//!   plughost --help                     Show help

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, bail};
use tracing_subscriber::EnvFilter;

use plughost_archive::{ArchivePackage, CompiledUnit, Importer, ModuleExtensions, SpecLoader};
use plughost_core::RuntimeConfig;
use plughost_plugin::{CommandKind, HeadlessHost, PluginHost};

#[derive(Parser)]
#[command(
    name = "plughost",
    version,
    about = "Inspect extension packages and load them into a headless host",
    long_about = "plughost resolves dotted module names across zip archives and an \
                  override directory, and loads Rhai extension modules into an \
                  in-memory host to show what they register."
)]
struct Cli {
    #[command(flatten)]
    runtime: RuntimeArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct RuntimeArgs {
    /// Runtime config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Archive package to register (repeatable)
    #[arg(short, long = "package", global = true)]
    packages: Vec<PathBuf>,

    /// Directory whose loose files override archive contents
    #[arg(short = 'O', long = "override", global = true, conflicts_with = "no_override")]
    override_path: Option<PathBuf>,

    /// Do not consult any override directory
    #[arg(long, global = true)]
    no_override: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List the modules and resources of archive packages
    Packages {
        /// Archives to list (defaults to the registered packages)
        archives: Vec<PathBuf>,
    },

    /// Show where a module resolves from
    Resolve {
        /// Dotted module name, e.g. `Default.indentation`
        name: String,
    },

    /// Load modules into a headless host and print what they registered
    Load {
        /// Dotted module names
        #[arg(required = true)]
        names: Vec<String>,

        /// Run exit listeners and write their output here
        #[arg(long)]
        exit_log: Option<PathBuf>,

        /// Print callback timings
        #[arg(long)]
        profile: bool,
    },

    /// Wrap a script into a compiled module file
    Compile {
        /// Script source
        source: PathBuf,

        /// Output file (defaults to the source with the compiled extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli.runtime)?;

    match cli.command {
        Command::Packages { archives } => {
            let archives = if archives.is_empty() { config.packages.clone() } else { archives };
            run_packages(&config, &archives)?;
        }
        Command::Resolve { name } => {
            run_resolve(&config, &name)?;
        }
        Command::Load {
            names,
            exit_log,
            profile,
        } => {
            run_load(config, &names, exit_log.as_deref(), profile)?;
        }
        Command::Compile { source, output } => {
            run_compile(&config, &source, output)?;
        }
    }

    Ok(())
}

/// Config file first, then command-line overrides.
fn build_config(args: &RuntimeArgs) -> Result<RuntimeConfig> {
    let mut config = match &args.config {
        Some(path) => RuntimeConfig::load(path).wrap_err("Invalid config")?,
        None => RuntimeConfig::default(),
    };
    config.packages.extend(args.packages.iter().cloned());
    if let Some(path) = &args.override_path {
        config = config.with_override_path(path);
    }
    if args.no_override {
        config.override_path = None;
    }
    Ok(config)
}

/// List archive contents.
fn run_packages(config: &RuntimeConfig, archives: &[PathBuf]) -> Result<()> {
    if archives.is_empty() {
        bail!("No archives given; pass them as arguments or with --package");
    }
    let extensions = ModuleExtensions::from_config(config);

    for path in archives {
        let package = ArchivePackage::scan(path, &extensions)
            .wrap_err_with(|| format!("Cannot read {}", path.display()))?;

        println!();
        println!("{}", "─".repeat(60));
        println!(" {} ({})", package.name(), path.display());
        println!("{}", "─".repeat(60));

        for key in package.module_keys() {
            let name = if key.is_empty() {
                package.name().to_string()
            } else {
                format!("{}.{}", package.name(), key)
            };
            let marker = if package.is_package_key(key) { "▼ " } else { "  " };
            println!(" {marker}{name}");

            if let Some(resources) = package.resources_for(key) {
                for resource in resources.keys() {
                    println!("       {resource}");
                }
            }
        }

        if !package.warnings().is_empty() {
            println!();
            println!("{} warning(s) during scan", package.warnings().len());
            for warning in package.warnings() {
                println!("   {}: {} ({:?})", warning.entry, warning.message, warning.kind);
            }
        }
    }

    Ok(())
}

/// Resolve one module name.
fn run_resolve(config: &RuntimeConfig, name: &str) -> Result<()> {
    let importer = Importer::from_config(config);
    let Some(spec) = importer.find_spec(name) else {
        bail!("No module named '{name}'");
    };

    let served_by = match &spec.loader {
        SpecLoader::Archive(loader) => format!("archive {}", loader.archive_path().display()),
        SpecLoader::Loose => "override root".to_string(),
    };
    println!("{:<10} {}", "name", spec.name);
    println!("{:<10} {}", "origin", spec.origin);
    println!("{:<10} {}", "loader", served_by);
    println!("{:<10} {}", "package", spec.is_package);
    for location in &spec.search_locations {
        println!("{:<10} {}", "search", location.display());
    }

    Ok(())
}

/// Load modules into a headless host with one window and one view.
fn run_load(config: RuntimeConfig, names: &[String], exit_log: Option<&Path>, profile: bool) -> Result<()> {
    let host = Arc::new(HeadlessHost::new());
    let window = host.add_window();
    host.add_view(window);

    let runtime = PluginHost::new(host.clone(), config)?;
    for name in names {
        runtime
            .load_plugin(name)
            .wrap_err_with(|| format!("Failed to load {name}"))?;
    }
    runtime.on_api_ready();
    host.run_main();
    host.run_async();

    let snapshot = runtime.snapshot();
    println!();
    println!("{}", "─".repeat(60));
    println!(" {} module(s) loaded", snapshot.modules.len());
    println!("{}", "─".repeat(60));
    for module in &snapshot.modules {
        println!("   {module}");
    }

    for kind in CommandKind::ALL {
        let commands = snapshot.command_names(kind);
        if !commands.is_empty() {
            println!();
            println!(" {kind}s:");
            for command in commands {
                println!("   {command}");
            }
        }
    }

    if !snapshot.callbacks.is_empty() {
        println!();
        println!(" Event listeners:");
        for (event, listeners) in &snapshot.callbacks {
            println!("   {:<28} {}", event, listeners.join(", "));
        }
    }
    for (title, classes) in [
        ("View listener classes", &snapshot.view_classes),
        ("Text change listener classes", &snapshot.text_change_classes),
    ] {
        if !classes.is_empty() {
            println!();
            println!(" {title}:");
            for class in classes {
                println!("   {class}");
            }
        }
    }

    if profile {
        println!();
        println!(" Callback timings:");
        for (event, module, entry) in runtime.profiling_data() {
            println!(
                "   {:<28} {:<24} {:>5} calls  {:.3}ms avg  {:.3}ms max",
                event,
                module,
                entry.count,
                entry.sum * 1000.0 / entry.count.max(1) as f64,
                entry.max * 1000.0
            );
        }
    }

    if let Some(path) = exit_log {
        runtime.on_exit(path)?;
        if path.exists() {
            eprintln!("Exit output written to {}", path.display());
        }
    }

    Ok(())
}

/// Write a compiled module next to its source, or to `output`.
fn run_compile(config: &RuntimeConfig, source: &Path, output: Option<PathBuf>) -> Result<()> {
    let text = std::fs::read_to_string(source).wrap_err_with(|| format!("Cannot read {}", source.display()))?;
    let mtime = std::fs::metadata(source)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |age| age.as_secs() as u32);

    let unit = CompiledUnit::from_source(&text, mtime);
    let output = output.unwrap_or_else(|| source.with_extension(&config.compiled_extension));
    let bytes = unit.encode().wrap_err_with(|| format!("Cannot compile {}", source.display()))?;
    std::fs::write(&output, bytes).wrap_err_with(|| format!("Cannot write {}", output.display()))?;
    eprintln!("Compiled {} -> {}", source.display(), output.display());

    Ok(())
}
