//! portalcrypt - Encrypted project package delivery
//!
//! Usage:
//!   portalcrypt init                                  - Write a default config
//!   portalcrypt seal <dir> --project <id> --out <root> - Pack and encrypt a build
//!   portalcrypt serve                                 - Run the portal server
//!   portalcrypt inspect <package>                     - Decrypt and list a package

use clap::{Parser, Subcommand};
use portalcrypt::{
    archive::{pack_directory, unpack},
    config::Config,
    crypto::{open_package, seal_package},
    server,
    source::{package_path, validate_project_id},
    vfs::VirtualFileTable,
    Envelope, Error, Result,
};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "portalcrypt")]
#[command(author = "portalcrypt Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Encrypted project package delivery")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "~/.config/portalcrypt/config.json")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Pack and encrypt a build directory
    Seal {
        /// Build output directory
        dir: PathBuf,

        /// Project id the package is published under
        #[arg(long)]
        project: String,

        /// Root of the published tree (receives projects/<id>/data.pkg)
        #[arg(long)]
        out: PathBuf,

        /// Read encryption password from file
        #[arg(long)]
        password_file: Option<PathBuf>,
    },

    /// Run the portal server
    Serve {
        /// Override the listen address
        #[arg(long)]
        listen: Option<String>,
    },

    /// Decrypt a package locally and list its files
    Inspect {
        /// Path to a data.pkg file
        package: PathBuf,

        /// Read encryption password from file
        #[arg(long)]
        password_file: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Expand ~ in config path
    let config_path = expand_tilde(&cli.config);

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = Config::load(&config_path)
                .map(|c| c.logging.level)
                .unwrap_or_else(|_| "info".to_string());
            EnvFilter::new(level)
        })
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    // Run the command
    if let Err(e) = run_command(cli.command, &config_path) {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_command(command: Commands, config_path: &Path) -> Result<()> {
    match command {
        Commands::Init { force } => cmd_init(config_path, force),

        Commands::Seal {
            dir,
            project,
            out,
            password_file,
        } => cmd_seal(&dir, &project, &out, password_file),

        Commands::Serve { listen } => cmd_serve(config_path, listen),

        Commands::Inspect {
            package,
            password_file,
        } => cmd_inspect(config_path, &package, password_file),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration already exists at {:?} (use --force to overwrite)",
            config_path
        )));
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let config = Config::default();
    config.save(config_path)?;

    info!("Configuration saved to {:?}", config_path);
    println!("Envelope source: {}", config.source.location);
    println!("Scope prefix:    {}", config.scope.prefix);
    println!("Listen address:  {}", config.server.listen);
    Ok(())
}

fn cmd_seal(dir: &Path, project: &str, out: &Path, password_file: Option<PathBuf>) -> Result<()> {
    validate_project_id(project)
        .map_err(|_| Error::Config(format!("Invalid project id: {}", project)))?;

    let password = read_password(password_file.as_deref(), true)?;

    info!("Packing {:?}...", dir);
    let archive = Zeroizing::new(pack_directory(dir)?);

    info!("Encrypting {} bytes...", archive.len());
    let envelope = seal_package(&password, &archive)?;

    let target = out.join(package_path(project));
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, envelope.encode())?;

    info!("Package written to {:?}", target);
    println!("Open with: /open?id={}&password=<password>", project);
    Ok(())
}

fn cmd_serve(config_path: &Path, listen: Option<String>) -> Result<()> {
    let mut config = Config::load_or_default(config_path)?;
    if let Some(listen) = listen {
        config.server.listen = listen;
        config.validate()?;
    }

    let runtime = tokio::runtime::Runtime::new().map_err(|e| Error::Internal(e.to_string()))?;
    runtime.block_on(server::serve(config))
}

fn cmd_inspect(config_path: &Path, package: &Path, password_file: Option<PathBuf>) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let scope = config.scope()?;

    let wire = std::fs::read_to_string(package)?;
    let envelope = Envelope::decode(&wire)?;
    let password = read_password(password_file.as_deref(), false)?;

    let plaintext = Zeroizing::new(open_package(&password, &envelope)?);
    let table = VirtualFileTable::from_entries(unpack(&plaintext, scope.prefix())?);

    println!("Package: {:?}", package);
    println!("Files:   {}", table.len());
    println!("Size:    {} bytes", table.total_bytes());
    println!();
    println!("{:<48} {:<28} {:>10}", "PATH", "TYPE", "BYTES");
    for path in table.paths() {
        if let Some(file) = table.get(path) {
            println!("{:<48} {:<28} {:>10}", path, file.mime_type, file.bytes.len());
        }
    }
    Ok(())
}

fn read_password(password_file: Option<&Path>, confirm: bool) -> Result<Zeroizing<String>> {
    if let Some(path) = password_file {
        return password_from_file(path);
    }

    let password = Zeroizing::new(
        rpassword::prompt_password("Enter package password: ")
            .map_err(|e| Error::Internal(e.to_string()))?,
    );
    if password.is_empty() {
        return Err(Error::Config("Password must not be empty".to_string()));
    }

    if confirm {
        let again = Zeroizing::new(
            rpassword::prompt_password("Confirm package password: ")
                .map_err(|e| Error::Internal(e.to_string()))?,
        );
        if *again != *password {
            return Err(Error::Config("Passwords do not match".to_string()));
        }
    }

    Ok(password)
}

/// Read a password file, trimming surrounding whitespace
fn password_from_file(path: &Path) -> Result<Zeroizing<String>> {
    let content = Zeroizing::new(
        std::fs::read_to_string(path)
            .map_err(|e| Error::Internal(format!("Failed to read password file: {}", e)))?,
    );
    let password = Zeroizing::new(content.trim().to_string());
    if password.is_empty() {
        return Err(Error::Config(format!("Password file {:?} is empty", path)));
    }
    Ok(password)
}

fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
