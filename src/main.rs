use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use gatekeeper::config::{ENV_CURRENT_KEY, ENV_PREVIOUS_KEY};
use gatekeeper::{
    HashParams, KeyFile, KeyRing, KeySet, default_key_path, hash_password, verify_password,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod auth;

#[derive(Debug, clap::Args)]
struct Argon2Args {
    /// Argon2 memory cost in KiB (default: 65536)
    #[arg(long = "argon-mem")]
    mem_cost_kib: Option<u32>,

    /// Argon2 time cost / iterations (default: CPU count, at most 8)
    #[arg(long = "argon-time")]
    time_cost: Option<u32>,

    /// Argon2 parallelism (default: CPU count)
    #[arg(long = "argon-parallelism")]
    parallelism: Option<u32>,

    /// Salt length in bytes (default: 32)
    #[arg(long = "salt-len")]
    salt_len: Option<u8>,

    /// Derived key length in bytes (default: 32)
    #[arg(long = "key-len")]
    output_len: Option<u8>,
}

impl Argon2Args {
    fn to_hash_params(&self) -> Result<HashParams> {
        let default = HashParams::default();

        HashParams::new(
            self.salt_len.unwrap_or(default.salt_len()),
            self.time_cost.unwrap_or(default.time_cost()),
            self.mem_cost_kib.unwrap_or(default.mem_cost_kib()),
            self.parallelism.unwrap_or(default.parallelism()),
            self.output_len.unwrap_or(default.output_len()),
        )
    }
}

fn resolve_key_file(path: Option<PathBuf>) -> Result<KeyFile> {
    match path {
        Some(p) => Ok(KeyFile::new(p)),
        None => Ok(KeyFile::new(default_key_path()?)),
    }
}

#[derive(Debug, Parser)]
#[command(name = "gatekeeper")]
#[command(
    version,
    about = "Manage cookie keys and password hashes for the gatekeeper authentication core."
)]
struct Cli {
    /// Path to the key file
    #[arg(long, global = true, value_name = "PATH", env = "GATEKEEPER_KEY_FILE")]
    key_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Prints a freshly generated key in `hash$block` form
    Keygen,

    /// Creates the key file with a fresh current key
    Init,

    /// Moves the current key to previous and installs a fresh current key
    Rotate,

    /// Shows key fingerprints and the last rotation time
    Info,

    /// Prints the keys as environment assignments
    Export,

    /// Hashes a password and prints the encoded record
    Hash {
        #[command(flatten)]
        argon2: Argon2Args,
    },

    /// Checks a password against an encoded record
    #[command(arg_required_else_help = true)]
    Verify { record: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    match args.command {
        Commands::Keygen => {
            let keys = KeySet::generate()?;
            println!("{}", keys.encode().as_str());
        }
        Commands::Init => {
            let file = resolve_key_file(args.key_file)?;
            if file.exists() {
                bail!("key file {} already exists", file.path().display());
            }

            let keys = KeyRing::new(KeySet::generate()?, None);
            file.save(&keys, Utc::now())?;
            info!(path = %file.path().display(), "created key file");
            println!("key file initialized");
        }
        Commands::Rotate => {
            let file = resolve_key_file(args.key_file)?;
            let contents = file.load()?;

            let rotated = contents.keys.rotate(KeySet::generate()?);
            file.save(&rotated, Utc::now())?;
            info!(fingerprint = %rotated.current().fingerprint(), "rotated keys");
            println!("keys rotated");
        }
        Commands::Info => {
            let file = resolve_key_file(args.key_file)?;
            let contents = file.load()?;
            let previous = contents
                .keys
                .previous()
                .map(KeySet::fingerprint)
                .unwrap_or_else(|| "none".to_string());

            println!("Path:       {}", file.path().display());
            println!("Current:    {}", contents.keys.current().fingerprint());
            println!("Previous:   {previous}");
            println!("Rotated at: {}", contents.rotated_at.to_rfc3339());
        }
        Commands::Export => {
            let file = resolve_key_file(args.key_file)?;
            let contents = file.load()?;

            println!("{ENV_CURRENT_KEY}={}", contents.keys.current().encode().as_str());
            match contents.keys.previous() {
                Some(previous) => println!("{ENV_PREVIOUS_KEY}={}", previous.encode().as_str()),
                None => println!("{ENV_PREVIOUS_KEY}="),
            }
        }
        Commands::Hash { argon2 } => {
            let params = argon2.to_hash_params()?;
            let password = auth::read_password()?;
            let record = hash_password(&password, params).context("failed to hash password")?;
            println!("{record}");
        }
        Commands::Verify { record } => {
            let password = auth::read_password()?;
            if verify_password(&password, record.trim()).context("cannot verify password")? {
                println!("password matches");
            } else {
                println!("password does not match");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
