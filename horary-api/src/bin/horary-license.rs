//! Horary license tool
//!
//! Generates signing keys, issues signed license artifacts and inspects
//! existing ones.
//!
//! Usage:
//!   horary-license keygen --output issuer.key
//!   horary-license issue --secret-key-file issuer.key --licensed-to "Acme" \
//!       --license-type professional --days 365 --feature enhanced_engine
//!   horary-license inspect license.hlic

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use horary_license::{
    inspect, public_key_from_base64, LicenseIssuer, LicensePublicKey,
    LicenseType, TemporalError, KNOWN_FEATURES,
};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const MAX_DAYS: i64 = 3650;

#[derive(Parser, Debug)]
#[command(name = "horary-license")]
#[command(about = "Issue and inspect Horary license artifacts")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new Ed25519 signing key pair
    Keygen {
        /// Write the base64 secret key here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Sign a new license artifact
    Issue {
        /// File holding the base64 secret key
        #[arg(short, long)]
        secret_key_file: PathBuf,

        /// Licensee name
        #[arg(long)]
        licensed_to: String,

        #[arg(long, value_enum, default_value = "standard")]
        license_type: Tier,

        /// Validity in days, starting now
        #[arg(long, default_value = "365")]
        days: i64,

        /// Entitled feature (repeatable)
        #[arg(short, long = "feature")]
        features: Vec<String>,

        /// Write the artifact here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode and verify an artifact, then print its grant
    Inspect {
        path: PathBuf,

        /// Base64 public key (defaults to the key built into this binary)
        #[arg(long)]
        public_key: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Tier {
    Trial,
    Standard,
    Professional,
    Premium,
}

impl From<Tier> for LicenseType {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Trial => LicenseType::Trial,
            Tier::Standard => LicenseType::Standard,
            Tier::Professional => LicenseType::Professional,
            Tier::Premium => LicenseType::Premium,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match args.command {
        Command::Keygen { output } => keygen(output),
        Command::Issue {
            secret_key_file,
            licensed_to,
            license_type,
            days,
            features,
            output,
        } => issue(&secret_key_file, &licensed_to, license_type.into(), days, &features, output),
        Command::Inspect { path, public_key } => inspect_artifact(&path, public_key.as_deref()),
    }
}

fn keygen(output: Option<PathBuf>) -> Result<()> {
    let issuer = LicenseIssuer::generate();
    match output {
        Some(path) => {
            fs::write(&path, issuer.secret_base64())
                .with_context(|| format!("Failed to write secret key to {}", path.display()))?;
            info!("Secret key written to {}", path.display());
        }
        None => println!("secret: {}", issuer.secret_base64()),
    }
    println!("public: {}", issuer.public_base64());
    println!("public bytes: {:?}", issuer.public_key().to_bytes());
    Ok(())
}

fn issue(
    secret_key_file: &Path,
    licensed_to: &str,
    license_type: LicenseType,
    days: i64,
    features: &[String],
    output: Option<PathBuf>,
) -> Result<()> {
    if !(1..=MAX_DAYS).contains(&days) {
        bail!("--days must be between 1 and {MAX_DAYS}");
    }
    for feature in features {
        if !KNOWN_FEATURES.contains(&feature.as_str()) {
            warn!("Unknown feature id: {feature}");
        }
    }

    let secret = fs::read_to_string(secret_key_file)
        .with_context(|| format!("Failed to read secret key {}", secret_key_file.display()))?;
    let issuer = LicenseIssuer::from_base64(&secret).context("Invalid secret key")?;
    let (grant, artifact) = issuer
        .issue_for(licensed_to, license_type, Utc::now(), Duration::days(days), features)
        .context("Failed to issue license")?;

    info!(
        "Issued license {} to {} ({}), expires {}",
        grant.license_id,
        grant.licensed_to,
        grant.license_type.as_str(),
        grant.expires_at
    );
    match output {
        Some(path) => {
            fs::write(&path, format!("{artifact}\n"))
                .with_context(|| format!("Failed to write license to {}", path.display()))?;
            info!("License written to {}", path.display());
        }
        None => println!("{artifact}"),
    }
    Ok(())
}

fn inspect_artifact(path: &Path, public_key: Option<&str>) -> Result<()> {
    let key = match public_key {
        Some(encoded) => public_key_from_base64(encoded).context("Invalid public key")?,
        None => LicensePublicKey::embedded(),
    };
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let grant = inspect(&bytes, &key).context("License rejected")?;

    println!("{}", serde_json::to_string_pretty(&grant)?);
    let now = Utc::now();
    match grant.check_validity_at(now) {
        Ok(days) => println!("status: valid, {days} days remaining"),
        Err(TemporalError::NotYetValid) => println!("status: not valid until {}", grant.issued_at),
        Err(TemporalError::Expired) => println!("status: expired on {}", grant.expires_at),
    }
    Ok(())
}
