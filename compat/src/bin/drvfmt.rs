//! Reads a derivation in ATerm format from stdin, and prints it as JSON.
//!
//! Given a name as first argument, it also prints the path the derivation
//! would have in the store.
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use nix_state_compat::conf::Settings;
use nix_state_compat::derivation::{write_derivation, Derivation};
use nix_state_compat::store::MemoryStore;
use nix_state_tracing::TracingBuilder;
use serde_json::json;
use tracing::{debug, Level};

#[derive(Parser)]
struct Args {
    /// A global log level to use when printing logs.
    /// It's also possible to set `RUST_LOG` according to
    /// `tracing_subscriber::filter::EnvFilter`, which will always have
    /// priority.
    #[arg(long, default_value_t = Level::WARN)]
    log_level: Level,

    /// Settings file (store-dir, read-only-mode, state-grammar).
    #[arg(long, env = "NIX_STATE_CONF")]
    conf: Option<PathBuf>,

    /// Derivation name, without the .drv suffix. If set, the path the
    /// derivation would be stored at is added as `drvPath`.
    name: Option<String>,
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };

    debug!(path = %path.display(), "loading settings");
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read {}", path.display()))?;
    Settings::parse(&contents).with_context(|| format!("unable to parse {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    TracingBuilder::default()
        .level(args.log_level)
        .build()
        .context("unable to set up logging")?;

    let settings = load_settings(args.conf.as_deref())?;

    // read A-Term from stdin
    let mut buf = Vec::new();
    std::io::stdin()
        .read_to_end(&mut buf)
        .context("failed to read from stdin")?;

    let drv = Derivation::from_aterm_bytes(&buf).context("unable to parse derivation")?;

    let mut value = serde_json::to_value(&drv).context("unable to serialize")?;

    if let Some(name) = &args.name {
        // only the path is wanted, nothing gets written.
        let store = MemoryStore::new(settings.store_dir.clone());
        let read_only = Settings {
            read_only_mode: true,
            ..settings.clone()
        };
        let drv_path = write_derivation(&store, &read_only, &drv, name)
            .context("unable to calculate derivation path")?;

        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "drvPath".to_string(),
                json!(settings.store_dir.print_path(&drv_path)),
            );
        }
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&value).context("unable to serialize")?
    );

    Ok(())
}
