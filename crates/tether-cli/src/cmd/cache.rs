//! `tether cache clear` — drop every persisted closure snapshot.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Args;
use serde::Serialize;
use tether_core::SqliteCache;
use tether_core::cache::DependencyCache;
use tether_core::config::load_project_config;

use crate::output::{OutputMode, kv, render, section};

/// Arguments for `tether cache clear`.
#[derive(Args, Debug, Default)]
pub struct ClearArgs {
    /// Cache database path (defaults to the configured project cache).
    #[arg(long)]
    pub cache: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ClearOutput {
    path: String,
    cleared: bool,
}

/// Execute `tether cache clear`.
pub fn run_clear(args: &ClearArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let config = load_project_config(project_root)?;
    let cache_path = args
        .cache
        .clone()
        .unwrap_or_else(|| project_root.join(&config.cache.path));

    // A cache that was never created has nothing to clear.
    let cleared = if cache_path.exists() {
        let cache = SqliteCache::open(&cache_path)?;
        cache.delete_all_permanent()?;
        true
    } else {
        false
    };

    let payload = ClearOutput {
        path: cache_path.display().to_string(),
        cleared,
    };

    render(output, &payload, |report, w| {
        section(w, "Cache clear")?;
        kv(w, "path", &report.path)?;
        kv(w, "cleared", if report.cleared { "yes" } else { "no (no cache file)" })?;
        writeln!(w)
    })
}
