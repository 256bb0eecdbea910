//! `tether calculate` — compute the dependency closure of one entity.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::Args;
use serde::{Deserialize, Serialize};
use tether_collectors::default_collectors;
use tether_core::config::{ModulesConfig, load_project_config};
use tether_core::{
    ContentNode, DependencyCalculator, DependencyStack, EntityStorage, MemoryStorage, SqliteCache,
};

use crate::output::{CliError, OutputMode, kv, render, render_error, section};

/// Arguments for `tether calculate`.
#[derive(Args, Debug)]
pub struct CalculateArgs {
    /// Entity type of the root entity (e.g. "node").
    pub entity_type: String,

    /// Local id of the root entity.
    pub id: String,

    /// JSON fixture file holding the content graph to resolve against.
    #[arg(long)]
    pub fixtures: PathBuf,

    /// Cache database path (defaults to the configured project cache).
    #[arg(long)]
    pub cache: Option<PathBuf>,
}

/// On-disk fixture shape: a module topology plus a flat list of nodes.
#[derive(Debug, Default, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    modules: ModulesConfig,
    #[serde(default)]
    entities: Vec<ContentNode>,
}

#[derive(Debug, Serialize)]
struct ClosureMember {
    uuid: String,
    hash: String,
    direct_child: bool,
}

#[derive(Debug, Serialize)]
struct CalculateOutput {
    entity_type: String,
    id: String,
    uuid: String,
    hash: String,
    dependencies: Vec<ClosureMember>,
    modules: BTreeSet<String>,
}

/// Execute `tether calculate`.
pub fn run_calculate(
    args: &CalculateArgs,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let config = load_project_config(project_root)?;

    let raw = std::fs::read_to_string(&args.fixtures).map_err(|e| {
        anyhow::anyhow!("failed to read fixture file {}: {e}", args.fixtures.display())
    })?;
    let fixture: FixtureFile = serde_json::from_str(&raw).map_err(|e| {
        anyhow::anyhow!("failed to parse fixture file {}: {e}", args.fixtures.display())
    })?;

    // Fixture topology layers over the project config: fixture providers
    // and active modules win on overlap.
    let mut modules = config.modules.clone();
    modules.active.extend(fixture.modules.active);
    modules.providers.extend(fixture.modules.providers);

    let mut storage = MemoryStorage::new();
    for node in fixture.entities {
        storage.insert(node);
    }
    let storage = Rc::new(storage);

    let Some(node) = EntityStorage::load(storage.as_ref(), &args.entity_type, &args.id) else {
        render_error(
            output,
            &CliError::with_code(
                format!("entity {}/{} not found in fixtures", args.entity_type, args.id),
                "E2003",
            ),
        )?;
        anyhow::bail!("entity not found");
    };

    let cache_path = args
        .cache
        .clone()
        .unwrap_or_else(|| project_root.join(&config.cache.path));
    if let Some(parent) = cache_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let cache = SqliteCache::open(&cache_path)?;
    let mut stack = DependencyStack::new(Box::new(cache));

    let registry = Rc::new(modules.registry());
    let calculator = DependencyCalculator::new(storage.clone(), registry.clone())
        .with_collectors(default_collectors(storage, registry));

    let root = match calculator.wrap(&node) {
        Ok(root) => root,
        Err(e) => {
            render_error(output, &CliError::with_code(e.to_string(), e.code().to_string()))?;
            anyhow::bail!("entity has no uuid");
        }
    };
    let closure = calculator.calculate_dependencies(&root, &mut stack)?;

    let root_uuid = root.uuid();
    let children: BTreeMap<_, _> = root.get().child_dependencies().clone();
    let dependencies = closure
        .entities
        .iter()
        .filter(|(uuid, _)| **uuid != root_uuid)
        .map(|(uuid, wrapper)| ClosureMember {
            uuid: uuid.as_str().to_string(),
            hash: wrapper.hash(),
            direct_child: children.contains_key(uuid),
        })
        .collect();

    let payload = CalculateOutput {
        entity_type: args.entity_type.clone(),
        id: args.id.clone(),
        uuid: root_uuid.as_str().to_string(),
        hash: root.hash(),
        dependencies,
        modules: closure.modules,
    };

    render(output, &payload, render_calculate_human)
}

fn render_calculate_human(report: &CalculateOutput, w: &mut dyn Write) -> std::io::Result<()> {
    section(w, &format!("{}/{}", report.entity_type, report.id))?;
    kv(w, "uuid", &report.uuid)?;
    kv(w, "hash", &report.hash)?;
    writeln!(w)?;

    writeln!(w, "Dependencies ({})", report.dependencies.len())?;
    for member in &report.dependencies {
        let marker = if member.direct_child { "*" } else { " " };
        writeln!(w, "  {marker} {}  {}", member.uuid, member.hash)?;
    }
    if !report.dependencies.is_empty() {
        writeln!(w, "  (* = direct child)")?;
    }
    writeln!(w)?;

    writeln!(w, "Modules ({})", report.modules.len())?;
    for module in &report.modules {
        writeln!(w, "    {module}")?;
    }
    Ok(())
}
