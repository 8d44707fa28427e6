//! Shared JSON fixtures for scenecraft tests and benches.
//!
//! Fixtures live under `fixtures/` at the workspace root and are addressed by
//! name through `fixtures/manifest.json`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    choreographies: HashMap<String, String>,
    bindings: HashMap<String, String>,
    scenarios: HashMap<String, ScenarioEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScenarioEntry {
    Path(String),
    Detailed {
        signals: String,
        #[serde(default)]
        choreographies: Vec<String>,
    },
}

impl ScenarioEntry {
    fn signals_path(&self) -> &str {
        match self {
            ScenarioEntry::Path(path) => path,
            ScenarioEntry::Detailed { signals, .. } => signals,
        }
    }
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn load_json<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let text = read_to_string(rel)?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON fixture {rel}"))
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    map.get(name)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

pub mod choreographies {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.choreographies.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        let rel = lookup(&MANIFEST.choreographies, "choreography", name)?;
        read_to_string(rel)
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let rel = lookup(&MANIFEST.choreographies, "choreography", name)?;
        super::load_json(rel)
    }
}

pub mod bindings {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.bindings.keys().cloned().collect()
    }

    /// A bindings fixture is a JSON array of binding objects.
    pub fn load<T: DeserializeOwned>(name: &str) -> Result<Vec<T>> {
        let rel = lookup(&MANIFEST.bindings, "binding", name)?;
        super::load_json(rel)
    }
}

pub mod scenarios {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.scenarios.keys().cloned().collect()
    }

    /// Ordered signal stream for the scenario.
    pub fn signals<T: DeserializeOwned>(name: &str) -> Result<Vec<T>> {
        let entry = lookup(&MANIFEST.scenarios, "scenario", name)?;
        super::load_json(entry.signals_path())
    }

    /// Choreography fixture names the scenario expects to be registered.
    pub fn choreographies(name: &str) -> Result<Vec<String>> {
        let entry = lookup(&MANIFEST.scenarios, "scenario", name)?;
        Ok(match entry {
            ScenarioEntry::Path(_) => Vec::new(),
            ScenarioEntry::Detailed { choreographies, .. } => choreographies.clone(),
        })
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let entry = lookup(&MANIFEST.scenarios, "scenario", name)?;
        Ok(resolve_path(entry.signals_path()))
    }
}
