//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/sponsorgraph/sponsorgraph.toml`
//! 3. Local config: `<dir>/.sponsorgraph.toml`
//! 4. Environment variables: `SPONSORGRAPH_*` prefix

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::commission::{builtin_skus, CommissionCatalog, DEFAULT_SKU};
use crate::domain::traversal::{DEFAULT_UPLINE_DEPTH, MAX_UPLINE_DEPTH};
use crate::domain::{AnalyzerOptions, SkuDefaults};

const APP_NAME: &str = "sponsorgraph";

/// Expand `~`, `$VAR` and `${VAR}` in a path string. Unresolvable input is
/// returned unchanged.
pub fn expand_env_vars(path: &str) -> String {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

/// Integrity analysis tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Orphans registered within this many days are flagged as recent.
    pub recent_orphan_days: u32,
    /// Edit-distance bound for "similar id" evidence.
    pub similar_id_max_distance: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            recent_orphan_days: 30,
            similar_id_max_distance: 2,
        }
    }
}

/// Commission engine tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommissionConfig {
    /// SKU whose defaults apply to unknown SKUs.
    pub default_sku: String,
    /// Upline hops paid on guest purchases.
    pub guest_upline_depth: usize,
    /// Upline hops paid on partner purchases (5 = extended mode).
    pub partner_upline_depth: usize,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            default_sku: DEFAULT_SKU.to_string(),
            guest_upline_depth: DEFAULT_UPLINE_DEPTH,
            partner_upline_depth: DEFAULT_UPLINE_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawAnalysisConfig {
    pub recent_orphan_days: Option<u32>,
    pub similar_id_max_distance: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawCommissionConfig {
    pub default_sku: Option<String>,
    pub guest_upline_depth: Option<usize>,
    pub partner_upline_depth: Option<usize>,
}

/// Raw settings for intermediate parsing.
///
/// Every field is optional so layered merging can tell "not specified"
/// (`None`) apart from an explicit value, including an explicit empty array.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub store_path: Option<PathBuf>,
    pub root_ids: Option<Vec<String>>,
    pub analysis: RawAnalysisConfig,
    pub commission: RawCommissionConfig,
    pub catalog: Option<BTreeMap<String, SkuDefaults>>,
}

/// Unified configuration for sponsorgraph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// JSON graph file used by the file-backed store
    pub store_path: PathBuf,
    /// Root/administrative ids exempt from orphan detection
    pub root_ids: Vec<String>,
    pub analysis: AnalysisConfig,
    pub commission: CommissionConfig,
    /// Per-SKU default prices and commission tables
    pub catalog: BTreeMap<String, SkuDefaults>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            root_ids: vec!["admin".into()],
            analysis: AnalysisConfig::default(),
            commission: CommissionConfig::default(),
            catalog: builtin_skus(),
        }
    }
}

/// Get the default store file (~/.sponsorgraph/graph.json).
fn default_store_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".sponsorgraph").join("graph.json"))
        .unwrap_or_else(|| PathBuf::from("~/.sponsorgraph/graph.json"))
}

/// Get the XDG config directory for sponsorgraph.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join(format!("{APP_NAME}.toml")))
}

/// Get the path to the local config file in a directory.
pub fn local_config_path(dir: &Path) -> PathBuf {
    dir.join(format!(".{APP_NAME}.toml"))
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

/// Merge arrays with union semantics and negation support.
///
/// - Items from overlay are added to base
/// - Items prefixed with `!` remove the corresponding item from the result
/// - Duplicates are de-duplicated
///
/// # Examples
/// ```ignore
/// merge_array(&["admin"], &["ops"])           // → ["admin", "ops"]
/// merge_array(&["admin", "ops"], &["!admin"]) // → ["ops"]
/// ```
pub fn merge_array(base: &[String], overlay: &[String]) -> Vec<String> {
    let mut result: HashSet<String> = base.iter().cloned().collect();

    for item in overlay {
        if let Some(negated) = item.strip_prefix('!') {
            result.remove(negated);
        } else {
            result.insert(item.clone());
        }
    }

    // Convert to sorted Vec for deterministic output
    let mut vec: Vec<String> = result.into_iter().collect();
    vec.sort();
    vec
}

impl AnalysisConfig {
    fn overlay(&self, raw: &RawAnalysisConfig) -> Self {
        Self {
            recent_orphan_days: raw.recent_orphan_days.unwrap_or(self.recent_orphan_days),
            similar_id_max_distance: raw
                .similar_id_max_distance
                .unwrap_or(self.similar_id_max_distance),
        }
    }
}

impl CommissionConfig {
    fn overlay(&self, raw: &RawCommissionConfig) -> Self {
        Self {
            default_sku: raw
                .default_sku
                .clone()
                .unwrap_or_else(|| self.default_sku.clone()),
            guest_upline_depth: raw.guest_upline_depth.unwrap_or(self.guest_upline_depth),
            partner_upline_depth: raw
                .partner_upline_depth
                .unwrap_or(self.partner_upline_depth),
        }
    }
}

impl Settings {
    /// Expand shell variables and tilde in `store_path`.
    fn expand_paths(&mut self) {
        let expanded = expand_env_vars(self.store_path.to_string_lossy().as_ref());
        self.store_path = PathBuf::from(expanded);
    }

    /// Catalog entries from overlay replace same-named SKUs, others are kept.
    fn overlay_catalog(&self, raw: &RawSettings) -> BTreeMap<String, SkuDefaults> {
        let mut catalog = self.catalog.clone();
        if let Some(overlay) = &raw.catalog {
            for (sku, defaults) in overlay {
                catalog.insert(sku.clone(), defaults.clone());
            }
        }
        catalog
    }

    /// Merge overlay config onto self (base) with union semantics for `root_ids`.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            store_path: overlay
                .store_path
                .clone()
                .unwrap_or_else(|| self.store_path.clone()),
            root_ids: overlay
                .root_ids
                .as_ref()
                .map(|o| merge_array(&self.root_ids, o))
                .unwrap_or_else(|| self.root_ids.clone()),
            analysis: self.analysis.overlay(&overlay.analysis),
            commission: self.commission.overlay(&overlay.commission),
            catalog: self.overlay_catalog(overlay),
        }
    }

    /// Apply global config onto defaults with REPLACE semantics for `root_ids`.
    ///
    /// Compiled defaults are only placeholders; the global file defines the
    /// real baseline, and local files add to it with `merge_with()`.
    fn apply_global(&self, global: &RawSettings) -> Self {
        Self {
            store_path: global
                .store_path
                .clone()
                .unwrap_or_else(|| self.store_path.clone()),
            root_ids: global
                .root_ids
                .clone()
                .unwrap_or_else(|| self.root_ids.clone()),
            analysis: self.analysis.overlay(&global.analysis),
            commission: self.commission.overlay(&global.commission),
            catalog: self.overlay_catalog(global),
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `local_dir` - Optional directory holding a `.sponsorgraph.toml`
    ///
    /// # Array Merge Semantics (`root_ids`)
    /// - Defaults → Global: REPLACE
    /// - Global → Local: UNION with `!id` negation
    /// - Any → Env vars: REPLACE
    pub fn load(local_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                let raw = load_raw_settings(&global_path)?;
                current = current.apply_global(&raw);
            }
        }

        if let Some(dir) = local_dir {
            let local_path = local_config_path(dir);
            if local_path.exists() {
                let raw = load_raw_settings(&local_path)?;
                current = current.merge_with(&raw);
            }
        }

        current = Self::apply_env_overrides(current)?;
        current.expand_paths();

        Ok(current)
    }

    /// Apply SPONSORGRAPH_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let builder = Config::builder().add_source(
            Environment::with_prefix("SPONSORGRAPH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("root_ids"),
        );

        let config = builder.build().map_err(config_err)?;

        if let Ok(val) = config.get_string("store_path") {
            settings.store_path = PathBuf::from(val);
        }
        if let Ok(val) = config.get::<Vec<String>>("root_ids") {
            settings.root_ids = val;
        }
        if let Ok(val) = config.get::<u32>("analysis.recent_orphan_days") {
            settings.analysis.recent_orphan_days = val;
        }
        if let Ok(val) = config.get::<usize>("analysis.similar_id_max_distance") {
            settings.analysis.similar_id_max_distance = val;
        }
        if let Ok(val) = config.get_string("commission.default_sku") {
            settings.commission.default_sku = val;
        }
        if let Ok(val) = config.get::<usize>("commission.guest_upline_depth") {
            settings.commission.guest_upline_depth = val;
        }
        if let Ok(val) = config.get::<usize>("commission.partner_upline_depth") {
            settings.commission.partner_upline_depth = val;
        }

        Ok(settings)
    }

    /// Analyzer options for a run at `now`.
    pub fn analyzer_options(&self, now: DateTime<Utc>) -> AnalyzerOptions {
        AnalyzerOptions {
            root_ids: self.root_ids.clone(),
            recent_orphan_window: Duration::days(i64::from(self.analysis.recent_orphan_days)),
            similar_id_max_distance: self.analysis.similar_id_max_distance,
            now,
        }
    }

    pub fn catalog(&self) -> CommissionCatalog {
        CommissionCatalog::new(self.commission.default_sku.clone(), self.catalog.clone())
    }

    /// Guest upline depth, clamped to `1..=3`.
    pub fn guest_upline_depth(&self) -> usize {
        self.commission
            .guest_upline_depth
            .clamp(1, DEFAULT_UPLINE_DEPTH)
    }

    /// Partner upline depth, clamped to `1..=5`.
    pub fn partner_upline_depth(&self) -> usize {
        self.commission
            .partner_upline_depth
            .clamp(1, MAX_UPLINE_DEPTH)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# sponsorgraph configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/sponsorgraph/sponsorgraph.toml  (defines your baseline)
#   Local:  <dir>/.sponsorgraph.toml                   (per-installation additions)
#   Env:    SPONSORGRAPH_* environment variables       (explicit overrides)
#
# root_ids: the global file REPLACES the compiled default, a local file
# UNIONS with it. Use "!id" in a local file to drop an inherited root:
#   root_ids = ["ops", "!admin"]

# JSON graph file
# store_path = "~/.sponsorgraph/graph.json"

# Accounts that legitimately have no sponsor
# root_ids = ["admin"]

[analysis]
# Orphans younger than this are flagged as a likely registration race
# recent_orphan_days = 30

# Edit distance used to find ids similar to a missing sponsor id
# similar_id_max_distance = 2

[commission]
# SKU whose defaults apply to unknown SKUs
# default_sku = "H2-1"

# Upline hops paid on guest purchases (max 3)
# guest_upline_depth = 3

# Upline hops paid on partner purchases (max 5, extended mode)
# partner_upline_depth = 3

# Per-SKU defaults
# [catalog.H2-1]
# retail_price = 6500
# partner_price = 4900
# [catalog.H2-1.commissions.guest]
# L0 = 1600
# [catalog.H2-1.commissions.partner]
# L1 = 900
# L2 = 500
# L3 = 200
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
