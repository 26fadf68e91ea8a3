//! Match strategies and the append-only match log.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use refdedup_core::{OverlapConfig, Preset, StrategyConfig};

/// A named, versioned rule set controlling clustering.
///
/// Either a legacy preset or a fully custom [`StrategyConfig`]; when both
/// are present the custom config wins. At most one strategy per project is
/// active at any moment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchStrategy {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    /// Legacy preset; `None` for fully custom strategies.
    pub preset: Option<Preset>,
    /// Custom tier configuration; takes precedence over `preset`.
    pub config: Option<StrategyConfig>,
    /// Field selection for overlap detection runs.
    pub overlap_config: Option<OverlapConfig>,
    pub is_active: bool,
    pub created_at_ms: u64,
}

impl MatchStrategy {
    /// A preset-backed strategy.
    #[must_use]
    pub fn from_preset(project_id: Uuid, name: impl Into<String>, preset: Preset) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            name: name.into(),
            preset: Some(preset),
            config: None,
            overlap_config: None,
            is_active: false,
            created_at_ms: super::now_millis(),
        }
    }

    /// Resolves the effective tier configuration: custom config wins, then
    /// the preset mapping, then safe defaults.
    #[must_use]
    pub fn resolve_config(&self) -> StrategyConfig {
        if let Some(config) = &self.config {
            return config.clone();
        }
        self.preset
            .map_or_else(StrategyConfig::default, StrategyConfig::from_preset)
    }

    /// Resolves the overlap field selection, defaulting when unset.
    #[must_use]
    pub fn resolve_overlap_config(&self) -> OverlapConfig {
        self.overlap_config.clone().unwrap_or_default()
    }

    /// Preset used for import-time key computation.
    #[must_use]
    pub fn import_preset(&self) -> Preset {
        self.preset.unwrap_or(Preset::DoiFirstStrict)
    }
}

/// What happened to a record source during a dedup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchAction {
    Unchanged,
    Merged,
    Split,
    Created,
}

/// Append-only audit row: where a record source was and where it went,
/// with the evidence that moved it. Both record ids were valid at the
/// moment the row was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchLogEntry {
    pub id: Uuid,
    pub dedup_job_id: Uuid,
    pub record_source_id: Uuid,
    pub old_record_id: Uuid,
    pub new_record_id: Uuid,
    pub match_key: Option<String>,
    pub match_basis: String,
    pub action: MatchAction,
}
