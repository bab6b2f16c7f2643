//! Dashboard configuration.
//!
//! Defaults match the clinic's pricing workbook. A JSON file can override
//! any part of it, and `CLINICA_DATA_PATH` / `CLINICA_PORT` (read after
//! `.env` is loaded) override the data source and server port.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Workbook shipped with the dashboard.
pub const DEFAULT_DATA_PATH: &str = "Docs/Clinica_Prospct.xlsx";

/// Port the HTTP server listens on.
pub const DEFAULT_PORT: u16 = 3000;

pub const ENV_DATA_PATH: &str = "CLINICA_DATA_PATH";
pub const ENV_PORT: &str = "CLINICA_PORT";

/// Source column header for each field of a procedure row.
///
/// Headers are matched after trimming, collapsing whitespace and ignoring
/// case, so `"Margem de Lucro  (Perdizes)"` also matches
/// `"margem de lucro (perdizes)"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnMap {
    pub procedure: String,
    pub product: String,
    pub charged_value: String,
    pub margin_location_a: String,
    pub margin_location_b: String,
    pub margin_pct_location_a: String,
    pub margin_pct_location_b: String,
    pub unit_cost_location_a: String,
    pub unit_cost_location_b: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            procedure: "Procedimento".to_string(),
            product: "Produto / Ativo".to_string(),
            charged_value: "Valor_Cobrado p/ Sessões à Vista_Cash".to_string(),
            margin_location_a: "Margem de Lucro  (Tatuapé / Paulista)".to_string(),
            margin_location_b: "Margem de Lucro  (Perdizes)".to_string(),
            margin_pct_location_a: "Margem %  (Tatuapé / Paulista)".to_string(),
            margin_pct_location_b: "Margem %  (Perdizes)".to_string(),
            unit_cost_location_a: "Custo_Unit_Sessões (Tatuapé / Paulista)".to_string(),
            unit_cost_location_b: "Custo_Unit_Sessões (Perdizes)".to_string(),
        }
    }
}

/// What an absent numeric cell means when averages are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValuePolicy {
    /// Any blank required cell fails the load.
    #[default]
    Reject,
    /// Average whichever site values are present; fail if none are.
    SkipMissing,
    /// Blank cells count as zero.
    TreatAsZero,
    /// Leave out rows with any blank required cell.
    DropRow,
}

/// Options that shape how a source becomes a [`crate::models::ProcedureTable`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoaderOptions {
    pub columns: ColumnMap,
    pub missing_values: MissingValuePolicy,
    /// Worksheet to read; the first one when unset.
    pub sheet: Option<String>,
}

/// Top-level configuration for the CLI and server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardConfig {
    pub data_path: PathBuf,
    pub port: u16,
    pub loader: LoaderOptions,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            port: DEFAULT_PORT,
            loader: LoaderOptions::default(),
        }
    }
}

impl DashboardConfig {
    /// Read a JSON config file. Missing keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Defaults, then the optional file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// [`DashboardConfig::load`]).
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DATA_PATH).filter(|v| !v.trim().is_empty()) {
            self.data_path = PathBuf::from(path.trim());
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: ENV_PORT.to_string(),
                value: port.clone(),
            })?;
        }
        Ok(self)
    }
}
