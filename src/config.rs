//! Node configuration
//!
//! Loaded from an optional JSON file, then overridden from `CHAIN_*`
//! environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::consensus::{ChainParams, MAX_DIFFICULTY};
use crate::constants::{
    COINBASE_REWARD, DEFAULT_CUTOFF_AGE, DEFAULT_DIFFICULTY, DEFAULT_FINALITY_DEPTH,
};
use crate::error::{ChainError, Result};
use crate::validation::Amount;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub difficulty: usize,
    pub cutoff_age: u64,
    pub finality_depth: u64,
    /// Decimal coin amount, e.g. `"25"` or `"12.5"`
    pub coinbase_reward: String,
    pub database_path: Option<PathBuf>,
    pub debug: bool,
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            cutoff_age: DEFAULT_CUTOFF_AGE,
            finality_depth: DEFAULT_FINALITY_DEPTH,
            coinbase_reward: COINBASE_REWARD.canonical_string(),
            database_path: None,
            debug: false,
            log_level: "info".to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(
    vars: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>> {
    match vars(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ChainError::Config(format!("{name}: cannot parse {raw:?}"))),
        None => Ok(None),
    }
}

impl NodeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ChainError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| ChainError::Config(format!("{}: {e}", path.display())))
    }

    /// File (if given) plus process environment, validated
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CHAIN_*` overrides from `vars`
    pub fn apply_env(&mut self, vars: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = env_parse(&vars, "CHAIN_DIFFICULTY")? {
            self.difficulty = v;
        }
        if let Some(v) = env_parse(&vars, "CHAIN_CUTOFF_AGE")? {
            self.cutoff_age = v;
        }
        if let Some(v) = env_parse(&vars, "CHAIN_FINALITY_DEPTH")? {
            self.finality_depth = v;
        }
        if let Some(v) = vars("CHAIN_DATABASE_PATH") {
            self.database_path = (!v.is_empty()).then(|| PathBuf::from(v));
        }
        if let Some(v) = env_parse(&vars, "CHAIN_DEBUG")? {
            self.debug = v;
        }
        if self.debug {
            self.log_level = "debug".to_string();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(ChainError::Config(format!(
                "difficulty {} exceeds {}",
                self.difficulty, MAX_DIFFICULTY
            )));
        }
        if self.finality_depth == 0 {
            return Err(ChainError::Config("finality_depth must be positive".to_string()));
        }
        if self.finality_depth >= self.cutoff_age {
            return Err(ChainError::Config(format!(
                "finality_depth {} must be below cutoff_age {}",
                self.finality_depth, self.cutoff_age
            )));
        }
        let reward = self.reward()?;
        if reward.is_negative() {
            return Err(ChainError::Config("coinbase_reward is negative".to_string()));
        }
        Ok(())
    }

    pub fn reward(&self) -> Result<Amount> {
        self.coinbase_reward.parse().map_err(|_| {
            ChainError::Config(format!("bad coinbase_reward {:?}", self.coinbase_reward))
        })
    }

    pub fn chain_params(&self) -> Result<ChainParams> {
        Ok(ChainParams {
            difficulty: self.difficulty,
            cutoff_age: self.cutoff_age,
            finality_depth: self.finality_depth,
            coinbase_reward: self.reward()?,
        })
    }
}
