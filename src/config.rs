//! Solver configuration.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::buckets::Buckets;
use crate::error::{CfrError, CfrResult};
use crate::game::GameDef;
use crate::stored_value::Width;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateRule {
    /// Value computation only.
    None,
    Cfr,
    CfrPlus,
}

/// Iterations before sumprob accumulation starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Warmup {
    None,
    /// Skip accumulation before iteration `n`, then weight 1.
    Hard(u64),
    /// Skip accumulation before iteration `n`, then weight `it - n + 1`.
    Soft(u64),
}

impl Warmup {
    /// Weight of iteration `it` (1-based), or None to skip accumulation.
    pub fn weight(self, it: u64) -> Option<f64> {
        match self {
            Warmup::None => Some(1.0),
            Warmup::Hard(n) if it < n => None,
            Warmup::Hard(_) => Some(1.0),
            Warmup::Soft(n) if it < n => None,
            Warmup::Soft(n) => Some((it - n + 1) as f64),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreetConfig {
    pub regret_width: Width,
    pub sumprob_width: Width,
    /// None disables flooring (plain CFR only).
    pub regret_floor: Option<f64>,
    pub regret_ceiling: Option<f64>,
    pub sumprob_ceiling: Option<f64>,
    pub regret_scaling: f64,
    pub sumprob_scaling: f64,
    pub accumulate_sumprobs: bool,
}

impl Default for StreetConfig {
    fn default() -> Self {
        StreetConfig {
            regret_width: Width::F64,
            sumprob_width: Width::F64,
            regret_floor: None,
            regret_ceiling: None,
            sumprob_ceiling: None,
            regret_scaling: 1.0,
            sumprob_scaling: 1.0,
            accumulate_sumprobs: true,
        }
    }
}

static DEFAULT_STREET: Lazy<StreetConfig> = Lazy::new(StreetConfig::default);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Per street; the last entry covers any later streets.
    pub streets: Vec<StreetConfig>,
    pub update: UpdateRule,
    pub warmup: Warmup,
    pub threads: usize,
    pub queue_capacity: usize,
    /// Street whose boards are farmed out to workers; None picks the first
    /// street with more than one board.
    pub split_street: Option<usize>,
    pub seed: u64,
    pub log_every: u64,
    pub checkpoint_every: Option<u64>,
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            streets: Vec::new(),
            update: UpdateRule::CfrPlus,
            warmup: Warmup::None,
            threads: 1,
            queue_capacity: 64,
            split_street: None,
            seed: 0,
            log_every: 100,
            checkpoint_every: None,
            checkpoint_dir: None,
        }
    }
}

impl SolverConfig {
    pub fn from_file(path: &Path) -> CfrResult<SolverConfig> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn street(&self, street: usize) -> &StreetConfig {
        self.streets
            .get(street)
            .or_else(|| self.streets.last())
            .unwrap_or(&DEFAULT_STREET)
    }

    /// Floor applied to regrets on `street` after every update.
    pub fn regret_floor(&self, street: usize) -> Option<f64> {
        let floor = self.street(street).regret_floor;
        match self.update {
            UpdateRule::CfrPlus => Some(floor.unwrap_or(0.0)),
            _ => floor,
        }
    }

    pub fn regret_widths(&self, num_streets: usize) -> Vec<Width> {
        (0..num_streets).map(|s| self.street(s).regret_width).collect()
    }

    pub fn sumprob_widths(&self, num_streets: usize) -> Vec<Width> {
        (0..num_streets).map(|s| self.street(s).sumprob_width).collect()
    }

    pub fn validate(&self, game: &GameDef) -> CfrResult<()> {
        if self.threads == 0 {
            return Err(CfrError::Config("threads must be at least 1".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(CfrError::Config("queue_capacity must be at least 1".to_string()));
        }
        if let Some(split) = self.split_street {
            if split > game.max_street() {
                return Err(CfrError::Config(format!(
                    "split street {} past the last street {}",
                    split,
                    game.max_street()
                )));
            }
        }
        for s in 0..game.num_streets() {
            let sc = self.street(s);
            if !(sc.regret_scaling.is_finite() && sc.regret_scaling > 0.0)
                || !(sc.sumprob_scaling.is_finite() && sc.sumprob_scaling > 0.0)
            {
                return Err(CfrError::Config(format!("street {}: scaling must be positive", s)));
            }
            for ceiling in [sc.regret_ceiling, sc.sumprob_ceiling].into_iter().flatten() {
                if ceiling <= 0.0 {
                    return Err(CfrError::Config(format!("street {}: ceiling must be positive", s)));
                }
            }
            let floor_ok = self.regret_floor(s).map_or(false, |f| f >= 0.0);
            if sc.regret_width.is_unsigned() && !floor_ok {
                return Err(CfrError::Config(format!(
                    "street {}: unsigned regret width {} needs a non-negative floor",
                    s, sc.regret_width
                )));
            }
        }
        Ok(())
    }

    /// Street at which board work is split across jobs, if any. A bucketed
    /// street at or after the split street shares rows across boards and so
    /// cannot be split; that is an error with several threads and disables
    /// splitting with one.
    pub fn split_street(
        &self,
        game: &GameDef,
        num_boards: impl Fn(usize) -> usize,
        buckets: &Buckets,
    ) -> CfrResult<Option<usize>> {
        let split = match self.split_street {
            Some(s) => Some(s),
            None => (0..game.num_streets()).find(|&s| num_boards(s) > 1),
        };
        let Some(split) = split else {
            return Ok(None);
        };
        if let Some(b) = (split..game.num_streets()).find(|&s| buckets.is_bucketed(s)) {
            if self.threads > 1 {
                return Err(CfrError::Config(format!(
                    "street {} is bucketed but boards from street {} run on {} threads",
                    b, split, self.threads
                )));
            }
            return Ok(None);
        }
        Ok(Some(split))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_warmup_weights_grow() {
        let w = Warmup::Soft(10);
        assert_eq!(w.weight(9), None);
        assert_eq!(w.weight(10), Some(1.0));
        assert_eq!(w.weight(14), Some(5.0));
        assert_eq!(Warmup::Hard(3).weight(20), Some(1.0));
    }

    #[test]
    fn unsigned_regrets_need_floor_under_plain_cfr() {
        let game = GameDef::kuhn();
        let mut config = SolverConfig {
            update: UpdateRule::Cfr,
            ..SolverConfig::default()
        };
        config.streets.push(StreetConfig {
            regret_width: Width::U16,
            ..StreetConfig::default()
        });
        assert!(config.validate(&game).is_err());
        config.update = UpdateRule::CfrPlus;
        assert!(config.validate(&game).is_ok());
    }

    #[test]
    fn config_parses_with_defaults() {
        let json = r#"{"threads": 4, "warmup": {"soft": 100}, "streets": [{"regret_width": "i32"}]}"#;
        let config: SolverConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.threads, 4);
        assert_eq!(config.warmup, Warmup::Soft(100));
        assert_eq!(config.street(3).regret_width, Width::I32);
        assert_eq!(config.update, UpdateRule::CfrPlus);
    }
}
