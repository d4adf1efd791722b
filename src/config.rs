use crate::error::DuelError;
use crate::types::UserId;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuelConfig {
    pub expiry_secs: u64,
    pub start_delay_secs: u64,
    pub invalidate_window_secs: i64,
    pub no_draw_secs: i64,
    pub elo_k: f64,
    pub default_rating: i32,
    pub handicap_secs_per_100: f64,
    pub rating_floor: i32,
    pub suggested_rating_offset: i32,
    pub min_suggested_rating: i32,
    pub default_problem_count: usize,
    pub max_problem_count: usize,
    pub min_participants: usize,
    pub max_participants: usize,
    pub placement_deltas: Vec<i32>,
    pub lower_placement_delta: i32,
    pub no_solve_delta: i32,
    pub recent_limit: usize,
    pub multihistory_limit: usize,
    pub max_rating_plot_users: usize,
    /// Users allowed to void any ongoing duel.
    pub moderators: Vec<UserId>,
}

impl Default for DuelConfig {
    fn default() -> Self {
        Self {
            expiry_secs: 5 * 60,
            start_delay_secs: 15,
            invalidate_window_secs: 2 * 60,
            no_draw_secs: 10 * 60,
            elo_k: 60.0,
            default_rating: 1500,
            handicap_secs_per_100: 30.0,
            rating_floor: 400,
            suggested_rating_offset: -400,
            min_suggested_rating: 500,
            default_problem_count: 3,
            max_problem_count: 5,
            min_participants: 2,
            max_participants: 10,
            placement_deltas: vec![40, 20, 10],
            lower_placement_delta: -5,
            no_solve_delta: -15,
            recent_limit: 10,
            multihistory_limit: 10,
            max_rating_plot_users: 5,
            moderators: Vec::new(),
        }
    }
}

impl DuelConfig {
    pub fn from_yaml_str(input: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(input)
    }

    pub fn from_json_str(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DuelError> {
        let path_ref = path.as_ref();
        let raw = fs::read_to_string(path_ref).map_err(|e| {
            DuelError::Config(format!("failed to read {}: {}", path_ref.display(), e))
        })?;
        let ext = path_ref
            .extension()
            .and_then(|v| v.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let config = match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&raw)
                .map_err(|e| DuelError::Config(format!("yaml parse failed: {}", e)))?,
            "json" => Self::from_json_str(&raw)
                .map_err(|e| DuelError::Config(format!("json parse failed: {}", e)))?,
            _ => {
                return Err(DuelError::Config(format!(
                    "unsupported config extension '{}'; expected .yaml/.yml/.json",
                    ext
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DuelError> {
        if self.rating_floor <= 0 {
            return Err(DuelError::Config("rating_floor must be > 0".to_string()));
        }
        if self.elo_k <= 0.0 {
            return Err(DuelError::Config("elo_k must be > 0".to_string()));
        }
        if self.handicap_secs_per_100 < 0.0 {
            return Err(DuelError::Config(
                "handicap_secs_per_100 must not be negative".to_string(),
            ));
        }
        if self.min_participants < 2 || self.min_participants > self.max_participants {
            return Err(DuelError::Config(format!(
                "participant bounds {}..={} are invalid",
                self.min_participants, self.max_participants
            )));
        }
        if self.max_problem_count == 0
            || self.default_problem_count == 0
            || self.default_problem_count > self.max_problem_count
        {
            return Err(DuelError::Config(format!(
                "problem count default {} / max {} are invalid",
                self.default_problem_count, self.max_problem_count
            )));
        }
        Ok(())
    }
}
