use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const POLICY_ENV: &str = "FASMD_POLICY";

/// Entry-time clamp ranges and submit-time limits shared by the create and
/// edit assignment flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ValidationPolicy {
    pub peer_reviews_min: i64,
    pub peer_reviews_max: i64,
    pub penalty_min: f64,
    pub penalty_max: f64,
    pub pass_threshold_max: f64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            peer_reviews_min: 1,
            peer_reviews_max: 10,
            penalty_min: 0.0,
            penalty_max: 100.0,
            pass_threshold_max: 10.0,
        }
    }
}

impl ValidationPolicy {
    pub fn check(&self) -> anyhow::Result<()> {
        if self.peer_reviews_min < 0 || self.peer_reviews_min > self.peer_reviews_max {
            anyhow::bail!(
                "peerReviewsMin ({}) must be >= 0 and <= peerReviewsMax ({})",
                self.peer_reviews_min,
                self.peer_reviews_max
            );
        }
        if !self.penalty_min.is_finite()
            || !self.penalty_max.is_finite()
            || self.penalty_min > self.penalty_max
        {
            anyhow::bail!(
                "penaltyMin ({}) must be <= penaltyMax ({})",
                self.penalty_min,
                self.penalty_max
            );
        }
        if !self.pass_threshold_max.is_finite() || self.pass_threshold_max <= 0.0 {
            anyhow::bail!("passThresholdMax must be > 0");
        }
        Ok(())
    }

    pub fn from_json_str(text: &str) -> anyhow::Result<Self> {
        let policy: ValidationPolicy = serde_json::from_str(text)?;
        policy.check()?;
        Ok(policy)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read policy file {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse policy file {}", path.display()))
    }

    pub fn clamp_peer_reviews(&self, value: i64) -> i64 {
        value.clamp(self.peer_reviews_min, self.peer_reviews_max)
    }

    pub fn clamp_penalty(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return self.penalty_min;
        }
        value.clamp(self.penalty_min, self.penalty_max)
    }
}

/// Policy named by `FASMD_POLICY`, if the variable is set.
pub fn load_from_env() -> anyhow::Result<Option<(PathBuf, ValidationPolicy)>> {
    let Some(raw) = std::env::var_os(POLICY_ENV) else {
        return Ok(None);
    };
    if raw.is_empty() {
        return Ok(None);
    }
    let path = PathBuf::from(raw);
    let policy = ValidationPolicy::load(&path)?;
    Ok(Some((path, policy)))
}
