use crate::error::{ImportError, Result};
use crate::settings::KEY_STAGES;
use serde::Serialize;
use std::fmt;

/// True when `candidate` is exactly one of the allowed stage names.
pub fn validate_stage<S: AsRef<str>>(candidate: &str, allow_list: &[S]) -> bool {
    !candidate.is_empty() && allow_list.iter().any(|s| s.as_ref() == candidate)
}

/// The `allowableStages` setting, split on commas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowedStages(Vec<String>);

impl AllowedStages {
    pub fn parse(raw: &str) -> Result<Self> {
        let stages: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if stages.is_empty() {
            return Err(ImportError::configuration(
                KEY_STAGES,
                "stages allowed for import",
            ));
        }
        Ok(Self(stages))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, candidate: &str) -> bool {
        validate_stage(candidate, &self.0)
    }

    /// Validate `candidate` into a [`StageName`].
    pub fn select(&self, candidate: &str) -> Result<StageName> {
        let candidate = candidate.trim();
        if self.contains(candidate) {
            Ok(StageName(candidate.to_string()))
        } else {
            Err(ImportError::InvalidStage {
                stage: candidate.to_string(),
                allowed: self.to_string(),
            })
        }
    }
}

impl fmt::Display for AllowedStages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

/// A stage that has been checked against the allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageName(String);

impl StageName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_stage_accepts_members_only() {
        let allowed = ["dev", "prod"];
        assert!(validate_stage("prod", &allowed));
        assert!(!validate_stage("staging", &allowed));
        assert!(!validate_stage("", &allowed));
        assert!(!validate_stage("Prod", &allowed));
    }

    #[test]
    fn parse_trims_and_drops_empty_entries() {
        let stages = AllowedStages::parse(" dev, prod ,,").unwrap();
        assert_eq!(stages.as_slice(), ["dev", "prod"]);
        assert_eq!(stages.to_string(), "dev,prod");
    }

    #[test]
    fn parse_rejects_empty_list() {
        assert!(matches!(
            AllowedStages::parse(" , "),
            Err(ImportError::Configuration { .. })
        ));
    }

    #[test]
    fn select_returns_stage_or_error() {
        let stages = AllowedStages::parse("dev,prod").unwrap();
        assert_eq!(stages.select("prod\n").unwrap().as_str(), "prod");
        let err = stages.select("staging").unwrap_err();
        assert!(err.to_string().contains("dev,prod"));
    }
}
