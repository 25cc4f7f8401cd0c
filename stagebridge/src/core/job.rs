//! Job identity carried through to the executor.

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};

/// Identity and options of the pipeline execution a stage belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    job_id: String,
    job_name: String,
    #[serde(default = "empty_options")]
    options: serde_json::Value,
}

fn empty_options() -> serde_json::Value {
    serde_json::json!({})
}

impl JobInfo {
    /// Creates a job identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the job id is empty or whitespace-only.
    pub fn create(
        job_id: impl Into<String>,
        job_name: impl Into<String>,
        options: serde_json::Value,
    ) -> Result<Self, ConfigurationError> {
        let job_id = job_id.into();
        if job_id.trim().is_empty() {
            return Err(ConfigurationError::invalid_stage("job id cannot be empty"));
        }
        Ok(Self {
            job_id,
            job_name: job_name.into(),
            options,
        })
    }

    /// Returns the job id.
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Returns the job name.
    #[must_use]
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Returns the pipeline options document.
    #[must_use]
    pub fn options(&self) -> &serde_json::Value {
        &self.options
    }

    /// Looks up a top-level option.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&serde_json::Value> {
        self.options.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create() {
        let job = JobInfo::create("job-id", "job-name", serde_json::json!({"parallelism": 4})).unwrap();
        assert_eq!(job.job_id(), "job-id");
        assert_eq!(job.job_name(), "job-name");
        assert_eq!(job.option("parallelism"), Some(&serde_json::json!(4)));
        assert!(job.option("missing").is_none());
    }

    #[test]
    fn test_empty_id_rejected() {
        assert!(JobInfo::create(" ", "name", serde_json::json!({})).is_err());
    }

    #[test]
    fn test_options_default_on_deserialize() {
        let job: JobInfo = serde_json::from_str(r#"{"job_id":"j","job_name":"n"}"#).unwrap();
        assert_eq!(job.options(), &serde_json::json!({}));
    }
}
