//! Configuration for the co-occurrence pipeline.
//!
//! A single `PipelineConfig` value is passed explicitly into every stage;
//! no stage reads ambient state.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bootstrap::BootstrapConfig;
use crate::error::util::safe_read_to_string;
use crate::error::{PipelineError, Result};
use crate::filter::{CodeFilterMethod, DemographicFilterSpec};
use crate::utils::io::DatasetFormat;

/// Column names of the episode and attribute tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    /// Unique per-record identifier
    pub record_id: String,
    /// Participant identifier shared by episodes and attributes
    pub participant_id: String,
    /// ICD-10 diagnosis code
    pub diagnosis_code: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            record_id: "ins_index".to_string(),
            participant_id: "eid".to_string(),
            diagnosis_code: "diag_icd10".to_string(),
        }
    }
}

impl ColumnNames {
    /// Columns every stage needs to identify participants and diseases
    #[must_use]
    pub fn core(&self) -> [&str; 2] {
        [self.participant_id.as_str(), self.diagnosis_code.as_str()]
    }
}

/// Configuration for a full pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Experiment name, used as the output subdirectory
    pub experiment_name: String,
    /// Episode records table
    pub episodes_path: PathBuf,
    /// Participant attributes table
    pub attributes_path: PathBuf,
    /// Disease code set (`{"codes": [...]}`)
    pub codes_path: PathBuf,
    /// Whether matching records are kept or dropped
    pub method: CodeFilterMethod,
    /// Demographic buckets; `None` yields a single cohort
    pub demographics: Option<DemographicFilterSpec>,
    /// Resampling settings
    pub bootstrap: BootstrapConfig,
    /// Column naming of the input tables
    pub columns: ColumnNames,
    /// Base output directory
    pub output_dir: PathBuf,
    /// Format for persisted cohorts and resamples
    pub output_format: DatasetFormat,
    /// Worker threads; defaults to the number of CPUs
    pub threads: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            experiment_name: "experiment".to_string(),
            episodes_path: PathBuf::from("hesin_diag.csv"),
            attributes_path: PathBuf::from("participants.csv"),
            codes_path: PathBuf::from("codes.json"),
            method: CodeFilterMethod::Keep,
            demographics: None,
            bootstrap: BootstrapConfig::default(),
            columns: ColumnNames::default(),
            output_dir: PathBuf::from("output"),
            output_format: DatasetFormat::Csv,
            threads: None,
        }
    }
}

impl PipelineConfig {
    /// Create a configuration with default settings
    #[must_use]
    pub fn new(experiment_name: impl Into<String>) -> Self {
        Self {
            experiment_name: experiment_name.into(),
            ..Self::default()
        }
    }

    /// Load and validate a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = safe_read_to_string(path, "pipeline configuration")?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| PipelineError::from(e).context(format!("config {}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values no stage can work with
    pub fn validate(&self) -> Result<()> {
        if self.experiment_name.trim().is_empty() {
            return Err(PipelineError::invalid_config("experiment_name must not be empty"));
        }
        if self.experiment_name.contains(['/', '\\']) {
            return Err(PipelineError::invalid_config(format!(
                "experiment_name '{}' must not contain path separators",
                self.experiment_name
            )));
        }
        if self.threads == Some(0) {
            return Err(PipelineError::invalid_config("threads must be at least 1"));
        }
        let columns = &self.columns;
        if columns.participant_id == columns.diagnosis_code {
            return Err(PipelineError::invalid_config(
                "participant_id and diagnosis_code columns must differ",
            ));
        }
        if let Some(spec) = &self.demographics {
            // Surfaces empty dimensions and cohort name collisions up front
            spec.combinations()?;
        }
        Ok(())
    }

    /// Number of worker threads to use
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get)
    }

    #[must_use]
    pub fn with_method(mut self, method: CodeFilterMethod) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn with_demographics(mut self, spec: DemographicFilterSpec) -> Self {
        self.demographics = Some(spec);
        self
    }

    #[must_use]
    pub fn with_bootstrap(mut self, bootstrap: BootstrapConfig) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    #[must_use]
    pub fn with_columns(mut self, columns: ColumnNames) -> Self {
        self.columns = columns;
        self
    }

    #[must_use]
    pub fn with_inputs(
        mut self,
        episodes_path: impl Into<PathBuf>,
        attributes_path: impl Into<PathBuf>,
        codes_path: impl Into<PathBuf>,
    ) -> Self {
        self.episodes_path = episodes_path.into();
        self.attributes_path = attributes_path.into();
        self.codes_path = codes_path.into();
        self
    }

    #[must_use]
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    #[must_use]
    pub fn with_output_format(mut self, format: DatasetFormat) -> Self {
        self.output_format = format;
        self
    }
}

impl fmt::Display for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pipeline Configuration:")?;
        writeln!(f, "  Experiment: {}", self.experiment_name)?;
        writeln!(f, "  Episodes: {}", self.episodes_path.display())?;
        writeln!(f, "  Attributes: {}", self.attributes_path.display())?;
        writeln!(f, "  Codes: {} ({})", self.codes_path.display(), self.method)?;
        match &self.demographics {
            Some(spec) => writeln!(f, "  Demographic dimensions: {}", spec.dimensions.len())?,
            None => writeln!(f, "  Demographic dimensions: none")?,
        }
        writeln!(f, "  Bootstrap iterations: {}", self.bootstrap.iterations)?;
        if let Some(seed) = self.bootstrap.seed {
            writeln!(f, "  Seed: {seed}")?;
        }
        writeln!(f, "  Output: {}", self.output_dir.display())?;
        Ok(())
    }
}
