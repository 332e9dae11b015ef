//! Job input/output specifications.
//!
//! An input maps a local directory or an existing dataset onto a job
//! directory: `<DIR|DATASET_ID>:<JOB_DIR>`. An output names the job directory
//! whose contents become a dataset, optionally an existing one:
//! `<JOB_DIR>[:DATASET_ID]`.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use crate::config::home;
use crate::error::CoreError;
use crate::types::DatasetId;

const INPUT_FORMAT: &str = "expected '<DIR|DATASET_ID>:<JOB_DIR>'";
const OUTPUT_FORMAT: &str = "expected '<JOB_DIR>[:DATASET_ID]'";

/// Where an input's data comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// A local directory that gets pushed into a fresh dataset.
    LocalDir(PathBuf),
    /// An existing dataset.
    Dataset(DatasetId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub source: InputSource,
    pub job_dir: String,
}

impl InputSpec {
    /// Parse an input spec, expanding `~` against the user's home directory.
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        Self::parse_with(input, home)
    }

    /// Parse an input spec with `~` expanding to `home`.
    pub fn parse_at(input: &str, home: &Path) -> Result<Self, CoreError> {
        Self::parse_with(input, || Ok(home.to_path_buf()))
    }

    fn parse_with(
        input: &str,
        home: impl FnOnce() -> Result<PathBuf, CoreError>,
    ) -> Result<Self, CoreError> {
        let invalid = |reason: &str| CoreError::InvalidSpec {
            kind: "input",
            spec: input.to_string(),
            reason: reason.to_string(),
        };

        // Only the last colon separates the job dir, so `C:/data:/input`
        // keeps its drive letter.
        let parts: Vec<&str> = input.split(':').collect();
        if parts.len() != 2 && parts.len() != 3 {
            return Err(invalid(INPUT_FORMAT));
        }
        let (source, job_dir) = match input.rsplit_once(':') {
            Some(split) => split,
            None => return Err(invalid(INPUT_FORMAT)),
        };

        if source.trim().is_empty() {
            return Err(invalid("input source is empty"));
        }
        if job_dir.trim().is_empty() {
            return Err(invalid("input mount path is empty"));
        }

        let source = expand_tilde(source, home).map_err(|reason| match reason {
            TildeError::Home(e) => e,
            TildeError::OtherUser => invalid("cannot expand another user's home directory"),
        })?;
        let source = from_slash(&source);

        let source = if source.contains(MAIN_SEPARATOR) {
            InputSource::LocalDir(PathBuf::from(source))
        } else {
            let id = DatasetId::from(source);
            id.validate()?;
            InputSource::Dataset(id)
        };

        Ok(Self {
            source,
            job_dir: job_dir.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub job_dir: String,
    /// Existing dataset to write into; `None` creates a new one.
    pub dataset: Option<DatasetId>,
}

impl OutputSpec {
    pub fn parse(output: &str) -> Result<Self, CoreError> {
        let invalid = |reason: &str| CoreError::InvalidSpec {
            kind: "output",
            spec: output.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = output.split(':').collect();
        let (job_dir, dataset) = match parts.as_slice() {
            [job_dir] => (*job_dir, None),
            [job_dir, dataset] => (*job_dir, Some(*dataset)),
            _ => return Err(invalid(OUTPUT_FORMAT)),
        };
        if job_dir.trim().is_empty() {
            return Err(invalid("output mount path is empty"));
        }
        let dataset = match dataset {
            Some(name) => {
                let id = DatasetId::from(name);
                id.validate()?;
                Some(id)
            }
            None => None,
        };
        Ok(Self {
            job_dir: job_dir.to_string(),
            dataset,
        })
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

enum TildeError {
    Home(CoreError),
    OtherUser,
}

fn expand_tilde(
    path: &str,
    home: impl FnOnce() -> Result<PathBuf, CoreError>,
) -> Result<String, TildeError> {
    let Some(rest) = path.strip_prefix('~') else {
        return Ok(path.to_string());
    };
    if !rest.is_empty() && !rest.starts_with('/') && !rest.starts_with('\\') {
        return Err(TildeError::OtherUser);
    }
    let home = home().map_err(TildeError::Home)?;
    Ok(format!("{}{rest}", home.display()))
}

fn from_slash(path: &str) -> String {
    if MAIN_SEPARATOR == '/' {
        path.to_string()
    } else {
        path.replace('/', &MAIN_SEPARATOR.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
