use crate::error::EnsembleResult;
use crate::job::{render_artifact_name, validate_artifact_template};
use std::path::{Path, PathBuf};

pub const ENSEMBLE_MANIFEST_FILE: &str = "ensemble_manifest.json";

/// Filesystem layout of one ensemble.
///
/// ```text
/// <root>/
///   ensemble_manifest.json
///   bagging_0.model ...            (artifact template)
///   samples/sample_<n>.json
///   manifests/estimator_<n>.json
/// ```
#[derive(Debug, Clone)]
pub struct EnsembleLayout {
    root: PathBuf,
    artifact_template: String,
}

impl EnsembleLayout {
    pub fn new(root: PathBuf, artifact_template: impl Into<String>) -> EnsembleResult<Self> {
        let artifact_template = artifact_template.into();
        validate_artifact_template(&artifact_template)?;
        Ok(Self { root, artifact_template })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn artifact_template(&self) -> &str {
        &self.artifact_template
    }

    #[must_use]
    pub fn artifact_path(&self, ordinal: usize) -> PathBuf {
        self.root.join(render_artifact_name(&self.artifact_template, ordinal))
    }

    /// Where an artifact is written before being renamed into place.
    #[must_use]
    pub fn staging_path(&self, ordinal: usize) -> PathBuf {
        let name = render_artifact_name(&self.artifact_template, ordinal);
        self.root.join(format!(".{name}.partial"))
    }

    #[must_use]
    pub fn samples_dir(&self) -> PathBuf {
        self.root.join("samples")
    }

    #[must_use]
    pub fn sample_manifest_path(&self, ordinal: usize) -> PathBuf {
        self.samples_dir().join(format!("sample_{ordinal}.json"))
    }

    #[must_use]
    pub fn manifests_dir(&self) -> PathBuf {
        self.root.join("manifests")
    }

    #[must_use]
    pub fn estimator_manifest_path(&self, ordinal: usize) -> PathBuf {
        self.manifests_dir().join(format!("estimator_{ordinal}.json"))
    }

    #[must_use]
    pub fn ensemble_manifest_path(&self) -> PathBuf {
        self.root.join(ENSEMBLE_MANIFEST_FILE)
    }

    pub fn ensure_dirs(&self) -> EnsembleResult<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.samples_dir())?;
        std::fs::create_dir_all(self.manifests_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let temp = TempDir::new().unwrap();
        let layout = EnsembleLayout::new(temp.path().to_path_buf(), "bagging_{n}.model").unwrap();

        assert_eq!(layout.artifact_path(4), temp.path().join("bagging_4.model"));
        assert!(layout.sample_manifest_path(4).ends_with("samples/sample_4.json"));
        assert_ne!(layout.staging_path(4), layout.artifact_path(4));

        layout.ensure_dirs().unwrap();
        assert!(layout.samples_dir().is_dir());
        assert!(layout.manifests_dir().is_dir());
    }

    #[test]
    fn test_layout_rejects_template_without_ordinal() {
        let temp = TempDir::new().unwrap();
        assert!(EnsembleLayout::new(temp.path().to_path_buf(), "model.bin").is_err());
    }
}
