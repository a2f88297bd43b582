use std::path::{Path, PathBuf};
use thiserror::Error;

/// Placeholder substituted with a shard's work-file path.
pub const INPUT_PLACEHOLDER: &str = "{{input}}";

const FALLBACK_EXTENSION: &str = "job";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to read job template '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(
        "Job template '{path}' does not contain the '{placeholder}' placeholder",
        path = path.display(),
        placeholder = INPUT_PLACEHOLDER
    )]
    MissingPlaceholder { path: PathBuf },
}

/// A user-supplied job descriptor with one input placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTemplate {
    text: String,
    extension: String,
}

impl JobTemplate {
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let text = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .unwrap_or(FALLBACK_EXTENSION);
        Self::from_text(text, extension, path)
    }

    pub fn from_text(
        text: impl Into<String>,
        extension: &str,
        origin: &Path,
    ) -> Result<Self, TemplateError> {
        let text = text.into();
        if !text.contains(INPUT_PLACEHOLDER) {
            return Err(TemplateError::MissingPlaceholder {
                path: origin.to_path_buf(),
            });
        }
        Ok(Self {
            text,
            extension: extension.to_string(),
        })
    }

    /// Extension used for rendered descriptors, without the leading dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Replaces every placeholder occurrence with `input`; everything else is
    /// copied verbatim.
    pub fn render(&self, input: &Path) -> String {
        self.text.replace(INPUT_PLACEHOLDER, &input.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_every_placeholder_occurrence() {
        let template = JobTemplate::from_text(
            "LIGANDFILE {{input}}\nOUTPUT {{input}}.out\nPRECISION SP\n",
            "in",
            Path::new("glide.in"),
        )
        .unwrap();
        let rendered = template.render(Path::new("/w/batch/shard_001.smi"));
        assert_eq!(
            rendered,
            "LIGANDFILE /w/batch/shard_001.smi\nOUTPUT /w/batch/shard_001.smi.out\nPRECISION SP\n"
        );
    }

    #[test]
    fn template_without_placeholder_is_rejected() {
        let err = JobTemplate::from_text("PRECISION SP", "in", Path::new("t.in")).unwrap_err();
        assert!(matches!(err, TemplateError::MissingPlaceholder { .. }));
    }

    #[test]
    fn extension_comes_from_template_file() {
        let dir = tempfile::tempdir().unwrap();
        let with_ext = dir.path().join("dock.inp");
        std::fs::write(&with_ext, "in={{input}}").unwrap();
        assert_eq!(JobTemplate::load(&with_ext).unwrap().extension(), "inp");

        let bare = dir.path().join("dock");
        std::fs::write(&bare, "in={{input}}").unwrap();
        assert_eq!(JobTemplate::load(&bare).unwrap().extension(), "job");
    }

    #[test]
    fn missing_file_reports_io_error() {
        let err = JobTemplate::load(Path::new("/definitely/not/here.in")).unwrap_err();
        assert!(matches!(err, TemplateError::Io { .. }));
    }
}
