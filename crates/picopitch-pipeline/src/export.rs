use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use picopitch_core::DocumentType;
use regex::Regex;

static UNSAFE_PATH_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/*?:"<>|]"#).expect("valid path-char regex"));

/// Writes generated documents under `output_dir`.
#[derive(Debug, Clone)]
pub struct DocumentExporter {
    output_dir: PathBuf,
}

impl DocumentExporter {
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `{output_dir}/{id}_{title}/{TYPE}_v{version}.md`
    #[must_use]
    pub fn path_for(
        &self,
        opportunity_id: i64,
        title: Option<&str>,
        document_type: DocumentType,
        version: i32,
    ) -> PathBuf {
        let folder = format!("{opportunity_id}_{}", sanitize_title(opportunity_id, title));
        self.output_dir
            .join(folder)
            .join(format!("{}_v{version}.md", document_type.as_str()))
    }

    /// Writes `content` and returns the file path. Empty content and I/O
    /// failures are logged and yield `None`.
    pub async fn export(
        &self,
        opportunity_id: i64,
        title: Option<&str>,
        document_type: DocumentType,
        content: &str,
        version: i32,
    ) -> Option<PathBuf> {
        if content.trim().is_empty() {
            tracing::warn!(
                opportunity_id,
                document_type = document_type.as_str(),
                "refusing to export empty document"
            );
            return None;
        }

        let path = self.path_for(opportunity_id, title, document_type, version);
        if let Some(dir) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                tracing::error!(dir = %dir.display(), error = %e, "failed to create export directory");
                return None;
            }
        }
        match tokio::fs::write(&path, content).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "document exported");
                Some(path)
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "failed to write document");
                None
            }
        }
    }
}

fn sanitize_title(opportunity_id: i64, title: Option<&str>) -> String {
    let cleaned = title
        .map(|t| UNSAFE_PATH_CHARS.replace_all(t.trim(), "").replace(' ', "_"))
        .unwrap_or_default();
    if cleaned.is_empty() {
        format!("opportunity_{opportunity_id}")
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("picopitch-export-{name}-{}", std::process::id()))
    }

    #[test]
    fn titles_are_sanitized() {
        assert_eq!(sanitize_title(7, Some("Invoice: Bot / Pro?")), "Invoice_Bot__Pro");
        assert_eq!(sanitize_title(7, Some("  ")), "opportunity_7");
        assert_eq!(sanitize_title(7, None), "opportunity_7");
    }

    #[test]
    fn path_layout_is_deterministic() {
        let exporter = DocumentExporter::new("/out");
        let path = exporter.path_for(12, Some("Invoice Bot"), DocumentType::AgilePlan, 2);
        assert_eq!(path, PathBuf::from("/out/12_Invoice_Bot/AGILE_PLAN_v2.md"));
    }

    #[tokio::test]
    async fn export_writes_file() {
        let dir = scratch_dir("write");
        let exporter = DocumentExporter::new(&dir);

        let path = exporter
            .export(3, Some("Invoice Bot"), DocumentType::Brd, "# BRD\n", 1)
            .await
            .expect("export should succeed");
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "# BRD\n");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn empty_content_is_not_exported() {
        let exporter = DocumentExporter::new(scratch_dir("empty"));
        assert!(exporter
            .export(3, None, DocumentType::Prd, "  \n", 1)
            .await
            .is_none());
    }
}
