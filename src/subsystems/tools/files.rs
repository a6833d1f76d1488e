//! `write_file` / `read_file`: a flat file area under `files.base_dir`.
//!
//! Both accept only a single plain file name; anything that could leave the
//! directory is `denied` before the filesystem is touched.

use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::core::config::FilesToolConfig;

use super::error::ToolError;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WriteInput {
    data: String,
    #[serde(rename = "fileName")]
    file_name: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ReadInput {
    #[serde(rename = "fileName")]
    file_name: String,
}

/// Accept `name` only if it is exactly one normal path component.
pub fn plain_file_name(name: &str) -> Result<&str, ToolError> {
    let denied = || ToolError::Denied(format!("fileName must be a plain file name: {name:?}"));
    if name.is_empty() || name.contains(['/', '\\', '\0']) {
        return Err(denied());
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(denied()),
    }
}

#[derive(Debug, Clone)]
pub struct WriteFileTool {
    base_dir: PathBuf,
}

impl WriteFileTool {
    pub fn new(config: &FilesToolConfig) -> Self {
        Self { base_dir: config.base_dir.clone() }
    }

    pub async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        let parsed: WriteInput = serde_json::from_str(input.trim()).map_err(|e| {
            ToolError::InvalidInput(format!(
                "expected JSON {{\"data\": string, \"fileName\": string}}: {e}"
            ))
        })?;
        let name = plain_file_name(&parsed.file_name)?;
        let path = self.base_dir.join(name);

        let write = async {
            tokio::fs::create_dir_all(&self.base_dir).await?;
            tokio::fs::write(&path, parsed.data.as_bytes()).await
        };
        match write.await {
            Ok(()) => {
                debug!(path = %path.display(), bytes = parsed.data.len(), "file written");
                Ok(format!("Write successful (Saved at {}).", path.display()))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "file write failed");
                Err(ToolError::Backend("Write failed.".into()))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadFileTool {
    base_dir: PathBuf,
}

impl ReadFileTool {
    pub fn new(config: &FilesToolConfig) -> Self {
        Self { base_dir: config.base_dir.clone() }
    }

    /// `input` is a bare file name or `{"fileName": ...}`.
    pub async fn invoke(&self, input: &str) -> Result<String, ToolError> {
        let input = input.trim();
        let file_name = if input.starts_with('{') {
            serde_json::from_str::<ReadInput>(input)
                .map_err(|e| ToolError::InvalidInput(format!("expected JSON {{\"fileName\": string}}: {e}")))?
                .file_name
        } else {
            input.to_string()
        };
        let name = plain_file_name(&file_name)?;
        let path = self.base_dir.join(name);

        tokio::fs::read_to_string(&path).await.map_err(|e| {
            debug!(path = %path.display(), error = %e, "file read failed");
            ToolError::NotFound("Read failed.".into())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> FilesToolConfig {
        FilesToolConfig { enabled: true, base_dir: dir.path().join("out") }
    }

    #[test]
    fn plain_names_pass_guard() {
        assert!(plain_file_name("report.md").is_ok());
        assert!(plain_file_name("a..b").is_ok());
        for bad in ["", ".", "..", "../x", "a/b", "/etc/passwd", "a\\b", "dir/"] {
            assert!(
                matches!(plain_file_name(bad), Err(ToolError::Denied(_))),
                "{bad:?} should be denied"
            );
        }
    }

    #[tokio::test]
    async fn write_then_read() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let out = WriteFileTool::new(&cfg)
            .invoke(r#"{"data":"hello","fileName":"a.txt"}"#)
            .await
            .unwrap();
        assert!(out.starts_with("Write successful (Saved at "));
        assert!(out.ends_with("a.txt)."));

        let reader = ReadFileTool::new(&cfg);
        assert_eq!(reader.invoke("a.txt").await.unwrap(), "hello");
        assert_eq!(reader.invoke(r#"{"fileName":"a.txt"}"#).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn write_rejects_loose_input() {
        let dir = TempDir::new().unwrap();
        let tool = WriteFileTool::new(&config(&dir));
        for input in [
            "just text",
            r#"{"data":"x"}"#,
            r#"{"data":"x","fileName":"a","extra":1}"#,
            r#"{"data":1,"fileName":"a"}"#,
        ] {
            assert!(
                matches!(tool.invoke(input).await, Err(ToolError::InvalidInput(_))),
                "{input} should be invalid"
            );
        }
    }

    #[tokio::test]
    async fn read_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = ReadFileTool::new(&config(&dir)).invoke("nope.txt").await.unwrap_err();
        assert_eq!(err, ToolError::NotFound("Read failed.".into()));
    }

    #[tokio::test]
    async fn write_into_unwritable_base_fails_as_backend() {
        let dir = TempDir::new().unwrap();
        // base_dir is a regular file, so create_dir_all fails.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let tool = WriteFileTool::new(&FilesToolConfig { enabled: true, base_dir: blocker });
        let err = tool.invoke(r#"{"data":"x","fileName":"a"}"#).await.unwrap_err();
        assert_eq!(err, ToolError::Backend("Write failed.".into()));
    }
}
