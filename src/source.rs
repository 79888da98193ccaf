use anyhow::{Context, Result};
use log::{debug, error, info};
use std::fs;
use std::path::PathBuf;

/// Supplies the raw markdown text of the document.
pub trait MarkdownSource: Send {
    /// Human-readable name for status messages.
    fn describe(&self) -> String;

    fn fetch(&self) -> Result<String>;
}

pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MarkdownSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn fetch(&self) -> Result<String> {
        fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))
    }
}

/// A document that is already in memory.
pub struct StaticSource {
    name: String,
    text: String,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

impl MarkdownSource for StaticSource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn fetch(&self) -> Result<String> {
        Ok(self.text.clone())
    }
}

/// Fetches a source once on a background thread and hands the result back
/// through a channel the UI polls.
pub struct SourceLoader {
    description: String,
    rx: flume::Receiver<Result<String, String>>,
}

impl SourceLoader {
    pub fn spawn(source: Box<dyn MarkdownSource>) -> Result<Self> {
        let description = source.describe();
        let (tx, rx) = flume::bounded(1);

        std::thread::Builder::new()
            .name("markdown-loader".to_string())
            .spawn(move || {
                let result = source.fetch().map_err(|e| format!("{e:#}"));
                match &result {
                    Ok(text) => info!("Fetched {} bytes from {}", text.len(), source.describe()),
                    Err(e) => error!("Fetching {} failed: {e}", source.describe()),
                }
                // the receiving side is gone when the app quit before we finished
                if tx.send(result).is_err() {
                    debug!("Document loaded after the viewer was closed, dropping it");
                }
            })
            .context("Failed to spawn markdown loader thread")?;

        Ok(Self { description, rx })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The fetch result once it is available. Yields at most one value.
    pub fn try_recv(&self) -> Option<Result<String, String>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(flume::TryRecvError::Empty) => None,
            Err(flume::TryRecvError::Disconnected) => {
                Some(Err(format!("Loader for {} stopped unexpectedly", self.description)))
            }
        }
    }

    /// Blocks until the fetch finishes.
    pub fn wait(self) -> Result<String, String> {
        self.rx
            .recv()
            .unwrap_or_else(|_| Err(format!("Loader for {} stopped unexpectedly", self.description)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_source_reads_text() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.md");
        fs::write(&path, "# Hello\n").unwrap();

        assert_eq!(FileSource::new(&path).fetch().unwrap(), "# Hello\n");
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = FileSource::new("/definitely/not/here.md").fetch().unwrap_err();
        assert!(format!("{err:#}").contains("/definitely/not/here.md"));
    }

    #[test]
    fn test_loader_delivers_result() {
        let loader = SourceLoader::spawn(Box::new(StaticSource::new("inline", "text"))).unwrap();
        assert_eq!(loader.description(), "inline");
        assert_eq!(loader.wait(), Ok("text".to_string()));
    }

    #[test]
    fn test_loader_delivers_failure_as_message() {
        let loader = SourceLoader::spawn(Box::new(FileSource::new("/nope/missing.md"))).unwrap();
        let err = loader.wait().unwrap_err();
        assert!(err.contains("missing.md"));
    }
}
