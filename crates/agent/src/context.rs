//! Context builder for assembling the system prompt

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Instructions used when no prompt override is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an assistant for payment dispute analysis and data file management. You can call tools to inspect stored files and to fetch records from external services.

## Storage (analyze_storage tool)
- list_buckets: list every bucket
- read_text: read a text object
- get_file_info: size, content type, last modified time and etag of an object
- analyze_csv: column statistics, null analysis, correlations and data quality warnings
- analyze_pdf: page count, document metadata, per-page text, images and links
- write_text / write_json: save text or JSON content to an object
- generate_presigned_url: create a time-limited URL to download or upload an object

## Disputes (analyze_dispute tool)
Fetch a dispute with its category, reason code, amounts, deadlines, required evidence and payment details.

## Policies (analyze_policy tool)
Fetch a policy with its status, client, billing history and documents.

## Guidelines
- Start with basic file information before detailed analysis, and consider file size.
- For CSV files, check completeness and data quality and point out anomalies.
- For disputes, relate the reason code to the reference documentation and list the evidence needed before the deadline.
- When a tool returns an error, explain it and adjust the next request instead of repeating it.
- Be precise and concise, and say which tool results your conclusions are based on."#;

const REFERENCE_HEADER: &str = "\n\nReference Documentation:\n";

/// Builds the system prompt: instructions followed by reference documentation
pub struct ContextBuilder {
    base_prompt: Option<String>,
    doc_dirs: Vec<PathBuf>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            base_prompt: None,
            doc_dirs: Vec::new(),
        }
    }

    /// Replace the built-in instructions
    pub fn with_prompt(mut self, prompt: Option<String>) -> Self {
        self.base_prompt = prompt;
        self
    }

    pub fn with_doc_dirs<I, P>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.doc_dirs = dirs.into_iter().map(|d| d.as_ref().to_path_buf()).collect();
        self
    }

    /// Instructions, the reference header, then every loaded document
    pub async fn build_system_prompt(&self) -> String {
        let base = self.base_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT);

        let mut docs = Vec::new();
        for dir in &self.doc_dirs {
            match self.load_docs(dir).await {
                Ok(Some(content)) => docs.push(content),
                Ok(None) => debug!("doc directory {:?} not found, skipping", dir),
                Err(e) => warn!("failed to load docs from {:?}: {}", dir, e),
            }
        }

        format!("{}{}{}", base, REFERENCE_HEADER, docs.join("\n\n"))
    }

    /// Contents of every file in `dir`, sorted by name and joined with blank
    /// lines. `None` when the directory does not exist.
    pub async fn load_docs(&self, dir: &Path) -> std::io::Result<Option<String>> {
        if !dir.is_dir() {
            return Ok(None);
        }

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();

        let mut parts = Vec::with_capacity(files.len());
        for path in files {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => parts.push(content),
                Err(e) => debug!("skipping unreadable doc {:?}: {}", path, e),
            }
        }

        Ok(Some(parts.join("\n\n")))
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
