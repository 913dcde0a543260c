use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

#[derive(Debug)]
pub enum PromptError {
    Unavailable { path: PathBuf, source: std::io::Error },
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::Unavailable { path, source } => {
                write!(f, "Prompt unavailable at {}: {}", path.display(), source)
            }
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::Unavailable { source, .. } => Some(source),
        }
    }
}

/// Instruction text that primes the SQL generator.
///
/// The file is read on first use and the text is kept for the life of the
/// loader. A failed read leaves the cell empty so a later call can retry.
pub struct PromptLoader {
    path: PathBuf,
    cached: OnceCell<Arc<str>>,
}

impl PromptLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: OnceCell::new(),
        }
    }

    pub async fn load(&self) -> Result<Arc<str>, PromptError> {
        let text = self
            .cached
            .get_or_try_init(|| async {
                debug!("Reading instruction prompt from {}", self.path.display());
                let text = tokio::fs::read_to_string(&self.path)
                    .await
                    .map_err(|source| PromptError::Unavailable {
                        path: self.path.clone(),
                        source,
                    })?;
                info!("Loaded instruction prompt ({} bytes)", text.len());
                Ok::<_, PromptError>(Arc::from(text))
            })
            .await?;

        Ok(Arc::clone(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let loader = PromptLoader::new(dir.path().join("nope.txt"));

        let err = loader.load().await.unwrap_err();
        assert!(matches!(err, PromptError::Unavailable { .. }));
        assert!(err.to_string().contains("nope.txt"));
    }

    #[tokio::test]
    async fn second_load_does_not_touch_storage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "You translate questions into SQLite SQL.").unwrap();

        let loader = PromptLoader::new(&path);
        let first = loader.load().await.unwrap();

        std::fs::remove_file(&path).unwrap();
        let second = loader.load().await.unwrap();

        assert_eq!(&*first, "You translate questions into SQLite SQL.");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn failed_load_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.txt");
        let loader = PromptLoader::new(&path);

        assert!(loader.load().await.is_err());

        std::fs::write(&path, "late prompt").unwrap();
        assert_eq!(&*loader.load().await.unwrap(), "late prompt");
    }
}
