use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use cortex_types::{Category, ContextEntry, ReferenceCode};
use tokio::sync::RwLock;

use crate::RegistryError;

#[derive(Debug, Clone, Default)]
pub struct ContextQuery {
    pub keywords: Option<String>,
    pub category: Option<Category>,
    pub tags: Vec<String>,
    pub reference_code: Option<ReferenceCode>,
    pub max_results: Option<usize>,
}

fn matches(entry: &ContextEntry, query: &ContextQuery) -> bool {
    if let Some(keywords) = query.keywords.as_deref().filter(|k| !k.is_empty()) {
        if !entry
            .content
            .to_lowercase()
            .contains(&keywords.to_lowercase())
        {
            return false;
        }
    }
    if let Some(category) = query.category {
        if entry.category != category {
            return false;
        }
    }
    if !query.tags.is_empty() && !query.tags.iter().any(|t| entry.tags.contains(t)) {
        return false;
    }
    if let Some(code) = query.reference_code {
        if entry.reference_code != Some(code) {
            return false;
        }
    }
    true
}

#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn store(&self, entry: ContextEntry) -> Result<(), RegistryError>;
    async fn all(&self) -> Result<Vec<ContextEntry>, RegistryError>;
}

#[derive(Default)]
pub struct InMemoryContextStore {
    entries: RwLock<std::collections::HashMap<String, ContextEntry>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn store(&self, entry: ContextEntry) -> Result<(), RegistryError> {
        self.entries.write().await.insert(entry.entry_id.clone(), entry);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<ContextEntry>, RegistryError> {
        Ok(self.entries.read().await.values().cloned().collect())
    }
}

/// Implements §6.3: one `<EntryId>.md` file per entry, `---`-fenced
/// header/body, lazily-created directory, empty-on-missing-directory read.
/// Grounded on `tandem-core::agents::parse_agent_markdown`'s
/// frontmatter-parsing idiom.
pub struct FileContextStore {
    dir: PathBuf,
}

impl FileContextStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, entry_id: &str) -> PathBuf {
        self.dir.join(format!("{entry_id}.md"))
    }

    fn render(entry: &ContextEntry) -> String {
        let tags = entry.tags.join(", ");
        let mut header = format!(
            "entryId: {}\ncategory: {}\ntags: [{}]\n",
            entry.entry_id, entry.category, tags
        );
        if let Some(code) = entry.reference_code {
            header.push_str(&format!("referenceCode: {code}\n"));
        }
        header.push_str(&format!("createdAt: {}\n", entry.created_at.to_rfc3339()));
        format!("---\n{header}---\n{}\n", entry.content)
    }

    fn parse(raw: &str) -> Option<ContextEntry> {
        let mut parts = raw.splitn(3, "---\n");
        let _ = parts.next()?; // before the first fence (empty)
        let header = parts.next()?;
        let body = parts.next().unwrap_or("").to_string();

        let mut entry_id = None;
        let mut category = None;
        let mut tags = Vec::new();
        let mut reference_code = None;
        let mut created_at = None;

        for line in header.lines() {
            let Some((key, value)) = line.split_once(':') else { continue };
            let value = value.trim();
            match key.trim() {
                "entryId" => entry_id = Some(value.to_string()),
                "category" => category = parse_category(value),
                "tags" => {
                    tags = value
                        .trim_start_matches('[')
                        .trim_end_matches(']')
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect();
                }
                "referenceCode" => reference_code = value.parse().ok(),
                "createdAt" => created_at = chrono::DateTime::parse_from_rfc3339(value).ok(),
                _ => {}
            }
        }

        Some(ContextEntry {
            entry_id: entry_id?,
            content: body.trim_end_matches('\n').to_string(),
            category: category?,
            tags,
            reference_code,
            created_at: created_at?.with_timezone(&chrono::Utc),
        })
    }
}

fn parse_category(value: &str) -> Option<Category> {
    match value {
        "CustomerNote" => Some(Category::CustomerNote),
        "MeetingNote" => Some(Category::MeetingNote),
        "Decision" => Some(Category::Decision),
        "Lesson" => Some(Category::Lesson),
        "Preference" => Some(Category::Preference),
        "Strategic" => Some(Category::Strategic),
        "Operational" => Some(Category::Operational),
        _ => None,
    }
}

#[async_trait]
impl ContextStore for FileContextStore {
    async fn store(&self, entry: ContextEntry) -> Result<(), RegistryError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| RegistryError::NotFound(e.to_string()))?;
        let path = self.path_for(&entry.entry_id);
        let rendered = Self::render(&entry);
        tokio::fs::write(path, rendered)
            .await
            .map_err(|e| RegistryError::NotFound(e.to_string()))?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<ContextEntry>, RegistryError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RegistryError::NotFound(e.to_string())),
        };

        let mut entries = Vec::new();
        while let Some(file) = dir
            .next_entry()
            .await
            .map_err(|e| RegistryError::NotFound(e.to_string()))?
        {
            let raw = tokio::fs::read_to_string(file.path())
                .await
                .map_err(|e| RegistryError::NotFound(e.to_string()))?;
            if let Some(entry) = Self::parse(&raw) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

/// The Context registry (§4.3): `store` overwrites by id, `query` combines
/// all filters with AND and orders by `CreatedAt` descending.
#[derive(Clone)]
pub struct ContextRegistry {
    store: Arc<dyn ContextStore>,
}

impl ContextRegistry {
    pub fn new(store: Arc<dyn ContextStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryContextStore::new()))
    }

    pub async fn store(&self, entry: ContextEntry) -> Result<(), RegistryError> {
        self.store.store(entry).await
    }

    pub async fn query(&self, query: ContextQuery) -> Result<Vec<ContextEntry>, RegistryError> {
        let mut results: Vec<ContextEntry> = self
            .store
            .all()
            .await?
            .into_iter()
            .filter(|e| matches(e, &query))
            .collect();
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(max) = query.max_results {
            results.truncate(max);
        }
        Ok(results)
    }
}
