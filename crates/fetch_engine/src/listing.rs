use fetch_core::{local_name, SuffixRules};
use scraper::{Html, Selector};
use url::Url;

const DEFAULT_MAX_ENTRIES: usize = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Sub-listing (path ends with `/`).
    Directory,
    /// File with a recognized asset suffix.
    File,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub url: Url,
    pub kind: EntryKind,
}

/// Extracts file and sub-listing references from an HTML directory listing.
pub struct ListingParser {
    rules: SuffixRules,
    max_entries: usize,
}

impl ListingParser {
    pub fn new(rules: SuffixRules) -> Self {
        Self::with_max_entries(rules, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(rules: SuffixRules, max_entries: usize) -> Self {
        Self { rules, max_entries }
    }

    pub fn rules(&self) -> &SuffixRules {
        &self.rules
    }

    /// Anchors are resolved against `base`; anything that is neither a
    /// directory nor a recognized file is dropped. Document order is kept.
    pub fn parse(&self, html: &str, base: &Url) -> Vec<ListingEntry> {
        let Ok(anchors) = Selector::parse("a[href]") else {
            return Vec::new();
        };
        let document = Html::parse_document(html);

        let mut entries = Vec::new();
        for anchor in document.select(&anchors) {
            if entries.len() >= self.max_entries {
                break;
            }
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some(url) = resolve_url(href, base) else {
                continue;
            };
            if let Some(kind) = self.classify(&url) {
                entries.push(ListingEntry { url, kind });
            }
        }
        entries
    }

    fn classify(&self, url: &Url) -> Option<EntryKind> {
        if url.path().ends_with('/') {
            return Some(EntryKind::Directory);
        }
        let name = local_name(url)?;
        self.rules.is_recognized(&name).then_some(EntryKind::File)
    }
}

fn resolve_url(reference: &str, base: &Url) -> Option<Url> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with('#')
        || lower.starts_with('?')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
    {
        return None;
    }
    let mut url = base.join(trimmed).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}
