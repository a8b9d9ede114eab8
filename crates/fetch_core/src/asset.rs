use url::Url;

/// Suffixes that mark a remote file as a downloadable asset.
///
/// Content suffixes name the usable form of an asset (`.bsp`); archive
/// suffixes name a compressed wrapper around it (`.bz2`). Matching is
/// case-insensitive and suffixes are stored lowercase with a leading dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuffixRules {
    content: Vec<String>,
    archive: Vec<String>,
}

impl SuffixRules {
    pub fn new<I, J, S, T>(content: I, archive: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            content: normalize_suffixes(content),
            archive: normalize_suffixes(archive),
        }
    }

    pub fn content_suffixes(&self) -> &[String] {
        &self.content
    }

    pub fn archive_suffixes(&self) -> &[String] {
        &self.archive
    }

    pub fn is_recognized(&self, name: &str) -> bool {
        self.is_archive(name) || matching_suffix(name, &self.content).is_some()
    }

    pub fn is_archive(&self, name: &str) -> bool {
        matching_suffix(name, &self.archive).is_some()
    }

    /// Name of the decompressed sibling of an archive, or `None` if `name` is not an archive.
    pub fn strip_archive_suffix<'a>(&self, name: &'a str) -> Option<&'a str> {
        matching_suffix(name, &self.archive).map(|len| &name[..name.len() - len])
    }

    /// Canonical identity of an asset: at most one archive suffix is removed,
    /// then at most one content suffix, and the result is lowercased.
    pub fn stem(&self, name: &str) -> String {
        let without_archive = self.strip_archive_suffix(name).unwrap_or(name);
        let without_content = match matching_suffix(without_archive, &self.content) {
            Some(len) => &without_archive[..without_archive.len() - len],
            None => without_archive,
        };
        without_content.to_lowercase()
    }
}

impl Default for SuffixRules {
    fn default() -> Self {
        Self::new([".bsp"], [".bz2"])
    }
}

fn normalize_suffixes<I, S>(suffixes: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = suffixes
        .into_iter()
        .map(|s| s.as_ref().trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty() && s != ".")
        .map(|s| if s.starts_with('.') { s } else { format!(".{s}") })
        .collect();
    // Longest first so `.tar.bz2` wins over `.bz2`.
    out.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    out.dedup();
    out
}

/// Byte length of the first suffix in `suffixes` that `name` ends with.
fn matching_suffix(name: &str, suffixes: &[String]) -> Option<usize> {
    let lower = name.to_ascii_lowercase();
    suffixes
        .iter()
        .find(|suffix| lower.len() > suffix.len() && lower.ends_with(suffix.as_str()))
        .map(String::len)
}

/// Percent-decoded last path segment of `url`, if it is usable as a local file name.
pub fn local_name(url: &Url) -> Option<String> {
    let raw = url.path_segments()?.next_back()?;
    let decoded = urlencoding::decode(raw).ok()?.into_owned();
    let trimmed = decoded.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\', '\0'])
    {
        return None;
    }
    Some(trimmed.to_string())
}

/// One remote file together with its derived local name and stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetReference {
    pub url: Url,
    pub name: String,
    pub stem: String,
}

impl AssetReference {
    /// Builds a reference when `url` names a file with a recognized suffix.
    pub fn from_url(url: Url, rules: &SuffixRules) -> Option<Self> {
        let name = local_name(&url)?;
        if !rules.is_recognized(&name) {
            return None;
        }
        let stem = rules.stem(&name);
        Some(Self { url, name, stem })
    }

    pub fn is_archive(&self, rules: &SuffixRules) -> bool {
        rules.is_archive(&self.name)
    }
}
