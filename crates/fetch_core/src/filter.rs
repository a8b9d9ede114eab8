use crate::AssetReference;

/// Include/exclude keyword lists, stored lowercase.
///
/// An empty include list matches everything. Exclusion is evaluated after inclusion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    include: Vec<String>,
    exclude: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Keep,
    /// Include terms were given and none matched.
    NotIncluded,
    /// Passed inclusion but matched an exclude term.
    Excluded,
}

impl FilterSpec {
    pub fn new<I, J, S, T>(include: I, exclude: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            include: normalize_terms(include),
            exclude: normalize_terms(exclude),
        }
    }

    pub fn include_terms(&self) -> &[String] {
        &self.include
    }

    pub fn exclude_terms(&self) -> &[String] {
        &self.exclude
    }

    pub fn decide(&self, name: &str) -> FilterDecision {
        let lower = name.to_lowercase();
        if !self.include.is_empty() && !self.include.iter().any(|t| lower.contains(t.as_str())) {
            return FilterDecision::NotIncluded;
        }
        if self.exclude.iter().any(|t| lower.contains(t.as_str())) {
            return FilterDecision::Excluded;
        }
        FilterDecision::Keep
    }
}

fn normalize_terms<I, S>(terms: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    terms
        .into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Splits a comma separated keyword list, dropping blanks.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome {
    pub kept: Vec<AssetReference>,
    /// Candidates that passed the include stage (all of them when no include terms exist).
    pub matched_include: usize,
    pub matched_exclude: usize,
}

/// Single pass over `candidates`, preserving their order.
pub fn apply_filters(candidates: Vec<AssetReference>, spec: &FilterSpec) -> FilterOutcome {
    let mut outcome = FilterOutcome {
        kept: Vec::with_capacity(candidates.len()),
        matched_include: 0,
        matched_exclude: 0,
    };
    for candidate in candidates {
        match spec.decide(&candidate.name) {
            FilterDecision::NotIncluded => {}
            FilterDecision::Excluded => {
                outcome.matched_include += 1;
                outcome.matched_exclude += 1;
            }
            FilterDecision::Keep => {
                outcome.matched_include += 1;
                outcome.kept.push(candidate);
            }
        }
    }
    outcome
}
