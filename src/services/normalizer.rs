use std::collections::{HashMap, HashSet};

/// Vocabulary used to turn raw vendor names into canonical display names
///
/// Built once from configuration and never mutated, so tests can run with
/// their own vocabularies side by side.
#[derive(Debug, Clone, Default)]
pub struct NormalizerConfig {
    /// Tier/plan suffixes, in priority order for equal-length matches
    suffixes: Vec<String>,
    /// Normalized name -> canonical brand name
    overrides: HashMap<String, String>,
}

impl NormalizerConfig {
    pub fn new(suffixes: Vec<String>, overrides: HashMap<String, String>) -> Self {
        let suffixes = suffixes
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            suffixes,
            overrides,
        }
    }
}

/// Maps raw provider names onto stable display identities
#[derive(Debug, Clone)]
pub struct NameNormalizer {
    config: NormalizerConfig,
}

impl NameNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Strips one trailing tier/plan suffix and trims whitespace
    ///
    /// The longest matching suffix wins. A suffix only matches when it is
    /// preceded by whitespace and leaves a non-empty name behind.
    pub fn normalize(&self, raw: &str) -> String {
        let trimmed = raw.trim();

        let mut best: Option<&str> = None;
        for suffix in &self.config.suffixes {
            if let Some(rest) = strip_suffix_ignore_case(trimmed, suffix) {
                let longer = best.map_or(true, |b| rest.len() < b.len());
                if longer {
                    best = Some(rest);
                }
            }
        }

        best.unwrap_or(trimmed).trim().to_string()
    }

    /// Normalizes until no suffix is left, then applies the brand override table
    ///
    /// Stacked suffixes ("Foo Premium Basic") are peeled one at a time, so the
    /// result is a fixed point of `normalize`. Override targets must be fixed
    /// points themselves for the whole mapping to be idempotent.
    pub fn canonicalize(&self, raw: &str) -> String {
        let mut normalized = self.normalize(raw);
        loop {
            // Each strip shortens the name, so this terminates
            let next = self.normalize(&normalized);
            if next == normalized {
                break;
            }
            normalized = next;
        }

        match self.config.overrides.get(&normalized) {
            Some(canonical) => canonical.clone(),
            None => normalized,
        }
    }
}

fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    let cut = name.len().checked_sub(suffix.len())?;
    if !name.is_char_boundary(cut) || !name[cut..].eq_ignore_ascii_case(suffix) {
        return None;
    }

    let rest = &name[..cut];
    let preceded_by_space = rest.chars().last().is_some_and(char::is_whitespace);
    if !preceded_by_space || rest.trim().is_empty() {
        return None;
    }

    Some(rest)
}

/// Normalizer plus the allow-list of services eligible as filter options
#[derive(Debug, Clone)]
pub struct ProviderCatalog {
    normalizer: NameNormalizer,
    allow_list: HashSet<String>,
}

impl ProviderCatalog {
    pub fn new(normalizer: NameNormalizer, allow_list: impl IntoIterator<Item = String>) -> Self {
        Self {
            normalizer,
            allow_list: allow_list.into_iter().collect(),
        }
    }

    pub fn canonicalize(&self, raw: &str) -> String {
        self.normalizer.canonicalize(raw)
    }

    pub fn is_listed(&self, canonical: &str) -> bool {
        self.allow_list.contains(canonical)
    }
}
