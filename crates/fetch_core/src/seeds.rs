use crate::SuffixRules;

pub const SEED_COMMENT_MARKER: char = '#';

/// Contents written when the seed source file does not exist yet.
pub const SEED_FILE_TEMPLATE: &str = "\
# Add one listing URL per line. Lines starting with '#' are ignored.
# Example:
# https://fastdl.example.com/maps/
";

/// Parses a newline separated seed list, skipping blanks and comments.
pub fn parse_seed_list(text: &str, rules: &SuffixRules) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(SEED_COMMENT_MARKER))
        .map(|line| normalize_seed(line, rules))
        .collect()
}

/// Listing seeds get a trailing `/` so relative links resolve inside them.
/// Seeds naming an asset file directly are left as they are.
pub fn normalize_seed(seed: &str, rules: &SuffixRules) -> String {
    let seed = seed.trim();
    if seed.ends_with('/') || names_asset(seed, rules) {
        seed.to_string()
    } else {
        format!("{seed}/")
    }
}

fn names_asset(seed: &str, rules: &SuffixRules) -> bool {
    let path = seed.split(['?', '#']).next().unwrap_or(seed);
    let last = path.rsplit('/').next().unwrap_or(path);
    rules.is_recognized(last)
}
