use crate::errors::{StoreError, StoreResult};
use once_cell::sync::Lazy;
use regex::Regex;

pub const MAX_ID_LEN: usize = 128;
const SUFFIX_BYTES: usize = 4;
const MAX_SLUG_WORDS: usize = 3;
const MAX_SLUG_LEN: usize = 30;
const FORBIDDEN_CHARS: [char; 6] = ['/', '\\', '#', ':', '\'', '"'];

static NON_ALNUM_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug regex"));

/// Builds `{prefix}-{slug}-{hex}` (or `{prefix}-{hex}` without a title).
pub fn generate(prefix: &str, title: Option<&str>) -> String {
    let suffix = random_hex(SUFFIX_BYTES);
    match title {
        Some(title) => format!("{}-{}-{}", prefix, slugify(title), suffix),
        None => format!("{}-{}", prefix, suffix),
    }
}

pub fn random_hex(bytes: usize) -> String {
    (0..bytes)
        .map(|_| format!("{:02x}", rand::random::<u8>()))
        .collect()
}

pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let replaced = NON_ALNUM_RUN.replace_all(&lowered, "-");
    let words: Vec<&str> = replaced
        .split('-')
        .filter(|word| !word.is_empty())
        .map(abbreviate)
        .take(MAX_SLUG_WORDS)
        .collect();

    let mut slug = words.join("-");
    if slug.len() > MAX_SLUG_LEN {
        slug = match slug[..=MAX_SLUG_LEN].rfind('-') {
            Some(cut) if cut > 0 => slug[..cut].to_string(),
            _ => slug[..MAX_SLUG_LEN].to_string(),
        };
    }

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

fn abbreviate(word: &str) -> &str {
    match word {
        "implementation" | "implement" => "impl",
        "configuration" | "configure" => "config",
        "documentation" | "document" => "docs",
        "authentication" => "auth",
        "authorization" => "authz",
        "database" => "db",
        "application" => "app",
        "development" => "dev",
        "environment" => "env",
        "performance" => "perf",
        "repository" => "repo",
        "dependency" => "dep",
        "dependencies" => "deps",
        "function" => "fn",
        "management" => "mgmt",
        "information" => "info",
        "integration" => "integ",
        "requirements" => "reqs",
        "refactoring" | "refactor" => "refac",
        "directory" => "dir",
        "message" => "msg",
        "initialize" | "initialization" => "init",
        other => other,
    }
}

/// Rejects any identifier that could escape its directory or corrupt the header syntax.
pub fn validate(id: &str) -> StoreResult<()> {
    if id.is_empty() {
        return Err(StoreError::InvalidId("identifier is empty".to_string()));
    }
    if id.len() > MAX_ID_LEN {
        return Err(StoreError::InvalidId(format!(
            "identifier exceeds {} bytes: {}...",
            MAX_ID_LEN,
            id.chars().take(32).collect::<String>()
        )));
    }
    if id == "." || id.contains("..") {
        return Err(StoreError::InvalidId(format!("identifier contains a dot segment: {}", id)));
    }
    if let Some(ch) = id
        .chars()
        .find(|ch| ch.is_control() || FORBIDDEN_CHARS.contains(ch))
    {
        return Err(StoreError::InvalidId(format!(
            "identifier contains forbidden character {:?}: {}",
            ch,
            id.escape_debug()
        )));
    }
    Ok(())
}
