use crate::atomic;
use crate::errors::{StoreError, StoreResult};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config";
pub const PREFIX_KEY: &str = "prefix";

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn load(root: &Path) -> StoreResult<BTreeMap<String, String>> {
    let path = config_path(root);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(error) => return Err(error.into()),
    };

    let mut values = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) => {
                values.insert(key.trim().to_string(), value.trim().to_string());
            }
            None => tracing::warn!(line = %line, "ignoring config line without '='"),
        }
    }
    Ok(values)
}

pub fn get(root: &Path, key: &str) -> StoreResult<Option<String>> {
    Ok(load(root)?.remove(key))
}

/// Sets `key` and rewrites the whole file.
pub fn set(root: &Path, key: &str, value: &str) -> StoreResult<()> {
    validate_entry(key, value)?;
    let mut values = load(root)?;
    values.insert(key.to_string(), value.to_string());

    let rendered: String = values
        .iter()
        .map(|(key, value)| format!("{}={}\n", key, value))
        .collect();
    atomic::write(&config_path(root), rendered.as_bytes())
}

fn validate_entry(key: &str, value: &str) -> StoreResult<()> {
    if key.is_empty() || key.trim() != key || key.contains('=') || key.starts_with('#') || key.contains(['\n', '\r']) {
        return Err(StoreError::InvalidConfig(format!("invalid config key: {:?}", key)));
    }
    if value.contains(['\n', '\r']) || value.trim() != value {
        return Err(StoreError::InvalidConfig(format!("invalid value for {}: {:?}", key, value)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_rewrites_the_whole_file_sorted() {
        let root = tempfile::tempdir().expect("temp root");
        let root = root.path();
        assert_eq!(get(root, PREFIX_KEY).expect("missing file"), None);

        set(root, "prefix", "demo").expect("set prefix");
        set(root, "editor", "vim").expect("set editor");
        set(root, "prefix", "proj").expect("overwrite prefix");

        assert_eq!(
            fs::read_to_string(config_path(root)).expect("read config"),
            "editor=vim\nprefix=proj\n"
        );
        assert_eq!(get(root, "prefix").expect("get"), Some("proj".to_string()));
    }

    #[test]
    fn load_skips_comments_and_blank_lines() {
        let root = tempfile::tempdir().expect("temp root");
        fs::write(config_path(root.path()), "# comment\n\nprefix = spaced \nbroken line\nurl=a=b\n").expect("write");
        let values = load(root.path()).expect("load");
        assert_eq!(values.get("prefix").map(String::as_str), Some("spaced"));
        assert_eq!(values.get("url").map(String::as_str), Some("a=b"));
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn rejects_keys_and_values_that_break_the_format() {
        let root = tempfile::tempdir().expect("temp root");
        for (key, value) in [("", "x"), ("a=b", "x"), ("#c", "x"), ("k\n", "x"), ("k", "two\nlines"), ("k", " pad")] {
            let error = set(root.path(), key, value).expect_err("invalid entry");
            assert!(matches!(error, StoreError::InvalidConfig(_)));
        }
        assert!(!config_path(root.path()).exists());
    }
}
