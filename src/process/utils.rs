use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

static PEM_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)-----BEGIN ([A-Z0-9 ]+)-----.*?-----END ([A-Z0-9 ]+)-----")
        .expect("PEM block pattern should parse")
});

/// Drop every `'`. The feed wraps PEM text in them; they are never part of
/// the certificate.
pub fn strip_apostrophes(raw: &str) -> String {
    raw.chars().filter(|&c| c != '\'').collect()
}

/// `ca_007.der` for index 7.
pub fn der_file_name(index: usize) -> String {
    format!("ca_{:03}.der", index)
}

pub fn der_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(der_file_name(index))
}

/// First `-----BEGIN X-----` .. `-----END X-----` block in `text`, if any.
pub fn first_pem_block(text: &str) -> Option<&str> {
    PEM_BLOCK
        .captures_iter(text)
        .find(|caps| caps[1] == caps[2])
        .and_then(|caps| caps.get(0))
        .map(|m| m.as_str())
}
