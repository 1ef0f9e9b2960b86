use itertools::Itertools;

/// Splits a comma-separated list of choice labels.
pub fn split_labels(text: &str) -> Vec<String> {
    text.split(',').map(|v| v.to_owned()).collect()
}

/// Trims labels, drops empty ones and keeps the first occurrence of each
/// repeated label. Order is preserved; there is no case folding.
pub fn normalize_labels<S: AsRef<str>>(labels: &[S]) -> Vec<String> {
    labels
        .iter()
        .map(|v| v.as_ref().trim())
        .filter(|v| !v.is_empty())
        .unique()
        .map(|v| v.to_owned())
        .collect()
}
