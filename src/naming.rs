/// First free name among `name`, `name (2)`, `name (3)`, ...
///
/// The counter is appended to `name` exactly as given, so a taken
/// `scan (2)` continues as `scan (2) (2)`.
pub fn unique_key(name: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(name) {
        return name.to_string();
    }
    (2u64..)
        .map(|n| format!("{name} ({n})"))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| unreachable!("unbounded counter"))
}

/// First free name among `name - copy`, `name - copy (2)`, ...
pub fn copy_name(name: &str, is_taken: impl Fn(&str) -> bool) -> String {
    unique_key(&format!("{name} - copy"), is_taken)
}
