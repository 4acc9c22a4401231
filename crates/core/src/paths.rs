//! POSIX-style path helpers for remote paths.
//!
//! Remote paths are always absolute and `/`-separated regardless of the host
//! platform, so these helpers work on strings rather than `std::path`.

/// Normalise a client-supplied remote path.
///
/// Collapses repeated separators, resolves `.` and `..` segments (never
/// climbing above the root) and guarantees a leading `/`. An empty input is
/// the root.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Parent of a normalised path. The parent of the root is the root.
pub fn parent(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
    }
}

/// Join a child name onto a directory path.
pub fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Last segment of a path. The root has an empty basename.
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Number of segments below the root (`/` is 0, `/a/b` is 2).
pub fn depth(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

pub fn is_root(path: &str) -> bool {
    path.trim_end_matches('/').is_empty()
}

/// Dot-files are hidden from listings.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Lower-cased extension of a file name, without the dot.
pub fn extension(name: &str) -> Option<String> {
    let base = basename(name);
    match base.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(base[idx + 1..].to_ascii_lowercase()),
    }
}

/// Split a file name into stem and `.ext` suffix (suffix may be empty).
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(idx) => (&name[..idx], &name[idx..]),
    }
}
