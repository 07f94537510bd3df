use alloc::string::String;
use alloc::vec::Vec;

/// Resolves `argument` against the working directory `cwd`.
///
/// Absolute arguments ignore `cwd`. Empty and `.` segments are skipped and
/// `..` strips the last segment, never going above the root. The result is
/// always absolute and never ends with a `/`, except for the root itself.
#[must_use]
pub fn resolve(cwd: &str, argument: &str) -> String {
    let mut segments: Vec<&str> = if argument.starts_with('/') {
        Vec::new()
    } else {
        cwd.split('/').filter(|segment| !segment.is_empty()).collect()
    };

    for segment in argument.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                let _ = segments.pop();
            }
            segment => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return String::from("/");
    }

    let mut path = String::new();
    for segment in segments {
        path.push('/');
        path.push_str(segment);
    }
    path
}

/// Joins a directory path and an entry name.
#[must_use]
pub fn join(dir: &str, name: &str) -> String {
    let mut path = String::from(dir.trim_end_matches('/'));
    path.push('/');
    path.push_str(name);
    path
}

#[cfg(test)]
mod tests {
    use super::{join, resolve};

    #[test]
    fn relative() {
        assert_eq!(resolve("/", "missing_dir"), "/missing_dir");
        assert_eq!(resolve("/a", "b/c"), "/a/b/c");
        assert_eq!(resolve("/a/b", "./c/"), "/a/b/c");
    }

    #[test]
    fn absolute() {
        assert_eq!(resolve("/a/b", "/c"), "/c");
        assert_eq!(resolve("/a/b", "/"), "/");
    }

    #[test]
    fn parent() {
        assert_eq!(resolve("/a/b", ".."), "/a");
        assert_eq!(resolve("/a", ".."), "/");
        assert_eq!(resolve("/", ".."), "/");
        assert_eq!(resolve("/a/b", "../../../c"), "/c");
    }

    #[test]
    fn join_paths() {
        assert_eq!(join("/", "a.txt"), "/a.txt");
        assert_eq!(join("/dir", "a.txt"), "/dir/a.txt");
    }
}
