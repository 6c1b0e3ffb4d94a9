//! Module-name derivation from a file path, relative to the scan root.

use std::path::Path;

/// `root=/r, file=/r/pkg/sub/__init__.py` => `"pkg.sub"`;
/// `root=/r, file=/r/pkg/x.py` => `"pkg.x"`.
pub fn module_name(root: &Path, file: &Path) -> String {
    let rel = file.strip_prefix(root).unwrap_or(file);
    let rel = rel.to_string_lossy().replace('\\', "/");

    let without_ext = match rel.rsplit_once('.') {
        Some((stem, _ext)) => stem.to_string(),
        None => rel,
    };

    let mut parts: Vec<&str> = without_ext
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();

    if let Some(last) = parts.last() {
        if *last == "__init__" {
            parts.pop();
        }
    }

    parts.join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn plain_module() {
        let root = PathBuf::from("/r");
        let file = PathBuf::from("/r/pkg/x.py");
        assert_eq!(module_name(&root, &file), "pkg.x");
    }

    #[test]
    fn package_init() {
        let root = PathBuf::from("/r");
        let file = PathBuf::from("/r/pkg/sub/__init__.py");
        assert_eq!(module_name(&root, &file), "pkg.sub");
    }

    #[test]
    fn top_level_init() {
        let root = PathBuf::from("/r");
        let file = PathBuf::from("/r/__init__.py");
        assert_eq!(module_name(&root, &file), "");
    }

    #[test]
    fn nested_package() {
        let root = PathBuf::from("/r");
        let file = PathBuf::from("/r/pkg/gamma/inner/g_mod.py");
        assert_eq!(module_name(&root, &file), "pkg.gamma.inner.g_mod");
    }
}
