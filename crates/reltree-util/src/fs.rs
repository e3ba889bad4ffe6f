use std::path::{Path, PathBuf};

/// Read a file into lines that keep their terminators, so that joining the
/// result reproduces the file byte for byte.
pub fn read_lines(path: &Path) -> std::io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(split_lines(&content))
}

/// Split text into terminator-preserving lines.
pub fn split_lines(content: &str) -> Vec<String> {
    content.split_inclusive('\n').map(str::to_string).collect()
}

/// Write lines back out verbatim.
pub fn write_lines(path: &Path, lines: &[String]) -> std::io::Result<()> {
    std::fs::write(path, lines.concat())
}

/// Normalize a module path: make it absolute (against `base` if relative)
/// and strip trailing separators and stray newlines.
pub fn normalize_module_path(path: &str, base: &Path) -> PathBuf {
    let trimmed = path.trim_end_matches(['/', '\n', '\r']);
    let p = Path::new(trimmed);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}
