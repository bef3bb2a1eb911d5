use std::fs;
use std::path::Path;

/// Write a file under `root`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(path, content).expect("write file");
}

/// Create a temp directory holding a minimal Dart package.
pub fn dart_package(name: &str) -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    write_file(
        temp.path(),
        "pubspec.yaml",
        &format!("name: {name}\nversion: 1.0.0\n"),
    );
    temp
}
