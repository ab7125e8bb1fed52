//! Shared workspace fixtures for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// A workspace with module `a` (no deps) and `b` (depends on `a`), each
/// holding one class; `B`'s class embeds `A`'s type.
pub fn two_module_workspace() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    write(
        root,
        "hotwire.toml",
        r#"
main = "b"

[[module]]
id = "a"
source_root = "a"

[[module]]
id = "b"
source_root = "b"
dependencies = ["a"]
"#,
    );
    write(root, "a/user.ts", "export class User {\n  id: string;\n}\n");
    write(
        root,
        "b/account.ts",
        "export class Account {\n  owner: User;\n\n  describe() {\n    this.logger.info(\"account\");\n  }\n}\n",
    );
    temp
}

pub fn write(root: &Path, relative: &str, text: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
}

pub fn output(root: &Path, module: &str, file: &str) -> String {
    fs::read_to_string(root.join(".hotwire/build").join(module).join(file)).unwrap()
}
