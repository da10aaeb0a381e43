//! Conversion of a flat recursive tree listing into the nested structure the
//! frontend file explorer consumes.

use serde::Serialize;

use super::TreeEntry;

/// One node of the nested listing. Files carry their full repository path;
/// directories carry their children.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_path: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub files: Vec<FileNode>,
}

impl FileNode {
    fn file(name: &str, full_path: &str) -> Self {
        Self {
            name: name.to_string(),
            full_path: Some(full_path.to_string()),
            files: Vec::new(),
        }
    }

    fn directory(name: &str) -> Self {
        Self {
            name: name.to_string(),
            full_path: None,
            files: Vec::new(),
        }
    }
}

/// Build the nested listing from a flat recursive tree. Only `blob` entries
/// become files; intermediate directories are created from the blob paths so
/// empty directories never appear.
#[must_use]
pub fn nest(entries: &[TreeEntry]) -> Vec<FileNode> {
    let mut roots: Vec<FileNode> = Vec::new();
    for entry in entries {
        if entry.kind != "blob" {
            continue;
        }
        let parts: Vec<&str> = entry.path.split('/').collect();
        insert(&mut roots, &entry.path, &parts);
    }
    roots
}

fn insert(level: &mut Vec<FileNode>, full_path: &str, parts: &[&str]) {
    let [part, rest @ ..] = parts else {
        return;
    };
    if rest.is_empty() {
        level.push(FileNode::file(part, full_path));
        return;
    }
    let position = level
        .iter()
        .position(|node| node.full_path.is_none() && node.name == *part);
    let directory = match position {
        Some(index) => &mut level[index],
        None => {
            level.push(FileNode::directory(part));
            level.last_mut().expect("just pushed")
        }
    };
    insert(&mut directory.files, full_path, rest);
}
