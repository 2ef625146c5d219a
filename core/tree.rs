use crate::descriptor::FileDescriptor;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Component, Path};

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Directory { children: BTreeMap<String, NodeId> },
    File { selected: bool },
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub name: String,
    pub kind: NodeKind,
    /// Files anywhere below this node (1 for a file).
    pub file_count: usize,
    pub selected_count: usize,
}

impl TreeNode {
    fn directory(name: String) -> Self {
        Self {
            name,
            kind: NodeKind::Directory {
                children: BTreeMap::new(),
            },
            file_count: 0,
            selected_count: 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }
}

/// Serialisable nested form of a [`FolderTree`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NestedNode {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: &'static str,
    pub files: usize,
    pub selected: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NestedNode>,
}

/// Folder hierarchy of scanned files, stored as an arena indexed by [`NodeId`].
#[derive(Debug, Clone)]
pub struct FolderTree {
    nodes: Vec<TreeNode>,
}

impl FolderTree {
    pub const ROOT: NodeId = 0;

    pub fn build(root: &Path, files: &[FileDescriptor]) -> Self {
        let root_name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string());
        let mut tree = Self {
            nodes: vec![TreeNode::directory(root_name)],
        };
        log::debug!("Building folder tree from {} files", files.len());
        for file in files {
            let Some(relative) = pathdiff::diff_paths(&file.path, root) else {
                log::warn!("{} is not under {}", file.path.display(), root.display());
                continue;
            };
            let segments: Vec<String> = relative
                .components()
                .filter_map(|c| match c {
                    Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect();
            if segments.is_empty() {
                continue;
            }
            if let Err(conflict) = tree.insert(&segments, file.is_selected) {
                log::error!(
                    "Tree conflict for {}: '{}' is already a file",
                    file.path.display(),
                    conflict
                );
            }
        }
        tree
    }

    /// Returns the conflicting segment when a file node would need children.
    fn insert(&mut self, segments: &[String], selected: bool) -> Result<(), String> {
        let mut path = vec![Self::ROOT];
        let mut current = Self::ROOT;
        let (file_name, dirs) = match segments.split_last() {
            Some(split) => split,
            None => return Ok(()),
        };

        for segment in dirs {
            current = match self.child(current, segment) {
                Some(id) if self.nodes[id].is_dir() => id,
                Some(_) => return Err(segment.clone()),
                None => self.add_child(current, TreeNode::directory(segment.clone())),
            };
            path.push(current);
        }

        match self.child(current, file_name) {
            Some(id) if self.nodes[id].is_dir() => return Err(file_name.clone()),
            Some(_) => return Ok(()),
            None => {
                self.add_child(
                    current,
                    TreeNode {
                        name: file_name.clone(),
                        kind: NodeKind::File { selected },
                        file_count: 1,
                        selected_count: usize::from(selected),
                    },
                );
            }
        }
        for id in path {
            self.nodes[id].file_count += 1;
            self.nodes[id].selected_count += usize::from(selected);
        }
        Ok(())
    }

    fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        match &self.nodes[parent].kind {
            NodeKind::Directory { children } => children.get(name).copied(),
            NodeKind::File { .. } => None,
        }
    }

    fn add_child(&mut self, parent: NodeId, node: TreeNode) -> NodeId {
        let id = self.nodes.len();
        let name = node.name.clone();
        self.nodes.push(node);
        if let NodeKind::Directory { children } = &mut self.nodes[parent].kind {
            children.insert(name, id);
        }
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub fn root(&self) -> &TreeNode {
        &self.nodes[Self::ROOT]
    }

    /// Directories first, then files; each group alphabetical.
    pub fn sorted_children(&self, id: NodeId) -> Vec<NodeId> {
        let NodeKind::Directory { children } = &self.nodes[id].kind else {
            return Vec::new();
        };
        let (mut dirs, files): (Vec<NodeId>, Vec<NodeId>) = children
            .values()
            .copied()
            .partition(|child| self.nodes[*child].is_dir());
        dirs.extend(files);
        dirs
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let root = self.root();
        let _ = writeln!(
            out,
            "{}/ ({} files, {} selected)",
            root.name, root.file_count, root.selected_count
        );
        self.render_children(Self::ROOT, "", &mut out);
        out
    }

    fn render_children(&self, id: NodeId, prefix: &str, out: &mut String) {
        let children = self.sorted_children(id);
        let last_index = children.len().saturating_sub(1);
        for (i, child) in children.into_iter().enumerate() {
            let node = &self.nodes[child];
            let (branch, indent) = if i == last_index {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };
            match node.kind {
                NodeKind::Directory { .. } => {
                    let _ = writeln!(
                        out,
                        "{}{}{}/ ({}/{})",
                        prefix, branch, node.name, node.selected_count, node.file_count
                    );
                    self.render_children(child, &format!("{}{}", prefix, indent), out);
                }
                NodeKind::File { selected } => {
                    let mark = if selected { " *" } else { "" };
                    let _ = writeln!(out, "{}{}{}{}", prefix, branch, node.name, mark);
                }
            }
        }
    }

    pub fn to_nested(&self) -> NestedNode {
        self.nested(Self::ROOT)
    }

    fn nested(&self, id: NodeId) -> NestedNode {
        let node = &self.nodes[id];
        NestedNode {
            name: node.name.clone(),
            node_type: if node.is_dir() { "directory" } else { "file" },
            files: node.file_count,
            selected: node.selected_count,
            children: self
                .sorted_children(id)
                .into_iter()
                .map(|child| self.nested(child))
                .collect(),
        }
    }
}
