use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use tote_manifest::ModuleType;

use super::{Chunk, FormatGraph};

/// Hash of a chunk's identity: its format and member ids.
pub fn chunk_hash(graph: &FormatGraph<'_>, chunk: &Chunk) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(graph.format.as_str().as_bytes());
    for &module in &chunk.modules {
        hasher.update(b"\n");
        hasher.update(graph.id(module).as_bytes());
    }
    hasher.finalize().to_hex()[..8].to_string()
}

/// Assigns collision-free file names to standalone chunks.
///
/// Only ever used from the single-writer phase of a build, so it needs no
/// synchronization.
#[derive(Debug, Default)]
pub struct ChunkNamer {
    taken: FxHashSet<PathBuf>,
}

impl ChunkNamer {
    /// A namer that never hands out any of `reserved` (entry outputs,
    /// declaration files).
    pub fn new(reserved: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            taken: reserved.into_iter().collect(),
        }
    }

    /// `<out_dir>/<descriptor>-<client|server|shared>-<hash>.<ext>`
    pub fn name(
        &mut self,
        out_dir: &Path,
        graph: &FormatGraph<'_>,
        chunk: &Chunk,
        module_type: ModuleType,
    ) -> PathBuf {
        let lead = chunk.roots.first().or(chunk.modules.first()).copied();
        let descriptor = lead
            .map(|module| descriptor_for(graph.id(module)))
            .unwrap_or_else(|| "chunk".to_string());
        let kind = chunk.directive.map_or("shared", |d| d.kind());
        let hash = chunk_hash(graph, chunk);
        let ext = graph.format.chunk_extension(module_type);

        let base = format!("{descriptor}-{kind}-{hash}");
        let mut candidate = out_dir.join(format!("{base}.{ext}"));
        let mut n = 2;
        while self.taken.contains(&candidate) {
            candidate = out_dir.join(format!("{base}-{n}.{ext}"));
            n += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

/// File-name-safe descriptor from a module id: the file stem, or the
/// directory name for `index` modules.
fn descriptor_for(id: &str) -> String {
    let path = Path::new(id);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("chunk");
    let stem = if stem == "index" {
        path.parent()
            .and_then(|p| p.file_name())
            .and_then(|s| s.to_str())
            .unwrap_or(stem)
    } else {
        stem
    };
    let cleaned: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "chunk".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::OutputFormat;
    use crate::graph::{Directive, GraphBuilder, ModuleKind, ModuleNode};
    use crate::splitter::Placement;

    #[test]
    fn descriptors() {
        assert_eq!(descriptor_for("src/components/button.tsx"), "button");
        assert_eq!(descriptor_for("src/ui/index.ts"), "ui");
        assert_eq!(descriptor_for("src/a.b.ts"), "a_b");
    }

    #[test]
    fn names_are_deterministic_and_unique() {
        let mut builder = GraphBuilder::new();
        let mut node = ModuleNode::new("src/button.ts", ModuleKind::Code);
        node.directive = Some(Directive::Client);
        let idx = builder.add(node);
        let graph = builder.build(idx);
        let merged = FormatGraph::merge(OutputFormat::Esm, &[(0, &graph)]);
        let chunk = Chunk {
            modules: vec![0],
            directive: Some(Directive::Client),
            importers: vec![0],
            placement: Placement::Standalone,
            roots: vec![0],
        };

        let out = Path::new("/pkg/dist");
        let mut namer = ChunkNamer::default();
        let first = namer.name(out, &merged, &chunk, ModuleType::CommonJs);
        let hash = chunk_hash(&merged, &chunk);
        assert_eq!(first, out.join(format!("button-client-{hash}.mjs")));

        let second = namer.name(out, &merged, &chunk, ModuleType::CommonJs);
        assert_eq!(second, out.join(format!("button-client-{hash}-2.mjs")));

        let mut fresh = ChunkNamer::default();
        assert_eq!(fresh.name(out, &merged, &chunk, ModuleType::CommonJs), first);
    }
}
