//! Content fingerprints over normalised source text
//!
//! C and C++ sources are tokenised with tree-sitter and comment tokens
//! dropped, so whitespace and comment edits keep the fingerprint stable.
//! Anything else is hashed with whitespace collapsed.

use std::path::Path;

use cppcia_core::Fingerprint;
use tree_sitter::{Language, Parser, Tree};

/// Separates tokens so adjacent ones cannot glue together.
const TOKEN_SEPARATOR: u8 = 0x1f;

/// Source dialect, from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    C,
    Cpp,
    Other,
}

impl FileType {
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return FileType::Other;
        };
        match ext {
            "c" => FileType::C,
            "cc" | "cpp" | "cxx" | "c++" | "h" | "hh" | "hpp" | "hxx" | "ipp" | "inl" | "tpp" => {
                FileType::Cpp
            }
            _ => FileType::Other,
        }
    }

    /// Get the tree-sitter language for this file type
    pub fn language(&self) -> Option<Language> {
        match self {
            FileType::C => Some(tree_sitter_c::LANGUAGE.into()),
            FileType::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
            FileType::Other => None,
        }
    }
}

/// Per-thread fingerprinting state. Tree-sitter parsers are not `Sync`, so
/// each worker owns one.
pub struct Normalizer {
    c: Option<Parser>,
    cpp: Option<Parser>,
}

impl Normalizer {
    pub fn new() -> Self {
        Normalizer {
            c: parser_for(FileType::C),
            cpp: parser_for(FileType::Cpp),
        }
    }

    /// Fingerprint of `content` as a file at `path`.
    pub fn fingerprint(&mut self, path: &Path, content: &[u8]) -> Fingerprint {
        let parser = match FileType::from_path(path) {
            FileType::C => self.c.as_mut(),
            FileType::Cpp => self.cpp.as_mut(),
            FileType::Other => None,
        };

        match parser.and_then(|p| p.parse(content, None)) {
            Some(tree) => Fingerprint::of(&token_stream(&tree, content)),
            None => Fingerprint::of(&collapse_whitespace(content)),
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn parser_for(file_type: FileType) -> Option<Parser> {
    let language = file_type.language()?;
    let mut parser = Parser::new();
    match parser.set_language(&language) {
        Ok(()) => Some(parser),
        Err(e) => {
            tracing::warn!(?file_type, "Failed to set language, hashing raw text: {}", e);
            None
        }
    }
}

/// Leaf tokens in source order, comments skipped.
fn token_stream(tree: &Tree, source: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(source.len());
    let mut cursor = tree.walk();

    loop {
        let node = cursor.node();
        let descend = node.kind() != "comment" && node.child_count() > 0;

        if node.kind() != "comment" && node.child_count() == 0 && !node.is_missing() {
            let text = &source[node.byte_range()];
            if node.kind() == "preproc_arg" {
                // Macro bodies are raw text in the grammar.
                out.extend(collapse_whitespace(text));
            } else {
                out.extend_from_slice(text);
            }
            out.push(TOKEN_SEPARATOR);
        }

        if descend && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return out;
            }
        }
    }
}

fn collapse_whitespace(content: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(content);
    text.split_whitespace().collect::<Vec<_>>().join(" ").into_bytes()
}
