//! File-backed editor host.
//!
//! The "editor" is a file on disk that the user edits with any tool. Each
//! poll compares the file against the last seen content and reports the
//! difference the way an editor would: one change covering the lines between
//! the common prefix and the common suffix, followed by a save.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use livecast_collab::{ActiveEditor, DocumentId, DocumentSnapshot, EditorEvent, EditorHost, TextChange};

/// The open file, as last read.
struct OpenFile {
    path: PathBuf,
    language_id: &'static str,
    text: String,
    /// Modification time and length at the last read
    stamp: Option<(SystemTime, u64)>,
}

impl OpenFile {
    fn id(&self) -> DocumentId {
        DocumentId::new(self.path.display().to_string())
    }
}

#[derive(Default)]
pub struct FileEditor {
    open: Option<OpenFile>,
}

impl FileEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.open.as_ref().map(|file| file.path.as_path())
    }

    /// Make `path` the active document.
    pub fn open(&mut self, path: impl Into<PathBuf>) -> io::Result<EditorEvent> {
        let path = path.into();
        let text = fs::read_to_string(&path)?;
        let stamp = fs::metadata(&path).ok().and_then(|m| stamp(&m));
        let file = OpenFile {
            language_id: language_id(&path),
            path,
            text,
            stamp,
        };
        log::info!("Opened {} ({})", file.path.display(), file.language_id);
        let id = file.id();
        self.open = Some(file);
        Ok(EditorEvent::ActiveEditorChanged(Some(id)))
    }

    /// Close the active document, if any.
    pub fn close(&mut self) -> EditorEvent {
        self.open = None;
        EditorEvent::ActiveEditorChanged(None)
    }

    /// Pick up changes written to disk since the last poll.
    pub fn poll(&mut self) -> io::Result<Vec<EditorEvent>> {
        let Some(file) = self.open.as_mut() else {
            return Ok(Vec::new());
        };

        let current = stamp(&fs::metadata(&file.path)?);
        if current.is_some() && current == file.stamp {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&file.path)?;
        file.stamp = current;

        let Some(change) = line_diff(&file.text, &text) else {
            return Ok(Vec::new());
        };
        log::debug!(
            "{} changed at line {} ({} lines replaced)",
            file.path.display(),
            change.start_line,
            change.original_span()
        );
        file.text = text;

        let id = file.id();
        Ok(vec![
            EditorEvent::TextChanged { document: id.clone(), changes: vec![change] },
            EditorEvent::Saved(id),
        ])
    }
}

impl EditorHost for FileEditor {
    fn active_editor(&self) -> Option<ActiveEditor> {
        let file = self.open.as_ref()?;
        Some(ActiveEditor {
            document: DocumentSnapshot {
                path: file.path.display().to_string(),
                language_id: file.language_id.to_string(),
                full_text: file.text.clone(),
            },
            selection: None,
        })
    }

    fn line(&self, document: &DocumentId, index: usize) -> Option<String> {
        let file = self.open.as_ref().filter(|file| &file.id() == document)?;
        lines(&file.text).nth(index).map(str::to_string)
    }
}

/// Two writes in the same mtime tick usually differ in length.
fn stamp(metadata: &fs::Metadata) -> Option<(SystemTime, u64)> {
    metadata.modified().ok().map(|modified| (modified, metadata.len()))
}

/// Lines without their terminators, `\r\n` included.
fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line))
}

/// Editor language id for a file name.
pub fn language_id(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "rs" => "rust",
        "py" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" => "typescript",
        "tsx" => "typescriptreact",
        "jsx" => "javascriptreact",
        "go" => "go",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "java" => "java",
        "rb" => "ruby",
        "sh" | "bash" => "shellscript",
        "json" => "json",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "md" | "markdown" => "markdown",
        "html" | "htm" => "html",
        "css" => "css",
        "sql" => "sql",
        _ => "plaintext",
    }
}

/// Single change turning `old` into `new`, or `None` if they are equal.
///
/// The changed region is trimmed by the common prefix and suffix of lines and
/// always spans at least one line on both sides, so a pure insertion or
/// deletion is reported as a rewrite of a neighbouring line.
pub fn line_diff(old: &str, new: &str) -> Option<TextChange> {
    if old == new {
        return None;
    }
    let old: Vec<&str> = lines(old).collect();
    let new: Vec<&str> = lines(new).collect();

    let mut prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
    let max_suffix = old.len().min(new.len()) - prefix;
    let mut suffix = old
        .iter()
        .rev()
        .zip(new.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    if old.len() - prefix - suffix == 0 || new.len() - prefix - suffix == 0 {
        if prefix > 0 {
            prefix -= 1;
        } else {
            suffix -= 1;
        }
    }

    let old_count = old.len() - prefix - suffix;
    let inserted = new[prefix..new.len() - suffix].join("\n");
    Some(TextChange::new(prefix, prefix + old_count - 1, inserted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn apply(old: &str, change: &TextChange) -> String {
        let mut lines: Vec<&str> = old.split('\n').collect();
        let span = change.original_span();
        let inserted: Vec<&str> = change.inserted_text.split('\n').collect();
        lines.splice(change.start_line..change.start_line + span, inserted);
        lines.join("\n")
    }

    #[test]
    fn test_diff_single_line_edit() {
        let change = line_diff("a\nb\nc", "a\nB\nc").unwrap();
        assert_eq!(change, TextChange::new(1, 1, "B"));
        assert_eq!(change.original_span(), 1);
    }

    #[test]
    fn test_diff_insertion_extends_to_neighbour() {
        let old = "a\nb\nc";
        let new = "a\nb\nx\ny\nc";
        let change = line_diff(old, new).unwrap();
        assert_eq!(change, TextChange::new(1, 1, "b\nx\ny"));
        assert_eq!(apply(old, &change), new);
    }

    #[test]
    fn test_diff_deletion_at_start() {
        let old = "a\nb\nc";
        let new = "c";
        let change = line_diff(old, new).unwrap();
        assert_eq!(change.start_line, 0);
        assert_eq!(change.original_span(), 3);
        assert_eq!(apply(old, &change), new);
    }

    #[test]
    fn test_diff_append_line() {
        let old = "one\ntwo";
        let new = "one\ntwo\nthree";
        let change = line_diff(old, new).unwrap();
        assert_eq!(apply(old, &change), new);
        assert!(change.inserted_segments() >= 1);
    }

    #[test]
    fn test_diff_repeated_lines() {
        let old = "x\nx\nx";
        let new = "x\nx\nx\nx";
        let change = line_diff(old, new).unwrap();
        assert_eq!(apply(old, &change), new);
    }

    #[test]
    fn test_diff_equal_is_none() {
        assert!(line_diff("same\ntext", "same\ntext").is_none());
    }

    #[test]
    fn test_language_ids() {
        assert_eq!(language_id(Path::new("src/main.rs")), "rust");
        assert_eq!(language_id(Path::new("README.MD")), "markdown");
        assert_eq!(language_id(Path::new("Makefile")), "plaintext");
    }

    #[test]
    fn test_open_reports_active_document() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "first\nsecond").unwrap();

        let mut editor = FileEditor::new();
        let event = editor.open(file.path()).unwrap();
        let id = DocumentId::new(file.path().display().to_string());

        assert_eq!(event, EditorEvent::ActiveEditorChanged(Some(id.clone())));
        assert_eq!(editor.line(&id, 1).as_deref(), Some("second"));
        assert_eq!(editor.line(&DocumentId::new("elsewhere"), 0), None);
        let active = editor.active_editor().unwrap();
        assert_eq!(active.document.full_text, "first\nsecond");
        assert_eq!(active.document.language_id, "plaintext");
    }

    #[test]
    fn test_poll_turns_rewrite_into_change_and_save() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "a\nb\nc").unwrap();
        let mut editor = FileEditor::new();
        editor.open(file.path()).unwrap();
        assert!(editor.poll().unwrap().is_empty());

        fs::write(file.path(), "a\nchanged\nc").unwrap();
        // Force a distinct modification time on coarse-grained filesystems.
        editor.open.as_mut().unwrap().stamp = None;

        let events = editor.poll().unwrap();
        let id = DocumentId::new(file.path().display().to_string());
        assert_eq!(
            events,
            vec![
                EditorEvent::TextChanged {
                    document: id.clone(),
                    changes: vec![TextChange::new(1, 1, "changed")],
                },
                EditorEvent::Saved(id.clone()),
            ]
        );
        assert_eq!(editor.line(&id, 1).as_deref(), Some("changed"));
    }

    #[test]
    fn test_poll_sees_write_within_same_mtime_tick() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "short").unwrap();
        let mut editor = FileEditor::new();
        editor.open(file.path()).unwrap();

        fs::write(file.path(), "a longer line").unwrap();
        let previous = editor.open.as_ref().unwrap().stamp.unwrap();
        let modified = fs::metadata(file.path()).unwrap().modified().unwrap();
        editor.open.as_mut().unwrap().stamp = Some((modified, previous.1));

        let events = editor.poll().unwrap();
        assert_eq!(events.len(), 2);
        let id = DocumentId::new(file.path().display().to_string());
        assert_eq!(editor.line(&id, 0).as_deref(), Some("a longer line"));
    }

    #[test]
    fn test_crlf_lines_reach_the_hub_without_carriage_returns() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "a\r\nb\r\nc\r\n").unwrap();
        let mut editor = FileEditor::new();
        editor.open(file.path()).unwrap();
        let id = DocumentId::new(file.path().display().to_string());
        assert_eq!(editor.line(&id, 0).as_deref(), Some("a"));

        fs::write(file.path(), "a\r\nB\r\nc\r\n").unwrap();
        editor.open.as_mut().unwrap().stamp = None;
        let events = editor.poll().unwrap();
        let EditorEvent::TextChanged { changes, .. } = &events[0] else {
            panic!("expected a text change, got {events:?}");
        };
        assert_eq!(changes, &vec![TextChange::new(1, 1, "B")]);

        let ops = livecast_collab::OperationBuilder::from_replace(changes, |n| editor.line(&id, n));
        assert_eq!(ops[0].lines[0].text, "B");
    }

    #[test]
    fn test_diff_ignores_line_ending_style() {
        let change = line_diff("a\r\nb", "a\nB").unwrap();
        assert_eq!(change, TextChange::new(1, 1, "B"));
    }

    #[test]
    fn test_poll_without_file_is_quiet() {
        let mut editor = FileEditor::new();
        assert!(editor.poll().unwrap().is_empty());
        assert_eq!(editor.close(), EditorEvent::ActiveEditorChanged(None));
        assert!(editor.active_editor().is_none());
    }
}
