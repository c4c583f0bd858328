//! Active document tracking and editor event routing.

use std::fmt;

use crate::channel::SessionChannel;
use crate::operations::{OperationBuilder, TextChange};
use crate::protocol::{code_content_type, CursorPosition, CursorState};

/// Identity of an editor document. Two events refer to the same document
/// iff their ids are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The document currently being broadcast, as the host sees it right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub path: String,
    pub language_id: String,
    pub full_text: String,
}

impl DocumentSnapshot {
    pub fn id(&self) -> DocumentId {
        DocumentId::new(self.path.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub anchor: CursorPosition,
    pub active: CursorPosition,
}

impl Selection {
    pub fn new(anchor: CursorPosition, active: CursorPosition) -> Self {
        Self { anchor, active }
    }

    pub fn caret(at: CursorPosition) -> Self {
        Self { anchor: at, active: at }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveEditor {
    pub document: DocumentSnapshot,
    /// Primary selection, if the host has one
    pub selection: Option<Selection>,
}

/// Read access to the editor. The host is the only source of document text.
pub trait EditorHost {
    fn active_editor(&self) -> Option<ActiveEditor>;

    /// Current text of line `index` of `document`, with or without its
    /// terminator. `None` past the end.
    fn line(&self, document: &DocumentId, index: usize) -> Option<String>;
}

/// Notifications raised by the editor host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    ActiveEditorChanged(Option<DocumentId>),
    TextChanged {
        document: DocumentId,
        changes: Vec<TextChange>,
    },
    Saved(DocumentId),
    SelectionChanged {
        document: DocumentId,
        selections: Vec<Selection>,
    },
}

/// Decides which editor events reach the hub.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    active: Option<DocumentId>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&DocumentId> {
        self.active.as_ref()
    }

    pub fn handle(&mut self, event: EditorEvent, host: &dyn EditorHost, channel: &mut SessionChannel<'_>) {
        match event {
            EditorEvent::ActiveEditorChanged(document) => {
                self.on_active_editor_changed(document, host, channel)
            }
            EditorEvent::TextChanged { document, changes } => {
                self.on_text_changed(&document, &changes, host, channel)
            }
            EditorEvent::Saved(document) => self.on_saved(&document, channel),
            EditorEvent::SelectionChanged { document, selections } => {
                self.on_selection_changed(&document, &selections, channel)
            }
        }
    }

    pub fn on_active_editor_changed(
        &mut self,
        document: Option<DocumentId>,
        host: &dyn EditorHost,
        channel: &mut SessionChannel<'_>,
    ) {
        log::debug!(
            "Active document changed to {}",
            document.as_ref().map(DocumentId::as_str).unwrap_or("<none>")
        );
        self.active = document;
        self.resend_active_document(host, channel);
    }

    pub fn on_text_changed(
        &self,
        document: &DocumentId,
        changes: &[TextChange],
        host: &dyn EditorHost,
        channel: &mut SessionChannel<'_>,
    ) {
        if !self.is_tracked(document) {
            return;
        }
        let batch = OperationBuilder::from_replace(changes, |index| host.line(document, index));
        channel.push_content(batch);
    }

    pub fn on_saved(&self, document: &DocumentId, channel: &mut SessionChannel<'_>) {
        if self.is_tracked(document) {
            channel.push_content(OperationBuilder::from_save());
        }
    }

    /// Forward the primary selection. Empty selection lists are ignored.
    pub fn on_selection_changed(
        &self,
        document: &DocumentId,
        selections: &[Selection],
        channel: &mut SessionChannel<'_>,
    ) {
        if !self.is_tracked(document) {
            return;
        }
        if let Some(primary) = selections.first() {
            channel.push_cursor(CursorState::from_selection(primary.anchor, primary.active));
        }
    }

    /// Full resync: info, then `[ResetAll, Append]`, then the cursor. Only
    /// `[ResetAll]` when no editor is open.
    pub fn resend_active_document(&mut self, host: &dyn EditorHost, channel: &mut SessionChannel<'_>) {
        let Some(editor) = host.active_editor() else {
            self.active = None;
            channel.push_content(OperationBuilder::from_full_resync(None));
            return;
        };

        let document = &editor.document;
        self.active = Some(document.id());
        log::debug!("Resending {} ({})", document.path, document.language_id);

        channel.push_info(&document.path, &code_content_type(&document.language_id));
        channel.push_content(OperationBuilder::from_full_resync(Some(&document.full_text)));
        if let Some(selection) = editor.selection {
            channel.push_cursor(CursorState::from_selection(selection.anchor, selection.active));
        }
    }

    fn is_tracked(&self, document: &DocumentId) -> bool {
        let tracked = self.active.as_ref() == Some(document);
        if !tracked {
            log::trace!("Ignoring event for untracked document {document}");
        }
        tracked
    }
}
