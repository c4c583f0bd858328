//! Translation of editor changes into ordered update batches.
//!
//! Pure: no network, no mirror of the document. Replacement text is read
//! back from the live editor buffer through a line lookup supplied by the
//! caller, so the editor stays the only source of truth.

use crate::protocol::{Line, UpdateKind, UpdateOperation};

/// One entry of an editor change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChange {
    pub start_line: usize,
    /// End line of the replaced range as reported by the host. The hub's
    /// `len` is derived from it as `end - start + 1`.
    pub end_line_exclusive: usize,
    pub inserted_text: String,
}

impl TextChange {
    pub fn new(start_line: usize, end_line_exclusive: usize, inserted_text: impl Into<String>) -> Self {
        Self {
            start_line,
            end_line_exclusive,
            inserted_text: inserted_text.into(),
        }
    }

    /// Number of `'\n'`-separated segments in the inserted text.
    pub fn inserted_segments(&self) -> usize {
        self.inserted_text.split('\n').count()
    }

    /// Line span sent to the hub, taken from the original range.
    pub fn original_span(&self) -> usize {
        self.end_line_exclusive.saturating_sub(self.start_line) + 1
    }
}

/// Builds update batches. Every batch is dense in `order` (0..n-1).
pub struct OperationBuilder;

impl OperationBuilder {
    /// One `Replace` per change, in input order.
    ///
    /// The content covers `[start, start + segments(inserted))` read from the
    /// live buffer after the edit; `len` covers the original range. Lines the
    /// buffer no longer has are skipped.
    pub fn from_replace<F>(changes: &[TextChange], mut line_at: F) -> Vec<UpdateOperation>
    where
        F: FnMut(usize) -> Option<String>,
    {
        let ops = changes
            .iter()
            .map(|change| {
                let start = change.start_line;
                let end = start + change.inserted_segments();
                let text = (start..end)
                    .filter_map(&mut line_at)
                    .map(strip_terminator)
                    .collect::<Vec<_>>()
                    .join("\n");

                UpdateOperation {
                    kind: UpdateKind::Replace,
                    lines: vec![Line::modified(text)],
                    position: start,
                    length: change.original_span(),
                    order: 0,
                }
            })
            .collect();
        sequenced(ops)
    }

    /// A lone `RemoveMarker`: viewers clear their modified markers.
    pub fn from_save() -> Vec<UpdateOperation> {
        vec![UpdateOperation::bare(UpdateKind::RemoveMarker)]
    }

    /// `[ResetAll, Append(full_text)]`, or `[ResetAll]` with no document.
    pub fn from_full_resync(full_text: Option<&str>) -> Vec<UpdateOperation> {
        let mut ops = vec![UpdateOperation::bare(UpdateKind::ResetAll)];
        if let Some(text) = full_text {
            ops.push(UpdateOperation {
                kind: UpdateKind::Append,
                lines: vec![Line::unmodified(text)],
                position: 0,
                length: 0,
                order: 0,
            });
        }
        sequenced(ops)
    }
}

fn strip_terminator(mut line: String) -> String {
    if line.ends_with('\n') {
        line.pop();
    }
    if line.ends_with('\r') {
        line.pop();
    }
    line
}

fn sequenced(mut ops: Vec<UpdateOperation>) -> Vec<UpdateOperation> {
    for (index, op) in ops.iter_mut().enumerate() {
        op.order = index;
    }
    ops
}
