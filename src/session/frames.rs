//! Element frames
//!
//! One frame per open element: the declaration and type in force, the
//! content-model position, and where the element's character data lives in
//! the session text arena.

use crate::error::ErrorCode;
use crate::validators::exceptions::ValidationError;
use crate::validators::models::ModelState;
use crate::validators::schemas::{ContentKind, ElemId, ModelRef, Range32, TypeId, ValidatorId};

use super::arena::{ByteArena, Span};
use super::intern::NameEntry;

/// Character data collected for one element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextState {
    /// Collected bytes in the text arena
    pub span: Span,
    /// Any character data was seen
    pub has_text: bool,
    /// Non-whitespace character data was seen
    pub has_non_whitespace: bool,
}

/// How the subtree of a frame is processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameMode {
    /// Validated against its declaration or type
    #[default]
    Validate,
    /// Accepted without validation, together with its descendants
    Skip,
}

/// State of one open element
#[derive(Debug, Clone, Copy, Default)]
pub struct ElemFrame {
    /// Element name
    pub name: NameEntry,
    /// Matched declaration (null for skipped or type-only frames)
    pub elem: ElemId,
    /// Type in force (after xsi:type)
    pub typ: TypeId,
    /// Effective content kind
    pub content: ContentKind,
    /// Validator of simple content
    pub text_validator: ValidatorId,
    /// Compiled content model
    pub model: ModelRef,
    /// Position in the content model
    pub state: ModelState,
    /// Text arena length when the element started
    pub text_mark: usize,
    /// Model word pool length before this frame's state was allocated
    pub words_mark: usize,
    /// Collected character data
    pub text: TextState,
    /// Whether character data is kept in the text arena
    pub buffer_text: bool,
    /// xsi:nil="true" was given
    pub nilled: bool,
    /// Validation mode of the subtree
    pub mode: FrameMode,
    /// A child element started
    pub has_children: bool,
    /// A content error was already reported for this element
    pub content_error_reported: bool,
    /// Identity constraints declared on the element
    pub ics: Range32,
}

impl ElemFrame {
    /// Frame for an element whose subtree is not validated
    pub fn skipped(name: NameEntry) -> Self {
        Self {
            name,
            content: ContentKind::Mixed,
            mode: FrameMode::Skip,
            ..Default::default()
        }
    }

    /// Whether the subtree is skipped
    pub fn is_skipped(&self) -> bool {
        self.mode == FrameMode::Skip
    }

    /// Route character data through the content-kind gate
    ///
    /// Returns the error to report, if any. A frame reports at most one
    /// content error.
    pub fn consume_text(&mut self, text: &[u8], arena: &mut ByteArena) -> Option<ValidationError> {
        if text.is_empty() {
            return None;
        }
        let non_ws = !is_xml_whitespace(text);
        self.text.has_text = true;
        self.text.has_non_whitespace |= non_ws;
        if self.buffer_text {
            if self.text.span.is_empty() {
                self.text.span = Span::new(arena.len(), 0);
            }
            arena.push(text);
            self.text.span = arena.span_from(self.text.span.off as usize);
        }

        if self.is_skipped() || !non_ws || self.content_error_reported {
            return None;
        }
        if self.nilled {
            self.content_error_reported = true;
            return Some(ValidationError::new(
                ErrorCode::NilledNotEmpty,
                "element with xsi:nil=\"true\" must be empty",
            ));
        }
        match self.content {
            ContentKind::Simple | ContentKind::Mixed => None,
            ContentKind::ElementOnly | ContentKind::Empty => {
                self.content_error_reported = true;
                let message = if self.content == ContentKind::Empty {
                    "character data is not allowed in empty content"
                } else {
                    "character data is not allowed in element-only content"
                };
                Some(
                    ValidationError::new(ErrorCode::TextInElementOnly, message)
                        .with_actual(String::from_utf8_lossy(text).trim().to_string()),
                )
            }
        }
    }
}

/// Whether `text` is all XML whitespace
pub fn is_xml_whitespace(text: &[u8]) -> bool {
    text.iter().all(|&b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
}
