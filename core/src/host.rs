//! The two surfaces the extension does not own: the host application's text
//! field (reached through a narrow proxy) and the shell that sizes and
//! presents the extension's view.

use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;

use unicode_segmentation::UnicodeSegmentation;
use url::Url;

/// Proxy onto the host document. Calls are not transactional: any read may be
/// stale by the time a following write lands, so callers re-read before
/// destructive operations.
pub trait TextDocumentProxy {
    fn text_before_cursor(&self) -> String;
    fn text_after_cursor(&self) -> String;
    fn selected_text(&self) -> Option<String>;
    fn insert_text(&mut self, text: &str);
    /// Deletes one user-perceived character before the insertion point.
    fn delete_backward(&mut self);
}

/// Sizes the shell has advertised for the extension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutMetrics {
    pub screen_height_px: f64,
    /// Height the key-input surface occupies when visible.
    pub keyboard_height_px: f64,
    /// Largest total height the shell supports for the extension.
    pub max_total_height_px: f64,
}

/// A desired total height asserted to the shell. A later generation
/// supersedes every earlier one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeRequest {
    pub generation: u64,
    pub total_height_px: f64,
    pub animated: bool,
}

pub trait HostShell {
    fn metrics(&self) -> LayoutMetrics;
    fn request_resize(&mut self, request: ResizeRequest);
    fn set_key_input_visible(&mut self, visible: bool);
    fn present_web_content(&mut self, url: &Url);
    fn reload_web_content(&mut self);
    fn release_web_content(&mut self);
    fn open_url(&mut self, url: &Url);
}

impl<T: TextDocumentProxy> TextDocumentProxy for Rc<RefCell<T>> {
    fn text_before_cursor(&self) -> String {
        self.borrow().text_before_cursor()
    }

    fn text_after_cursor(&self) -> String {
        self.borrow().text_after_cursor()
    }

    fn selected_text(&self) -> Option<String> {
        self.borrow().selected_text()
    }

    fn insert_text(&mut self, text: &str) {
        self.borrow_mut().insert_text(text);
    }

    fn delete_backward(&mut self) {
        self.borrow_mut().delete_backward();
    }
}

impl<T: HostShell> HostShell for Rc<RefCell<T>> {
    fn metrics(&self) -> LayoutMetrics {
        self.borrow().metrics()
    }

    fn request_resize(&mut self, request: ResizeRequest) {
        self.borrow_mut().request_resize(request);
    }

    fn set_key_input_visible(&mut self, visible: bool) {
        self.borrow_mut().set_key_input_visible(visible);
    }

    fn present_web_content(&mut self, url: &Url) {
        self.borrow_mut().present_web_content(url);
    }

    fn reload_web_content(&mut self) {
        self.borrow_mut().reload_web_content();
    }

    fn release_web_content(&mut self) {
        self.borrow_mut().release_web_content();
    }

    fn open_url(&mut self, url: &Url) {
        self.borrow_mut().open_url(url);
    }
}

/// A plain string with a cursor and an optional selection, for drivers that
/// have no real host application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryDocument {
    text: String,
    cursor: usize,
    selection: Option<Range<usize>>,
}

impl InMemoryDocument {
    /// Cursor placed at the end of `text`.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let cursor = text.len();
        Self {
            text,
            cursor,
            selection: None,
        }
    }

    /// Selects `range` (byte offsets, each end moved back to a char boundary)
    /// and moves the cursor to its end.
    pub fn with_selection(mut self, range: Range<usize>) -> Self {
        let end = self.char_boundary_at_or_before(range.end);
        let start = self.char_boundary_at_or_before(range.start).min(end);
        self.cursor = end;
        self.selection = Some(start..end);
        self
    }

    /// Moves the cursor to byte offset `cursor`, or the nearest char boundary
    /// before it, and clears any selection.
    pub fn with_cursor(mut self, cursor: usize) -> Self {
        self.cursor = self.char_boundary_at_or_before(cursor);
        self.selection = None;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    fn char_boundary_at_or_before(&self, offset: usize) -> usize {
        let mut offset = offset.min(self.text.len());
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }
        offset
    }

    fn delete_selection(&mut self) -> bool {
        match self.selection.take() {
            Some(range) if !range.is_empty() => {
                self.text.replace_range(range.clone(), "");
                self.cursor = range.start;
                true
            }
            _ => false,
        }
    }
}

impl TextDocumentProxy for InMemoryDocument {
    fn text_before_cursor(&self) -> String {
        self.text[..self.cursor].to_string()
    }

    fn text_after_cursor(&self) -> String {
        self.text[self.cursor..].to_string()
    }

    fn selected_text(&self) -> Option<String> {
        self.selection
            .as_ref()
            .map(|range| self.text[range.clone()].to_string())
    }

    fn insert_text(&mut self, text: &str) {
        self.delete_selection();
        self.text.insert_str(self.cursor, text);
        self.cursor += text.len();
    }

    fn delete_backward(&mut self) {
        if self.delete_selection() {
            return;
        }
        let before = &self.text[..self.cursor];
        if let Some((start, _)) = before.grapheme_indices(true).next_back() {
            self.text.replace_range(start..self.cursor, "");
            self.cursor = start;
        }
    }
}
