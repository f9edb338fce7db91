//! Annotation records and the ordered store that owns them.
//!
//! Records are immutable once built. Every constructor validates its input,
//! and deserialization goes through the same constructors, so a record that
//! exists is always well formed.

use serde::{Deserialize, Serialize};

pub const DEFAULT_HIGHLIGHT_WIDTH: f64 = 100.0;
pub const DEFAULT_HIGHLIGHT_HEIGHT: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("page numbers are 1-based")]
    ZeroPage,
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("position ({x}, {y}) must be finite and non-negative")]
    InvalidPosition { x: f64, y: f64 },
    #[error("highlight size {width}x{height} must be positive")]
    InvalidSize { width: f64, height: f64 },
    #[error("comment text is empty")]
    EmptyCommentText,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HighlightSize {
    pub width: f64,
    pub height: f64,
}

impl Default for HighlightSize {
    fn default() -> Self {
        Self { width: DEFAULT_HIGHLIGHT_WIDTH, height: DEFAULT_HIGHLIGHT_HEIGHT }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Highlight,
    Comment,
}

/// A single highlight or comment, positioned in page-local coordinates
/// (origin at the top-left of the page's rendered surface).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnnotationRecord {
    Highlight(Highlight),
    Comment(Comment),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HighlightFields")]
pub struct Highlight {
    page: u32,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CommentFields")]
pub struct Comment {
    page: u32,
    x: f64,
    y: f64,
    text: String,
}

#[derive(Deserialize)]
struct HighlightFields {
    page: u32,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

#[derive(Deserialize)]
struct CommentFields {
    page: u32,
    x: f64,
    y: f64,
    text: String,
}

impl TryFrom<HighlightFields> for Highlight {
    type Error = RecordError;

    fn try_from(fields: HighlightFields) -> Result<Self, Self::Error> {
        let size = HighlightSize { width: fields.width, height: fields.height };
        Highlight::new(fields.page, fields.x, fields.y, size)
    }
}

impl TryFrom<CommentFields> for Comment {
    type Error = RecordError;

    fn try_from(fields: CommentFields) -> Result<Self, Self::Error> {
        Comment::new(fields.page, fields.x, fields.y, &fields.text)
    }
}

fn check_anchor(page: u32, x: f64, y: f64) -> Result<(), RecordError> {
    if page == 0 {
        return Err(RecordError::ZeroPage);
    }

    if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
        return Err(RecordError::InvalidPosition { x, y });
    }

    Ok(())
}

impl Highlight {
    fn new(page: u32, x: f64, y: f64, size: HighlightSize) -> Result<Self, RecordError> {
        check_anchor(page, x, y)?;

        let HighlightSize { width, height } = size;
        if !width.is_finite() || !height.is_finite() || width <= 0.0 || height <= 0.0 {
            return Err(RecordError::InvalidSize { width, height });
        }

        Ok(Self { page, x, y, width, height })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }
}

impl Comment {
    fn new(page: u32, x: f64, y: f64, text: &str) -> Result<Self, RecordError> {
        check_anchor(page, x, y)?;

        let text = text.trim();
        if text.is_empty() {
            return Err(RecordError::EmptyCommentText);
        }

        Ok(Self { page, x, y, text: text.to_owned() })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    /// The comment body, already trimmed.
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl AnnotationRecord {
    /// Highlight with the default 100x20 size.
    pub fn highlight(page: u32, x: f64, y: f64) -> Result<Self, RecordError> {
        Self::highlight_with_size(page, x, y, HighlightSize::default())
    }

    pub fn highlight_with_size(
        page: u32,
        x: f64,
        y: f64,
        size: HighlightSize,
    ) -> Result<Self, RecordError> {
        Highlight::new(page, x, y, size).map(Self::Highlight)
    }

    pub fn comment(page: u32, x: f64, y: f64, text: &str) -> Result<Self, RecordError> {
        Comment::new(page, x, y, text).map(Self::Comment)
    }

    pub fn kind(&self) -> AnnotationKind {
        match self {
            Self::Highlight(_) => AnnotationKind::Highlight,
            Self::Comment(_) => AnnotationKind::Comment,
        }
    }

    pub fn page(&self) -> u32 {
        match self {
            Self::Highlight(highlight) => highlight.page,
            Self::Comment(comment) => comment.page,
        }
    }

    pub fn x(&self) -> f64 {
        match self {
            Self::Highlight(highlight) => highlight.x,
            Self::Comment(comment) => comment.x,
        }
    }

    pub fn y(&self) -> f64 {
        match self {
            Self::Highlight(highlight) => highlight.y,
            Self::Comment(comment) => comment.y,
        }
    }
}

/// Ordered record of every annotation in the current document session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationStore {
    records: Vec<AnnotationRecord>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: AnnotationRecord) {
        self.records.push(record);
    }

    /// Records on `page`, in insertion order. Each call starts a fresh scan.
    pub fn for_page(&self, page: u32) -> impl Iterator<Item = &AnnotationRecord> + '_ {
        self.records.iter().filter(move |record| record.page() == page)
    }

    pub fn serialize(&self) -> &[AnnotationRecord] {
        &self.records
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mixed_store() -> AnnotationStore {
        let mut store = AnnotationStore::new();
        store.append(AnnotationRecord::highlight(1, 10.0, 10.0).expect("valid highlight"));
        store.append(AnnotationRecord::comment(2, 5.0, 6.0, "first").expect("valid comment"));
        store.append(AnnotationRecord::highlight(2, 40.0, 80.0).expect("valid highlight"));
        store.append(AnnotationRecord::comment(1, 7.0, 8.0, "second").expect("valid comment"));
        store.append(AnnotationRecord::highlight(3, 1.0, 2.0).expect("valid highlight"));
        store
    }

    #[test]
    fn for_page_returns_matching_records_in_insertion_order() {
        let store = mixed_store();

        let page_two: Vec<_> = store.for_page(2).collect();
        assert_eq!(page_two.len(), 2);
        assert_eq!(page_two[0].kind(), AnnotationKind::Comment);
        assert_eq!(page_two[1].kind(), AnnotationKind::Highlight);

        let page_one: Vec<_> = store.for_page(1).map(|record| record.y()).collect();
        assert_eq!(page_one, vec![10.0, 8.0]);

        assert_eq!(store.for_page(9).count(), 0);
    }

    #[test]
    fn reads_do_not_consume_or_mutate() {
        let store = mixed_store();
        let before = store.clone();

        assert_eq!(store.for_page(1).count(), store.for_page(1).count());
        let _ = store.serialize();
        let _ = store.to_json().expect("serialization should succeed");

        assert_eq!(store, before);
        assert_eq!(store.serialize().len(), 5);
    }

    #[test]
    fn empty_store_serializes_to_empty_array() {
        let store = AnnotationStore::new();
        assert!(store.is_empty());
        assert_eq!(store.to_json().expect("serialization should succeed"), "[]");
    }

    #[test]
    fn comment_text_is_trimmed_and_must_not_be_blank() {
        let comment = AnnotationRecord::comment(1, 0.0, 0.0, "  note \n").expect("valid comment");
        let AnnotationRecord::Comment(comment) = comment else {
            panic!("expected a comment");
        };
        assert_eq!(comment.text(), "note");

        for blank in ["", "   ", "\t\n"] {
            let err = AnnotationRecord::comment(1, 0.0, 0.0, blank).expect_err("blank text");
            assert_eq!(err, RecordError::EmptyCommentText);
        }
    }

    #[test]
    fn constructors_reject_bad_anchors_and_sizes() {
        assert_eq!(
            AnnotationRecord::highlight(0, 1.0, 1.0).expect_err("page zero"),
            RecordError::ZeroPage
        );
        assert!(matches!(
            AnnotationRecord::highlight(1, -1.0, 1.0),
            Err(RecordError::InvalidPosition { .. })
        ));
        assert!(matches!(
            AnnotationRecord::highlight(1, 1.0, f64::NAN),
            Err(RecordError::InvalidPosition { .. })
        ));
        assert!(matches!(
            AnnotationRecord::highlight_with_size(
                1,
                1.0,
                1.0,
                HighlightSize { width: 0.0, height: 20.0 }
            ),
            Err(RecordError::InvalidSize { .. })
        ));
    }

    #[test]
    fn highlight_json_matches_wire_schema() {
        let record = AnnotationRecord::highlight(1, 50.0, 30.0).expect("valid highlight");
        let value = serde_json::to_value(&record).expect("serialization should succeed");

        assert_eq!(
            value,
            json!({"type": "highlight", "page": 1, "x": 50.0, "y": 30.0, "width": 100.0, "height": 20.0})
        );
    }

    #[test]
    fn comment_json_matches_wire_schema() {
        let record = AnnotationRecord::comment(3, 12.5, 4.0, "look here").expect("valid comment");
        let value = serde_json::to_value(&record).expect("serialization should succeed");

        assert_eq!(
            value,
            json!({"type": "comment", "page": 3, "x": 12.5, "y": 4.0, "text": "look here"})
        );
    }

    #[test]
    fn deserialization_applies_constructor_validation() {
        let parsed: Vec<AnnotationRecord> = serde_json::from_str(
            r#"[{"type":"comment","page":2,"x":1,"y":2,"text":"  padded  "},
                {"type":"highlight","page":1,"x":3,"y":4,"width":10,"height":5}]"#,
        )
        .expect("valid records should parse");

        assert_eq!(parsed[0], AnnotationRecord::comment(2, 1.0, 2.0, "padded").expect("valid"));
        assert_eq!(parsed[1].kind(), AnnotationKind::Highlight);

        let blank: Result<Vec<AnnotationRecord>, _> =
            serde_json::from_str(r#"[{"type":"comment","page":1,"x":0,"y":0,"text":"  "}]"#);
        assert!(blank.is_err());

        let unknown =
            serde_json::from_str::<AnnotationRecord>(r#"{"type":"underline","page":1,"x":0,"y":0}"#);
        assert!(unknown.is_err());
    }
}
