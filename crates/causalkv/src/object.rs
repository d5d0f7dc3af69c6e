//! The client-side object model: a bucket/key pair, its opaque causal
//! clock, and one or more sibling contents.
//!
//! Objects are plain values: movable, clonable, never shared. Misusing one
//! is a programmer error and panics rather than returning a result — an
//! invalid object means an operation's error was ignored, and touching the
//! content of a conflicted object means sibling resolution was skipped.

use crate::proto::Content;

/// A stored object as seen by the client.
#[derive(Debug, Clone)]
pub struct Object {
    bucket: String,
    key: String,
    vclock: Vec<u8>,
    siblings: Vec<Content>,
    valid: bool,
    exists: bool,
}

impl Default for Object {
    /// An invalid placeholder for later population; only `valid`, `bucket`,
    /// `key`, `in_conflict` and `exists` may be called on it.
    fn default() -> Self {
        Self {
            bucket: String::new(),
            key: String::new(),
            vclock: Vec::new(),
            siblings: Vec::new(),
            valid: false,
            exists: false,
        }
    }
}

impl Object {
    /// A new object for `bucket`/`key` that is not in the store yet: valid,
    /// absent, with a single empty content.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        let mut object = Self {
            bucket: bucket.into(),
            key: key.into(),
            vclock: Vec::new(),
            siblings: Vec::new(),
            valid: true,
            exists: false,
        };
        object.ensure_one_valid_sibling();
        object
    }

    /// Builds an object from a fetch response.
    pub(crate) fn from_response(
        bucket: String,
        key: String,
        vclock: Vec<u8>,
        siblings: Vec<Content>,
    ) -> Self {
        let mut object = Self {
            exists: !vclock.is_empty(),
            bucket,
            key,
            vclock,
            siblings,
            valid: true,
        };
        object.ensure_one_valid_sibling();
        object
    }

    /// Whether the object came out of a successful operation or
    /// constructor. Never panics.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// The bucket name. Never panics.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The key within the bucket. Never panics.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether divergent replica values are present. Never panics.
    pub fn in_conflict(&self) -> bool {
        self.siblings.len() > 1
    }

    /// Whether exactly one sibling exists and it is not a tombstone. Never
    /// panics; a conflicted object reports `false`.
    pub fn exists(&self) -> bool {
        !self.in_conflict() && self.exists
    }

    /// The opaque causal clock. Panics on invalid or conflicted objects.
    pub fn vclock(&self) -> &[u8] {
        self.check_no_conflict();
        &self.vclock
    }

    pub(crate) fn set_vclock(&mut self, vclock: Vec<u8>) {
        self.vclock = vclock;
    }

    /// The value bytes. Panics on invalid or conflicted objects.
    pub fn value(&self) -> &[u8] {
        &self.content().value
    }

    /// Replaces the value bytes. Panics on invalid or conflicted objects.
    pub fn set_value(&mut self, value: impl Into<Vec<u8>>) {
        self.content_mut().value = value.into();
    }

    /// The primary content record. Panics on invalid or conflicted objects.
    pub fn content(&self) -> &Content {
        self.check_no_conflict();
        &self.siblings[0]
    }

    /// Mutable primary content record. Panics on invalid or conflicted
    /// objects.
    pub fn content_mut(&mut self) -> &mut Content {
        self.check_no_conflict();
        &mut self.siblings[0]
    }

    /// All siblings, in server order. Panics on invalid objects.
    pub fn siblings(&self) -> &[Content] {
        self.check_valid();
        &self.siblings
    }

    /// One sibling by index. Panics on invalid objects or out-of-range
    /// indices.
    pub fn sibling(&self, index: usize) -> &Content {
        self.check_valid();
        &self.siblings[index]
    }

    /// Collapses the sibling list to the chosen sibling, clearing any
    /// tombstone flag. Panics on invalid objects or out-of-range indices.
    pub fn resolve_with_sibling(&mut self, index: usize) {
        self.check_valid();
        assert!(
            index < self.siblings.len(),
            "sibling index {index} out of range ({} siblings)",
            self.siblings.len()
        );
        let chosen = self.siblings.swap_remove(index);
        self.siblings.clear();
        self.siblings.push(chosen);
        self.ensure_valid_content();
    }

    /// Collapses the sibling list to the given content, clearing any
    /// tombstone flag. Panics on invalid objects.
    pub fn resolve_with(&mut self, content: Content) {
        self.check_valid();
        self.siblings.clear();
        self.siblings.push(content);
        self.ensure_valid_content();
    }

    fn check_valid(&self) {
        assert!(
            self.valid,
            "invalid object used; check the operation's error before touching its object"
        );
    }

    fn check_no_conflict(&self) {
        self.check_valid();
        assert!(
            !self.in_conflict(),
            "cannot access content of conflicted object '{}'/'{}' ({} siblings); resolve it first",
            self.bucket,
            self.key,
            self.siblings.len()
        );
    }

    fn ensure_one_valid_sibling(&mut self) {
        if self.siblings.is_empty() {
            self.siblings.push(Content::default());
            self.exists = false;
        } else if self.siblings.len() == 1 {
            self.ensure_valid_content();
        }
    }

    fn ensure_valid_content(&mut self) {
        debug_assert_eq!(self.siblings.len(), 1);
        let content = &mut self.siblings[0];
        if content.deleted.unwrap_or(false) {
            self.exists = false;
            content.deleted = None;
        }
    }
}
