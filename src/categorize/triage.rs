//! Client-side state for stepping through uncategorized descriptions one at a time.

use std::fmt;

use crate::categorize::{endpoints::CategorizeRequest, queue::UncategorizedDescription};

/// Where a [TriageSession] is.
#[derive(Debug, Clone, PartialEq)]
pub enum TriageStep<'a> {
    /// The description waiting for a category.
    Current {
        /// The description to categorize.
        item: &'a UncategorizedDescription,
        /// The zero-based position of `item`.
        index: usize,
        /// How many descriptions the session started with.
        total: usize,
    },
    /// Every description has been categorized or skipped.
    Complete,
}

/// Walks forward through a list of uncategorized descriptions.
///
/// There is no way back; once the end is reached the completion callback is
/// called once and every further call does nothing.
pub struct TriageSession {
    items: Vec<UncategorizedDescription>,
    index: usize,
    create_rules: bool,
    on_complete: Option<Box<dyn FnOnce() + Send>>,
}

impl fmt::Debug for TriageSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriageSession")
            .field("items", &self.items)
            .field("index", &self.index)
            .field("create_rules", &self.create_rules)
            .finish_non_exhaustive()
    }
}

impl TriageSession {
    /// Start a session over `items`. `on_complete` is called when the last item is passed.
    ///
    /// An empty list completes immediately.
    pub fn new(
        items: Vec<UncategorizedDescription>,
        on_complete: impl FnOnce() + Send + 'static,
    ) -> Self {
        let mut session = Self {
            items,
            index: 0,
            create_rules: true,
            on_complete: Some(Box::new(on_complete)),
        };
        session.complete_if_done();
        session
    }

    /// Whether categorizing also saves a description rule. Defaults to true.
    pub fn with_rule_creation(mut self, create_rules: bool) -> Self {
        self.create_rules = create_rules;
        self
    }

    /// The current step.
    pub fn step(&self) -> TriageStep<'_> {
        match self.items.get(self.index) {
            Some(item) => TriageStep::Current {
                item,
                index: self.index,
                total: self.items.len(),
            },
            None => TriageStep::Complete,
        }
    }

    /// Whether every description has been handled.
    pub fn is_complete(&self) -> bool {
        self.index >= self.items.len()
    }

    /// Assign `category` to the current description and move on.
    ///
    /// Returns the request to send to the server, or `None` if the session is complete.
    pub fn categorize(&mut self, category: &str) -> Option<CategorizeRequest> {
        let item = self.items.get(self.index)?;

        let request = CategorizeRequest {
            description: item.description.clone(),
            category: category.to_owned(),
            create_rule: Some(self.create_rules),
        };
        self.advance();

        Some(request)
    }

    /// Leave the current description uncategorized and move on.
    pub fn skip(&mut self) {
        if !self.is_complete() {
            self.advance();
        }
    }

    fn advance(&mut self) {
        self.index += 1;
        self.complete_if_done();
    }

    fn complete_if_done(&mut self) {
        if !self.is_complete() {
            return;
        }

        if let Some(on_complete) = self.on_complete.take() {
            on_complete();
        }
    }
}
