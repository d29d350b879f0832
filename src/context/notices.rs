use serde::Serialize;

use crate::ast::Span;

/// A non-fatal diagnostic attached to a successful compilation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub message: String,
    pub span: Option<Span>,
    /// Optional machine-applicable replacement suggestion.
    pub fix: Option<String>,
}

impl Notice {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), span: None, fix: None }
    }

    pub fn with_span(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }
}

/// Accumulated warnings and notices, deduplicated by the full
/// (message, span, fix) triple.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Notices {
    warnings: Vec<Notice>,
    notices: Vec<Notice>,
}

impl Notices {
    pub fn add_warning(&mut self, notice: Notice) {
        if !self.warnings.contains(&notice) {
            self.warnings.push(notice);
        }
    }

    pub fn add_notice(&mut self, notice: Notice) {
        if !self.notices.contains(&notice) {
            self.notices.push(notice);
        }
    }

    pub fn warnings(&self) -> &[Notice] {
        &self.warnings
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }
}
