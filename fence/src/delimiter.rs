/// The literal open/close marker pair that delimits a block.
/// Markers are opaque strings: nothing about the guest language is assumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimiterSpec {
    pub open: String,
    pub close: String,
}

impl DelimiterSpec {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        DelimiterSpec {
            open: open.into(),
            close: close.into(),
        }
    }

    /// The triple-backtick fence.
    pub fn fence() -> Self {
        Self::new("```", "```")
    }

    /// An empty marker matches at every offset, so it can never delimit anything.
    pub fn is_usable(&self) -> bool {
        !self.open.is_empty() && !self.close.is_empty()
    }

    /// Wrap `body` in this pair of markers.
    pub fn wrap(&self, body: &str) -> String {
        format!("{}{}{}", self.open, body, self.close)
    }
}

impl Default for DelimiterSpec {
    fn default() -> Self {
        Self::fence()
    }
}
