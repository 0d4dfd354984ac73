use std::borrow::Cow;

use crate::error::DecodeError;
use crate::extract::BlockSpan;

/// A block body split into its language tag and code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedBlock<'a> {
    /// Exactly the text before the first line break (may be empty).
    pub language_tag: &'a str,
    /// Everything after the first line break.
    pub code: &'a str,
}

impl<'a> DecodedBlock<'a> {
    /// Normalized language name: the first word of the tag, lower-cased.
    /// `"JS title=demo\r"` becomes `"js"`.
    pub fn language(&self) -> String {
        self.language_tag
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_lowercase()
    }

    /// Inverse of [`decode`]: reproduces the original block body.
    pub fn rejoin(&self) -> String {
        format!("{}\n{}", self.language_tag, self.code)
    }
}

/// Split a block body at its first line break.
pub fn decode<'a>(block: &BlockSpan<'a>) -> Result<DecodedBlock<'a>, DecodeError> {
    let (language_tag, code) =
        block
            .body
            .split_once('\n')
            .ok_or_else(|| DecodeError::MissingLanguageLine {
                span: block.span(),
            })?;
    Ok(DecodedBlock { language_tag, code })
}

/// Which decoded blocks run, and what guest code they run as.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Accepted language names (case-insensitive). Empty accepts every block.
    pub languages: Vec<String>,
    /// Guest code prepended to every selected block.
    pub prelude: Option<String>,
}

impl Selection {
    pub fn accepts(&self, block: &DecodedBlock<'_>) -> bool {
        if self.languages.is_empty() {
            return true;
        }
        let language = block.language();
        self.languages
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(&language))
    }

    /// The guest code for `block`, or `None` if the block is not selected.
    /// Without a prelude the code is passed through untouched.
    pub fn prepare<'a>(&self, block: &DecodedBlock<'a>) -> Option<Cow<'a, str>> {
        if !self.accepts(block) {
            return None;
        }
        Some(match &self.prelude {
            Some(prelude) => Cow::Owned(format!("{}\n{}", prelude, block.code)),
            None => Cow::Borrowed(block.code),
        })
    }
}
