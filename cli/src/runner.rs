use std::ops::Range;
use std::rc::Rc;

use futures::future::join_all;
use tracing::{debug, warn};

use fence::{DecodeError, Document, Selection, decode};
use sandbox::{Captured, Engine, Sandbox, SandboxError, Verifier};

pub enum BlockOutcome {
    /// The block ran; `value` is `None` when nothing was captured.
    Captured(Captured),
    /// Language not selected.
    Skipped,
    DecodeFailed(DecodeError),
    Failed(SandboxError),
}

pub struct BlockReport {
    /// 1-based position among the document's blocks.
    pub number: usize,
    /// 1-based line of the opening marker.
    pub line: usize,
    pub language: String,
    /// Byte range of the whole block, markers included.
    pub span: Range<usize>,
    pub outcome: BlockOutcome,
}

impl BlockReport {
    /// Guest errors, decode errors and failed verifications.
    pub fn is_failure(&self) -> bool {
        match &self.outcome {
            BlockOutcome::Captured(captured) => captured.failures > 0,
            BlockOutcome::Skipped => false,
            BlockOutcome::DecodeFailed(_) | BlockOutcome::Failed(_) => true,
        }
    }
}

/// Execute every selected block of `document`, each in its own context.
///
/// All executions are started in document order and awaited together, so a block
/// waiting on host verification does not hold back the blocks after it.
/// Reports come back in document order.
pub async fn run_document<E: Engine>(
    sandbox: &Sandbox<E>,
    document: &Document<'_>,
    selection: &Selection,
    verifier: &Rc<dyn Verifier>,
) -> Vec<BlockReport> {
    let runs = document.blocks.iter().enumerate().map(|(index, block)| {
        let verifier = Rc::clone(verifier);
        async move {
            let number = index + 1;
            let line = document.line_of(block.start);
            let report = |language: String, outcome: BlockOutcome| BlockReport {
                number,
                line,
                language,
                span: block.span(),
                outcome,
            };

            let decoded = match decode(block) {
                Ok(decoded) => decoded,
                Err(err) => {
                    warn!(block = number, line, "{}", err);
                    return report(String::new(), BlockOutcome::DecodeFailed(err));
                }
            };
            let language = decoded.language();
            let Some(code) = selection.prepare(&decoded) else {
                debug!(block = number, language = %language, "skipped");
                return report(language, BlockOutcome::Skipped);
            };

            let outcome = match sandbox.execute(&code, verifier).await {
                Ok(captured) => BlockOutcome::Captured(captured),
                Err(err) => {
                    warn!(block = number, line, error = %err, "block failed");
                    BlockOutcome::Failed(err)
                }
            };
            report(language, outcome)
        }
    });
    join_all(runs).await
}
