use std::rc::Rc;

use serde::Deserialize;
use tracing::info;

use sandbox::{HostValue, Identity, Verdict, VerificationError, Verifier};

/// Built-in verification logic, selectable from the config file or `--verifier`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VerifierKind {
    /// The first argument is the result.
    #[default]
    Identity,
    /// Log the first argument asynchronously, then resolve to it.
    Log,
    /// `verify(actual, expected)`: fail unless both are structurally equal.
    Assert,
}

impl VerifierKind {
    pub fn build(self) -> Rc<dyn Verifier> {
        match self {
            VerifierKind::Identity => Rc::new(Identity),
            VerifierKind::Log => Rc::new(log_result),
            VerifierKind::Assert => Rc::new(assert_equal),
        }
    }
}

fn first(args: Vec<HostValue>) -> HostValue {
    args.into_iter().next().unwrap_or(HostValue::Undefined)
}

fn log_result(args: Vec<HostValue>) -> Verdict {
    let value = first(args);
    Verdict::deferred(async move {
        tokio::task::yield_now().await;
        info!(result = %value, "verified");
        Ok(value)
    })
}

fn assert_equal(args: Vec<HostValue>) -> Verdict {
    let mut args = args.into_iter();
    let actual = args.next().unwrap_or(HostValue::Undefined);
    let expected = args.next().unwrap_or(HostValue::Undefined);
    if actual == expected {
        Verdict::value(actual)
    } else {
        Verdict::fail(VerificationError::Mismatch { expected, actual })
    }
}
