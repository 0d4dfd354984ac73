use std::future::Future;

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use crate::error::VerificationError;
use crate::host_value::HostValue;

/// A host computation that settles after the bridge call has returned to the guest.
pub type Deferred = LocalBoxFuture<'static, Result<HostValue, VerificationError>>;

/// What host verification logic produced for one bridge call.
pub enum Verdict {
    Ready(Result<HostValue, VerificationError>),
    Deferred(Deferred),
}

impl Verdict {
    pub fn value(value: impl Into<HostValue>) -> Self {
        Verdict::Ready(Ok(value.into()))
    }

    pub fn fail(error: VerificationError) -> Self {
        Verdict::Ready(Err(error))
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = Result<HostValue, VerificationError>> + 'static,
    {
        Verdict::Deferred(future.boxed_local())
    }
}

/// Host-side verification logic, invoked once per bridge call with the converted arguments.
pub trait Verifier {
    fn verify(&self, args: Vec<HostValue>) -> Verdict;
}

impl<F> Verifier for F
where
    F: Fn(Vec<HostValue>) -> Verdict,
{
    fn verify(&self, args: Vec<HostValue>) -> Verdict {
        self(args)
    }
}

/// The default verification logic: the first argument is the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Verifier for Identity {
    fn verify(&self, args: Vec<HostValue>) -> Verdict {
        Verdict::value(args.into_iter().next().unwrap_or(HostValue::Undefined))
    }
}
