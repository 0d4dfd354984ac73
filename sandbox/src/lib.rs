pub mod bridge;
pub mod engine;
pub mod error;
pub mod executor;
pub mod host_value;
pub mod verifier;

pub use bridge::{Bridge, Captured};
pub use engine::quickjs::{Limits, QuickJs};
pub use engine::{Engine, GuestContext, Lease, Ledger};
pub use error::{SandboxError, VerificationError};
pub use executor::{DEFAULT_BRIDGE_NAME, Sandbox};
pub use host_value::HostValue;
pub use verifier::{Identity, Verdict, Verifier};
