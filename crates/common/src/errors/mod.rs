//! Commonly used errors

use std::{error::Error, fmt, sync::Arc};

/// An internal invariant was violated.
///
/// These are never user-facing recoverable errors: they mean a caller upstream handed over data
/// that cannot exist, like a chain id that isn't in the registry or a watch-only account that
/// reached the signer.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("impossible state: {0}")]
pub struct ImpossibleState(pub String);

impl ImpossibleState {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }
}

/// Sink for errors that are swallowed on a degrading path but must still be observed.
pub trait ErrorReporter: Send + Sync + fmt::Debug {
    /// Records `error`. Must not fail or block.
    fn report(&self, error: &(dyn Error + 'static));
}

/// Shared handle to an [ErrorReporter].
pub type SharedReporter = Arc<dyn ErrorReporter>;

/// Reports errors as `tracing` events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &(dyn Error + 'static)) {
        error!(target: "kestrel::report", error = %display_chain(error), "reported error");
    }
}

mod private {
    use eyre::Chain;
    use std::error::Error;

    pub trait ErrorChain {
        fn chain(&self) -> Chain<'_>;
    }

    impl ErrorChain for dyn Error + 'static {
        fn chain(&self) -> Chain<'_> {
            Chain::new(self)
        }
    }

    impl ErrorChain for dyn Error + Send + Sync + 'static {
        fn chain(&self) -> Chain<'_> {
            Chain::new(self)
        }
    }

    impl ErrorChain for eyre::Report {
        fn chain(&self) -> Chain<'_> {
            self.chain()
        }
    }
}

/// Displays a chain of errors in a single line.
pub fn display_chain<E: private::ErrorChain + ?Sized>(error: &E) -> String {
    dedup_chain(error).join("; ")
}

/// Deduplicates a chain of errors.
pub fn dedup_chain<E: private::ErrorChain + ?Sized>(error: &E) -> Vec<String> {
    let mut causes = all_sources(error);
    // Deduplicate the common pattern `msg1: msg2; msg2` -> `msg1: msg2`.
    causes.dedup_by(|b, a| a.contains(b.as_str()));
    causes
}

fn all_sources<E: private::ErrorChain + ?Sized>(err: &E) -> Vec<String> {
    err.chain().map(|cause| cause.to_string().trim().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(thiserror::Error, Debug)]
    #[error("my error: {0}")]
    struct A(#[from] B);

    #[derive(thiserror::Error, Debug)]
    #[error("{0}")]
    struct B(String);

    #[test]
    fn dedups_contained() {
        let ee = eyre::Report::from(A(B("hello".into())));
        assert_eq!(ee.chain().count(), 2, "{ee:?}");
        let full = all_sources(&ee).join("; ");
        assert_eq!(full, "my error: hello; hello");
        let chained = display_chain(&ee);
        assert_eq!(chained, "my error: hello");
    }

    #[test]
    fn chains_std_errors() {
        let err = A(B("nonce too low".into()));
        let err: &(dyn Error + 'static) = &err;
        assert_eq!(display_chain(err), "my error: nonce too low");
    }
}
