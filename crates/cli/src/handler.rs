use eyre::EyreHandler;
use std::{error::Error, fmt};

/// A custom context type for kestrel specific error reporting via `eyre`.
#[derive(Debug, Default)]
pub struct Handler {
    verbose: bool,
}

impl Handler {
    /// Create a new instance of the `Handler`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Print errors with their full `Debug` representation.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl EyreHandler for Handler {
    fn display(&self, error: &(dyn Error + 'static), f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&kestrel_common::errors::dedup_chain(error).join("; "))
    }

    fn debug(&self, error: &(dyn Error + 'static), f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.verbose || f.alternate() {
            return fmt::Debug::fmt(error, f);
        }
        let errors = kestrel_common::errors::dedup_chain(error);

        let Some((error, sources)) = errors.split_first() else { return Ok(()) };
        write!(f, "{error}")?;

        if !sources.is_empty() {
            write!(f, "\n\nContext:")?;

            let multiple = sources.len() > 1;
            for (n, error) in sources.iter().enumerate() {
                writeln!(f)?;
                if multiple {
                    write!(f, "- Error #{n}: {error}")?;
                } else {
                    write!(f, "- {error}")?;
                }
            }
        }

        Ok(())
    }
}

/// Installs the kestrel [`eyre`] hook as the global one.
///
/// Errors are printed as their deduplicated chain of causes, unless `KESTREL_DEBUG` is set in
/// the environment, in which case their `Debug` representation is printed.
pub fn install() {
    let verbose = std::env::var_os("KESTREL_DEBUG").is_some();
    if let Err(e) = eyre::set_hook(Box::new(move |_| Box::new(Handler::new().verbose(verbose)))) {
        debug!("failed to install eyre error hook: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Failed(&'static str, Option<Box<Failed>>);

    impl fmt::Display for Failed {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    impl Error for Failed {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            self.1.as_deref().map(|err| err as _)
        }
    }

    struct Shown<'a>(&'a Handler, &'a (dyn Error + 'static));

    impl fmt::Display for Shown<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            self.0.display(self.1, f)
        }
    }

    impl fmt::Debug for Shown<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            self.0.debug(self.1, f)
        }
    }

    #[test]
    fn prints_deduplicated_chain() {
        let err = Failed(
            "failed to fetch nonce: connection refused",
            Some(Box::new(Failed("connection refused", None))),
        );
        let handler = Handler::new();

        assert_eq!(Shown(&handler, &err).to_string(), "failed to fetch nonce: connection refused");

        let err = Failed("failed to sign", Some(Box::new(Failed("device disconnected", None))));
        assert_eq!(
            format!("{:?}", Shown(&handler, &err)),
            "failed to sign\n\nContext:\n- device disconnected"
        );
    }
}
