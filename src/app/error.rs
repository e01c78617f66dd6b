use thiserror::Error;

/// Violations of the descriptor's construction constraints.
///
/// Anything that depends on the filesystem or on the bundler itself
/// (missing entry file, unknown loader, pattern semantics) is not reported here.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("entry path must not be empty")]
    EmptyEntry,

    #[error("output path must not be empty")]
    EmptyOutputPath,

    #[error("output filename must not be empty")]
    EmptyOutputFilename,

    #[error("rule #{0} has an empty `test` pattern")]
    EmptyTest(usize),

    #[error("rule #{0} has an empty loader")]
    EmptyLoader(usize),
}
