//! Error types shared by every primitive in the crate.
//!
//! Only configuration and rendering paths are fallible. Foreign addresses
//! handed to an [`AddrPool`](crate::AddrPool) are ignored rather than
//! reported, and the locks never poison, so most operations return plain
//! values.

/// A result type defaulting to the crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All error variants that `podsim` can emit.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An address range could not be parsed.
    #[error("invalid address range {input:?}: {reason}")]
    InvalidRange { input: String, reason: String },

    /// The pool walked past the end of its range and has nothing to recycle.
    #[error("address range {range} is exhausted")]
    RangeExhausted { range: String },

    /// The template text failed to compile.
    #[error("template parse error: {0}")]
    TemplateParse(String),

    /// The compiled template failed while executing against its input.
    #[error("template execution error: {0}")]
    TemplateExec(String),

    /// The input could not be normalized through its JSON form.
    #[error("normalize input: {0}")]
    Normalize(String),

    /// The rendered text was not valid YAML/JSON.
    ///
    /// `rendered` carries the raw template output so a malformed template can
    /// be diagnosed.
    #[error("convert rendered output: {reason}: {rendered}")]
    Convert { reason: String, rendered: String },

    /// A work item could not be handed to a worker, e.g. because the OS
    /// refused to start a worker thread.
    #[error("dispatch error: {reason}")]
    Dispatch { reason: String },
}
