//! Errors returned by tcspc-core.

use std::{
    backtrace::{Backtrace, BacktraceStatus},
    borrow::Cow,
    error::Error as StdError,
    fmt,
};

/// Result that is a wrapper of `Result<T, tcspc_core::Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All kinds of error that can flow out of a pipeline.
///
/// `EndOfProcessing` and `AcquisitionHalted` are control-flow signals, not
/// failures: the original C++ design raises them as exceptions that are
/// caught only by the outermost data source (see spec §7). In Rust they are
/// ordinary [`Error`] values; a caller that wants the "catch" behavior
/// matches on [`Error::kind`] explicitly instead of relying on unwinding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A processor decided the stream is complete and the pipeline should
    /// wind down normally. Caught only by the ultimate data source.
    EndOfProcessing,
    /// An external halt signal was observed by `acquire`/`acquire_full_buckets`
    /// during `flush()`. Raised without flushing downstream.
    AcquisitionHalted,
    /// `error_on_overflow` saw an about-to-overflow increment, or
    /// `reset_on_overflow` saw overflow on the first scan of a round.
    HistogramOverflow,
    /// A `scan_histograms` processor configured to emit concluding events
    /// received a reset mid-scan in a way that breaks the array-cycle
    /// invariant.
    IncompleteArrayCycle,
    /// File or stream open/read/write failed.
    Io,
    /// Attempt to extract a bucket's storage as the wrong concrete type, or
    /// from a view bucket.
    BadStorageCast,
    /// A construction-time parameter violated a contract (zero batch size,
    /// missing bucket source, etc).
    InvalidArgument,
    /// We don't know what happened here, and no actions other than just
    /// returning it back.
    Unexpected,
    /// The operation is not supported by this configuration.
    Unsupported,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EndOfProcessing => "EndOfProcessing",
            Self::AcquisitionHalted => "AcquisitionHalted",
            Self::HistogramOverflow => "HistogramOverflow",
            Self::IncompleteArrayCycle => "IncompleteArrayCycle",
            Self::Io => "Io",
            Self::BadStorageCast => "BadStorageCast",
            Self::InvalidArgument => "InvalidArgument",
            Self::Unexpected => "Unexpected",
            Self::Unsupported => "Unsupported",
        };
        f.write_str(s)
    }
}

impl ErrorKind {
    /// Capturing a backtrace is a relatively expensive runtime operation; it
    /// is only worth doing for kinds that represent genuine bugs.
    fn enable_backtrace(self) -> bool {
        matches!(self, ErrorKind::Unexpected)
    }
}

/// The error type returned by all fallible tcspc-core operations.
pub struct Error {
    kind: ErrorKind,
    message: Cow<'static, str>,
    context: Vec<(&'static str, String)>,

    source: Option<anyhow::Error>,
    backtrace: Option<Box<Backtrace>>,
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            return f
                .debug_struct("Error")
                .field("kind", &self.kind)
                .field("message", &self.message)
                .field("context", &self.context)
                .field("source", &self.source)
                .finish();
        }

        write!(f, "{}", self.kind)?;
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        writeln!(f)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "Context:")?;
            for (k, v) in self.context.iter() {
                writeln!(f, "   {k}: {v}")?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "Source:")?;
            writeln!(f, "   {source:#}")?;
        }

        if let Some(backtrace) = &self.backtrace {
            writeln!(f)?;
            writeln!(f, "Backtrace:")?;
            writeln!(f, "{backtrace}")?;
        }

        Ok(())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if !self.context.is_empty() {
            write!(f, ", context: {{ ")?;
            write!(
                f,
                "{}",
                self.context
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )?;
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|v| v.as_ref())
    }
}

impl Error {
    /// Create a new [`Error`] with error kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::new(),
            source: None,
            backtrace: kind
                .enable_backtrace()
                .then(Backtrace::capture)
                .filter(|bt| bt.status() == BacktraceStatus::Captured)
                .map(Box::new),
        }
    }

    /// `end-of-processing`: a processor decided the stream is complete.
    pub fn end_of_processing(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::EndOfProcessing, message)
    }

    /// `acquisition-halted`: an external halt signal was observed.
    pub fn acquisition_halted() -> Self {
        Self::new(ErrorKind::AcquisitionHalted, "acquisition halted")
    }

    /// `histogram-overflow`: an about-to-overflow increment under a policy
    /// that treats overflow as fatal.
    pub fn histogram_overflow(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::HistogramOverflow, message)
    }

    /// `incomplete-array-cycle`.
    pub fn incomplete_array_cycle(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::IncompleteArrayCycle, message)
    }

    /// `input-output-error`.
    pub fn io(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    /// `bad-storage-cast`.
    pub fn bad_storage_cast(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::BadStorageCast, message)
    }

    /// `invalid-argument`.
    pub fn invalid_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// Create a new unexpected [`Error`] with message.
    pub fn unexpected(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    /// Create a new unsupported [`Error`] with message.
    pub fn unsupported(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    /// Add more context to the error.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Set the source for this error.
    pub fn set_source(mut self, src: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "the source error has already been set");
        self.source = Some(src.into());
        self
    }

    /// Returns the kind of the error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the message of the error.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// True if this error is the `end-of-processing` control-flow signal.
    pub fn is_end_of_processing(&self) -> bool {
        self.kind == ErrorKind::EndOfProcessing
    }

    /// True if this error is the `acquisition-halted` control-flow signal.
    pub fn is_acquisition_halted(&self) -> bool {
        self.kind == ErrorKind::AcquisitionHalted
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::io("I/O operation failed").set_source(err)
    }
}
