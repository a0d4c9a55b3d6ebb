use std::borrow::Cow;
use std::error::Error;
use std::fmt;

pub type Result<T, E = LazyError> = std::result::Result<T, E>;

/// Broad category of an error.
///
/// Callers match on this instead of inspecting messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A placeholder was evaluated without a value bound for it.
    UnboundReference,
    /// The same identity was seen with two different definitions.
    ConflictingDefinition,
    /// An identity was re-entered while it was still being evaluated.
    CyclicEvaluation,
    /// Evaluation nested deeper than allowed.
    DepthExceeded,
    /// Kind for user functions to construct when they fail. Sessions pass
    /// function errors through unchanged and never assign this kind.
    Function,
    /// Invalid configuration value or setting name.
    Config,
    NotImplemented,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnboundReference => "unbound reference",
            Self::ConflictingDefinition => "conflicting definition",
            Self::CyclicEvaluation => "cyclic evaluation",
            Self::DepthExceeded => "depth exceeded",
            Self::Function => "function error",
            Self::Config => "config error",
            Self::NotImplemented => "not implemented",
            Self::Internal => "internal error",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug)]
pub struct LazyError {
    inner: Box<LazyErrorInner>,
}

#[derive(Debug)]
struct LazyErrorInner {
    kind: ErrorKind,
    msg: String,
    source: Option<Box<dyn Error + Send + Sync>>,
    fields: Vec<ErrorField>,
}

#[derive(Debug)]
struct ErrorField {
    key: Cow<'static, str>,
    value: Box<dyn fmt::Debug + Send + Sync>,
}

impl LazyError {
    /// Create a new internal error with a message.
    pub fn new(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Internal, msg)
    }

    pub fn with_kind(kind: ErrorKind, msg: impl Into<String>) -> Self {
        LazyError {
            inner: Box::new(LazyErrorInner {
                kind,
                msg: msg.into(),
                source: None,
                fields: Vec::new(),
            }),
        }
    }

    pub fn unbound(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::UnboundReference, msg)
    }

    pub fn conflicting(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::ConflictingDefinition, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Config, msg)
    }

    /// Wrap an arbitrary error returned from a user function.
    pub fn function(msg: impl Into<String>, source: Box<dyn Error + Send + Sync>) -> Self {
        let mut err = Self::with_kind(ErrorKind::Function, msg);
        err.inner.source = Some(source);
        err
    }

    /// Attach a debug field to this error.
    pub fn with_field<V>(mut self, key: impl Into<Cow<'static, str>>, value: V) -> Self
    where
        V: fmt::Debug + Send + Sync + 'static,
    {
        self.inner.fields.push(ErrorField {
            key: key.into(),
            value: Box::new(value),
        });
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.inner.kind
    }

    pub fn message(&self) -> &str {
        &self.inner.msg
    }

    /// Iterate over the debug fields attached to this error.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &dyn fmt::Debug)> {
        self.inner
            .fields
            .iter()
            .map(|f| (f.key.as_ref(), f.value.as_ref() as &dyn fmt::Debug))
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.inner.kind == kind
    }
}

impl fmt::Display for LazyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.msg)?;
        for field in &self.inner.fields {
            write!(f, "\n  {}: {:?}", field.key, field.value)?;
        }
        if let Some(source) = &self.inner.source {
            write!(f, "\nError source: {source}")?;
        }
        Ok(())
    }
}

impl Error for LazyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.source.as_ref().map(|e| e.as_ref() as _)
    }
}

#[macro_export]
macro_rules! not_implemented {
    ($($arg:tt)*) => {
        return Err($crate::LazyError::with_kind(
            $crate::ErrorKind::NotImplemented,
            format!("Not yet implemented: {}", format!($($arg)*)),
        ))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_fields_and_source() {
        let err = LazyError::function("outer", Box::new(fmt::Error))
            .with_field("id", "add_3")
            .with_field("depth", 4);

        let s = err.to_string();
        assert!(s.starts_with("outer"));
        assert!(s.contains("id: \"add_3\""));
        assert!(s.contains("depth: 4"));
        assert!(s.contains("Error source"));
        assert_eq!(ErrorKind::Function, err.kind());
    }

    #[test]
    fn not_implemented_macro_kind() {
        fn unsupported() -> Result<()> {
            not_implemented!("partition by {}", "column");
        }

        let err = unsupported().unwrap_err();
        assert!(err.is_kind(ErrorKind::NotImplemented));
        assert_eq!("Not yet implemented: partition by column", err.message());
    }

    #[test]
    fn kind_specific_constructors() {
        assert!(LazyError::unbound("x").is_kind(ErrorKind::UnboundReference));
        assert!(LazyError::conflicting("x").is_kind(ErrorKind::ConflictingDefinition));
        assert!(LazyError::config("x").is_kind(ErrorKind::Config));
        assert!(LazyError::function("x", Box::new(fmt::Error)).is_kind(ErrorKind::Function));
    }
}
