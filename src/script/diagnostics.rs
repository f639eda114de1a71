//! Diagnostics reported by the compiler, evaluator and dependency resolution
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a diagnostic, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "fatal" => Ok(Severity::Fatal),
            other => Err(format!(
                "Unknown severity: {}. Use: debug, info, warning, error, fatal",
                other
            )),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// A single message from one of the external services
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Source location (`file:line:col` or a script id)
    pub location: Option<String>,
    /// Rendered cause, e.g. the error that triggered the diagnostic
    pub cause: Option<String>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            location: None,
            cause: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn caused_by(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    /// Build an error diagnostic from any error, keeping its source chain
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut diagnostic = Self::error(err.to_string());
        if let Some(source) = err.source() {
            diagnostic.cause = Some(source.to_string());
        }
        diagnostic
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(location) = &self.location {
            write!(f, "{}: ", location)?;
        }
        write!(f, "{}", self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

/// A failed operation's diagnostics batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(pub Vec<Diagnostic>);

impl Diagnostics {
    pub fn single(diagnostic: Diagnostic) -> Self {
        Self(vec![diagnostic])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<Diagnostic> {
        self.0
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.iter().find(|d| d.severity >= Severity::Error) {
            Some(first) => write!(f, "{}", first)?,
            None => write!(f, "no error diagnostics")?,
        }
        if self.0.len() > 1 {
            write!(f, " (+{} more)", self.0.len() - 1)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostics {}

impl From<Vec<Diagnostic>> for Diagnostics {
    fn from(reports: Vec<Diagnostic>) -> Self {
        Self(reports)
    }
}

/// A successful result together with the non-fatal diagnostics it produced
#[derive(Debug, Clone, PartialEq)]
pub struct Reported<T> {
    pub value: T,
    pub reports: Vec<Diagnostic>,
}

impl<T> Reported<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            reports: Vec::new(),
        }
    }

    pub fn with_reports(value: T, reports: Vec<Diagnostic>) -> Self {
        Self { value, reports }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reported<U> {
        Reported {
            value: f(self.value),
            reports: self.reports,
        }
    }
}

/// Decides which diagnostics reach the operator
#[derive(Debug, Clone)]
pub struct ReportFilter {
    /// Least severe level that is still reported
    pub min_severity: Severity,
    /// Diagnostics whose message contains any of these are dropped
    pub ignore: Vec<String>,
}

impl Default for ReportFilter {
    fn default() -> Self {
        Self {
            min_severity: Severity::Info,
            ignore: vec!["never used".to_string()],
        }
    }
}

impl ReportFilter {
    pub fn accepts(&self, diagnostic: &Diagnostic) -> bool {
        diagnostic.severity >= self.min_severity
            && !self
                .ignore
                .iter()
                .any(|needle| diagnostic.message.contains(needle.as_str()))
    }

    pub fn apply<'a>(
        &'a self,
        diagnostics: &'a [Diagnostic],
    ) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        diagnostics.iter().filter(move |d| self.accepts(d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_drops_debug_and_ignored() {
        let filter = ReportFilter::default();
        let reports = vec![
            Diagnostic::new(Severity::Debug, "compiled in 3ms"),
            Diagnostic::warning("Variable 'x' is never used"),
            Diagnostic::warning("Deprecated call"),
            Diagnostic::error("Unresolved reference: foo"),
        ];

        let kept: Vec<_> = filter.apply(&reports).map(|d| d.message.as_str()).collect();
        assert_eq!(kept, vec!["Deprecated call", "Unresolved reference: foo"]);
    }

    #[test]
    fn test_min_severity_is_inclusive() {
        let filter = ReportFilter {
            min_severity: Severity::Warning,
            ignore: vec![],
        };
        assert!(!filter.accepts(&Diagnostic::new(Severity::Info, "i")));
        assert!(filter.accepts(&Diagnostic::warning("w")));
        assert!(filter.accepts(&Diagnostic::error("e")));
    }

    #[test]
    fn test_display_includes_location_and_cause() {
        let d = Diagnostic::error("Unresolved reference: foo")
            .at("hello.kts:3:5")
            .caused_by("boom");
        assert_eq!(d.to_string(), "hello.kts:3:5: Unresolved reference: foo: boom");
    }

    #[test]
    fn test_severity_parsing() {
        assert_eq!("WARN".parse::<Severity>().unwrap(), Severity::Warning);
        assert!("loud".parse::<Severity>().is_err());
    }
}
