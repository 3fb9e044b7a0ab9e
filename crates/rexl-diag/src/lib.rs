//! Error reporting and diagnostics for Rexl operation binding.
//!
//! Operations never throw for user mistakes. They post [`Diagnostic`] values
//! to a [`DiagnosticSink`] supplied by the binder and carry on, so that form
//! selection can try another candidate and the binder can still produce a
//! best-effort tree for display.

use std::fmt;

// ---------------------------------------------------------------------------
// Diagnostic severity and categories
// ---------------------------------------------------------------------------

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Broad category for diagnostics. Used for filtering and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// No invocation form of the operation accepts the argument count.
    ArityMismatch,
    /// No invocation form is consistent with the given names and types.
    NoMatchingForm,
    /// An argument name does not match any parameter.
    BadFieldName,
    /// The same parameter was named twice.
    DuplicateName,
    /// A required argument was omitted.
    MissingRequired,
    /// A name was given where the slot does not accept one.
    NameNotAllowed,
    /// A directive was attached to a slot that does not support it.
    UnsupportedDirective,
    /// An argument type is not accepted by the parameter type.
    TypeMismatch,
    /// A scope-introducing argument has the wrong container type.
    BadScopeSource,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::ArityMismatch,
        Category::NoMatchingForm,
        Category::BadFieldName,
        Category::DuplicateName,
        Category::MissingRequired,
        Category::NameNotAllowed,
        Category::UnsupportedDirective,
        Category::TypeMismatch,
        Category::BadScopeSource,
    ];

    pub fn all() -> &'static [Category] {
        &Self::ALL
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::ArityMismatch => "arity_mismatch",
            Category::NoMatchingForm => "no_matching_form",
            Category::BadFieldName => "bad_field_name",
            Category::DuplicateName => "duplicate_name",
            Category::MissingRequired => "missing_required",
            Category::NameNotAllowed => "name_not_allowed",
            Category::UnsupportedDirective => "unsupported_directive",
            Category::TypeMismatch => "type_mismatch",
            Category::BadScopeSource => "bad_scope_source",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Category::ArityMismatch => "R0001",
            Category::NoMatchingForm => "R0002",
            Category::BadFieldName => "R0003",
            Category::DuplicateName => "R0004",
            Category::MissingRequired => "R0005",
            Category::NameNotAllowed => "R0006",
            Category::UnsupportedDirective => "R0007",
            Category::TypeMismatch => "R0008",
            Category::BadScopeSource => "R0009",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::ArityMismatch => "The operation was invoked with an unsupported argument count.",
            Category::NoMatchingForm => "No call shape of the operation fits the arguments.",
            Category::BadFieldName => "An argument name does not match any parameter name.",
            Category::DuplicateName => "A parameter was supplied more than once.",
            Category::MissingRequired => "A parameter without a default value was not supplied.",
            Category::NameNotAllowed => "A name was attached to an argument that cannot be named.",
            Category::UnsupportedDirective => "A directive is not valid for this argument.",
            Category::TypeMismatch => "Argument type does not match the parameter type.",
            Category::BadScopeSource => {
                "A scope-introducing argument is not of the required container type."
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Source locations
// ---------------------------------------------------------------------------

/// A source location for diagnostics, in byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file_id: u32,
    pub start: u32,
    pub end: u32,
}

impl SourceLocation {
    pub fn new(file_id: u32, start: u32, end: u32) -> Self {
        Self {
            file_id,
            start,
            end,
        }
    }
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// A structured diagnostic message.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Stable diagnostic code (e.g. R0001).
    pub code: Option<String>,
    pub severity: Severity,
    pub category: Category,
    /// Primary message: what went wrong.
    pub message: String,
    /// Where it went wrong.
    pub location: Option<SourceLocation>,
    /// Argument slot the diagnostic refers to, when it refers to one.
    pub slot: Option<usize>,
    /// Suggested fix, if any.
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(category: Category, message: impl Into<String>) -> Self {
        Self {
            code: Some(category.code().to_string()),
            severity: Severity::Error,
            category,
            message: message.into(),
            location: None,
            slot: None,
            help: None,
        }
    }

    pub fn warning(category: Category, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(category, message)
        }
    }

    pub fn at(mut self, location: Option<SourceLocation>) -> Self {
        self.location = location;
        self
    }

    pub fn for_slot(mut self, slot: usize) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        if let Some(code) = &self.code {
            write!(f, "{prefix}[{code}]: {}", self.message)?;
        } else {
            write!(f, "{prefix}: {}", self.message)?;
        }
        if let Some(help) = &self.help {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Callback through which operations report user-facing problems.
pub trait DiagnosticSink {
    fn post(&mut self, diag: Diagnostic);
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn post(&mut self, diag: Diagnostic) {
        self.push(diag);
    }
}

/// A sink that drops everything. Used when re-specializing calls that are
/// already known to be valid.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn post(&mut self, _diag: Diagnostic) {}
}

// ---------------------------------------------------------------------------
// Error type for crates that produce diagnostics
// ---------------------------------------------------------------------------

/// Error type wrapping one or more diagnostics.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", .0.first().map(|d| d.to_string()).unwrap_or_default())]
pub struct DiagnosticError(pub Vec<Diagnostic>);

impl DiagnosticError {
    pub fn single(diag: Diagnostic) -> Self {
        Self(vec![diag])
    }

    pub fn multiple(diags: Vec<Diagnostic>) -> Self {
        Self(diags)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.0
    }

    pub fn has_category(&self, category: Category) -> bool {
        self.0.iter().any(|d| d.category == category)
    }
}
