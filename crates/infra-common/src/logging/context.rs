use std::collections::BTreeMap;
use std::fmt;
use tracing::{Level, Span};

/// Context information for logging
///
/// Call sites build one of these per operation (`phone 0 / dial`) and run the
/// operation inside its span so every event carries the same fields.
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Component that is generating the log
    pub component: String,
    /// Operation or action being performed
    pub operation: Option<String>,
    /// Additional contextual fields, kept sorted for stable output
    pub fields: BTreeMap<String, String>,
}

impl LogContext {
    /// Create a new log context with just the component name
    pub fn new<S: Into<String>>(component: S) -> Self {
        LogContext {
            component: component.into(),
            operation: None,
            fields: BTreeMap::new(),
        }
    }

    /// Create a new log context with component and operation
    pub fn with_operation<S: Into<String>, T: Into<String>>(component: S, operation: T) -> Self {
        LogContext {
            component: component.into(),
            operation: Some(operation.into()),
            fields: BTreeMap::new(),
        }
    }

    /// Add a field to the context
    pub fn with_field<S: Into<String>, T: ToString>(mut self, key: S, value: T) -> Self {
        self.fields.insert(key.into(), value.to_string());
        self
    }

    /// Create a span with this context's information
    pub fn span(&self, level: Level) -> Span {
        let op = self.operation.as_deref().unwrap_or("");
        let fields = self.fields_string();
        match level {
            Level::TRACE => tracing::trace_span!("telephony", component = %self.component, operation = %op, fields = %fields),
            Level::DEBUG => tracing::debug_span!("telephony", component = %self.component, operation = %op, fields = %fields),
            Level::INFO => tracing::info_span!("telephony", component = %self.component, operation = %op, fields = %fields),
            Level::WARN => tracing::warn_span!("telephony", component = %self.component, operation = %op, fields = %fields),
            Level::ERROR => tracing::error_span!("telephony", component = %self.component, operation = %op, fields = %fields),
        }
    }

    /// Run `f` inside this context's span
    pub fn in_scope<F, R>(&self, level: Level, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let span = self.span(level);
        let _guard = span.enter();
        f()
    }

    fn fields_string(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.component)?;

        if let Some(op) = &self.operation {
            write!(f, "[{}]", op)?;
        }

        for (key, value) in &self.fields {
            write!(f, "[{}={}]", key, value)?;
        }

        Ok(())
    }
}
