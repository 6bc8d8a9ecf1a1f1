use std::fmt;

/// Outcome of validating a task before it runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationStatus {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn into_errors(self) -> Vec<String> {
        self.errors
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "errors=[{}] warnings=[{}]",
            self.errors.join("; "),
            self.warnings.join("; ")
        )
    }
}
