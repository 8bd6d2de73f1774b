//! Configuration validation.

use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_engine(config, &mut result);
        Self::validate_logging(config, &mut result);

        result
    }

    fn validate_engine(config: &Config, result: &mut ValidationResult) {
        let engine = &config.engine;

        if engine.max_concurrent_jobs == 0 {
            result.add_error(ValidationError::new(
                "engine.max_concurrent_jobs",
                "max_concurrent_jobs must be greater than 0",
            ));
        }

        if engine.max_concurrent_jobs > 64 {
            result.add_warning(ValidationWarning::new(
                "engine.max_concurrent_jobs",
                "max_concurrent_jobs is very high (>64), handlers may overwhelm their collaborators",
            ));
        }

        if engine.tick_interval_secs == 0 {
            result.add_error(ValidationError::new(
                "engine.tick_interval_secs",
                "tick_interval_secs must be greater than 0",
            ));
        }

        if engine.max_attempts == 0 {
            result.add_error(ValidationError::new(
                "engine.max_attempts",
                "max_attempts must be at least 1",
            ));
        }

        if engine.dead_letter_capacity == 0 {
            result.add_error(ValidationError::new(
                "engine.dead_letter_capacity",
                "dead_letter_capacity must be greater than 0",
            ));
        }

        if engine.event_capacity == 0 {
            result.add_error(ValidationError::new(
                "engine.event_capacity",
                "event_capacity must be greater than 0",
            ));
        }

        if engine.max_backoff_secs < engine.backoff_base_secs {
            result.add_warning(ValidationWarning::new(
                "engine.max_backoff_secs",
                "max_backoff_secs is below backoff_base_secs, every retry will use the cap",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        if config.logging.level.trim().is_empty() {
            result.add_error(ValidationError::new(
                "logging.level",
                "Log level cannot be empty",
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
