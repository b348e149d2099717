//! Error types for the stagepipe engine.
//!
//! Errors fall into two families: compilation errors, raised synchronously
//! while a specification is validated and turned into nodes, and execution
//! errors, raised while a pipeline runs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The main error type for stagepipe operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pipeline could not be compiled (or its runtime DAG is malformed).
    #[error("{0}")]
    Compilation(#[from] CompilationError),

    /// A stage's own `do_work` failed.
    #[error("Stage '{node_id}' failed: {source}")]
    Stage {
        /// The id of the node wrapping the stage.
        node_id: String,
        /// The error raised by the stage implementation.
        source: anyhow::Error,
    },

    /// A node failed inside a fail-fast scope.
    #[error("Execution of '{node_id}' failed: {source}")]
    Execution {
        /// The id of the node whose execution failed.
        node_id: String,
        /// The underlying failure.
        source: Box<PipelineError>,
    },

    /// A child with the same id is already part of the container.
    #[error("'{parent}' already contains a child with id '{child}'")]
    DuplicateChild {
        /// The container id.
        parent: String,
        /// The duplicated child id.
        child: String,
    },

    /// A detached run is still outstanding on the same pipeline.
    #[error("Pipeline '{0}' already has an outstanding detached run")]
    DetachedRunOutstanding(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Wraps an error raised while running `node_id` in a fail-fast scope.
    #[must_use]
    pub fn execution(node_id: impl Into<String>, source: Self) -> Self {
        Self::Execution {
            node_id: node_id.into(),
            source: Box::new(source),
        }
    }

    /// Returns the innermost error of a chain of execution wrappers.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Execution { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Returns true if this is a compilation-time error.
    #[must_use]
    pub fn is_compilation(&self) -> bool {
        matches!(self.root_cause(), Self::Compilation(_))
    }
}

/// Errors raised while turning a specification into a runnable pipeline.
#[derive(Debug, Clone, Error)]
pub enum CompilationError {
    /// The specification failed one or more validation rules.
    #[error("{0}")]
    Validation(#[from] SpecValidationError),

    /// The specification or a runtime DAG contains a cycle.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// No builder is registered for a stage's type name.
    #[error("Stage '{id}': no stage builder registered for type '{type_name}'")]
    UnknownStageType {
        /// The stage definition id.
        id: String,
        /// The type name that failed to resolve.
        type_name: String,
    },

    /// The stage builder failed to construct a stage.
    #[error("Stage '{id}': builder for '{type_name}' failed: {reason}")]
    StageBuildFailed {
        /// The stage definition id.
        id: String,
        /// The type name of the builder.
        type_name: String,
        /// Why construction failed.
        reason: String,
    },

    /// An id referenced while wiring nodes was never materialised.
    #[error("Unresolved reference: '{id}'")]
    UnresolvedReference {
        /// The unresolved id.
        id: String,
    },

    /// A named specification template is not cached.
    #[error("No specification template registered for '{0}'")]
    TemplateNotFound(String),
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "SPEC-002-DUPLICATE_ID").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// The structural rules checked by the specification validator, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationRule {
    /// Every id and step reference is non-empty.
    NonEmptyIds,
    /// Stage, parallel and nested pipeline ids are pairwise distinct.
    UniqueIds,
    /// Every stage names an implementation type.
    StageDefinitions,
    /// Every nested pipeline step resolves to a declared id.
    PipelineReferences,
    /// Every parallel's pipeline ids resolve to a declared id.
    ParallelReferences,
    /// Every root step resolves to a declared id.
    RootSteps,
}

impl ValidationRule {
    /// Returns the contract code for the rule.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::NonEmptyIds => "SPEC-001-EMPTY_ID",
            Self::UniqueIds => "SPEC-002-DUPLICATE_ID",
            Self::StageDefinitions => "SPEC-003-MALFORMED_STAGE",
            Self::PipelineReferences => "SPEC-004-UNRESOLVED_PIPELINE_REF",
            Self::ParallelReferences => "SPEC-005-UNRESOLVED_PARALLEL_REF",
            Self::RootSteps => "SPEC-006-UNRESOLVED_STEP",
        }
    }
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonEmptyIds => write!(f, "validate non-empty ids"),
            Self::UniqueIds => write!(f, "validate unique ids"),
            Self::StageDefinitions => write!(f, "validate stage definitions"),
            Self::PipelineReferences => write!(f, "validate pipeline definitions"),
            Self::ParallelReferences => write!(f, "validate parallel definitions"),
            Self::RootSteps => write!(f, "validate spec steps"),
        }
    }
}

/// A single violated validation rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationViolation {
    /// The rule that was violated.
    pub rule: ValidationRule,
    /// Human readable description.
    pub message: String,
    /// The offending ids, sorted.
    pub ids: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl ValidationViolation {
    /// Creates a violation for `rule` naming the offending ids.
    #[must_use]
    pub fn new(rule: ValidationRule, message: impl Into<String>, mut ids: Vec<String>) -> Self {
        ids.sort();
        ids.dedup();
        let message = message.into();
        let error_info = ContractErrorInfo::new(rule.code(), message.clone())
            .with_context_entry("rule", rule.to_string());
        Self {
            rule,
            message,
            ids,
            error_info,
        }
    }

    /// Sets the fix hint on the contract info.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.error_info = self.error_info.with_fix_hint(hint);
        self
    }
}

impl fmt::Display for ValidationViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.rule.code(), self.message)?;
        if !self.ids.is_empty() {
            write!(f, ": {:?}", self.ids)?;
        }
        Ok(())
    }
}

/// Aggregate report of every rule a specification violates.
#[derive(Debug, Clone, Error)]
#[error("The pipeline specification '{spec_id}' is malformed: {}", format_violations(.violations))]
pub struct SpecValidationError {
    /// The specification id (may be empty if that is one of the violations).
    pub spec_id: String,
    /// All violations, in rule order.
    pub violations: Vec<ValidationViolation>,
}

impl SpecValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(spec_id: impl Into<String>, violations: Vec<ValidationViolation>) -> Self {
        Self {
            spec_id: spec_id.into(),
            violations,
        }
    }

    /// Returns true if `rule` is among the violations.
    #[must_use]
    pub fn violates(&self, rule: ValidationRule) -> bool {
        self.violations.iter().any(|v| v.rule == rule)
    }

    /// Returns the ids reported for `rule`.
    #[must_use]
    pub fn ids_for(&self, rule: ValidationRule) -> Vec<String> {
        self.violations
            .iter()
            .filter(|v| v.rule == rule)
            .flat_map(|v| v.ids.iter().cloned())
            .collect()
    }
}

fn format_violations(violations: &[ValidationViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error raised when a cycle is detected in a pipeline graph.
#[derive(Debug, Clone, Error)]
#[error("The pipeline must be acyclic, cycle detected: {}", .cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of ids forming the cycle (first id repeated at the end).
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "SPEC-007-CYCLE",
            format!("Pipeline contains a cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove the self-reference or the repeated step to break the cycle.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}
