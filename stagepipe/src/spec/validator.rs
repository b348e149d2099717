//! Structural validation of specifications.

use super::model::PipelineSpecification;
use crate::errors::{SpecValidationError, ValidationRule, ValidationViolation};
use std::collections::HashSet;

type RuleFn = fn(&PipelineSpecification) -> Option<ValidationViolation>;

/// The checks, in the order they run.
const RULES: [(ValidationRule, RuleFn); 6] = [
    (ValidationRule::NonEmptyIds, check_non_empty_ids),
    (ValidationRule::UniqueIds, check_unique_ids),
    (ValidationRule::StageDefinitions, check_stage_definitions),
    (ValidationRule::PipelineReferences, check_pipeline_references),
    (ValidationRule::ParallelReferences, check_parallel_references),
    (ValidationRule::RootSteps, check_root_steps),
];

/// Runs every structural check over a specification.
///
/// All checks run regardless of earlier failures; the violations are
/// reported together.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecValidator;

impl SpecValidator {
    /// Creates a validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Returns the rules in the order they run.
    #[must_use]
    pub fn rules(&self) -> Vec<ValidationRule> {
        RULES.iter().map(|(rule, _)| *rule).collect()
    }

    /// Returns every violation, in rule order.
    #[must_use]
    pub fn violations(&self, spec: &PipelineSpecification) -> Vec<ValidationViolation> {
        RULES
            .iter()
            .filter_map(|(rule, check)| {
                let violation = check(spec);
                tracing::trace!(spec_id = %spec.id, rule = %rule, passed = violation.is_none(), "Validation rule");
                violation
            })
            .collect()
    }

    /// Validates the specification.
    ///
    /// # Errors
    ///
    /// Returns a [`SpecValidationError`] listing every violated rule.
    pub fn validate(&self, spec: &PipelineSpecification) -> Result<(), SpecValidationError> {
        let violations = self.violations(spec);
        if violations.is_empty() {
            return Ok(());
        }
        let err = SpecValidationError::new(spec.id.clone(), violations);
        tracing::error!(spec_id = %spec.id, error = %err, "Specification is malformed");
        Err(err)
    }
}

fn declared_ids(spec: &PipelineSpecification) -> HashSet<&str> {
    spec.declared_ids().into_iter().filter(|id| !id.is_empty()).collect()
}

fn check_non_empty_ids(spec: &PipelineSpecification) -> Option<ValidationViolation> {
    let mut locations = Vec::new();

    if spec.id.is_empty() {
        locations.push("specification".to_string());
    }
    for (i, stage) in spec.stages.iter().enumerate() {
        if stage.id.is_empty() {
            locations.push(format!("stages[{i}]"));
        }
    }
    for (i, parallel) in spec.parallels.iter().enumerate() {
        if parallel.id.is_empty() {
            locations.push(format!("parallels[{i}]"));
        }
        for (j, pipeline) in parallel.pipelines.iter().enumerate() {
            if pipeline.id.is_empty() {
                locations.push(format!("parallels[{i}].pipelines[{j}]"));
            }
            for (k, step) in pipeline.steps.iter().enumerate() {
                if step.is_empty() {
                    locations.push(format!("parallels[{i}].pipelines[{j}].steps[{k}]"));
                }
            }
        }
    }
    for (i, step) in spec.steps.iter().enumerate() {
        if step.is_empty() {
            locations.push(format!("steps[{i}]"));
        }
    }

    (!locations.is_empty()).then(|| {
        ValidationViolation::new(
            ValidationRule::NonEmptyIds,
            "The following identifiers are empty",
            locations,
        )
        .with_fix_hint("Give every specification, stage, parallel, pipeline and step a non-empty id.")
    })
}

fn check_unique_ids(spec: &PipelineSpecification) -> Option<ValidationViolation> {
    let mut seen = HashSet::new();
    let duplicated: Vec<String> = spec
        .declared_ids()
        .into_iter()
        .filter(|id| !id.is_empty() && !seen.insert(*id))
        .map(ToString::to_string)
        .collect();

    (!duplicated.is_empty()).then(|| {
        ValidationViolation::new(
            ValidationRule::UniqueIds,
            "The following ids are duplicated",
            duplicated,
        )
        .with_fix_hint("Stage, parallel and nested pipeline ids share one namespace.")
    })
}

fn check_stage_definitions(spec: &PipelineSpecification) -> Option<ValidationViolation> {
    let malformed: Vec<String> = spec
        .stages
        .iter()
        .filter(|stage| stage.class_name.trim().is_empty())
        .map(|stage| stage.id.clone())
        .collect();

    (!malformed.is_empty()).then(|| {
        ValidationViolation::new(
            ValidationRule::StageDefinitions,
            "The following stage definitions are malformed",
            malformed,
        )
        .with_fix_hint("Set className to a registered stage type.")
    })
}

fn check_pipeline_references(spec: &PipelineSpecification) -> Option<ValidationViolation> {
    let ids = declared_ids(spec);
    let malformed: Vec<String> = spec
        .all_nested_pipelines()
        .into_iter()
        .filter(|pipeline| {
            pipeline
                .steps
                .iter()
                .any(|step| !step.is_empty() && !ids.contains(step.as_str()))
        })
        .map(|pipeline| pipeline.id.clone())
        .collect();

    (!malformed.is_empty()).then(|| {
        ValidationViolation::new(
            ValidationRule::PipelineReferences,
            "The following pipelines contain unresolved references",
            malformed,
        )
    })
}

fn check_parallel_references(spec: &PipelineSpecification) -> Option<ValidationViolation> {
    let ids = declared_ids(spec);
    let malformed: Vec<String> = spec
        .parallels
        .iter()
        .filter(|parallel| {
            parallel
                .pipelines
                .iter()
                .any(|pipeline| !ids.contains(pipeline.id.as_str()))
        })
        .map(|parallel| parallel.id.clone())
        .collect();

    (!malformed.is_empty()).then(|| {
        ValidationViolation::new(
            ValidationRule::ParallelReferences,
            "The following parallels contain unresolved references",
            malformed,
        )
    })
}

fn check_root_steps(spec: &PipelineSpecification) -> Option<ValidationViolation> {
    let ids = declared_ids(spec);
    let unresolved: Vec<String> = spec
        .steps
        .iter()
        .filter(|step| !step.is_empty() && !ids.contains(step.as_str()))
        .cloned()
        .collect();

    (!unresolved.is_empty()).then(|| {
        ValidationViolation::new(
            ValidationRule::RootSteps,
            "The following steps definitions are unresolved",
            unresolved,
        )
        .with_fix_hint("Declare each step as a stage, parallel or nested pipeline.")
    })
}
