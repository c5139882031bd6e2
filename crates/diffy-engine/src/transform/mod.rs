//! Field transformation
//!
//! Normalizes responses before comparison by applying user-authored
//! transformations at their injection points. Transformations run behind the
//! [`TransformRuntime`] boundary and every failure is contained to the field
//! it happened on: the field keeps its untransformed value and a
//! [`Diagnostic`] is recorded.

use crate::config::EngineConfig;
use crate::error::TransformError;
use diffy_model::{
    Diagnostic, DiagnosticKind, FieldPath, InjectionPoint, PathSegment, Role, Transformation,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

mod pipeline;
mod runtime;

pub use pipeline::{Pipeline, PipelineRuntime, MAX_STEPS, MAX_STRING_LEN};
pub use runtime::{invoke_guarded, panic_message, CompiledTransform, TransformRuntime};

/// A transformation ready to run
#[derive(Debug, Clone)]
pub struct CompiledTransformation {
    injection_point: InjectionPoint,
    transform: Arc<dyn CompiledTransform>,
}

impl CompiledTransformation {
    /// Compile a configured transformation with `runtime`
    ///
    /// # Errors
    /// Returns the runtime's compile error
    pub fn compile(
        transformation: &Transformation,
        runtime: &dyn TransformRuntime,
    ) -> Result<Self, TransformError> {
        let transform = runtime.compile(&transformation.source)?;
        Ok(Self {
            injection_point: transformation.injection_point.clone(),
            transform: Arc::from(transform),
        })
    }

    /// Wrap an already compiled transform
    #[inline]
    #[must_use]
    pub fn from_parts(injection_point: InjectionPoint, transform: Arc<dyn CompiledTransform>) -> Self {
        Self {
            injection_point,
            transform,
        }
    }

    /// Where the transformation applies
    #[inline]
    #[must_use]
    pub fn injection_point(&self) -> &InjectionPoint {
        &self.injection_point
    }

    /// Compiled logic
    #[inline]
    #[must_use]
    pub fn transform(&self) -> &dyn CompiledTransform {
        self.transform.as_ref()
    }
}

/// Transformed response plus the problems met on the way
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutcome {
    /// Normalized response
    pub value: Value,
    /// One entry per field that fell back to its untransformed value
    pub diagnostics: Vec<Diagnostic>,
}

/// Applies transformations to response trees
#[derive(Debug, Clone, Copy)]
pub struct FieldTransformer {
    verify_purity: bool,
    budget: Duration,
}

impl Default for FieldTransformer {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl FieldTransformer {
    /// Create transformer
    #[inline]
    #[must_use]
    pub fn new(verify_purity: bool, budget: Duration) -> Self {
        Self {
            verify_purity,
            budget,
        }
    }

    /// Create transformer from engine configuration
    #[inline]
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.verify_purity, config.transform_budget())
    }

    /// Transform a whole response for `role`
    ///
    /// Nodes are visited pre-order; children of a transformed node are walked
    /// in their transformed form.
    #[must_use]
    pub fn transform(
        &self,
        mut value: Value,
        role: Role,
        rules: &[CompiledTransformation],
    ) -> TransformOutcome {
        let applicable: Vec<&CompiledTransformation> = rules
            .iter()
            .filter(|rule| rule.injection_point.roles.includes(role))
            .collect();
        let mut diagnostics = Vec::new();
        if !applicable.is_empty() {
            let mut path = Vec::new();
            self.walk(&mut value, &mut path, role, &applicable, &mut diagnostics);
        }
        TransformOutcome { value, diagnostics }
    }

    fn walk(
        &self,
        value: &mut Value,
        path: &mut Vec<PathSegment>,
        role: Role,
        rules: &[&CompiledTransformation],
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        if rules
            .iter()
            .any(|rule| rule.injection_point.applies_to_segments(path.as_slice(), role))
        {
            let field = FieldPath::from(path.as_slice());
            match self.chain(value, &field, role, rules) {
                Ok(Some(transformed)) => *value = transformed,
                Ok(None) => {}
                Err(diagnostic) => diagnostics.push(diagnostic),
            }
        }
        match value {
            Value::Object(map) => {
                for (key, child) in map.iter_mut() {
                    path.push(PathSegment::Key(key.clone()));
                    self.walk(child, path, role, rules, diagnostics);
                    path.pop();
                }
            }
            Value::Array(items) => {
                for (index, child) in items.iter_mut().enumerate() {
                    path.push(PathSegment::Index(index));
                    self.walk(child, path, role, rules, diagnostics);
                    path.pop();
                }
            }
            _ => {}
        }
    }

    /// Apply every matching transformation to one field, in declaration order
    ///
    /// Returns `Ok(None)` when nothing applies. On the first failure the whole
    /// chain is discarded and the diagnostic returned; the caller keeps the
    /// untransformed value.
    ///
    /// # Errors
    /// Returns the [`Diagnostic`] describing the failed transformation
    pub fn transform_field(
        &self,
        value: &Value,
        path: &FieldPath,
        role: Role,
        rules: &[CompiledTransformation],
    ) -> Result<Option<Value>, Diagnostic> {
        let rules: Vec<&CompiledTransformation> = rules.iter().collect();
        self.chain(value, path, role, &rules)
    }

    fn chain(
        &self,
        value: &Value,
        path: &FieldPath,
        role: Role,
        rules: &[&CompiledTransformation],
    ) -> Result<Option<Value>, Diagnostic> {
        let mut current: Option<Value> = None;
        for rule in rules
            .iter()
            .filter(|rule| rule.injection_point.applies_to(path, role))
        {
            let input = current.as_ref().unwrap_or(value);
            match self.invoke(rule, input) {
                Ok(output) => current = Some(output),
                Err(err) => {
                    tracing::warn!(
                        injection_point = %rule.injection_point,
                        %role,
                        path = %path,
                        error = %err,
                        "transformation failed; using untransformed value"
                    );
                    let kind = if err == TransformError::UnsupportedImpure {
                        DiagnosticKind::UnsupportedImpureTransform
                    } else {
                        DiagnosticKind::TransformFailed
                    };
                    return Err(Diagnostic {
                        kind,
                        injection_point: rule.injection_point.clone(),
                        role: Some(role),
                        path: Some(path.clone()),
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(current)
    }

    fn invoke(&self, rule: &CompiledTransformation, input: &Value) -> Result<Value, TransformError> {
        let first = invoke_guarded(rule.transform(), input, self.budget)?;
        if self.verify_purity {
            let second = invoke_guarded(rule.transform(), input, self.budget)?;
            if first != second {
                return Err(TransformError::UnsupportedImpure);
            }
        }
        Ok(first)
    }
}
