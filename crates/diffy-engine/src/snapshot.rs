//! Immutable configuration snapshots
//!
//! An analysis reads its noise rules and transformations from exactly one
//! [`ConfigSnapshot`], so a configuration change mid-batch never mixes rule
//! sets within a result. Snapshots are content-addressed: the same rules
//! always produce the same [`SnapshotId`].

use crate::transform::{CompiledTransformation, TransformRuntime};
use diffy_model::{
    ConfigProvenance, ConfigStatus, Diagnostic, DiagnosticKind, NoiseRule, SnapshotId,
    Transformation,
};

/// Rules in effect for one analysis
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    id: SnapshotId,
    status: ConfigStatus,
    noise_rules: Vec<NoiseRule>,
    transformations: Vec<CompiledTransformation>,
    diagnostics: Vec<Diagnostic>,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl ConfigSnapshot {
    /// Snapshot with no rules
    #[must_use]
    pub fn empty() -> Self {
        Self {
            id: Self::identify(&[], &[]),
            status: ConfigStatus::Fresh,
            noise_rules: Vec::new(),
            transformations: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Compile `transformations` and freeze them with `noise_rules`
    ///
    /// Transformations that fail to compile are left out and reported as
    /// [`DiagnosticKind::TransformCompileFailed`] diagnostics; the snapshot id
    /// still covers them, since it names the configuration as written.
    #[must_use]
    pub fn build(
        noise_rules: Vec<NoiseRule>,
        transformations: &[Transformation],
        runtime: &dyn TransformRuntime,
    ) -> Self {
        let id = Self::identify(&noise_rules, transformations);
        let mut compiled = Vec::with_capacity(transformations.len());
        let mut diagnostics = Vec::new();

        for transformation in transformations {
            match CompiledTransformation::compile(transformation, runtime) {
                Ok(c) => compiled.push(c),
                Err(err) => {
                    tracing::warn!(
                        injection_point = %transformation.injection_point,
                        runtime = runtime.name(),
                        error = %err,
                        "transformation skipped"
                    );
                    diagnostics.push(Diagnostic {
                        kind: DiagnosticKind::TransformCompileFailed,
                        injection_point: transformation.injection_point.clone(),
                        role: None,
                        path: None,
                        message: err.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            snapshot = %id.short(),
            noise_rules = noise_rules.len(),
            transformations = compiled.len(),
            skipped = diagnostics.len(),
            "configuration snapshot built"
        );
        Self {
            id,
            status: ConfigStatus::Fresh,
            noise_rules,
            transformations: compiled,
            diagnostics,
        }
    }

    /// Content hash of a rule set
    ///
    /// Hashes the length-prefixed text form of every rule, in order. Every
    /// list is preceded by its element count. An empty rule set hashes to
    /// [`SnapshotId::empty`].
    #[must_use]
    pub fn identify(noise_rules: &[NoiseRule], transformations: &[Transformation]) -> SnapshotId {
        fn count(hasher: &mut blake3::Hasher, n: usize) {
            hasher.update(&u64::try_from(n).unwrap_or(u64::MAX).to_le_bytes());
        }
        fn field(hasher: &mut blake3::Hasher, text: &str) {
            count(hasher, text.len());
            hasher.update(text.as_bytes());
        }

        if noise_rules.is_empty() && transformations.is_empty() {
            return SnapshotId::empty();
        }
        let mut hasher = blake3::Hasher::new();
        count(&mut hasher, noise_rules.len());
        for rule in noise_rules {
            field(&mut hasher, "noise");
            field(&mut hasher, &rule.endpoint);
            count(&mut hasher, rule.patterns.len());
            for pattern in &rule.patterns {
                field(&mut hasher, &pattern.to_string());
            }
        }
        count(&mut hasher, transformations.len());
        for transformation in transformations {
            field(&mut hasher, "transformation");
            field(&mut hasher, &transformation.injection_point.to_string());
            field(&mut hasher, &transformation.source);
        }
        SnapshotId::new(*hasher.finalize().as_bytes())
    }

    /// Mark the snapshot's freshness
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: ConfigStatus) -> Self {
        self.status = status;
        self
    }

    /// Snapshot id
    #[inline]
    #[must_use]
    pub fn id(&self) -> SnapshotId {
        self.id
    }

    /// Freshness
    #[inline]
    #[must_use]
    pub fn status(&self) -> ConfigStatus {
        self.status
    }

    /// Id and freshness, as recorded on results
    #[inline]
    #[must_use]
    pub fn provenance(&self) -> ConfigProvenance {
        ConfigProvenance {
            snapshot_id: self.id,
            status: self.status,
        }
    }

    /// Noise rules
    #[inline]
    #[must_use]
    pub fn noise_rules(&self) -> &[NoiseRule] {
        &self.noise_rules
    }

    /// Compiled transformations in declaration order
    #[inline]
    #[must_use]
    pub fn transformations(&self) -> &[CompiledTransformation] {
        &self.transformations
    }

    /// Compile failures recorded while building
    #[inline]
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::PipelineRuntime;
    use diffy_model::{FieldPattern, PatternSegment};

    fn noise(endpoint: &str, pattern: &str) -> NoiseRule {
        NoiseRule::new(endpoint, vec![pattern.parse().unwrap()])
    }

    fn key(name: &str) -> FieldPattern {
        FieldPattern::new(vec![PatternSegment::Key(name.to_owned())]).unwrap()
    }

    fn transformation(ip: &str, source: &str) -> Transformation {
        Transformation::new(ip.parse().unwrap(), source)
    }

    #[test]
    fn snapshot_empty_has_empty_id() {
        let snapshot = ConfigSnapshot::empty();
        assert_eq!(snapshot.id(), SnapshotId::empty());
        assert_eq!(snapshot.status(), ConfigStatus::Fresh);
        assert!(snapshot.noise_rules().is_empty());
    }

    #[test]
    fn snapshot_id_is_content_addressed() {
        let a = ConfigSnapshot::build(
            vec![noise("/u", "ts")],
            &[transformation("all:name", "trim")],
            &PipelineRuntime,
        );
        let b = ConfigSnapshot::build(
            vec![noise("/u", "ts")],
            &[transformation("all:name", "trim")],
            &PipelineRuntime,
        );
        let c = ConfigSnapshot::build(vec![noise("/u", "ts2")], &[], &PipelineRuntime);
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn snapshot_id_has_no_field_ambiguity() {
        let a = ConfigSnapshot::identify(&[noise("/ab", "c")], &[]);
        let b = ConfigSnapshot::identify(&[noise("/a", "bc")], &[]);
        assert_ne!(a, b);
    }

    #[test]
    fn snapshot_id_separates_rule_boundaries() {
        let one = NoiseRule::new("/a", vec![key("noise"), key("/b"), key("x")]);
        let two = [NoiseRule::new("/a", Vec::new()), noise("/b", "x")];
        assert_ne!(
            ConfigSnapshot::identify(&[one], &[]),
            ConfigSnapshot::identify(&two, &[])
        );

        let spilled = NoiseRule::new("/a", vec![key("transformation"), key("all:x"), key("trim")]);
        assert_ne!(
            ConfigSnapshot::identify(&[spilled], &[]),
            ConfigSnapshot::identify(
                &[NoiseRule::new("/a", Vec::new())],
                &[transformation("all:x", "trim")]
            )
        );
    }

    #[test]
    fn snapshot_built_from_nothing_matches_empty() {
        let built = ConfigSnapshot::build(Vec::new(), &[], &PipelineRuntime);
        assert_eq!(built.id(), ConfigSnapshot::empty().id());
    }

    #[test]
    fn snapshot_skips_uncompilable_transformations() {
        let snapshot = ConfigSnapshot::build(
            Vec::new(),
            &[
                transformation("all:a", "explode"),
                transformation("all:b", "trim"),
            ],
            &PipelineRuntime,
        );
        assert_eq!(snapshot.transformations().len(), 1);
        assert_eq!(snapshot.diagnostics().len(), 1);
        let diagnostic = &snapshot.diagnostics()[0];
        assert_eq!(diagnostic.kind, DiagnosticKind::TransformCompileFailed);
        assert_eq!(diagnostic.injection_point.to_string(), "all:a");
    }

    #[test]
    fn snapshot_status_in_provenance() {
        let snapshot = ConfigSnapshot::empty().with_status(ConfigStatus::Missing);
        assert_eq!(snapshot.provenance().status, ConfigStatus::Missing);
        assert_eq!(snapshot.provenance().snapshot_id, snapshot.id());
    }
}
