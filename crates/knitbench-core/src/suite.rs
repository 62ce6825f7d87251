//! Test-suite builder.

use crate::cases::SuiteContext;
use crate::error::GenerationError;
use crate::model::{Answer, CaseKind, Query};

/// Generated questions and their canonical answers, index-aligned.
#[derive(Debug, Clone)]
pub struct Suite {
    pub questions: Vec<Query>,
    pub answers: Vec<Answer>,
}

impl Suite {
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Number of questions of each kind, in suite order.
    pub fn kind_counts(&self) -> Vec<(CaseKind, usize)> {
        let mut counts: Vec<(CaseKind, usize)> = Vec::new();
        for q in &self.questions {
            match counts.iter_mut().find(|(k, _)| *k == q.kind) {
                Some((_, n)) => *n += 1,
                None => counts.push((q.kind, 1)),
            }
        }
        counts
    }
}

/// Generate every requested kind, in the given order.
///
/// The first kind that fails aborts the build.
pub fn build_suite(kinds: &[CaseKind], ctx: &SuiteContext) -> Result<Suite, GenerationError> {
    let mut questions = Vec::new();
    for &kind in kinds {
        let generated = kind.generate(ctx)?;
        tracing::debug!(kind = %kind, count = generated.len(), "generated cases");
        questions.extend(generated);
    }
    let answers = questions.iter().map(|q| q.expected.clone()).collect();
    tracing::info!(
        kinds = kinds.len(),
        questions = questions.len(),
        seed = ctx.seed,
        "built test suite"
    );
    Ok(Suite { questions, answers })
}
