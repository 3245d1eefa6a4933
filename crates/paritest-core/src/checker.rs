//! Static feature check: compares extracted feature sets against a policy.
//!
//! Independent of the equivalence outcome.

use crate::features::{Feature, FeaturePolicy, FeatureSet};
use crate::results::{Excess, FeatureVerdict};

const LOOP_FEATURES: [Feature; 4] = [
    Feature::ForLoops,
    Feature::EnhancedFor,
    Feature::WhileLoops,
    Feature::DoWhileLoops,
];

/// Check a submission's constructs against `policy`.
///
/// `reference` matters when the policy restricts submissions to the
/// constructs the reference uses, or bounds complexity and length relative
/// to it.
pub fn check(reference: &FeatureSet, submission: &FeatureSet, policy: &FeaturePolicy) -> FeatureVerdict {
    let forbidden = submission
        .present()
        .filter(|feature| {
            policy.forbidden.contains(feature)
                || (policy.within_reference && !reference.has(*feature))
                || (policy.forbid_loops && LOOP_FEATURES.contains(feature))
        })
        .collect();

    let forbidden_calls = submission
        .method_calls
        .iter()
        .filter(|name| {
            policy.forbidden_calls.contains(*name) || (policy.forbid_loops && *name == "forEach")
        })
        .cloned()
        .collect();

    let missing = policy
        .required
        .iter()
        .filter(|feature| !submission.has(**feature))
        .copied()
        .collect();

    let complexity = policy
        .complexity_limit(reference.complexity)
        .filter(|limit| submission.complexity > *limit)
        .map(|limit| Excess {
            reference: reference.complexity,
            submission: submission.complexity,
            limit,
        });

    let source_lines = policy
        .source_line_limit(reference.source_lines)
        .filter(|limit| submission.source_lines > *limit)
        .map(|limit| Excess {
            reference: reference.source_lines,
            submission: submission.source_lines,
            limit,
        });

    FeatureVerdict {
        forbidden,
        forbidden_calls,
        missing,
        complexity,
        source_lines,
    }
}

/// Check that a reference satisfies its own policy.
pub fn check_reference(reference: &FeatureSet, policy: &FeaturePolicy) -> FeatureVerdict {
    check(reference, reference, policy)
}
