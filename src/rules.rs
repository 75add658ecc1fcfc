use crate::{
    bucketing::{bucket_value, Bucketer, TOTAL_BUCKETS},
    flag::{Rollout, Rule},
    EvaluationContext,
};

/// Outcome of evaluating a single rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RuleOutcome {
    /// The rule selected a variation.
    Matched {
        variation: usize,
        in_experiment: bool,
    },
    /// Clauses matched but the context fell outside the percentage gate. Evaluation continues
    /// with the next rule.
    PercentageMiss,
    /// Clauses did not match. Evaluation continues with the next rule.
    NotMatched,
}

impl Rule {
    /// Return `true` if every clause matches. Rules without clauses always match.
    pub fn matches(&self, context: &EvaluationContext) -> bool {
        self.clauses.iter().all(|clause| clause.matches(context))
    }

    pub(crate) fn eval(
        &self,
        context: &EvaluationContext,
        flag_key: &str,
        bucketer: &(impl Bucketer + ?Sized),
    ) -> RuleOutcome {
        if self.matches(context) {
            self.resolve_variation(context, flag_key, bucketer)
        } else {
            RuleOutcome::NotMatched
        }
    }

    /// Select a variation for a context that already [matches](Rule::matches) this rule.
    ///
    /// A rollout takes precedence over the percentage gate, which takes precedence over the fixed
    /// variation.
    pub(crate) fn resolve_variation(
        &self,
        context: &EvaluationContext,
        flag_key: &str,
        bucketer: &(impl Bucketer + ?Sized),
    ) -> RuleOutcome {
        if let Some(rollout) = &self.rollout {
            let Some(variation) = rollout.select(context, flag_key, bucketer) else {
                log::warn!(target: "flagvisor",
                           flag_key,
                           rule_id:? = self.id;
                           "rollout has no variations, skipping rule");
                return RuleOutcome::NotMatched;
            };
            return RuleOutcome::Matched {
                variation,
                in_experiment: true,
            };
        }

        if let Some(percentage) = self.percentage {
            let bucket = bucket_value(bucketer, context, "key", flag_key) / 1000;
            if bucket >= percentage {
                return RuleOutcome::PercentageMiss;
            }
        }

        RuleOutcome::Matched {
            variation: self.variation,
            in_experiment: false,
        }
    }
}

impl Rollout {
    /// Pick the variation whose cumulative weight first exceeds the context's bucket.
    ///
    /// Falls back to the first entry when the weights sum to less than the bucket. Returns `None`
    /// only when there are no entries at all.
    fn select(
        &self,
        context: &EvaluationContext,
        flag_key: &str,
        bucketer: &(impl Bucketer + ?Sized),
    ) -> Option<usize> {
        let first = self.variations.first()?;
        let bucket = bucket_value(
            bucketer,
            context,
            self.bucket_by.as_deref().unwrap_or_default(),
            flag_key,
        );
        Some(self.variation_for_bucket(bucket).unwrap_or(first.variation))
    }

    fn variation_for_bucket(&self, bucket: u32) -> Option<usize> {
        debug_assert!(bucket < TOTAL_BUCKETS);
        let mut cumulative = 0u64;
        self.variations.iter().find_map(|wv| {
            cumulative += u64::from(wv.weight);
            (cumulative > u64::from(bucket)).then_some(wv.variation)
        })
    }
}
