use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    bucketing::Bucketer,
    flag::{Flag, FlagValue},
    rules::RuleOutcome,
    store::FlagStore,
    Error, EvaluationContext, Result,
};

/// Why an [`Evaluation`] resolved to its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    /// No rule matched, the default value was served.
    Fallthrough,
    /// A client-side override was served.
    TargetMatch,
    /// A rule matched.
    RuleMatch,
    /// A prerequisite did not resolve to its required variation.
    PrerequisiteFailed,
    /// The flag is disabled.
    Off,
    /// Evaluation failed, the caller-supplied default was served.
    Error,
}

/// Result of evaluating a flag for a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub key: String,
    pub value: FlagValue,
    /// Index into the flag's variants. `None` when no variant applies (default value, override).
    pub variation_index: Option<usize>,
    pub reason: Reason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// `true` only when a weighted rollout selected the variation.
    #[serde(default)]
    pub in_experiment: bool,
    #[serde(default)]
    pub prerequisite_failed: bool,
    /// Key of the prerequisite that failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prerequisite_key: Option<String>,
}

impl Evaluation {
    fn with_default(flag: &Flag, reason: Reason) -> Evaluation {
        Evaluation {
            key: flag.key.clone(),
            value: flag.default_value.clone(),
            variation_index: None,
            reason,
            rule_id: None,
            in_experiment: false,
            prerequisite_failed: false,
            prerequisite_key: None,
        }
    }

    /// Evaluation served from a client-side override.
    pub fn overridden(key: impl Into<String>, value: FlagValue) -> Evaluation {
        Evaluation {
            key: key.into(),
            value,
            variation_index: None,
            reason: Reason::TargetMatch,
            rule_id: None,
            in_experiment: false,
            prerequisite_failed: false,
            prerequisite_key: None,
        }
    }

    /// Evaluation carrying the caller-supplied default after a failure.
    pub fn error(key: impl Into<String>, default: FlagValue) -> Evaluation {
        Evaluation {
            key: key.into(),
            value: default,
            variation_index: None,
            reason: Reason::Error,
            rule_id: None,
            in_experiment: false,
            prerequisite_failed: false,
            prerequisite_key: None,
        }
    }
}

/// Default bound on the length of a prerequisite chain.
pub const DEFAULT_MAX_PREREQUISITE_DEPTH: usize = 32;

/// Evaluates flags from a [`FlagStore`].
///
/// The evaluator holds no state of its own: every call works on the flag snapshots returned by the
/// store, so it can be shared between threads freely.
pub struct Evaluator<'a, S: FlagStore + ?Sized, B: Bucketer + ?Sized> {
    store: &'a S,
    bucketer: &'a B,
    max_prerequisite_depth: usize,
}

impl<'a, S: FlagStore + ?Sized, B: Bucketer + ?Sized> Evaluator<'a, S, B> {
    pub fn new(store: &'a S, bucketer: &'a B) -> Self {
        Evaluator {
            store,
            bucketer,
            max_prerequisite_depth: DEFAULT_MAX_PREREQUISITE_DEPTH,
        }
    }

    pub fn with_max_prerequisite_depth(mut self, depth: usize) -> Self {
        self.max_prerequisite_depth = depth;
        self
    }

    /// Evaluate the flag `flag_key` for `context`.
    ///
    /// # Errors
    ///
    /// - [`Error::FlagNotFound`] if the store does not know the flag.
    /// - [`Error::CyclicPrerequisite`] if the flag depends on itself through prerequisites.
    /// - [`Error::PrerequisiteDepthExceeded`] if the prerequisite chain is too long.
    pub fn evaluate(&self, flag_key: &str, context: &EvaluationContext) -> Result<Evaluation> {
        let (evaluation, _) = self.evaluate_key(flag_key, context, &mut Walk::default())?;
        Ok(evaluation)
    }

    /// Evaluate an already fetched flag definition. Prerequisites are still looked up in the store.
    pub fn evaluate_flag(&self, flag: &Flag, context: &EvaluationContext) -> Result<Evaluation> {
        let (evaluation, _) = self.evaluate_in_chain(flag, context, &mut Walk::default())?;
        Ok(evaluation)
    }

    fn evaluate_key(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
        walk: &mut Walk,
    ) -> Result<(Evaluation, usize)> {
        let flag = self
            .store
            .get_flag(flag_key)
            .ok_or_else(|| Error::FlagNotFound {
                flag_key: flag_key.to_owned(),
            })?;
        self.evaluate_in_chain(&flag, context, walk)
    }

    /// Returns the evaluation together with the height of the prerequisite tree that was walked
    /// to produce it, counting the flag itself.
    fn evaluate_in_chain(
        &self,
        flag: &Flag,
        context: &EvaluationContext,
        walk: &mut Walk,
    ) -> Result<(Evaluation, usize)> {
        if walk.chain.iter().any(|key| key == &flag.key) {
            let mut cycle = walk.chain.clone();
            cycle.push(flag.key.clone());
            log::warn!(target: "flagvisor",
                       flag_key:display = flag.key,
                       chain:? = cycle;
                       "cyclic prerequisite");
            return Err(Error::CyclicPrerequisite { chain: cycle });
        }
        if walk.chain.len() > self.max_prerequisite_depth {
            return Err(self.depth_exceeded(&flag.key));
        }

        walk.chain.push(flag.key.clone());
        let result = self.evaluate_steps(flag, context, walk);
        walk.chain.pop();
        result
    }

    /// Prerequisites are resolved at most once per call. A cached result is only reused when its
    /// subtree still fits under the depth bound at the current position.
    fn resolve_prerequisite(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
        walk: &mut Walk,
    ) -> Result<Resolved> {
        if let Some(resolved) = walk.resolved.get(flag_key).copied() {
            if walk.chain.len() + resolved.height > self.max_prerequisite_depth + 1 {
                return Err(self.depth_exceeded(flag_key));
            }
            return Ok(resolved);
        }

        let (evaluation, height) = self.evaluate_key(flag_key, context, walk)?;
        let resolved = Resolved {
            variation_index: evaluation.variation_index,
            height,
        };
        walk.resolved.insert(flag_key.to_owned(), resolved);
        Ok(resolved)
    }

    fn depth_exceeded(&self, flag_key: &str) -> Error {
        Error::PrerequisiteDepthExceeded {
            flag_key: flag_key.to_owned(),
            max_depth: self.max_prerequisite_depth,
        }
    }

    fn evaluate_steps(
        &self,
        flag: &Flag,
        context: &EvaluationContext,
        walk: &mut Walk,
    ) -> Result<(Evaluation, usize)> {
        if !flag.enabled {
            return Ok((Evaluation::with_default(flag, Reason::Off), 1));
        }

        let mut height = 1;
        for prerequisite in &flag.prerequisites {
            let satisfied = match self.resolve_prerequisite(&prerequisite.key, context, walk) {
                Ok(resolved) => {
                    height = height.max(resolved.height + 1);
                    resolved.variation_index == Some(prerequisite.variation)
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    log::debug!(target: "flagvisor",
                                flag_key:display = flag.key,
                                prerequisite_key:display = prerequisite.key;
                                "prerequisite evaluation failed: {err}");
                    false
                }
            };
            if !satisfied {
                let evaluation = Evaluation {
                    prerequisite_failed: true,
                    prerequisite_key: Some(prerequisite.key.clone()),
                    ..Evaluation::with_default(flag, Reason::PrerequisiteFailed)
                };
                return Ok((evaluation, height));
            }
        }

        for rule in &flag.rules {
            match rule.eval(context, &flag.key, self.bucketer) {
                RuleOutcome::NotMatched | RuleOutcome::PercentageMiss => continue,
                RuleOutcome::Matched {
                    variation,
                    in_experiment,
                } => {
                    let variation_index = if variation < flag.variants.len() {
                        Some(variation)
                    } else {
                        log::warn!(target: "flagvisor",
                                   flag_key:display = flag.key,
                                   rule_id:? = rule.id,
                                   variation;
                                   "variation index out of range, serving default value");
                        None
                    };
                    let evaluation = Evaluation {
                        key: flag.key.clone(),
                        value: flag.variant_value(variation).clone(),
                        variation_index,
                        reason: Reason::RuleMatch,
                        rule_id: rule.id.clone(),
                        in_experiment,
                        prerequisite_failed: false,
                        prerequisite_key: None,
                    };
                    return Ok((evaluation, height));
                }
            }
        }

        Ok((Evaluation::with_default(flag, Reason::Fallthrough), height))
    }
}

/// State of one top-level evaluation as it walks the prerequisite graph.
#[derive(Default)]
struct Walk {
    /// Keys of flags whose evaluation is in progress further up the stack.
    chain: Vec<String>,
    resolved: HashMap<String, Resolved>,
}

#[derive(Debug, Clone, Copy)]
struct Resolved {
    variation_index: Option<usize>,
    height: usize,
}
