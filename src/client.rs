use std::collections::HashMap;

use crate::{
    eval::Evaluator,
    events::{dispatch, EvaluationEvent},
    ClientConfig, Error, Evaluation, EvaluationContext, FlagValue, Result,
};

/// Evaluates feature flags for contexts.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// Typed accessors ([`Client::bool_variation`] and friends) never fail: on any error or type
/// mismatch they return the supplied default. Use [`Client::variation`] to see errors.
///
/// # Examples
/// ```
/// # use flagvisor::{Client, ClientConfig, EvaluationContext, InMemoryFlagStore};
/// let client = Client::new(ClientConfig::from_store(InMemoryFlagStore::new()));
/// let context = EvaluationContext::new("user-1");
/// assert!(!client.bool_variation(&context, "new-checkout", false));
/// ```
pub struct Client<'a> {
    config: ClientConfig<'a>,
}

impl<'a> Client<'a> {
    /// Create a new `Client` using the specified configuration.
    pub fn new(config: ClientConfig<'a>) -> Self {
        Client { config }
    }

    /// Evaluate `flag_key` for `context` and return the full evaluation.
    ///
    /// Overrides win over everything else, including disabled and unknown flags.
    ///
    /// # Errors
    ///
    /// - [`Error::ProviderUnavailable`] if no flag store is configured.
    /// - [`Error::FlagNotFound`] if the flag does not exist.
    /// - [`Error::CyclicPrerequisite`] or [`Error::PrerequisiteDepthExceeded`] for broken
    ///   prerequisite configuration.
    ///
    /// Use [`Evaluation::error`] to turn an error into an evaluation serving `default`.
    pub fn variation(&self, context: &EvaluationContext, flag_key: &str) -> Result<Evaluation> {
        if let Some(value) = self.config.overrides.get(flag_key) {
            log::debug!(target: "flagvisor", flag_key; "serving override");
            return Ok(Evaluation::overridden(flag_key, value.clone()));
        }

        let evaluation = self
            .config
            .flag_store
            .as_deref()
            .ok_or(Error::ProviderUnavailable)
            .and_then(|store| {
                Evaluator::new(store, &*self.config.bucketer)
                    .with_max_prerequisite_depth(self.config.max_prerequisite_depth)
                    .evaluate(flag_key, context)
            })
            .inspect_err(|err| {
                log::warn!(target: "flagvisor",
                           flag_key,
                           context_key = context.key();
                           "error occurred while evaluating a flag: {err}");
            })?;

        self.record(&evaluation, context);
        Ok(evaluation)
    }

    /// Evaluate every flag in the store, plus every override.
    ///
    /// Flags whose evaluation fails are served their default value with [`Reason::Error`].
    ///
    /// [`Reason::Error`]: crate::Reason::Error
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProviderUnavailable`] if no flag store is configured.
    pub fn all_flags(&self, context: &EvaluationContext) -> Result<HashMap<String, Evaluation>> {
        let store = self
            .config
            .flag_store
            .as_deref()
            .ok_or(Error::ProviderUnavailable)?;
        let evaluator = Evaluator::new(store, &*self.config.bucketer)
            .with_max_prerequisite_depth(self.config.max_prerequisite_depth);

        let mut evaluations: HashMap<String, Evaluation> = store
            .get_all_flags()
            .into_iter()
            .filter(|(key, _)| !self.config.overrides.contains_key(key))
            .map(|(key, flag)| {
                let evaluation = match evaluator.evaluate_flag(&flag, context) {
                    Ok(evaluation) => {
                        self.record(&evaluation, context);
                        evaluation
                    }
                    Err(err) => {
                        log::warn!(target: "flagvisor",
                                   flag_key:display = key,
                                   context_key = context.key();
                                   "error occurred while evaluating a flag: {err}");
                        Evaluation::error(key.clone(), flag.default_value.clone())
                    }
                };
                (key, evaluation)
            })
            .collect();

        evaluations.extend(
            self.config
                .overrides
                .iter()
                .map(|(key, value)| (key.clone(), Evaluation::overridden(key, value.clone()))),
        );

        Ok(evaluations)
    }

    /// Evaluate a boolean flag.
    ///
    /// ```
    /// # fn test(client: &flagvisor::Client, context: &flagvisor::EvaluationContext) {
    /// if client.bool_variation(context, "new-checkout", false) {
    ///     // show new checkout
    /// }
    /// # }
    /// ```
    pub fn bool_variation(&self, context: &EvaluationContext, flag_key: &str, default: bool) -> bool {
        self.typed_variation(context, flag_key, FlagValue::as_bool)
            .unwrap_or(default)
    }

    pub fn string_variation(
        &self,
        context: &EvaluationContext,
        flag_key: &str,
        default: &str,
    ) -> String {
        self.typed_variation(context, flag_key, |value| value.as_str().map(str::to_owned))
            .unwrap_or_else(|| default.to_owned())
    }

    /// Evaluate an integer flag. Floats without a fractional part are accepted.
    pub fn int_variation(&self, context: &EvaluationContext, flag_key: &str, default: i64) -> i64 {
        self.typed_variation(context, flag_key, FlagValue::as_int)
            .unwrap_or(default)
    }

    /// Evaluate a numeric flag. Integers are widened.
    pub fn float_variation(&self, context: &EvaluationContext, flag_key: &str, default: f64) -> f64 {
        self.typed_variation(context, flag_key, FlagValue::as_float)
            .unwrap_or(default)
    }

    /// Evaluate a flag as JSON. Every value except non-finite floats converts.
    pub fn json_variation(
        &self,
        context: &EvaluationContext,
        flag_key: &str,
        default: serde_json::Value,
    ) -> serde_json::Value {
        self.typed_variation(context, flag_key, FlagValue::to_json)
            .unwrap_or(default)
    }

    fn typed_variation<T>(
        &self,
        context: &EvaluationContext,
        flag_key: &str,
        convert: impl FnOnce(&FlagValue) -> Option<T>,
    ) -> Option<T> {
        let evaluation = self.variation(context, flag_key).ok()?;
        let value = convert(&evaluation.value);
        if value.is_none() {
            log::warn!(target: "flagvisor",
                       flag_key,
                       value:serde = evaluation.value;
                       "flag value has unexpected type, serving default");
        }
        value
    }

    fn record(&self, evaluation: &Evaluation, context: &EvaluationContext) {
        log::trace!(target: "flagvisor",
                    flag_key:display = evaluation.key,
                    context_key = context.key(),
                    reason:serde = evaluation.reason,
                    value:serde = evaluation.value;
                    "evaluated a flag");

        dispatch(
            &*self.config.event_sink,
            EvaluationEvent::new(evaluation, context),
        );
    }
}
