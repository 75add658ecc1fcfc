use std::{collections::HashMap, sync::Arc};

use crate::{
    bucketing::{Bucketer, Fnv1aBucketer},
    eval::DEFAULT_MAX_PREREQUISITE_DEPTH,
    events::NoopEventSink,
    Client, EventSink, FlagStore, FlagValue,
};

/// Configuration for [`Client`].
pub struct ClientConfig<'a> {
    pub(crate) flag_store: Option<Arc<dyn FlagStore + Send + Sync + 'a>>,
    pub(crate) event_sink: Box<dyn EventSink + Send + Sync + 'a>,
    pub(crate) overrides: HashMap<String, FlagValue>,
    pub(crate) bucketer: Box<dyn Bucketer + Send + Sync + 'a>,
    pub(crate) max_prerequisite_depth: usize,
}

impl<'a> Default for ClientConfig<'a> {
    fn default() -> Self {
        ClientConfig {
            flag_store: None,
            event_sink: Box::new(NoopEventSink),
            overrides: HashMap::new(),
            bucketer: Box::new(Fnv1aBucketer),
            max_prerequisite_depth: DEFAULT_MAX_PREREQUISITE_DEPTH,
        }
    }
}

impl<'a> ClientConfig<'a> {
    /// Create a configuration reading flags from `store`.
    ///
    /// ```
    /// # use flagvisor::{ClientConfig, InMemoryFlagStore};
    /// ClientConfig::from_store(InMemoryFlagStore::new());
    /// ```
    pub fn from_store(store: impl FlagStore + Send + Sync + 'a) -> Self {
        ClientConfig::default().flag_store(Arc::new(store))
    }

    /// Set the store flags are read from. Without a store every evaluation fails with
    /// [`Error::ProviderUnavailable`](crate::Error::ProviderUnavailable).
    pub fn flag_store(mut self, store: Arc<dyn FlagStore + Send + Sync + 'a>) -> Self {
        self.flag_store = Some(store);
        self
    }

    /// Set the sink that receives an event after each evaluation from the store.
    ///
    /// ```
    /// # use flagvisor::{ClientConfig, EvaluationEvent, InMemoryFlagStore};
    /// let config = ClientConfig::from_store(InMemoryFlagStore::new()).event_sink(|event: EvaluationEvent| {
    ///   println!("{:?}", event);
    /// });
    /// ```
    pub fn event_sink(mut self, sink: impl EventSink + Send + Sync + 'a) -> Self {
        self.event_sink = Box::new(sink);
        self
    }

    /// Serve `value` for `flag_key` without consulting the store.
    ///
    /// Overrides are meant for tests and kill-switches, not for targeting.
    pub fn override_flag(mut self, flag_key: impl Into<String>, value: impl Into<FlagValue>) -> Self {
        self.overrides.insert(flag_key.into(), value.into());
        self
    }

    /// Add several overrides at once. See [`ClientConfig::override_flag`].
    pub fn overrides(mut self, overrides: impl IntoIterator<Item = (String, FlagValue)>) -> Self {
        self.overrides.extend(overrides);
        self
    }

    /// Override the hash used for bucketing. Defaults to [`Fnv1aBucketer`].
    ///
    /// Changing the bucketer reassigns contexts in every rollout.
    pub fn bucketer(mut self, bucketer: impl Bucketer + Send + Sync + 'a) -> Self {
        self.bucketer = Box::new(bucketer);
        self
    }

    /// Maximum length of a prerequisite chain. Defaults to 32.
    pub fn max_prerequisite_depth(mut self, depth: usize) -> Self {
        self.max_prerequisite_depth = depth;
        self
    }

    /// Create a new [`Client`] using the specified configuration.
    pub fn to_client(self) -> Client<'a> {
        Client::new(self)
    }
}
