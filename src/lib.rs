//! Deterministic feature flag evaluation.
//!
//! # Overview
//!
//! A [`Client`] evaluates feature flags for an [`EvaluationContext`], an immutable attribute bag
//! identifying a user or request. Each flag ([`Flag`]) has a default value, a list of variants,
//! targeting rules and prerequisites. Evaluation produces an [`Evaluation`]: the selected value,
//! the index of the selected variant and the [`Reason`] it was chosen.
//!
//! Evaluation works in this order:
//!
//! 1. client-side overrides win over everything;
//! 2. a disabled flag serves its default value ([`Reason::Off`]);
//! 3. every prerequisite must resolve to its required variation, otherwise the default value is
//!    served ([`Reason::PrerequisiteFailed`]);
//! 4. rules are tried in order and the first match wins ([`Reason::RuleMatch`]);
//! 5. if nothing matches, the default value is served ([`Reason::Fallthrough`]).
//!
//! Percentage gates and weighted rollouts bucket contexts with a stable hash of the flag key and
//! the context key, so the same context always lands in the same variation on every instance.
//!
//! Flags are read from a [`FlagStore`]. [`InMemoryFlagStore`] is a thread-safe implementation
//! that can be loaded from JSON. An [`EventSink`] can be configured to receive an
//! [`EvaluationEvent`] after each evaluation.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. Only [`Client::variation`] returns them; the
//! typed accessors ([`Client::bool_variation`] and friends) log the error and serve the
//! caller-supplied default, as flag evaluation should never take down request serving.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages under
//! the `flagvisor` target. Consider integrating a `log`-compatible logger implementation for
//! better visibility into evaluation.
//!
//! # Examples
//!
//! ```
//! use flagvisor::{ClientConfig, EvaluationContext, InMemoryFlagStore};
//!
//! let store = InMemoryFlagStore::from_json(br#"{
//!     "flags": {
//!         "new-checkout": {
//!             "key": "new-checkout",
//!             "enabled": true,
//!             "defaultValue": false,
//!             "variants": [
//!                 {"name": "off", "value": false},
//!                 {"name": "on", "value": true}
//!             ],
//!             "rules": [{
//!                 "clauses": [{"attribute": "country", "operator": "eq", "values": ["US"]}],
//!                 "variation": 1
//!             }]
//!         }
//!     }
//! }"#).unwrap();
//!
//! let client = ClientConfig::from_store(store).to_client();
//!
//! let us = EvaluationContext::builder("user-1").country("US").build();
//! let ca = EvaluationContext::builder("user-2").country("CA").build();
//! assert!(client.bool_variation(&us, "new-checkout", false));
//! assert!(!client.bool_variation(&ca, "new-checkout", false));
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

mod bucketing;
mod clause;
mod client;
mod config;
mod context;
mod error;
mod eval;
mod events;
mod flag;
mod rules;
mod store;

pub use bucketing::{bucket_value, Bucketer, Fnv1aBucketer, Md5Bucketer, TOTAL_BUCKETS};
pub use client::Client;
pub use config::ClientConfig;
pub use context::{AttributeValue, Attributes, ContextBuilder, EvaluationContext};
pub use error::{Error, Result};
pub use eval::{Evaluation, Evaluator, Reason, DEFAULT_MAX_PREREQUISITE_DEPTH};
pub use events::{EvaluationEvent, EventSink};
pub use flag::{
    Clause, Flag, FlagType, FlagValue, Operator, Prerequisite, Rollout, Rule, Variant,
    WeightedVariation,
};
pub use store::{FlagSet, FlagStore, InMemoryFlagStore};
