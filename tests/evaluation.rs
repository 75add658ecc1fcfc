use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use serde_json::json;

use flagvisor::{
    Client, ClientConfig, Error, EvaluationContext, EvaluationEvent, FlagStore, FlagValue,
    InMemoryFlagStore, Md5Bucketer, Reason,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn store() -> InMemoryFlagStore {
    let json = std::fs::read("tests/data/flags.json").unwrap();
    InMemoryFlagStore::from_json(&json).unwrap()
}

fn client() -> Client<'static> {
    ClientConfig::from_store(store()).to_client()
}

#[test]
fn drops_unparsable_flags() {
    init();
    let store = store();
    assert!(store.get_flag("unparsable").is_none());
    assert!(store.get_flag("beta").is_some());
}

#[test]
fn disabled_flag_is_off() {
    init();
    let client = client();
    let ctx = EvaluationContext::new("user-1");

    assert!(!client.bool_variation(&ctx, "beta", true));

    let evaluation = client.variation(&ctx, "beta").unwrap();
    assert_eq!(evaluation.reason, Reason::Off);
    assert_eq!(evaluation.variation_index, None);
}

#[test]
fn rule_without_clauses_matches_any_context() {
    init();
    let client = client();
    for key in ["user-1", "user-2", ""] {
        let evaluation = client
            .variation(&EvaluationContext::new(key), "everyone")
            .unwrap();
        assert_eq!(evaluation.value, FlagValue::Bool(true));
        assert_eq!(evaluation.reason, Reason::RuleMatch);
        assert_eq!(evaluation.rule_id.as_deref(), Some("all"));
    }
}

#[test]
fn rollout_assignment_is_stable() {
    init();
    let first_client = client();
    let ctx = EvaluationContext::new("user-1");

    let first = first_client.variation(&ctx, "button-color").unwrap();
    assert!(first.in_experiment);
    assert!(first.variation_index.is_some());
    for _ in 0..100 {
        assert_eq!(first_client.variation(&ctx, "button-color").unwrap(), first);
    }

    // A second client instance with no shared state agrees.
    let second_client = client();
    assert_eq!(second_client.variation(&ctx, "button-color").unwrap(), first);
}

#[test]
fn rollout_spreads_contexts_over_all_variations() {
    init();
    let client = client();
    let seen: HashSet<String> = (0..300)
        .map(|i| {
            client.string_variation(
                &EvaluationContext::new(format!("user-{i}")),
                "button-color",
                "gray",
            )
        })
        .collect();
    assert_eq!(
        seen,
        HashSet::from(["red".to_owned(), "green".to_owned(), "blue".to_owned()])
    );
}

#[test]
fn bucketer_is_configurable() {
    init();
    let client = ClientConfig::from_store(store())
        .bucketer(Md5Bucketer)
        .to_client();
    let ctx = EvaluationContext::new("user-1");
    let color = client.string_variation(&ctx, "button-color", "gray");
    assert!(["red", "green", "blue"].contains(&color.as_str()));
    assert_eq!(client.string_variation(&ctx, "button-color", "gray"), color);
}

#[test]
fn unset_country_does_not_match() {
    init();
    let client = client();

    let unset = EvaluationContext::new("user-1");
    let evaluation = client.variation(&unset, "us-only").unwrap();
    assert_eq!(evaluation.reason, Reason::Fallthrough);
    assert_eq!(evaluation.value, FlagValue::Bool(false));

    let empty = EvaluationContext::builder("user-1").country("").build();
    assert_eq!(
        client.variation(&empty, "us-only").unwrap().reason,
        Reason::Fallthrough
    );

    let us = EvaluationContext::builder("user-1").country("US").build();
    assert!(client.bool_variation(&us, "us-only", false));
}

#[test]
fn failed_prerequisite_serves_default() {
    init();
    let client = client();
    let ctx = EvaluationContext::new("user-1");

    assert_eq!(
        client.variation(&ctx, "base-flag").unwrap().variation_index,
        Some(0)
    );

    let evaluation = client.variation(&ctx, "dependent").unwrap();
    assert_eq!(evaluation.reason, Reason::PrerequisiteFailed);
    assert!(evaluation.prerequisite_failed);
    assert_eq!(evaluation.value, FlagValue::from("classic"));
    assert_eq!(evaluation.rule_id, None);
}

#[test]
fn met_prerequisite_evaluates_rules() {
    init();
    let client = client();
    let ctx = EvaluationContext::builder("user-1").group("beta").build();

    let evaluation = client.variation(&ctx, "dependent").unwrap();
    assert_eq!(evaluation.reason, Reason::RuleMatch);
    assert_eq!(evaluation.value, FlagValue::from("modern"));
    assert_eq!(evaluation.rule_id.as_deref(), Some("modern"));
}

#[test]
fn clauses_and_percentage_gates() {
    init();
    let client = client();

    let staff = EvaluationContext::builder("user-1")
        .email("dev@example.com")
        .build();
    assert_eq!(client.int_variation(&staff, "limits", 0), 1000);

    let anonymous_staff = EvaluationContext::builder("user-1")
        .email("dev@example.com")
        .anonymous(true)
        .build();
    assert_eq!(client.int_variation(&anonymous_staff, "limits", 0), 10);

    // The age rule matches but its percentage gate lets nobody through.
    let adult = EvaluationContext::builder("user-2").custom("age", 40).build();
    let evaluation = client.variation(&adult, "limits").unwrap();
    assert_eq!(evaluation.reason, Reason::Fallthrough);
    assert_eq!(evaluation.value, FlagValue::Int(10));
}

#[test]
fn json_flags() {
    init();
    let client = client();

    let new = EvaluationContext::builder("user-1")
        .custom("version", "2.1.0")
        .build();
    assert_eq!(
        client.json_variation(&new, "config", json!(null)),
        json!({"timeout": 5, "retries": [1, 2]})
    );

    let old = EvaluationContext::builder("user-1")
        .custom("version", "1.9.9")
        .build();
    assert_eq!(
        client.json_variation(&old, "config", json!(null)),
        json!({"timeout": 30})
    );
}

#[test]
fn override_for_absent_flag() {
    init();
    let client = ClientConfig::from_store(store())
        .override_flag("x", true)
        .to_client();
    assert!(client.bool_variation(&EvaluationContext::new("user-1"), "x", false));
}

#[test]
fn errors_only_surface_through_variation() {
    init();
    let client = client();
    let ctx = EvaluationContext::new("user-1");

    assert_eq!(client.string_variation(&ctx, "nope", "fallback"), "fallback");

    let err = client.variation(&ctx, "nope").unwrap_err();
    assert!(matches!(err, Error::FlagNotFound { .. }));

    let evaluation = flagvisor::Evaluation::error("nope", "fallback".into());
    assert_eq!(evaluation.reason, Reason::Error);
    assert_eq!(evaluation.value, FlagValue::from("fallback"));
}

#[test]
fn store_updates_are_picked_up() {
    init();
    let store = Arc::new(store());
    let client = ClientConfig::default().flag_store(store.clone()).to_client();
    let ctx = EvaluationContext::new("user-1");

    assert!(client.bool_variation(&ctx, "everyone", false));

    let mut flag = (*store.get_flag("everyone").unwrap()).clone();
    flag.enabled = false;
    store.upsert_flag(flag);

    assert!(!client.bool_variation(&ctx, "everyone", true));
}

#[test]
fn events_are_forwarded() {
    init();
    let events = Arc::new(Mutex::new(Vec::new()));
    let client = {
        let events = events.clone();
        ClientConfig::from_store(store())
            .event_sink(move |event: EvaluationEvent| events.lock().unwrap().push(event))
            .to_client()
    };

    let ctx = EvaluationContext::new("user-1");
    client.string_variation(&ctx, "button-color", "gray");

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].flag_key, "button-color");
    assert!(events[0].in_experiment);
    assert_eq!(events[0].rule_id.as_deref(), Some("experiment"));
}

#[test]
fn all_flags() {
    init();
    let client = client();
    let all = client
        .all_flags(&EvaluationContext::new("user-1"))
        .unwrap();

    assert!(!all.contains_key("unparsable"));
    assert_eq!(all["beta"].reason, Reason::Off);
    assert_eq!(all["everyone"].reason, Reason::RuleMatch);
    assert_eq!(all["dependent"].reason, Reason::PrerequisiteFailed);
}

#[test]
fn client_is_shareable_between_threads() {
    init();
    let client = Arc::new(client());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let client = client.clone();
            std::thread::spawn(move || {
                let ctx = EvaluationContext::new(format!("user-{i}"));
                client.string_variation(&ctx, "button-color", "gray")
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let ctx = EvaluationContext::new(format!("user-{i}"));
        assert_eq!(
            handle.join().unwrap(),
            client.string_variation(&ctx, "button-color", "gray")
        );
    }
}
