use flagvisor::{ClientConfig, EvaluationContext, EvaluationEvent, InMemoryFlagStore};

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tests/data/flags.json".to_owned());
    let json = std::fs::read(&path)?;

    // Flags that fail to parse are dropped with a warning; the rest are served.
    let store = InMemoryFlagStore::from_json(&json)?;

    let client = ClientConfig::from_store(store)
        .override_flag("maintenance-mode", false)
        .event_sink(|event: EvaluationEvent| {
            println!(
                "event: {} -> {:?} ({:?})",
                event.flag_key, event.value, event.reason
            );
        })
        .to_client();

    let context = EvaluationContext::builder("test-subject")
        .country("US")
        .group("beta")
        .custom("version", "2.1.0")
        .build();

    // Typed accessors serve the supplied default on any error.
    let color = client.string_variation(&context, "button-color", "gray");
    println!("button-color: {color}");

    let evaluation = client.variation(&context, "dependent")?;
    println!("dependent: {:?}", evaluation);

    for (key, evaluation) in client.all_flags(&context)? {
        println!("{key}: {:?} ({:?})", evaluation.value, evaluation.reason);
    }

    Ok(())
}
