//! Terminal rendering of registry snapshots.

use devreg_core::{RegistrySettings, WorkerDefinition, WorkerRegistry};

pub fn print_registry(workers: &WorkerRegistry, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(workers)?);
        return Ok(());
    }

    if workers.is_empty() {
        println!("No workers registered");
        return Ok(());
    }

    for (name, definition) in workers {
        println!("{}", describe(name, definition));
    }
    Ok(())
}

pub fn print_unavailable(settings: &RegistrySettings) {
    println!("No dev registry running at {}", settings.base_url());
}

fn describe(name: &str, definition: &WorkerDefinition) -> String {
    let address = match (definition.protocol, definition.address()) {
        (Some(protocol), Some(address)) => format!("{}://{}", protocol, address),
        (None, Some(address)) => address,
        (_, None) => "(starting)".to_string(),
    };

    let mut line = format!("{}\t{}\t{}", name, definition.mode, address);
    if !definition.durable_objects.is_empty() {
        let classes: Vec<&str> = definition
            .durable_objects
            .iter()
            .map(|entry| entry.class_name.as_str())
            .collect();
        line.push_str(&format!("\tdurable objects: {}", classes.join(", ")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use devreg_core::Protocol;

    #[test]
    fn test_describe_running_worker() {
        let def = WorkerDefinition::local()
            .with_port(8787)
            .with_protocol(Protocol::Http)
            .with_durable_object("DO1", "Counter")
            .with_durable_object("DO2", "Room");
        assert_eq!(
            describe("api", &def),
            "api\tlocal\thttp://127.0.0.1:8787\tdurable objects: Counter, Room"
        );
    }

    #[test]
    fn test_describe_starting_worker() {
        assert_eq!(
            describe("api", &WorkerDefinition::local()),
            "api\tlocal\t(starting)"
        );
    }
}
