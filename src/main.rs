use fleetstate::{
    init_logging, selector, ActionProducer, ActionsReducer, AttrValue, EngineSettings, Event,
    EventsReducer, PushSupport, Select, SimulatedDevice, SimulatedDirectory, StateCoordinator,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

type FleetState = BTreeMap<String, AttrValue>;
type LampSelector = Arc<dyn Select<FleetState, Output = Option<AttrValue>>>;

const LAMPS: [&str; 3] = ["lamp-1", "lamp-2", "lamp-3"];

fn record(state: &FleetState, event: &Event) -> anyhow::Result<FleetState> {
    let mut next = state.clone();
    let value = if event.is_error() {
        json!("UNKNOWN")
    } else {
        event.value().clone()
    };
    next.insert(event.key().to_string(), value);
    Ok(next)
}

fn main() -> anyhow::Result<()> {
    init_logging()?;
    tracing::info!("FleetState demo {} (built {})", fleetstate::VERSION, fleetstate::BUILD_DATE);

    let settings = EngineSettings::load_or_default()?;

    let directory = Arc::new(SimulatedDirectory::new());
    let lamps: Vec<_> = LAMPS
        .iter()
        .map(|name| {
            directory.add_device(SimulatedDevice::new(*name).with_attribute("state", json!("OFF")))
        })
        .collect();
    let thermostat = directory.add_device(
        SimulatedDevice::new("thermostat")
            .with_attribute("temperature", json!(19.5))
            .with_push_support(PushSupport::AfterPollingConfigured),
    );
    let operator = Arc::new(ActionProducer::new("operator"));

    let initial: FleetState = LAMPS
        .iter()
        .map(|name| (format!("{name}:state"), json!("UNKNOWN")))
        .collect();
    let coordinator = StateCoordinator::with_settings(initial, directory, settings);

    for name in LAMPS {
        coordinator.add_events_reducer(EventsReducer::new(name, "state", record));
    }
    coordinator.add_events_reducer(EventsReducer::new("thermostat", "temperature", record));
    coordinator.add_action_reducer(ActionsReducer::new(
        operator.clone(),
        |state: &FleetState, action: &fleetstate::Action| {
            let mut next = state.clone();
            next.insert("mode".to_string(), action.payload().clone());
            Ok(next)
        },
    ));

    let lamp_states: Vec<LampSelector> = LAMPS
        .iter()
        .map(|name| {
            let key = format!("{name}:state");
            let lamp: LampSelector = selector::root(move |s: &FleetState| s.get(&key).cloned());
            lamp
        })
        .collect();
    let lamps_on = selector::derived(lamp_states, |states: &Vec<Option<AttrValue>>| {
        states.iter().filter(|s| s.as_ref() == Some(&json!("ON"))).count()
    });
    coordinator.add_named_observer("lamps-on", lamps_on, |count: &usize| {
        tracing::info!("{} of {} lamps on", count, LAMPS.len());
        Ok(())
    });
    coordinator.add_named_observer(
        "temperature",
        selector::root(|s: &FleetState| s.get("thermostat:temperature").cloned()),
        |temperature: &Option<AttrValue>| {
            if let Some(temperature) = temperature {
                tracing::info!("Temperature is {}", temperature);
            }
            Ok(())
        },
    );

    for (key, error) in coordinator.start_subscriptions() {
        tracing::warn!("{} disabled: {}", key, error);
    }
    coordinator.start_listening()?;

    operator.push_action(json!("evening"));
    for lamp in &lamps {
        lamp.set_attribute("state", json!("ON"));
    }
    thermostat.set_attribute("temperature", json!(20.0));
    lamps[1].set_attribute("state", json!("OFF"));

    while !coordinator.bus().is_empty() {
        thread::sleep(Duration::from_millis(100));
    }
    thread::sleep(coordinator.settings().pacing_interval());
    tracing::info!("Final state: {}", serde_json::to_string(coordinator.state().as_ref())?);
    if let Some(latency) = coordinator.bus().average_latency() {
        tracing::info!("Average event latency {:?}", latency);
    }

    coordinator.shutdown()?;
    Ok(())
}
