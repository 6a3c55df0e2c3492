use biometrics::{Collector, Counter, Moments};

pub(crate) static CONNECTIONS_OPENED: Counter = Counter::new("parley.connection.opened");
pub(crate) static CONNECTION_FAILURES: Counter = Counter::new("parley.connection.failures");
pub(crate) static CONNECTIONS_SUPERSEDED: Counter = Counter::new("parley.connection.superseded");
pub(crate) static CONNECTIONS_CLOSED_REMOTELY: Counter =
    Counter::new("parley.connection.closed_remotely");
pub(crate) static CONNECT_DURATION: Moments =
    Moments::new("parley.connection.connect_duration_seconds");

pub(crate) static FRAMES_RECEIVED: Counter = Counter::new("parley.stream.frames_received");
pub(crate) static FRAMES_DROPPED: Counter = Counter::new("parley.stream.frames_dropped");
pub(crate) static FRAMES_SENT: Counter = Counter::new("parley.stream.frames_sent");
pub(crate) static SEND_FAILURES: Counter = Counter::new("parley.stream.send_failures");

pub(crate) static SESSIONS_STARTED: Counter = Counter::new("parley.session.started");
pub(crate) static SESSION_FAILURES: Counter = Counter::new("parley.session.failures");

pub(crate) static STALE_RESULTS: Counter = Counter::new("parley.store.stale_results");
pub(crate) static STALE_EVENTS: Counter = Counter::new("parley.store.stale_events");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CONNECTIONS_OPENED);
    collector.register_counter(&CONNECTION_FAILURES);
    collector.register_counter(&CONNECTIONS_SUPERSEDED);
    collector.register_counter(&CONNECTIONS_CLOSED_REMOTELY);
    collector.register_moments(&CONNECT_DURATION);

    collector.register_counter(&FRAMES_RECEIVED);
    collector.register_counter(&FRAMES_DROPPED);
    collector.register_counter(&FRAMES_SENT);
    collector.register_counter(&SEND_FAILURES);

    collector.register_counter(&SESSIONS_STARTED);
    collector.register_counter(&SESSION_FAILURES);

    collector.register_counter(&STALE_RESULTS);
    collector.register_counter(&STALE_EVENTS);
}
