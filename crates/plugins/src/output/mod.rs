//! Builtin output plugins.

pub mod file;
pub mod http;
pub mod stdout;

fn default_separator() -> String {
    "\n".to_string()
}

/// Join events into one buffer, terminating each with `separator`.
pub(crate) fn join_events(events: &[String], separator: &str) -> String {
    let capacity = events.iter().map(|e| e.len() + separator.len()).sum();
    let mut buffer = String::with_capacity(capacity);
    for event in events {
        buffer.push_str(event);
        buffer.push_str(separator);
    }
    buffer
}
