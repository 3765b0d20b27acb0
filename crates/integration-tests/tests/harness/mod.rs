//! Shared test harness: mock backend and proxy server wrappers

pub mod mock_backend;
pub mod server;

/// Parse an SSE body into (event name, data) pairs
pub fn parse_sse(text: &str) -> Vec<(String, String)> {
    let mut events = Vec::new();
    let mut current_event = String::new();
    for line in text.lines() {
        if let Some(name) = line.strip_prefix("event: ") {
            current_event = name.trim().to_owned();
        } else if let Some(data) = line.strip_prefix("data: ") {
            events.push((current_event.clone(), data.trim().to_owned()));
        }
    }
    events
}
