//! Session events and tool-call telemetry reported by execution backends.

use serde::{Deserialize, Serialize};

/// The kind of a session event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventType {
    AssistantMessage,
    UserMessage,
    ToolExecutionStart,
    ToolExecutionComplete,
    SessionError,
}

/// One entry in a session transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    #[serde(rename = "type")]
    pub event_type: SessionEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl SessionEvent {
    /// Creates an assistant message event.
    pub fn assistant_message(content: impl Into<String>) -> Self {
        Self {
            event_type: SessionEventType::AssistantMessage,
            content: Some(content.into()),
            tool_name: None,
            tool_call_id: None,
            arguments: None,
            success: None,
        }
    }
}

/// A tool invocation observed during a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
    pub success: bool,
}

/// Correlates tool-start events with their completion events, preserving
/// start order.
pub fn filter_tool_calls(events: &[SessionEvent]) -> Vec<ToolCall> {
    let mut calls: Vec<(String, ToolCall)> = Vec::new();

    for evt in events {
        match evt.event_type {
            SessionEventType::ToolExecutionStart => {
                let (Some(name), Some(id)) = (&evt.tool_name, &evt.tool_call_id) else {
                    continue;
                };
                calls.push((
                    id.clone(),
                    ToolCall {
                        name: name.clone(),
                        arguments: evt.arguments.clone(),
                        success: false,
                    },
                ));
            }
            SessionEventType::ToolExecutionComplete => {
                let Some(id) = &evt.tool_call_id else {
                    continue;
                };
                if let Some((_, call)) = calls.iter_mut().find(|(cid, _)| cid == id) {
                    call.success = evt.success.unwrap_or(false);
                }
            }
            _ => {}
        }
    }

    calls.into_iter().map(|(_, call)| call).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_start(id: &str, name: &str) -> SessionEvent {
        SessionEvent {
            event_type: SessionEventType::ToolExecutionStart,
            content: None,
            tool_name: Some(name.to_string()),
            tool_call_id: Some(id.to_string()),
            arguments: None,
            success: None,
        }
    }

    fn tool_complete(id: &str, success: bool) -> SessionEvent {
        SessionEvent {
            event_type: SessionEventType::ToolExecutionComplete,
            content: None,
            tool_name: None,
            tool_call_id: Some(id.to_string()),
            arguments: None,
            success: Some(success),
        }
    }

    #[test]
    fn test_filter_tool_calls_preserves_start_order() {
        let events = vec![
            tool_start("1", "read_file"),
            tool_start("2", "write_file"),
            tool_complete("2", true),
            tool_complete("1", false),
        ];

        let calls = filter_tool_calls(&events);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "read_file");
        assert!(!calls[0].success);
        assert_eq!(calls[1].name, "write_file");
        assert!(calls[1].success);
    }

    #[test]
    fn test_filter_tool_calls_ignores_unmatched_complete() {
        let events = vec![
            SessionEvent::assistant_message("hi"),
            tool_complete("unknown", true),
        ];
        assert!(filter_tool_calls(&events).is_empty());
    }
}
