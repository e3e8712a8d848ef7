use crate::message::{Message, MessageContent, ToolCall, ToolError};
use crate::model::ModelConfig;
use crate::providers::base::Usage;
use crate::providers::errors::ProviderError;
use crate::providers::utils::{is_valid_function_name, sanitize_function_name};
use rand::{distributions::Alphanumeric, Rng};
use rmcp::model::{AnnotateAble, RawContent, Role, Tool};
use serde_json::{json, Map, Value};

/// Convert internal Message format to Google's API message specification
pub fn format_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| {
            let role = if message.role == Role::User {
                "user"
            } else {
                "model"
            };
            let mut parts = Vec::new();
            for message_content in message.content.iter() {
                match message_content {
                    MessageContent::Text(text) => {
                        if !text.text.is_empty() {
                            parts.push(json!({"text": text.text}));
                        }
                    }
                    MessageContent::ToolRequest(request) => match &request.tool_call {
                        Ok(tool_call) => {
                            let mut function_call_part = Map::new();
                            function_call_part.insert(
                                "name".to_string(),
                                json!(sanitize_function_name(&tool_call.name)),
                            );
                            if tool_call
                                .arguments
                                .as_object()
                                .is_some_and(|args| !args.is_empty())
                            {
                                function_call_part
                                    .insert("args".to_string(), tool_call.arguments.clone());
                            }
                            parts.push(json!({
                                "functionCall": function_call_part
                            }));
                        }
                        Err(e) => {
                            parts.push(json!({"text": format!("Error: {}", e)}));
                        }
                    },
                    MessageContent::ToolResponse(response) => match &response.tool_result {
                        Ok(contents) => {
                            // only content meant for the assistant goes back to the model
                            let mut text = contents
                                .iter()
                                .filter(|content| {
                                    content
                                        .audience()
                                        .is_none_or(|audience| audience.contains(&Role::Assistant))
                                })
                                .filter_map(|content| match &content.raw {
                                    RawContent::Text(t) => Some(t.text.clone()),
                                    RawContent::Resource(resource) => {
                                        Some(resource.clone().no_annotation().get_text())
                                    }
                                    _ => None,
                                })
                                .collect::<Vec<_>>()
                                .join("\n");

                            if text.is_empty() {
                                text = "Tool call is done.".to_string();
                            }
                            parts.push(json!({
                                "functionResponse": {
                                    "name": sanitize_function_name(&response.name),
                                    "response": {"content": {"text": text}},
                                }
                            }));
                        }
                        Err(e) => {
                            parts.push(json!({"text": format!("Error: {}", e)}));
                        }
                    },
                }
            }
            json!({"role": role, "parts": parts})
        })
        .collect()
}

/// Convert internal Tool format to Google's API tool specification
pub fn format_tools(tools: &[Tool]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            let mut parameters = Map::new();
            parameters.insert("name".to_string(), json!(tool.name));
            parameters.insert("description".to_string(), json!(tool.description));
            let tool_input_schema = &tool.input_schema;
            // Gemini rejects parameter objects without properties
            if tool_input_schema
                .get("properties")
                .and_then(|v| v.as_object())
                .is_some_and(|p| !p.is_empty())
            {
                parameters.insert(
                    "parameters".to_string(),
                    process_map(tool_input_schema, None),
                );
            }
            json!(parameters)
        })
        .collect()
}

/// Get the accepted keys for a given parent key in the JSON schema.
fn get_accepted_keys(parent_key: Option<&str>) -> &'static [&'static str] {
    match parent_key {
        Some("properties") => &[
            "anyOf",
            "allOf",
            "type",
            "description",
            "nullable",
            "enum",
            "properties",
            "required",
            "items",
        ],
        Some("items") => &["type", "properties", "items", "required"],
        // top-level schema
        _ => &["type", "properties", "required", "anyOf", "allOf"],
    }
}

/// Strip JSON schema keywords the Gemini function declaration format does not accept
fn process_map(map: &Map<String, Value>, parent_key: Option<&str>) -> Value {
    let accepted_keys = get_accepted_keys(parent_key);
    let filtered_map: Map<String, Value> = map
        .iter()
        .filter(|(key, _)| accepted_keys.contains(&key.as_str()))
        .filter_map(|(key, value)| match key.as_str() {
            "properties" => value.as_object().map(|nested_map| {
                let processed: Map<String, Value> = nested_map
                    .iter()
                    .map(|(prop_key, prop_value)| match prop_value.as_object() {
                        Some(prop_obj) => {
                            (prop_key.clone(), process_map(prop_obj, Some("properties")))
                        }
                        None => (prop_key.clone(), prop_value.clone()),
                    })
                    .collect();
                (key.clone(), Value::Object(processed))
            }),
            "items" => value
                .as_object()
                .map(|nested_map| (key.clone(), process_map(nested_map, Some("items")))),
            _ => Some((key.clone(), value.clone())),
        })
        .collect();

    Value::Object(filtered_map)
}

fn tool_call_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

/// Convert Google's API response to internal Message format
pub fn response_to_message(response: Value) -> Result<Message, ProviderError> {
    let mut content = Vec::new();
    let created = chrono::Utc::now().timestamp();

    let parts = response
        .get("candidates")
        .and_then(|v| v.as_array())
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(|parts| parts.as_array());

    let Some(parts) = parts else {
        return Ok(Message::new(Role::Assistant, created, content));
    };

    for part in parts {
        if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
            content.push(MessageContent::text(text));
        } else if let Some(function_call) = part.get("functionCall") {
            let id = tool_call_id();
            let name = function_call["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            if !is_valid_function_name(&name) {
                let error = ToolError::NotFound(format!(
                    "The provided function name '{}' had invalid characters, it must match this regex [a-zA-Z0-9_-]+",
                    name
                ));
                content.push(MessageContent::tool_request(id, Err(error)));
            } else {
                let arguments = function_call
                    .get("args")
                    .cloned()
                    .unwrap_or_else(|| json!({}));
                content.push(MessageContent::tool_request(
                    id,
                    Ok(ToolCall::new(name, arguments)),
                ));
            }
        }
    }
    Ok(Message::new(Role::Assistant, created, content))
}

/// Extract usage information from Google's API response
pub fn get_usage(data: &Value) -> Usage {
    let Some(usage_meta_data) = data.get("usageMetadata") else {
        tracing::debug!("No usageMetadata in Gemini response");
        return Usage::default();
    };

    let count = |key: &str| {
        usage_meta_data
            .get(key)
            .and_then(|v| v.as_u64())
            .map(|v| v as i32)
    };
    Usage::new(
        count("promptTokenCount"),
        count("candidatesTokenCount"),
        count("totalTokenCount"),
    )
}

/// Create a complete request payload for Google's API
pub fn create_request(
    model_config: &ModelConfig,
    system: &str,
    messages: &[Message],
    tools: &[Tool],
) -> Value {
    let mut payload = Map::new();
    if !system.is_empty() {
        payload.insert(
            "system_instruction".to_string(),
            json!({"parts": [{"text": system}]}),
        );
    }
    payload.insert("contents".to_string(), json!(format_messages(messages)));
    if !tools.is_empty() {
        payload.insert(
            "tools".to_string(),
            json!({"functionDeclarations": format_tools(tools)}),
        );
    }
    let mut generation_config = Map::new();
    if let Some(temp) = model_config.temperature {
        generation_config.insert("temperature".to_string(), json!(temp));
    }
    if let Some(tokens) = model_config.max_tokens {
        generation_config.insert("maxOutputTokens".to_string(), json!(tokens));
    }
    if !generation_config.is_empty() {
        payload.insert("generationConfig".to_string(), json!(generation_config));
    }

    Value::Object(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::Content;
    use rmcp::object;

    fn text_message(text: &str, role: Role) -> Message {
        Message::new(role, 0, vec![MessageContent::text(text)])
    }

    fn tool_response_message(id: &str, name: &str, contents: Vec<Content>) -> Message {
        Message::new(
            Role::User,
            0,
            vec![MessageContent::tool_response(id, name, Ok(contents))],
        )
    }

    #[test]
    fn test_get_usage() {
        let data = json!({
            "usageMetadata": {
                "promptTokenCount": 1,
                "candidatesTokenCount": 2,
                "totalTokenCount": 3
            }
        });
        let usage = get_usage(&data);
        assert_eq!(usage.input_tokens, Some(1));
        assert_eq!(usage.output_tokens, Some(2));
        assert_eq!(usage.total_tokens, Some(3));

        assert_eq!(get_usage(&json!({})), Usage::default());
    }

    #[test]
    fn test_text_messages_map_roles() {
        let messages = vec![
            text_message("Hello", Role::User),
            text_message("World", Role::Assistant),
        ];
        let payload = format_messages(&messages);
        assert_eq!(payload.len(), 2);
        assert_eq!(payload[0]["role"], "user");
        assert_eq!(payload[0]["parts"][0]["text"], "Hello");
        assert_eq!(payload[1]["role"], "model");
        assert_eq!(payload[1]["parts"][0]["text"], "World");
    }

    #[test]
    fn test_tool_request_becomes_function_call() {
        let arguments = json!({ "location": "Lisbon" });
        let messages = vec![Message::assistant().with_tool_request(
            "id",
            Ok(ToolCall::new("airbnb__airbnb_search", arguments.clone())),
        )];
        let payload = format_messages(&messages);
        assert_eq!(payload[0]["role"], "model");
        assert_eq!(
            payload[0]["parts"][0]["functionCall"]["name"],
            "airbnb__airbnb_search"
        );
        assert_eq!(payload[0]["parts"][0]["functionCall"]["args"], arguments);
    }

    #[test]
    fn test_tool_response_joins_texts_under_tool_name() {
        let messages = vec![tool_response_message(
            "abc123",
            "airbnb__airbnb_search",
            vec![
                Content::text("Hello"),
                Content::text("World"),
                Content::embedded_text("test_uri", "This is a test."),
            ],
        )];
        let payload = format_messages(&messages);

        let expected_payload = vec![json!({
            "role": "user",
            "parts": [{
                "functionResponse": {
                    "name": "airbnb__airbnb_search",
                    "response": {
                        "content": { "text": "Hello\nWorld\nThis is a test." }
                    }
                }
            }]
        })];
        assert_eq!(payload, expected_payload);
    }

    #[test]
    fn test_empty_tool_response_still_answers() {
        let messages = vec![tool_response_message("abc", "airbnb__airbnb_search", vec![])];
        let payload = format_messages(&messages);
        assert_eq!(
            payload[0]["parts"][0]["functionResponse"]["response"]["content"]["text"],
            "Tool call is done."
        );
    }

    #[test]
    fn test_tool_errors_are_sent_as_text() {
        let message = Message::user().with_tool_response(
            "abc",
            "airbnb__airbnb_search",
            Err(ToolError::ExecutionError("robots.txt disallows".into())),
        );
        let payload = format_messages(&[message]);
        assert_eq!(
            payload[0]["parts"][0]["text"],
            "Error: Execution failed: robots.txt disallows"
        );
    }

    #[test]
    fn test_tools_drop_unsupported_schema_keys() {
        let schema = object!({
            "type": "object",
            "$schema": "http://json-schema.org/draft-07/schema#",
            "additionalProperties": false,
            "properties": {
                "location": {
                    "type": "string",
                    "description": "City or area",
                    "format": "city"
                },
                "checkin": {
                    "anyOf": [{ "type": "string" }, { "type": "null" }],
                    "description": "Check-in date"
                },
                "amenities": {
                    "type": "array",
                    "items": { "type": "string", "minLength": 1 }
                }
            },
            "required": ["location"]
        });
        let tools = vec![Tool::new("airbnb__airbnb_search", "Search listings", schema)];
        let result = format_tools(&tools);

        assert_eq!(result[0]["name"], "airbnb__airbnb_search");
        assert_eq!(result[0]["description"], "Search listings");
        assert_eq!(
            result[0]["parameters"],
            json!({
                "type": "object",
                "properties": {
                    "location": { "type": "string", "description": "City or area" },
                    "checkin": {
                        "anyOf": [{ "type": "string" }, { "type": "null" }],
                        "description": "Check-in date"
                    },
                    "amenities": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["location"]
            })
        );
    }

    #[test]
    fn test_tools_with_empty_properties_have_no_parameters() {
        let tools = vec![Tool::new(
            "airbnb__airbnb_listing_details",
            "Listing details",
            object!({ "properties": {} }),
        )];
        let result = format_tools(&tools);
        assert!(result[0].get("parameters").is_none());
    }

    #[test]
    fn test_response_to_message_with_no_candidates() {
        let message = response_to_message(json!({})).unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert!(message.content.is_empty());
    }

    #[test]
    fn test_response_to_message_with_text_and_call() {
        let response = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "Searching now." },
                        { "functionCall": { "name": "airbnb__airbnb_search", "args": { "location": "Goa" } } },
                        { "functionCall": { "name": "airbnb__airbnb_listing_details" } }
                    ]
                }
            }]
        });
        let message = response_to_message(response).unwrap();
        assert_eq!(message.as_concat_text(), "Searching now.");

        let requests = message.tool_requests();
        assert_eq!(requests.len(), 2);
        let first = requests[0].tool_call.as_ref().unwrap();
        assert_eq!(first.name, "airbnb__airbnb_search");
        assert_eq!(first.arguments["location"], "Goa");
        // a call without args still reaches the tool, with empty arguments
        assert_eq!(requests[1].tool_call.as_ref().unwrap().arguments, json!({}));
        assert_ne!(requests[0].id, requests[1].id);
    }

    #[test]
    fn test_response_to_message_with_invalid_function_name() {
        let response = json!({
            "candidates": [{
                "content": {
                    "parts": [{ "functionCall": { "name": "invalid name!", "args": {} } }]
                }
            }]
        });
        let message = response_to_message(response).unwrap();
        let request = message.content[0].as_tool_request().unwrap();
        assert!(matches!(request.tool_call, Err(ToolError::NotFound(_))));
    }

    #[test]
    fn test_create_request_carries_generation_config() {
        let model = ModelConfig::new("gemini-2.5-flash".to_string())
            .with_temperature(Some(0.0))
            .with_max_tokens(Some(8192));
        let payload = create_request(
            &model,
            "You are a travel assistant.",
            &[text_message("Find me a stay in Goa", Role::User)],
            &[],
        );

        assert_eq!(payload["generationConfig"]["temperature"], 0.0);
        assert_eq!(payload["generationConfig"]["maxOutputTokens"], 8192);
        assert_eq!(
            payload["system_instruction"]["parts"][0]["text"],
            "You are a travel assistant."
        );
        assert_eq!(payload["contents"][0]["parts"][0]["text"], "Find me a stay in Goa");
        assert!(payload.get("tools").is_none());
    }

    #[test]
    fn test_temperature_is_sent_as_configured() {
        let model = ModelConfig::new("gemini-2.5-flash".to_string()).with_temperature(Some(0.3));
        let payload = create_request(&model, "", &[text_message("Hi", Role::User)], &[]);

        assert_eq!(payload["generationConfig"]["temperature"], json!(0.3));
        assert!(payload.to_string().contains("\"temperature\":0.3"));
    }
}
