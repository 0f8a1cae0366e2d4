//! OpenAI provider wire format tests.

use serde_json::json;
use lcac::providers::openai::{build_request, parse_response, OpenAiProvider};
use lcac::providers::{CompletionRequest, LlmProvider, Message, Role, StopReason};

fn simple_request() -> CompletionRequest {
    CompletionRequest {
        messages: vec![Message::user("Patient Context:\n- Fever\n\nUser Query: Urgent?")],
        system: Some("You are a clinical triage assistant.".to_owned()),
        max_tokens: Some(256),
    }
}

#[test]
fn build_request_sets_model_system_and_max_tokens() {
    let req = build_request("gpt-3.5-turbo", &simple_request());
    assert_eq!(req.model, "gpt-3.5-turbo");
    assert_eq!(req.max_tokens, Some(256));
    assert_eq!(req.messages.len(), 2);
    assert_eq!(req.messages[0].role, "system");
    assert_eq!(req.messages[0].content, "You are a clinical triage assistant.");
    assert_eq!(req.messages[1].role, "user");
    assert!(req.messages[1].content.starts_with("Patient Context:"));
}

#[test]
fn build_request_defaults_max_tokens() {
    let request = CompletionRequest {
        messages: vec![Message::user("hi")],
        ..CompletionRequest::default()
    };
    let req = build_request("gpt-3.5-turbo", &request);
    assert_eq!(req.max_tokens, Some(500));
    assert_eq!(req.messages.len(), 1);
}

#[test]
fn build_request_keeps_assistant_turns() {
    let request = CompletionRequest {
        messages: vec![
            Message::user("first"),
            Message {
                role: Role::Assistant,
                content: "reply".to_owned(),
            },
            Message::user("second"),
        ],
        ..CompletionRequest::default()
    };
    let req = build_request("m", &request);
    let roles: Vec<&str> = req.messages.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, ["user", "assistant", "user"]);
}

#[test]
fn serialised_request_matches_chat_completions_shape() {
    let req = build_request("gpt-3.5-turbo", &simple_request());
    let value = serde_json::to_value(&req).expect("serialise");
    assert_eq!(value["model"], "gpt-3.5-turbo");
    assert_eq!(value["max_tokens"], 256);
    assert_eq!(value["messages"][0]["role"], "system");
}

#[test]
fn parse_response_text_only() {
    let body = json!({
        "choices": [{
            "message": {"role": "assistant", "content": "Non-urgent."},
            "finish_reason": "stop"
        }],
        "model": "gpt-3.5-turbo",
        "usage": {"prompt_tokens": 10, "completion_tokens": 5}
    });

    let resp = parse_response(&body.to_string()).expect("should parse");
    assert_eq!(resp.text, "Non-urgent.");
    assert_eq!(resp.stop_reason, StopReason::EndTurn);
    assert_eq!(resp.model, "gpt-3.5-turbo");
    assert_eq!(resp.usage.input_tokens, 10);
    assert_eq!(resp.usage.output_tokens, 5);
}

#[test]
fn parse_response_length_maps_to_max_tokens() {
    let body = json!({
        "choices": [{
            "message": {"role": "assistant", "content": "cut"},
            "finish_reason": "length"
        }],
        "model": "gpt-3.5-turbo"
    });
    let resp = parse_response(&body.to_string()).expect("should parse");
    assert_eq!(resp.stop_reason, StopReason::MaxTokens);
}

#[test]
fn parse_response_content_filter_maps_to_other() {
    let body = json!({
        "choices": [{
            "message": {"role": "assistant", "content": "I can't help with that."},
            "finish_reason": "content_filter"
        }],
        "model": "gpt-3.5-turbo"
    });
    let resp = parse_response(&body.to_string()).expect("should parse");
    assert_eq!(
        resp.stop_reason,
        StopReason::Other("content_filter".to_owned())
    );
}

#[test]
fn parse_response_null_content_is_empty_text() {
    let body = json!({
        "choices": [{
            "message": {"role": "assistant", "content": null},
            "finish_reason": "stop"
        }],
        "model": "gpt-3.5-turbo"
    });
    let resp = parse_response(&body.to_string()).expect("should parse");
    assert!(resp.text.is_empty());
    assert_eq!(resp.usage.input_tokens, 0);
}

#[test]
fn parse_response_without_choices_is_error() {
    let body = json!({"choices": [], "model": "gpt-3.5-turbo"});
    assert!(parse_response(&body.to_string()).is_err());
}

#[test]
fn parse_response_rejects_non_json() {
    assert!(parse_response("not json at all").is_err());
}

#[test]
fn provider_reports_full_spec_as_model_id() {
    let provider = OpenAiProvider::new(
        "openai/gpt-3.5-turbo".to_owned(),
        "gpt-3.5-turbo".to_owned(),
        "test-key".to_owned(),
        reqwest::Client::new(),
    );
    assert_eq!(provider.model_id(), "openai/gpt-3.5-turbo");
}
