use std::io::Read;
use std::sync::mpsc::{self, Receiver};
use std::thread;

use anyhow::Result;
use presenton_kernel::llm::{list_available_models, LlmClient, LlmMessage, OpenAiCompatibleClient};
use presenton_kernel::ApiError;
use serde_json::{json, Value};
use tiny_http::{Header, Response, Server};

struct Recorded {
    method: String,
    url: String,
    authorization: Option<String>,
    body: Value,
}

/// Serves `responses` in order from a local port, one request each, and
/// reports what it received.
fn fake_provider(responses: Vec<(u16, String)>) -> (String, Receiver<Recorded>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        for (status, body) in responses {
            let Ok(mut request) = server.recv() else {
                return;
            };
            let mut raw = String::new();
            let _ = request.as_reader().read_to_string(&mut raw);
            let authorization = request
                .headers()
                .iter()
                .find(|h| h.field.equiv("Authorization"))
                .map(|h| h.value.to_string());
            let _ = sender.send(Recorded {
                method: request.method().as_str().to_string(),
                url: request.url().to_string(),
                authorization,
                body: serde_json::from_str(&raw).unwrap_or(Value::Null),
            });
            let response = Response::from_string(body)
                .with_status_code(status)
                .with_header(Header::from_bytes("Content-Type", "application/json").unwrap());
            let _ = request.respond(response);
        }
    });
    (format!("http://127.0.0.1:{port}"), receiver)
}

fn completion(content: &str) -> String {
    json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] }).to_string()
}

fn messages() -> Vec<LlmMessage> {
    vec![LlmMessage::system("be brief"), LlmMessage::user("outline")]
}

#[test]
fn posts_json_schema_request() -> Result<()> {
    let (url, requests) = fake_provider(vec![(200, completion("```json\n{\"title\": \"Hi\"}\n```"))]);
    let client = OpenAiCompatibleClient::new(format!("{url}/v1/"), Some("sk-test".to_string()));
    let schema = json!({
        "type": "object",
        "properties": { "title": { "type": "string", "format": "uri" } }
    });

    let answer = client.generate_structured("qwen-plus", &messages(), &schema, true)?;
    assert_eq!(answer, json!({ "title": "Hi" }));

    let seen = requests.recv()?;
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.url, "/v1/chat/completions");
    assert_eq!(seen.authorization.as_deref(), Some("Bearer sk-test"));
    assert_eq!(seen.body["model"], "qwen-plus");
    assert_eq!(seen.body["messages"][0], json!({ "role": "system", "content": "be brief" }));
    let format = &seen.body["response_format"];
    assert_eq!(format["type"], "json_schema");
    assert_eq!(format["json_schema"]["name"], "response");
    assert_eq!(format["json_schema"]["strict"], true);
    assert_eq!(format["json_schema"]["schema"]["additionalProperties"], false);
    assert_eq!(format["json_schema"]["schema"]["required"], json!(["title"]));
    assert!(format["json_schema"]["schema"]
        .pointer("/properties/title/format")
        .is_none());
    Ok(())
}

#[test]
fn lenient_requests_keep_schema() -> Result<()> {
    let (url, requests) = fake_provider(vec![(200, completion("{\"n\": 1}"))]);
    let client = OpenAiCompatibleClient::new(url, None);
    let schema = json!({ "type": "object", "properties": { "n": { "type": "integer" } } });
    client.generate_structured("llama3.2:3b", &messages(), &schema, false)?;

    let seen = requests.recv()?;
    assert_eq!(seen.authorization, None);
    assert_eq!(seen.body["response_format"]["json_schema"]["schema"], schema);
    Ok(())
}

#[test]
fn upstream_errors_become_bad_gateway() {
    let (url, _requests) = fake_provider(vec![(429, "{\"error\":\"rate limited\"}".to_string())]);
    let client = OpenAiCompatibleClient::new(url, Some("k".to_string()));
    let err = client
        .generate_structured("m", &messages(), &json!({ "type": "object" }), false)
        .unwrap_err();
    let api = err.downcast_ref::<ApiError>().unwrap();
    assert_eq!(api.status, 502);
    assert!(api.detail.contains("429"));
    assert!(api.detail.contains("rate limited"));
}

#[test]
fn lists_models_from_provider() -> Result<()> {
    let (url, requests) = fake_provider(vec![
        (200, json!({ "object": "list", "data": [{ "id": "qwen-plus" }, { "id": "qwen-max" }] }).to_string()),
        (401, "{}".to_string()),
    ]);

    let models = list_available_models(&format!("{url}///"), "sk-models")?;
    assert_eq!(models, vec!["qwen-plus", "qwen-max"]);
    let seen = requests.recv()?;
    assert_eq!(seen.method, "GET");
    assert_eq!(seen.url, "/models");
    assert_eq!(seen.authorization.as_deref(), Some("Bearer sk-models"));

    let err = list_available_models(&url, "bad-key").unwrap_err();
    let api = err.downcast_ref::<ApiError>().unwrap();
    assert_eq!(api.status, 401);
    assert!(api.detail.starts_with("Failed to fetch models"));
    Ok(())
}
