//! Ollama 后端对接本地假服务器：NDJSON 流、健康探测、模型列表、错误映射

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use pixelprompt::agent::{Agent, AnimationConfig, Vec2, WorldBounds};
use pixelprompt::core::{
    user_facing_message, Delivery, ErrorKind, InferenceOrchestrator, OrchestratorOptions,
    ProviderError, ResponseRouter,
};
use pixelprompt::llm::{ChatOptions, LlmProvider, OllamaProvider, ProviderRegistry};
use pixelprompt::memory::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

type Handler = Arc<dyn Fn(&str, &str) -> (u16, String) + Send + Sync>;

/// 启动只处理固定路由的 HTTP/1.1 服务器；返回 base_url 与收到的请求体
async fn serve(handler: Handler) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&bodies);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let handler = Arc::clone(&handler);
            let seen = Arc::clone(&seen);
            tokio::spawn(async move {
                let Some((method, path, body)) = read_request(&mut socket).await else {
                    return;
                };
                seen.lock().unwrap().push(body);
                let (status, payload) = handler(&method, &path);
                let reason = match status {
                    200 => "OK",
                    404 => "Not Found",
                    _ => "Error",
                };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: application/x-ndjson\r\nConnection: close\r\n\r\n{payload}"
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{addr}"), bodies)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<(String, String, String)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        let Some(header_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let head = &text[..header_end];
        let content_length = head
            .lines()
            .find_map(|l| {
                let lower = l.to_ascii_lowercase();
                lower
                    .strip_prefix("content-length:")
                    .map(|v| v.trim().parse::<usize>().unwrap_or(0))
            })
            .unwrap_or(0);
        let body_start = header_end + 4;
        if buf.len() < body_start + content_length {
            continue;
        }
        let mut first = head.lines().next()?.split_whitespace();
        let method = first.next()?.to_string();
        let path = first.next()?.to_string();
        let body = String::from_utf8_lossy(&buf[body_start..body_start + content_length]).to_string();
        return Some((method, path, body));
    }
}

fn provider(base_url: &str) -> OllamaProvider {
    OllamaProvider::new(Some(base_url), Duration::from_secs(5)).unwrap()
}

async fn collect(p: &OllamaProvider, model: &str) -> Result<Vec<String>, ProviderError> {
    let messages = vec![Message::system("be brief"), Message::user("hi")];
    let mut stream = p.send_message(&messages, model, &ChatOptions::default()).await?;
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.push(chunk?);
    }
    Ok(out)
}

const HELLO_STREAM: &str = concat!(
    "{\"model\":\"m\",\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n",
    "{\"model\":\"m\",\"message\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n",
    "{\"model\":\"m\",\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n",
    "{\"model\":\"m\",\"message\":{\"role\":\"assistant\",\"content\":\"after done\"},\"done\":false}\n",
);

#[tokio::test]
async fn test_streams_chunks_until_done() {
    let (base, bodies) = serve(Arc::new(|_: &str, path: &str| match path {
        "/api/chat" => (200, HELLO_STREAM.to_string()),
        _ => (404, String::new()),
    }))
    .await;

    let chunks = collect(&provider(&base), "m").await.unwrap();
    assert_eq!(chunks, vec!["Hel", "lo"]);

    let body: serde_json::Value = serde_json::from_str(&bodies.lock().unwrap()[0]).unwrap();
    assert_eq!(body["model"], "m");
    assert_eq!(body["stream"], true);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["role"], "user");
    assert_eq!(body["messages"][1]["content"], "hi");
    assert!(body.get("options").is_none());
}

#[tokio::test]
async fn test_stops_after_repeated_parse_failures() {
    let (base, _) = serve(Arc::new(|_: &str, _: &str| {
        (
            200,
            concat!(
                "{\"message\":{\"content\":\"Hi\"},\"done\":false}\n",
                "garbage\n",
                "{not json\n",
                "still bad\n",
                "{\"message\":{\"content\":\"ignored\"},\"done\":false}\n",
            )
            .to_string(),
        )
    }))
    .await;

    let chunks = collect(&provider(&base), "m").await.unwrap();
    assert_eq!(chunks, vec!["Hi"]);
}

#[tokio::test]
async fn test_missing_model_maps_to_model_not_found() {
    let (base, _) = serve(Arc::new(|_: &str, _: &str| {
        (404, "{\"error\":\"model 'llama3.2:3b' not found\"}".to_string())
    }))
    .await;

    let err = collect(&provider(&base), "llama3.2:3b").await.unwrap_err();
    assert_eq!(
        err,
        ProviderError::ModelNotFound("Model 'llama3.2:3b' not found. Run: ollama pull llama3.2:3b".into())
    );
}

#[tokio::test]
async fn test_health_check_and_model_list() {
    let (base, _) = serve(Arc::new(|method: &str, path: &str| match (method, path) {
        ("GET", "/api/tags") => (
            200,
            "{\"models\":[{\"name\":\"llama3.2:3b\"},{\"name\":\"qwen2.5:7b\"}]}".to_string(),
        ),
        _ => (404, String::new()),
    }))
    .await;

    let p = provider(&base);
    assert!(p.is_available().await);
    assert_eq!(p.list_models().await, vec!["llama3.2:3b", "qwen2.5:7b"]);
}

#[tokio::test]
async fn test_unreachable_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let p = provider(&format!("http://{addr}"));
    assert!(!p.is_available().await);
    assert!(p.list_models().await.is_empty());
    let err = collect(&p, "m").await.unwrap_err();
    assert!(matches!(err, ProviderError::Unreachable(_)), "got {err:?}");
}

#[tokio::test]
async fn test_error_line_in_stream_fails_request() {
    let (base, _) = serve(Arc::new(|_: &str, _: &str| {
        (
            200,
            concat!(
                "{\"message\":{\"content\":\"par\"},\"done\":false}\n",
                "{\"error\":\"out of memory\"}\n",
            )
            .to_string(),
        )
    }))
    .await;

    let err = collect(&provider(&base), "m").await.unwrap_err();
    assert_eq!(err, ProviderError::Stream("out of memory".into()));
}

/// 接受连接后不再推进：`head` 为 None 时一个字节也不回；否则读完请求、写出 head 后挂起
async fn stalling_server(head: Option<&'static str>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((mut socket, _)) = listener.accept().await {
            if let Some(head) = head {
                if read_request(&mut socket).await.is_some() {
                    let _ = socket.write_all(head.as_bytes()).await;
                }
            }
            held.push(socket);
        }
    });
    format!("http://{addr}")
}

fn assert_timed_out(err: &ProviderError) {
    assert!(matches!(err, ProviderError::Timeout(_)), "got {err:?}");
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(user_facing_message(err.kind(), &err.to_string()), "Request timed out");
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let base = stalling_server(None).await;
    let p = OllamaProvider::new(Some(&base), Duration::from_secs(1)).unwrap();

    let started = std::time::Instant::now();
    let err = collect(&p, "m").await.unwrap_err();
    assert_timed_out(&err);
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_stalled_body_times_out() {
    let base = stalling_server(Some(concat!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\nConnection: close\r\n\r\n",
        "{\"message\":{\"content\":\"par\"},\"done\":false}\n",
    )))
    .await;
    let p = OllamaProvider::new(Some(&base), Duration::from_secs(1)).unwrap();

    let messages = vec![Message::user("hi")];
    let mut stream = p.send_message(&messages, "m", &ChatOptions::default()).await.unwrap();
    assert_eq!(stream.next().await, Some(Ok("par".to_string())));

    let err = stream.next().await.unwrap().unwrap_err();
    assert_timed_out(&err);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_chat_options_reach_backend_through_router() {
    let (base, bodies) = serve(Arc::new(|_: &str, path: &str| match path {
        "/api/tags" => (200, "{\"models\":[]}".to_string()),
        "/api/chat" => (200, HELLO_STREAM.to_string()),
        _ => (404, String::new()),
    }))
    .await;

    let mut registry = ProviderRegistry::new();
    registry.insert("ollama", Arc::new(provider(&base)));
    let options = OrchestratorOptions {
        poll_interval: Duration::from_millis(50),
        ..OrchestratorOptions::default()
    };
    let mut router = ResponseRouter::new(InferenceOrchestrator::new(Arc::new(registry), options))
        .with_chat_options(ChatOptions {
            temperature: Some(0.5),
            num_predict: Some(64),
        });
    router.orchestrator_mut().start().unwrap();

    let mut agents = vec![Agent::new(
        "a1",
        "Pixel",
        Vec2::new(300.0, 300.0),
        WorldBounds::default(),
        AnimationConfig::default(),
    )
    .with_provider("ollama", "m")
    .with_seed(5)];
    router.on_user_message(&mut agents, "a1", "hi");

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    let mut deliveries = Vec::new();
    while deliveries.is_empty() && std::time::Instant::now() < deadline {
        deliveries = router.drain(&mut agents);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        deliveries,
        vec![Delivery::Reply { agent_id: "a1".into(), text: "Hello".into() }]
    );

    let chat_body = bodies
        .lock()
        .unwrap()
        .iter()
        .find(|b| !b.is_empty())
        .cloned()
        .unwrap();
    let body: serde_json::Value = serde_json::from_str(&chat_body).unwrap();
    assert_eq!(body["options"]["temperature"], 0.5);
    assert_eq!(body["options"]["num_predict"], 64);
    assert!(router.orchestrator_mut().stop(Duration::from_secs(2)));
}
