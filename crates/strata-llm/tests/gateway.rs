//! End-to-end gateway behavior against in-process providers

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;
use strata_llm::metrics::ProviderMetrics;
use strata_llm::types::{ContentBlock, Message, Role, Usage};
use strata_llm::{
    Completion, CompletionRequest, CompletionResponse, EventStream, GatewayError, ModelAttempts, Provider,
    ProviderCapabilities, ProviderRegistry, RetryPolicy, StreamEvent,
};

/// Provider that replays a scripted unified event sequence
struct ScriptedProvider {
    name: String,
    models: Vec<String>,
    script: Vec<Result<StreamEvent, GatewayError>>,
    metrics: Arc<ProviderMetrics>,
}

impl ScriptedProvider {
    fn new(name: &str, models: &[&str], script: Vec<Result<StreamEvent, GatewayError>>) -> Self {
        Self {
            name: name.to_owned(),
            models: models.iter().map(|&m| m.to_owned()).collect(),
            script,
            metrics: Arc::new(ProviderMetrics::new(name)),
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            streaming: true,
            tool_calling: true,
            reasoning: false,
        }
    }

    fn models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn metrics(&self) -> Arc<ProviderMetrics> {
        Arc::clone(&self.metrics)
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, GatewayError> {
        Ok(CompletionResponse {
            id: "scripted-1".to_owned(),
            model: request.model.clone(),
            content: vec![ContentBlock::Text { text: "ok".to_owned() }],
            stop_reason: None,
            usage: None,
        })
    }

    async fn complete_stream(&self, _request: &CompletionRequest) -> Result<EventStream, GatewayError> {
        let script: Vec<_> = self
            .script
            .iter()
            .map(|item| match item {
                Ok(event) => Ok(event.clone()),
                Err(e) => Err(GatewayError::Streaming(e.to_string())),
            })
            .collect();
        Ok(Box::pin(futures_util::stream::iter(script)))
    }
}

fn tool_call_script() -> Vec<Result<StreamEvent, GatewayError>> {
    vec![
        Ok(StreamEvent::ThinkingDelta {
            text: "planning".to_owned(),
        }),
        Ok(StreamEvent::ContentDelta { text: "Let me ".to_owned() }),
        Ok(StreamEvent::ContentDelta { text: "check.".to_owned() }),
        Ok(StreamEvent::ToolCallStart {
            id: "tu_1".to_owned(),
            name: "read_file".to_owned(),
        }),
        Ok(StreamEvent::ToolCallDelta {
            id: "tu_1".to_owned(),
            fragment: "{\"path\": \"a.txt\"}".to_owned(),
        }),
        Ok(StreamEvent::ToolCallComplete {
            id: "tu_1".to_owned(),
            name: "read_file".to_owned(),
            arguments: json!({"path": "a.txt"}),
        }),
        Ok(StreamEvent::Usage(Usage {
            prompt_tokens: 12,
            completion_tokens: 34,
        })),
        Ok(StreamEvent::Done { finish_reason: None }),
    ]
}

#[tokio::test]
async fn streaming_call_yields_unified_event_sequence() {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(ScriptedProvider::new("scripted", &["model-a"], tool_call_script())));

    let mut request = CompletionRequest::new("model-a", vec![Message::text(Role::User, "read a.txt")]);
    request.stream = true;

    let Completion::Stream(mut stream) = registry.create_completion(request, None).await.unwrap() else {
        panic!("expected a stream");
    };

    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event.unwrap());
    }

    assert_eq!(events.len(), 8);
    assert!(matches!(&events[0], StreamEvent::ThinkingDelta { .. }));
    assert!(matches!(&events[3], StreamEvent::ToolCallStart { id, .. } if id == "tu_1"));
    assert!(matches!(
        &events[5],
        StreamEvent::ToolCallComplete { arguments, .. } if *arguments == json!({"path": "a.txt"})
    ));
    assert!(matches!(events.last().unwrap(), StreamEvent::Done { .. }));
}

#[tokio::test]
async fn stream_failure_ends_with_one_terminal_error() {
    let script = vec![
        Ok(StreamEvent::ContentDelta { text: "par".to_owned() }),
        Err(GatewayError::Streaming("connection reset".to_owned())),
    ];
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(ScriptedProvider::new("scripted", &["model-a"], script)));

    let mut request = CompletionRequest::new("model-a", vec![Message::text(Role::User, "hi")]);
    request.stream = true;

    let Completion::Stream(stream) = registry.create_completion(request, None).await.unwrap() else {
        panic!("expected a stream");
    };

    let items: Vec<_> = stream.collect().await;
    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert!(matches!(&items[1], Err(GatewayError::Streaming(_))));
}

#[tokio::test]
async fn unknown_model_fails_fast_with_routing_error() {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(ScriptedProvider::new("scripted", &["model-a"], Vec::new())));

    let request = CompletionRequest::new("model-unknown", vec![Message::text(Role::User, "hi")]);
    let err = registry.create_completion(request, None).await.err().unwrap();
    assert!(matches!(err, GatewayError::NoProviderForModel { .. }));
}

/// The failover contract end to end: a primary model that always
/// throttles, a secondary that succeeds, per-attempt metrics the way the
/// real providers record them.
#[tokio::test(start_paused = true)]
async fn throttled_primary_falls_over_and_counts_every_attempt() {
    let policy = RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(400),
    };
    let metrics = Arc::new(ProviderMetrics::new("failover-test"));
    let attempts = ModelAttempts::new("model-primary", Some("model-secondary".to_owned()));
    let primary_attempts = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&primary_attempts);
    let attempt_metrics = Arc::clone(&metrics);
    let served_by = policy
        .run(&attempts, move |model, _attempt| {
            let counter = Arc::clone(&counter);
            let metrics = Arc::clone(&attempt_metrics);
            async move {
                let start = Instant::now();
                if model == "model-primary" {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let error = GatewayError::Throttled("rate exceeded".to_owned());
                    metrics.record_failure(&error);
                    Err(error)
                } else {
                    metrics.record_success(start.elapsed());
                    Ok(model)
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(served_by, "model-secondary");
    // max_retries + 1 failed attempts against the primary
    assert_eq!(primary_attempts.load(Ordering::SeqCst), 4);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.failures, 4);
    assert_eq!(snapshot.successes, 1);
    assert!(snapshot.healthy);
}
