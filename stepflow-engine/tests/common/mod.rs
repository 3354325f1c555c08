#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use stepflow_core::types::{
    SourceDescription, Step, Workflow, WorkflowDocument,
};
use stepflow_engine::auth::CredentialProvider;
use stepflow_engine::{
    HttpClient, HttpError, HttpRequest, HttpResponse, ResolvedOperation, StaticOperationResolver,
    WorkflowEngine,
};

type Handler = Box<dyn Fn(usize, &HttpRequest) -> Result<HttpResponse, HttpError> + Send + Sync>;

/// Test double for the transport: every request is recorded, numbered,
/// and answered by the scripted handler.
pub struct ScriptedClient {
    handler: Handler,
    requests: Mutex<Vec<HttpRequest>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedClient {
    pub fn new(
        handler: impl Fn(usize, &HttpRequest) -> Result<HttpResponse, HttpError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        })
    }

    /// Like [`new`], but every send pauses first, so concurrent callers
    /// genuinely overlap.
    pub fn with_delay(
        delay: Duration,
        handler: impl Fn(usize, &HttpRequest) -> Result<HttpResponse, HttpError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn request(&self, index: usize) -> HttpRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl HttpClient for ScriptedClient {
    async fn send(&self, req: HttpRequest, _timeout: Duration) -> Result<HttpResponse, HttpError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(req.clone());
        (self.handler)(n, &req)
    }
}

pub fn json_response(status: u16, body: JsonValue) -> HttpResponse {
    let mut headers = BTreeMap::new();
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    HttpResponse {
        status,
        headers,
        body: body.to_string().into_bytes(),
    }
}

pub fn source() -> SourceDescription {
    SourceDescription {
        name: "api".to_string(),
        url: "https://api.test/openapi.json".to_string(),
        base_url: "https://api.test".to_string(),
        security: Vec::new(),
    }
}

pub fn document(workflows: Vec<Workflow>) -> WorkflowDocument {
    WorkflowDocument {
        source_descriptions: vec![source()],
        workflows,
    }
}

pub fn workflow(id: &str, steps: Vec<Step>) -> Workflow {
    Workflow {
        workflow_id: id.to_string(),
        summary: None,
        inputs: Vec::new(),
        depends_on: Vec::new(),
        steps,
        outputs: BTreeMap::new(),
    }
}

pub fn step(id: &str, operation_id: &str) -> Step {
    Step {
        step_id: id.to_string(),
        description: None,
        operation_id: Some(operation_id.to_string()),
        operation_path: None,
        workflow_id: None,
        parameters: Vec::new(),
        request_body: None,
        success_criteria: Vec::new(),
        on_success: Vec::new(),
        on_failure: Vec::new(),
        outputs: BTreeMap::new(),
    }
}

pub fn get_op(path: &str) -> ResolvedOperation {
    ResolvedOperation {
        method: "GET".to_string(),
        path: path.to_string(),
        security: Vec::new(),
    }
}

pub fn post_op(path: &str) -> ResolvedOperation {
    ResolvedOperation {
        method: "POST".to_string(),
        path: path.to_string(),
        security: Vec::new(),
    }
}

pub fn engine(
    doc: WorkflowDocument,
    resolver: StaticOperationResolver,
    client: Arc<ScriptedClient>,
) -> WorkflowEngine {
    let provider = CredentialProvider::new(client.clone(), Default::default());
    WorkflowEngine::new(doc, Arc::new(resolver), client, Arc::new(provider))
}
