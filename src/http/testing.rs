//! Scripted transport for driving deterministic interleavings in unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::{ApiRequest, ApiResponse, Transport};
use crate::error::CellarError;

type Responder = Box<dyn Fn(&ApiRequest) -> Result<ApiResponse, CellarError> + Send + Sync>;

pub(crate) struct ScriptedTransport {
    respond: Responder,
    held: Mutex<HashMap<String, Arc<Semaphore>>>,
    log: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new(
        respond: impl Fn(&ApiRequest) -> Result<ApiResponse, CellarError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            held: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Park every request to `path` until a permit is added to the returned semaphore.
    pub(crate) fn hold(&self, path: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.held
            .lock()
            .unwrap()
            .insert(path.to_string(), gate.clone());
        gate
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.log.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, path: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.path == path)
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, CellarError> {
        self.log.lock().unwrap().push(request.clone());
        let gate = self.held.lock().unwrap().get(&request.path).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        (self.respond)(&request)
    }
}

pub(crate) fn json_response(status: u16, body: serde_json::Value) -> Result<ApiResponse, CellarError> {
    Ok(ApiResponse::new(status, body.to_string()))
}

pub(crate) fn user_body(email: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "5b0f6d6e-9d43-4d5e-8a3c-0c7f3c1a9e11",
        "email": email,
        "full_name": "Ana Pérez",
        "is_active": true,
        "is_superuser": false,
        "created_at": "2024-03-01T10:00:00Z",
        "updated_at": "2024-03-01T10:00:00Z"
    })
}

pub(crate) fn user(email: &str) -> crate::types::User {
    serde_json::from_value(user_body(email)).expect("fixture user")
}
