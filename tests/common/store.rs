//! Scripted in-memory service store
//!
//! Replays a queue of responses, one per fetch, then keeps returning the
//! fallback. Every fetch is counted so tests can assert on the number of
//! polls and the key they were made with.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use k8s_openapi::api::core::v1::Service;
use kube::core::ErrorResponse;
use mongodb_operator::resources::ServiceStore;

#[allow(dead_code)]
pub struct ScriptedStore {
    script: Mutex<VecDeque<Result<Service, kube::Error>>>,
    fallback: Service,
    calls: AtomicUsize,
    keys: Mutex<Vec<(String, String)>>,
}

#[allow(dead_code)]
impl ScriptedStore {
    /// Always answers with `svc`
    pub fn constant(svc: Service) -> Self {
        Self::scripted(Vec::new(), svc)
    }

    /// Answers with `script` in order, then with `fallback`
    pub fn scripted(script: Vec<Result<Service, kube::Error>>, fallback: Service) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
            keys: Mutex::new(Vec::new()),
        }
    }

    /// Number of fetches observed
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// (name, namespace) of every fetch, in order
    pub fn keys(&self) -> Vec<(String, String)> {
        self.keys.lock().unwrap().clone()
    }
}

impl ServiceStore for ScriptedStore {
    async fn get_service(&self, name: &str, namespace: &str) -> Result<Service, kube::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.keys
            .lock()
            .unwrap()
            .push((name.to_string(), namespace.to_string()));

        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// An API error as the client would surface it
#[allow(dead_code)]
pub fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} error", reason),
        reason: reason.to_string(),
        code,
    })
}
