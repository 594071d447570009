//! Stateful fake control plane served by Wiremock.
//!
//! The fake tracks registered repositories and applications and behaves like
//! the delivery controller for the refspec scenarios: a revision under
//! `refs/hidden/` only resolves once a repository refspec fetches it, and a
//! synced application reports `Running` for a configurable number of reads
//! before `Succeeded`. Reads can be made to fail with `503` to simulate an
//! outage.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Value, json};
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const API_PREFIX: &str = "/api/v1/";
const HIDDEN_REVISION: &str = "hidden-gem";
const HIDDEN_SOURCE_REF: &str = "refs/hidden/gem";

#[derive(Debug, Default)]
struct FakeApplication {
    repo_url: String,
    synced: bool,
    reads_since_sync: u32,
}

#[derive(Debug, Default)]
struct FakeState {
    refspecs: HashMap<String, Vec<String>>,
    applications: HashMap<String, FakeApplication>,
    deleted: Vec<String>,
    running_reads: u32,
    failing_reads: u32,
    reads: u32,
    creates: u32,
}

/// Handle to the fake's state; clones share it.
#[derive(Debug, Clone, Default)]
pub struct FakeControlPlane {
    state: Arc<Mutex<FakeState>>,
}

impl FakeControlPlane {
    /// A fake whose synced applications report `Running` for
    /// `running_reads` reads before `Succeeded`.
    pub fn new(running_reads: u32) -> Self {
        let fake = Self::default();
        fake.lock().running_reads = running_reads;
        fake
    }

    /// Makes the next `reads` application reads fail with `503`.
    pub fn fail_next_reads(&self, reads: u32) {
        self.lock().failing_reads = reads;
    }

    /// Mounts the fake as the only responder on `server`.
    pub async fn mount(&self, server: &MockServer) {
        Mock::given(any())
            .respond_with(self.clone())
            .mount(server)
            .await;
    }

    /// Names of applications that currently exist.
    pub fn application_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().applications.keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of deleted applications, in deletion order.
    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    /// Refspecs last registered for `repo_url`.
    pub fn refspecs_for(&self, repo_url: &str) -> Vec<String> {
        self.lock()
            .refspecs
            .get(repo_url)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of application reads served, failed ones included.
    pub fn reads(&self) -> u32 {
        self.lock().reads
    }

    /// Number of create requests received.
    pub fn creates(&self) -> u32 {
        self.lock().creates
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Respond for FakeControlPlane {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Some(route) = request.url.path().strip_prefix(API_PREFIX) else {
            return not_found("route");
        };
        let segments: Vec<&str> = route.split('/').filter(|part| !part.is_empty()).collect();
        let body: Value = request.body_json().unwrap_or(Value::Null);
        let mut state = self.lock();

        match (request.method.as_str(), segments.as_slice()) {
            ("POST", ["repositories"]) => register_repository(&mut state, &body),
            ("POST", ["applications"]) => create_application(&mut state, &body),
            ("POST", ["applications", name, "sync"]) => sync_application(&mut state, name),
            ("GET", ["applications", name]) => read_application(&mut state, name),
            ("DELETE", ["applications", name]) => delete_application(&mut state, name),
            _ => not_found("route"),
        }
    }
}

fn register_repository(state: &mut FakeState, body: &Value) -> ResponseTemplate {
    let repo = text(body, "/repo").to_owned();
    let refspecs = body
        .pointer("/fetchRefspecs")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    state.refspecs.insert(repo.clone(), refspecs);
    ResponseTemplate::new(200).set_body_json(json!({ "repo": repo }))
}

fn create_application(state: &mut FakeState, body: &Value) -> ResponseTemplate {
    state.creates += 1;
    let name = text(body, "/metadata/name").to_owned();
    let repo_url = text(body, "/spec/source/repoURL").to_owned();
    let revision = text(body, "/spec/source/targetRevision");

    if revision == HIDDEN_REVISION && !fetches_hidden_ref(state, &repo_url) {
        return rejected(
            400,
            3,
            &format!(
                "application spec for {name} is invalid: InvalidSpecError: \
                 Unable to resolve '{HIDDEN_REVISION}' to a commit SHA"
            ),
        );
    }
    if state.applications.contains_key(&name) {
        return rejected(400, 6, &format!("application {name} already exists"));
    }

    state.applications.insert(
        name.clone(),
        FakeApplication {
            repo_url,
            ..FakeApplication::default()
        },
    );
    ResponseTemplate::new(200).set_body_json(json!({ "metadata": { "name": name } }))
}

fn fetches_hidden_ref(state: &FakeState, repo_url: &str) -> bool {
    state.refspecs.get(repo_url).is_some_and(|refspecs| {
        refspecs
            .iter()
            .any(|refspec| refspec.trim_start_matches('+').starts_with(HIDDEN_SOURCE_REF))
    })
}

fn sync_application(state: &mut FakeState, name: &str) -> ResponseTemplate {
    let Some(application) = state.applications.get_mut(name) else {
        return not_found(name);
    };
    application.synced = true;
    application.reads_since_sync = 0;
    ResponseTemplate::new(200).set_body_json(json!({ "metadata": { "name": name } }))
}

fn read_application(state: &mut FakeState, name: &str) -> ResponseTemplate {
    state.reads += 1;
    if state.failing_reads > 0 {
        state.failing_reads -= 1;
        return ResponseTemplate::new(503).set_body_string("upstream connect error");
    }

    let running_reads = state.running_reads;
    let Some(application) = state.applications.get_mut(name) else {
        return not_found(name);
    };

    let (sync, health, operation) = if application.synced {
        application.reads_since_sync += 1;
        let (phase, message) = if application.reads_since_sync > running_reads {
            ("Succeeded", "successfully synced (all tasks run)")
        } else {
            ("Running", "one or more tasks are running")
        };
        (
            "Synced",
            "Healthy",
            json!({ "phase": phase, "message": message }),
        )
    } else {
        ("OutOfSync", "Missing", Value::Null)
    };

    ResponseTemplate::new(200).set_body_json(json!({
        "metadata": { "name": name },
        "spec": { "source": { "repoURL": application.repo_url } },
        "status": {
            "operationState": operation,
            "sync": { "status": sync },
            "health": { "status": health },
        },
    }))
}

fn delete_application(state: &mut FakeState, name: &str) -> ResponseTemplate {
    if state.applications.remove(name).is_none() {
        return not_found(name);
    }
    state.deleted.push(name.to_owned());
    ResponseTemplate::new(200).set_body_json(json!({}))
}

fn text<'body>(body: &'body Value, pointer: &str) -> &'body str {
    body.pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn rejected(status: u16, code: i32, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "error": message,
        "code": code,
        "message": message,
    }))
}

fn not_found(resource: &str) -> ResponseTemplate {
    rejected(404, 5, &format!("{resource} not found"))
}
