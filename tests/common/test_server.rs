use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use codepad::auth::TokenGenerator;
use codepad::error::Result;
use codepad::exec::{Executor, Submission};
use codepad::notify::{Notification, Notifier};
use codepad::server::{AppState, create_router};
use codepad::store::{SqliteStore, Store};

/// Records notifications instead of sending them.
#[derive(Default)]
pub struct Outbox {
    sent: Mutex<Vec<Notification>>,
}

impl Outbox {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("outbox lock").clone()
    }
}

#[async_trait]
impl Notifier for Outbox {
    async fn send(&self, notification: &Notification) -> Result<()> {
        self.sent
            .lock()
            .expect("outbox lock")
            .push(notification.clone());
        Ok(())
    }
}

/// Echoes the submitted source back as stdout.
pub struct EchoExecutor;

#[async_trait]
impl Executor for EchoExecutor {
    async fn submit(&self, source: &str, language_id: u32) -> Result<Submission> {
        Ok(Submission {
            stdout: Some(format!("[{language_id}] {source}")),
            ..Submission::default()
        })
    }
}

/// An in-process server on a random local port.
pub struct TestServer {
    pub temp_dir: TempDir,
    pub addr: SocketAddr,
    pub base_url: String,
    pub admin_token: String,
    pub store: Arc<SqliteStore>,
    pub outbox: Arc<Outbox>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let store =
            Arc::new(SqliteStore::new(temp_dir.path().join("codepad.db")).expect("open db"));
        store.initialize().expect("initialize db");

        let issued = TokenGenerator::new()
            .issue(None, None)
            .expect("issue admin token");
        store.create_token(&issued.token).expect("store admin token");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let base_url = format!("http://{addr}");

        let outbox = Arc::new(Outbox::default());
        let dyn_store: Arc<dyn Store> = store.clone();
        let state = AppState::new(dyn_store, base_url.clone())
            .with_notifier(outbox.clone())
            .with_executor(Arc::new(EchoExecutor));
        let app = create_router(Arc::new(state));

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            temp_dir,
            addr,
            base_url,
            admin_token: issued.raw,
            store,
            outbox,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}/api/v1{}", self.addr, path)
    }

    /// Registers an identity `<uid>@example.com` and returns a token for it.
    pub async fn create_identity(&self, uid: &str) -> String {
        let client = reqwest::Client::new();

        let resp = client
            .post(self.url("/admin/identities"))
            .bearer_auth(&self.admin_token)
            .json(&serde_json::json!({
                "uid": uid,
                "email": format!("{uid}@example.com"),
                "display_name": uid,
            }))
            .send()
            .await
            .expect("create identity");
        assert_eq!(resp.status(), 201, "create identity {uid}");

        let resp: Value = client
            .post(self.url(&format!("/admin/identities/{uid}/tokens")))
            .bearer_auth(&self.admin_token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .expect("create token")
            .json()
            .await
            .expect("parse token response");

        resp["data"]["token"]
            .as_str()
            .expect("token in response")
            .to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
