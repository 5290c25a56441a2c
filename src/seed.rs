use crate::context::AppContext;
use crate::dispatch::{HandlerRequest, HandlerResponse, RequestHandler};
use crate::persist::PersistenceHandle;
use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Echoes the request back; handy for poking at freshly reloaded routes.
pub struct EchoHandler;

#[async_trait]
impl RequestHandler for EchoHandler {
    async fn call(
        &self,
        operation: &str,
        request: HandlerRequest,
    ) -> anyhow::Result<HandlerResponse> {
        Ok(HandlerResponse::ok(json!({
            "operation": operation,
            "method": request.method.as_str(),
            "path": request.path,
            "params": request.params,
            "query": request.query,
            "body": request.body,
        })))
    }
}

/// Note CRUD over the live persistence unit: stores whatever JSON it is
/// given under the `Note` entity type.
pub struct NoteHandler {
    persistence: Arc<PersistenceHandle>,
}

impl NoteHandler {
    pub fn new(persistence: Arc<PersistenceHandle>) -> Self {
        Self { persistence }
    }
}

#[async_trait]
impl RequestHandler for NoteHandler {
    async fn call(
        &self,
        operation: &str,
        request: HandlerRequest,
    ) -> anyhow::Result<HandlerResponse> {
        let session = self.persistence.create_session();
        match operation {
            "create" => {
                let id = Uuid::new_v4().to_string();
                let mut note = request.body;
                if let Some(obj) = note.as_object_mut() {
                    obj.insert("id".to_string(), json!(id));
                }
                session.save("Note", &id, note.clone())?;
                Ok(HandlerResponse::with_status(201, note))
            }
            "list" => Ok(HandlerResponse::ok(json!(session.list("Note")?))),
            "get" => {
                let Some(id) = request.params.get("id") else {
                    return Ok(HandlerResponse::with_status(400, json!({"error": "missing id"})));
                };
                match session.find("Note", id)? {
                    Some(note) => Ok(HandlerResponse::ok(note)),
                    None => Ok(HandlerResponse::with_status(404, json!({"error": "not found"}))),
                }
            }
            other => Ok(HandlerResponse::with_status(
                400,
                json!({"error": format!("unknown operation '{other}'")}),
            )),
        }
    }
}

/// Register the demo handler beans.
pub fn install_demo_beans(context: &AppContext, persistence: &Arc<PersistenceHandle>) {
    context.register_handler("echo", Arc::new(EchoHandler));
    context.register_handler("notes", Arc::new(NoteHandler::new(persistence.clone())));
}

/// Drop a sample compiled module into a watched root so a fresh checkout has
/// something to serve (and to recompile by hand).
pub fn write_demo_module(root: &Path) -> std::io::Result<PathBuf> {
    let manifest = json!({
        "endpoints": [
            {"method": "POST", "path": "/notes", "handler": "notes", "operation": "create"},
            {"method": "GET", "path": "/notes", "handler": "notes", "operation": "list"},
            {"method": "GET", "path": "/notes/{id}", "handler": "notes", "operation": "get"},
            {"method": "GET", "path": "/echo", "handler": "echo", "operation": "echo"}
        ],
        "entities": ["Note"]
    });
    std::fs::create_dir_all(root)?;
    let path = root.join("demo.module");
    std::fs::write(&path, serde_json::to_string_pretty(&manifest)?)?;
    Ok(path)
}
