use std::sync::Arc;

use axum::extract::Extension;
use axum::response::sse::{self, Sse};
use axum::Json;
use serde::Deserialize;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

use crate::application::Application;
use crate::driver::TaskDriver;

use super::types::Result;

#[derive(Debug, Deserialize)]
pub struct TaskRequest {
    pub task: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub max_steps: Option<usize>,
}

/// Runs one task to completion against a session, streaming every
/// `DriverEvent` the OODA loop emits as a server-sent event. A missing
/// `session_id` gets a fresh uuid; the same id can be reused across calls
/// to keep accumulating `SessionState`.
pub async fn task(
    Extension(app): Extension<Application>,
    Json(request): Json<TaskRequest>,
) -> Result<Sse<impl tokio_stream::Stream<Item = anyhow::Result<sse::Event>>>> {
    let session_id = request.session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let session = app.sessions.get_or_create(&session_id).await?;

    let max_driver_steps = request.max_steps.unwrap_or(app.config.max_driver_steps);
    let driver = Arc::new(TaskDriver::new(
        app.reasoning.clone(),
        app.dispatcher.clone(),
        app.discovery.clone(),
        app.handlers.clone(),
        max_driver_steps,
    ));

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        driver.run(&request.task, session, tx).await;
    });

    let stream = UnboundedReceiverStream::new(rx).map(|event| {
        sse::Event::default()
            .json_data(event)
            .map_err(anyhow::Error::new)
    });

    Ok(Sse::new(stream))
}
