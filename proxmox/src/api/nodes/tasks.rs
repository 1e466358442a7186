//! Task status polling

use crate::api::{common::TaskId, error::ApiError, Client};
use serde::Deserialize;
use std::time::{Duration, Instant};

pub struct TasksApi<'a> {
    client: &'a Client,
    node: String,
}

impl<'a> TasksApi<'a> {
    pub fn new(client: &'a Client, node: &str) -> Self {
        Self {
            client,
            node: node.to_string(),
        }
    }

    /// GET /api2/json/nodes/{node}/tasks/{upid}/status
    pub async fn status(&self, upid: &TaskId) -> Result<TaskStatus, ApiError> {
        let path = format!(
            "/api2/json/nodes/{}/tasks/{}/status",
            self.node,
            urlencoding::encode(upid.as_str())
        );
        self.client.get(&path).await
    }

    /// Polls until the task stops. A stopped task whose exit status is not
    /// `OK` is reported as [`ApiError::TaskFailed`].
    pub async fn wait(
        &self,
        upid: &TaskId,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<(), ApiError> {
        let deadline = Instant::now() + timeout;

        loop {
            let status = self.status(upid).await?;
            if status.is_stopped() {
                return match status.exitstatus.as_deref() {
                    Some("OK") => {
                        tracing::debug!("Task {} finished", upid);
                        Ok(())
                    }
                    other => Err(ApiError::TaskFailed {
                        upid: upid.to_string(),
                        exit_status: other.unwrap_or("unknown").to_string(),
                    }),
                };
            }

            if Instant::now() + poll_interval > deadline {
                return Err(ApiError::Timeout(timeout.as_secs()));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskStatus {
    pub status: String,
    pub exitstatus: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub node: Option<String>,
}

impl TaskStatus {
    pub fn is_stopped(&self) -> bool {
        self.status == "stopped"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;
    use mockito::Server;

    const UPID: &str = "UPID:pve:00001234:00ABCDEF:65000000:qmstart:100:root@pam:";

    fn status_path() -> String {
        format!(
            "/api2/json/nodes/pve/tasks/{}/status",
            urlencoding::encode(UPID)
        )
    }

    #[tokio::test]
    async fn test_wait_returns_when_task_ok() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("GET", status_path().as_str())
            .with_body(r#"{"data":{"status":"stopped","exitstatus":"OK","type":"qmstart"}}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        client
            .nodes()
            .node("pve")
            .tasks()
            .wait(
                &TaskId(UPID.to_string()),
                Duration::from_secs(5),
                Duration::from_millis(10),
            )
            .await
            .unwrap();
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_wait_reports_failed_task() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", status_path().as_str())
            .with_body(r#"{"data":{"status":"stopped","exitstatus":"can't lock file"}}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let result = client
            .nodes()
            .node("pve")
            .tasks()
            .wait(
                &TaskId(UPID.to_string()),
                Duration::from_secs(5),
                Duration::from_millis(10),
            )
            .await;

        match result {
            Err(ApiError::TaskFailed { exit_status, .. }) => {
                assert_eq!(exit_status, "can't lock file")
            }
            other => panic!("expected TaskFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wait_times_out_on_running_task() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", status_path().as_str())
            .with_body(r#"{"data":{"status":"running"}}"#)
            .expect_at_least(1)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let result = client
            .nodes()
            .node("pve")
            .tasks()
            .wait(
                &TaskId(UPID.to_string()),
                Duration::from_millis(50),
                Duration::from_millis(20),
            )
            .await;

        assert!(matches!(result, Err(ApiError::Timeout(_))));
    }
}
