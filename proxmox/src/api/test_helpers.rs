//! Test helpers for the Proxmox API

use super::{Client, RetryConfig};

pub fn create_test_client(url: &str) -> Client {
    Client::new(url, "test@pam!test=secret", true).unwrap()
}

/// Client that gives up on the first 5xx instead of backing off
pub fn create_test_client_no_retry(url: &str) -> Client {
    Client::with_config(
        url,
        "test@pam!test=secret",
        true,
        RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        },
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::super::*;
    use super::*;
    use mockito::Server;

    #[test]
    fn test_retry_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_backoff_ms, 100);
        assert_eq!(config.max_backoff_ms, 10000);
        assert_eq!(config.timeout_seconds, 30);
    }

    #[test]
    fn test_proxmox_bool_serializes_as_integer() {
        use common::ProxmoxBool;

        assert_eq!(serde_json::to_string(&ProxmoxBool(true)).unwrap(), "1");
        assert_eq!(serde_json::to_string(&ProxmoxBool(false)).unwrap(), "0");

        let b: ProxmoxBool = serde_json::from_str("\"1\"").unwrap();
        assert!(b.as_bool());
        let b: ProxmoxBool = serde_json::from_str("false").unwrap();
        assert!(!bool::from(b));
        assert!(serde_json::from_str::<ProxmoxBool>("2").is_err());
    }

    #[test]
    fn test_api_query_params() {
        use common::ApiQueryParams;

        let params = ApiQueryParams::new()
            .add("type", "vm")
            .add("vmid", 123)
            .add_optional("target", Some("pve 2"))
            .add_optional("none", None::<String>);

        let query = params.to_query_string();
        assert!(query.starts_with('?'));
        assert!(query.contains("type=vm"));
        assert!(query.contains("vmid=123"));
        assert!(query.contains("target=pve%202"));
        assert!(!query.contains("none="));
        assert_eq!(ApiQueryParams::new().to_query_string(), "");
    }

    #[test]
    fn test_task_id_node() {
        let upid = TaskId("UPID:pve2:0000C0DE:00A1B2C3:65000000:qmclone:100:root@pam:".to_string());
        assert_eq!(upid.node(), Some("pve2"));
        assert_eq!(TaskId("garbage".to_string()).node(), None);
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let result = Client::new("not a url", "token", true);
        assert!(matches!(result, Err(ApiError::InvalidEndpoint { .. })));

        let result = Client::new("ftp://pve.example.com", "token", true);
        assert!(matches!(result, Err(ApiError::InvalidEndpoint { .. })));
    }

    #[tokio::test]
    async fn test_connection_stats() {
        use pool::{ConnectionPoolConfig, ConnectionPoolManager};

        let manager = ConnectionPoolManager::new(ConnectionPoolConfig::default());

        let stats = manager.get_stats().await;
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.failed_requests, 0);

        manager.record_request(true).await;
        manager.record_request(false).await;
        manager.record_retry().await;

        let stats = manager.get_stats().await;
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.retried_requests, 1);
        assert!(stats.last_request.is_some());
    }

    #[tokio::test]
    async fn test_auth_header_and_trailing_slash() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api2/json/cluster/nextid")
            .match_header("authorization", "PVEAPIToken=test@pam!test=secret")
            .with_body(r#"{"data":"104"}"#)
            .create_async()
            .await;

        let client = create_test_client(&format!("{}/", server.url()));
        let id = client.cluster().next_id().await.unwrap();

        assert_eq!(id, 104);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_is_auth_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/api2/json/cluster/nextid")
            .with_status(401)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let result = client.cluster().next_id().await;
        assert!(matches!(result, Err(ApiError::AuthError)));
    }

    #[tokio::test]
    async fn test_parameter_errors_are_reported() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/api2/json/nodes/pve/qemu/100/config")
            .with_status(400)
            .with_body(r#"{"errors":{"cores":"value must be at least 1"},"data":null}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let result = client
            .post::<serde_json::Value, _>(
                "/api2/json/nodes/pve/qemu/100/config",
                &serde_json::json!({"cores": 0}),
            )
            .await;

        match result {
            Err(ApiError::ApiError {
                status, details, ..
            }) => {
                assert_eq!(status, 400);
                let field_errors = details.unwrap().field_errors.unwrap();
                assert_eq!(field_errors["cores"], "value must be at least 1");
            }
            other => panic!("expected ApiError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api2/json/cluster/nextid")
            .with_status(500)
            .expect(2)
            .create_async()
            .await;

        let client = Client::with_config(
            &server.url(),
            "token",
            true,
            RetryConfig {
                max_retries: 1,
                initial_backoff_ms: 1,
                ..RetryConfig::default()
            },
        )
        .unwrap();

        let result = client.cluster().next_id().await;
        assert!(matches!(result, Err(ApiError::ServiceUnavailable)));
        mock.assert_async().await;

        let stats = client.get_connection_stats().await;
        assert_eq!(stats.retried_requests, 1);
        assert_eq!(stats.failed_requests, 2);
    }
}
