#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::api::test_helpers::create_test_client_no_retry;
    use crate::provider_data::LifecycleDelays;
    use crate::ProxmoxProviderData;
    use mockito::{Matcher, Server};
    use std::any::Any;
    use std::sync::Arc;
    use std::time::Duration;
    use tfplug::resource::{DeleteResourceRequest, ReadResourceRequest};
    use tfplug::types::ClientCapabilities;

    fn test_provider_data(server_url: &str) -> ProxmoxProviderData {
        ProxmoxProviderData::new(
            create_test_client_no_retry(server_url),
            2,
            Duration::from_secs(5),
        )
        .with_delays(LifecycleDelays::none())
    }

    async fn configured_resource(server_url: &str) -> QemuVmResource {
        let mut resource = QemuVmResource::new();
        let data: Arc<dyn Any + Send + Sync> = Arc::new(test_provider_data(server_url));
        let response = resource
            .configure(
                Context::new(),
                ConfigureResourceRequest {
                    provider_data: Some(data),
                },
            )
            .await;
        assert!(response.diagnostics.is_empty());
        resource
    }

    fn object(pairs: Vec<(&str, Dynamic)>) -> Dynamic {
        Dynamic::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<HashMap<_, _>>(),
        )
    }

    fn s(v: &str) -> Dynamic {
        Dynamic::String(v.to_string())
    }

    fn nic(id: f64) -> Dynamic {
        object(vec![
            ("id", Dynamic::Number(id)),
            ("model", s("virtio")),
            ("bridge", s("vmbr0")),
        ])
    }

    fn test_config() -> DynamicValue {
        DynamicValue::new(object(vec![
            ("name", s("web-1")),
            ("target_node", s("pve")),
            ("clone", s("ubuntu-template")),
            ("memory", Dynamic::Number(2048.0)),
            ("network", Dynamic::List(vec![nic(0.0)])),
            (
                "disk",
                Dynamic::List(vec![object(vec![
                    ("id", Dynamic::Number(0.0)),
                    ("type", s("scsi")),
                    ("storage", s("local-lvm")),
                    ("size", s("32G")),
                ])]),
            ),
        ]))
    }

    fn validate_request(config: DynamicValue) -> ValidateResourceConfigRequest {
        ValidateResourceConfigRequest {
            type_name: "proxmox_vm_qemu".to_string(),
            config,
            client_capabilities: ClientCapabilities::default(),
        }
    }

    fn plan_request(config: DynamicValue, prior: DynamicValue) -> ModifyPlanRequest {
        ModifyPlanRequest {
            type_name: "proxmox_vm_qemu".to_string(),
            proposed_new_state: config.clone(),
            config,
            prior_state: prior,
            prior_private: vec![],
            provider_meta: None,
        }
    }

    #[tokio::test]
    async fn test_resource_metadata() {
        let resource = QemuVmResource::new();
        let response = resource
            .metadata(Context::new(), ResourceMetadataRequest)
            .await;
        assert_eq!(response.type_name, "proxmox_vm_qemu");
    }

    #[tokio::test]
    async fn test_resource_schema() {
        let resource = QemuVmResource::new();
        let response = resource.schema(Context::new(), ResourceSchemaRequest).await;

        assert!(response.diagnostics.is_empty());
        let attrs = &response.schema.block.attributes;
        assert!(attrs.iter().any(|a| a.name == "name" && a.required));
        assert!(attrs.iter().any(|a| a.name == "target_node" && a.required));
        assert!(attrs.iter().any(|a| a.name == "clone_wait" && a.optional));
        assert!(attrs.iter().any(|a| a.name == "cipassword" && a.sensitive));
    }

    #[tokio::test]
    async fn test_validate_valid_config() {
        let resource = QemuVmResource::new();
        let response = resource
            .validate(Context::new(), validate_request(test_config()))
            .await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
    }

    #[tokio::test]
    async fn test_validate_rejects_out_of_range_values() {
        let resource = QemuVmResource::new();
        let mut config = test_config();
        config
            .set_number(&AttributePath::new("memory"), 8.0)
            .unwrap();
        config
            .set_string(&AttributePath::new("bios"), "uefi".to_string())
            .unwrap();

        let response = resource
            .validate(Context::new(), validate_request(config))
            .await;
        assert_eq!(response.diagnostics.len(), 2);
    }

    #[tokio::test]
    async fn test_validate_rejects_bad_disk_size() {
        let resource = QemuVmResource::new();
        let mut config = test_config();
        config
            .set_list(
                &AttributePath::new("disk"),
                vec![object(vec![
                    ("id", Dynamic::Number(0.0)),
                    ("type", s("scsi")),
                    ("storage", s("local-lvm")),
                    ("size", s("32 gigs")),
                ])],
            )
            .unwrap();

        let response = resource
            .validate(Context::new(), validate_request(config))
            .await;
        assert_eq!(response.diagnostics.len(), 1);
    }

    #[tokio::test]
    async fn test_validate_rejects_clone_and_iso() {
        let resource = QemuVmResource::new();
        let mut config = test_config();
        config
            .set_string(&AttributePath::new("iso"), "local:iso/debian.iso".to_string())
            .unwrap();

        let response = resource
            .validate(Context::new(), validate_request(config))
            .await;
        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(response.diagnostics[0].summary, "Conflicting VM source");
    }

    #[tokio::test]
    async fn test_modify_plan_on_create() {
        let resource = QemuVmResource::new();
        let response = resource
            .modify_plan(
                Context::new(),
                plan_request(test_config(), DynamicValue::null()),
            )
            .await;

        assert!(response.diagnostics.is_empty());
        assert!(response.requires_replace.is_empty());
        let plan = &response.planned_state;
        assert_eq!(plan.get(&AttributePath::new("id")), Some(&Dynamic::Unknown));
        assert_eq!(plan.get_string(&AttributePath::new("bios")).unwrap(), "seabios");
        assert_eq!(plan.get_number(&AttributePath::new("clone_wait")).unwrap(), 15.0);

        let networks = plan.get_list(&AttributePath::new("network")).unwrap();
        let nic = networks[0].as_map().unwrap();
        assert_eq!(nic["macaddr"], Dynamic::Unknown);
        assert_eq!(nic["firewall"], Dynamic::Bool(false));
    }

    #[tokio::test]
    async fn test_modify_plan_on_update_keeps_computed_values() {
        let resource = QemuVmResource::new();
        let planned = resource
            .modify_plan(
                Context::new(),
                plan_request(test_config(), DynamicValue::null()),
            )
            .await
            .planned_state;

        let mut prior = planned.clone();
        prior
            .set_string(&AttributePath::new("id"), "pve/qemu/100".to_string())
            .unwrap();
        let mut prior_nic = nic(0.0);
        if let Dynamic::Map(map) = &mut prior_nic {
            map.insert("macaddr".to_string(), s("AA:BB:CC:DD:EE:FF"));
        }
        prior
            .set_list(&AttributePath::new("network"), vec![prior_nic])
            .unwrap();

        let mut config = test_config();
        config
            .set_list(&AttributePath::new("network"), vec![nic(0.0), nic(1.0)])
            .unwrap();
        let response = resource
            .modify_plan(Context::new(), plan_request(config, prior))
            .await;

        let plan = &response.planned_state;
        assert_eq!(
            plan.get_string(&AttributePath::new("id")).unwrap(),
            "pve/qemu/100"
        );
        let networks = plan.get_list(&AttributePath::new("network")).unwrap();
        assert_eq!(networks[0].as_map().unwrap()["macaddr"], s("AA:BB:CC:DD:EE:FF"));
        assert_eq!(networks[1].as_map().unwrap()["macaddr"], Dynamic::Unknown);
        assert!(response.requires_replace.is_empty());
    }

    #[tokio::test]
    async fn test_modify_plan_clone_change_requires_replace() {
        let resource = QemuVmResource::new();
        let mut prior = test_config();
        schema::qemu_schema()
            .block
            .apply_defaults(&mut prior.value, &AttributePath::root());
        prior
            .set_string(&AttributePath::new("id"), "pve/qemu/100".to_string())
            .unwrap();
        let mut config = test_config();
        config
            .set_string(&AttributePath::new("clone"), "debian-template".to_string())
            .unwrap();

        let response = resource
            .modify_plan(Context::new(), plan_request(config, prior))
            .await;
        assert_eq!(response.requires_replace, vec![AttributePath::new("clone")]);
    }

    #[tokio::test]
    async fn test_modify_plan_passes_destroy_through() {
        let resource = QemuVmResource::new();
        let response = resource
            .modify_plan(
                Context::new(),
                plan_request(DynamicValue::null(), test_config()),
            )
            .await;
        assert!(response.planned_state.is_null());
    }

    #[tokio::test]
    async fn test_import_state() {
        let resource = QemuVmResource::new();
        let response = resource
            .import_state(
                Context::new(),
                ImportResourceStateRequest {
                    type_name: "proxmox_vm_qemu".to_string(),
                    id: "pve/qemu/100".to_string(),
                    client_capabilities: ClientCapabilities::default(),
                    identity: None,
                },
            )
            .await;

        assert!(response.diagnostics.is_empty());
        let state = &response.imported_resources[0].state;
        assert_eq!(
            state.get_string(&AttributePath::new("id")).unwrap(),
            "pve/qemu/100"
        );
    }

    #[tokio::test]
    async fn test_import_state_invalid_id() {
        let resource = QemuVmResource::new();
        let response = resource
            .import_state(
                Context::new(),
                ImportResourceStateRequest {
                    type_name: "proxmox_vm_qemu".to_string(),
                    id: "pve/100".to_string(),
                    client_capabilities: ClientCapabilities::default(),
                    identity: None,
                },
            )
            .await;

        assert!(response.imported_resources.is_empty());
        assert_eq!(response.diagnostics[0].summary, "Invalid import ID");
    }

    #[tokio::test]
    async fn test_configure_rejects_foreign_provider_data() {
        let mut resource = QemuVmResource::new();
        let data: Arc<dyn Any + Send + Sync> = Arc::new("not provider data".to_string());
        let response = resource
            .configure(
                Context::new(),
                ConfigureResourceRequest {
                    provider_data: Some(data),
                },
            )
            .await;
        assert_eq!(response.diagnostics[0].summary, "Invalid provider data");
    }

    #[tokio::test]
    async fn test_create_without_provider_data() {
        let resource = QemuVmResource::new();
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "proxmox_vm_qemu".to_string(),
                    planned_state: test_config(),
                    config: test_config(),
                    planned_private: vec![],
                    provider_meta: None,
                },
            )
            .await;
        assert_eq!(response.diagnostics[0].summary, "Provider not configured");
    }

    #[tokio::test]
    async fn test_read_vm_not_found() {
        let mut server = Server::new_async().await;
        let _resources = server
            .mock("GET", "/api2/json/cluster/resources")
            .match_query(Matcher::UrlEncoded("type".into(), "vm".into()))
            .with_body(r#"{"data":[]}"#)
            .create_async()
            .await;
        let _config = server
            .mock("GET", "/api2/json/nodes/pve/qemu/100/config")
            .with_status(500)
            .with_body(r#"{"data":null,"message":"Configuration file 'nodes/pve/qemu-server/100.conf' does not exist"}"#)
            .create_async()
            .await;

        let resource = configured_resource(&server.url()).await;
        let mut state = test_config();
        state
            .set_string(&AttributePath::new("id"), "pve/qemu/100".to_string())
            .unwrap();

        let response = resource
            .read(
                Context::new(),
                ReadResourceRequest {
                    type_name: "proxmox_vm_qemu".to_string(),
                    current_state: state,
                    private: vec![],
                    provider_meta: None,
                    client_capabilities: ClientCapabilities::default(),
                    current_identity: None,
                },
            )
            .await;

        assert!(response.diagnostics.is_empty());
        assert!(response.new_state.is_none());
    }

    #[tokio::test]
    async fn test_read_malformed_id() {
        let server = Server::new_async().await;
        let resource = configured_resource(&server.url()).await;
        let mut state = test_config();
        state
            .set_string(&AttributePath::new("id"), "100".to_string())
            .unwrap();

        let response = resource
            .read(
                Context::new(),
                ReadResourceRequest {
                    type_name: "proxmox_vm_qemu".to_string(),
                    current_state: state,
                    private: vec![],
                    provider_meta: None,
                    client_capabilities: ClientCapabilities::default(),
                    current_identity: None,
                },
            )
            .await;

        assert_eq!(response.diagnostics[0].summary, "Failed to read VM");
        assert!(response.diagnostics[0].detail.contains("Invalid resource id"));
    }

    #[tokio::test]
    async fn test_delete_vm_already_gone() {
        let mut server = Server::new_async().await;
        let _resources = server
            .mock("GET", "/api2/json/cluster/resources")
            .match_query(Matcher::UrlEncoded("type".into(), "vm".into()))
            .with_body(r#"{"data":[]}"#)
            .create_async()
            .await;
        let stop = server
            .mock("POST", Matcher::Regex(r"/status/stop$".to_string()))
            .expect(0)
            .create_async()
            .await;

        let resource = configured_resource(&server.url()).await;
        let mut state = test_config();
        state
            .set_string(&AttributePath::new("id"), "pve/qemu/100".to_string())
            .unwrap();

        let response = resource
            .delete(
                Context::new(),
                DeleteResourceRequest {
                    type_name: "proxmox_vm_qemu".to_string(),
                    prior_state: state,
                    planned_private: vec![],
                    provider_meta: None,
                },
            )
            .await;

        assert!(response.diagnostics.is_empty());
        stop.assert_async().await;
    }
}
