mod common;

use common::{
    RESOURCE_GROUP, TestEnv, cloud_spec, cloud_spec_with, cloud_spec_with_secret_ref,
    provider_spec, secret_resolver,
};
use machina_cloud::{
    AddressClass, CloudError, FinalizerChange, InstanceStatus, MachineProvider,
    MachineStatusError,
};
use machina_cloud_azure::naming::{
    FINALIZER_DISKS, FINALIZER_NIC, FINALIZER_PUBLIC_IP, FINALIZER_PUBLIC_IPV6, FINALIZER_VM,
};
use machina_cloud_azure::{AzureApi, AzureError};
use serde_json::json;

fn added(finalizers: &[&str]) -> Vec<FinalizerChange> {
    finalizers
        .iter()
        .map(|f| FinalizerChange::Added(f.to_string()))
        .collect()
}

fn removed(finalizers: &[&str]) -> Vec<FinalizerChange> {
    finalizers
        .iter()
        .map(|f| FinalizerChange::Removed(f.to_string()))
        .collect()
}

#[tokio::test]
async fn test_dual_stack_lifecycle() {
    let env = TestEnv::new();
    let spec = provider_spec(cloud_spec_with(json!({ "assignPublicIP": true })), "IPv4+IPv6");
    let mut machine = env.machine("worker-1", "uid-1", spec).await;

    // 1. Create
    let instance = env
        .provider
        .create(&mut machine, &env.data, "#cloud-config")
        .await
        .unwrap();

    assert_eq!(instance.name, "worker-1");
    assert_eq!(instance.status, InstanceStatus::Creating);
    assert_eq!(instance.external_addresses(), vec!["20.0.0.1", "2001:db8::2"]);
    assert_eq!(instance.internal_addresses(), vec!["10.0.0.3", "fd00::4"]);

    assert_eq!(
        env.store.history().await,
        added(&[
            FINALIZER_PUBLIC_IP,
            FINALIZER_PUBLIC_IPV6,
            FINALIZER_NIC,
            FINALIZER_DISKS,
            FINALIZER_VM,
        ])
    );
    assert_eq!(
        env.azure.writes(),
        vec![
            "put_public_ip worker-1-netiface-pubip",
            "put_public_ip worker-1-netiface-pubipv6",
            "put_nic worker-1-netiface",
            "put_vm worker-1",
        ]
    );
    assert_eq!(env.stored("worker-1").await.finalizers.len(), 5);

    // 2. Get once the VM is up
    env.azure.set_running(RESOURCE_GROUP, "worker-1");
    let instance = env.provider.get(&machine, &env.data).await.unwrap();
    assert_eq!(instance.status, InstanceStatus::Running);
    assert_eq!(
        instance.addresses.get("20.0.0.1"),
        Some(&AddressClass::ExternalIp)
    );

    // 3. Cleanup
    env.store.clear_history().await;
    env.azure.clear_calls();

    let done = env.provider.cleanup(&mut machine, &env.data).await.unwrap();
    assert!(done);
    assert!(machine.finalizers.is_empty());
    assert_eq!(
        env.store.history().await,
        removed(&[
            FINALIZER_VM,
            FINALIZER_DISKS,
            FINALIZER_NIC,
            FINALIZER_PUBLIC_IPV6,
            FINALIZER_PUBLIC_IP,
        ])
    );
    assert_eq!(
        env.azure.writes(),
        vec![
            "delete_vm worker-1",
            "delete_disk worker-1_OsDisk_1",
            "delete_nic worker-1-netiface",
            "delete_public_ip worker-1-netiface-pubipv6",
            "delete_public_ip worker-1-netiface-pubip",
        ]
    );
    assert!(env.azure.is_empty());

    // 4. Gone
    let err = env.provider.get(&machine, &env.data).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_create_is_idempotent() {
    let env = TestEnv::new();
    let spec = provider_spec(cloud_spec_with(json!({ "assignPublicIP": true })), "IPv4");
    let mut machine = env.machine("worker-1", "uid-1", spec).await;

    let first = env.provider.create(&mut machine, &env.data, "").await.unwrap();
    env.store.clear_history().await;
    let second = env.provider.create(&mut machine, &env.data, "").await.unwrap();

    assert_eq!(first.addresses, second.addresses);
    assert!(env.store.history().await.is_empty());
    assert_eq!(env.azure.vm_names(), vec!["worker-1"]);
    assert_eq!(env.azure.nic_names(), vec!["worker-1-netiface"]);
    assert_eq!(env.azure.public_ip_names(), vec!["worker-1-netiface-pubip"]);
}

#[tokio::test]
async fn test_create_without_public_ip() {
    let env = TestEnv::new();
    let mut machine = env
        .machine("worker-1", "uid-1", provider_spec(cloud_spec(), ""))
        .await;

    let instance = env.provider.create(&mut machine, &env.data, "").await.unwrap();

    assert!(instance.external_addresses().is_empty());
    assert_eq!(instance.internal_addresses().len(), 1);
    assert!(!machine.has_finalizer(FINALIZER_PUBLIC_IP));
    assert!(!machine.has_finalizer(FINALIZER_PUBLIC_IPV6));
    assert!(env.azure.public_ip_names().is_empty());
}

#[tokio::test]
async fn test_create_resumes_after_vm_failure() {
    let env = TestEnv::new();
    let mut machine = env
        .machine("worker-1", "uid-1", provider_spec(cloud_spec(), ""))
        .await;
    env.azure
        .fail_next("put_vm", AzureError::api(500, "InternalError", "try again"));

    let err = env
        .provider
        .create(&mut machine, &env.data, "")
        .await
        .unwrap_err();
    assert!(!err.is_terminal());
    // Finalizers are committed before the resources they guard
    assert!(machine.has_finalizer(FINALIZER_NIC));
    assert!(machine.has_finalizer(FINALIZER_VM));
    assert!(env.azure.vm_names().is_empty());

    env.provider
        .create(&mut machine, &env.data, "")
        .await
        .unwrap();
    assert_eq!(env.azure.vm_names(), vec!["worker-1"]);
    assert_eq!(env.azure.nic_names(), vec!["worker-1-netiface"]);
}

#[tokio::test]
async fn test_quota_exceeded_is_terminal() {
    let env = TestEnv::new();
    let mut machine = env
        .machine("worker-1", "uid-1", provider_spec(cloud_spec(), ""))
        .await;
    env.azure.fail_next(
        "put_vm",
        AzureError::api(409, "QuotaExceeded", "regional cores quota exhausted"),
    );

    let err = env
        .provider
        .create(&mut machine, &env.data, "")
        .await
        .unwrap_err();
    assert_eq!(
        err.terminal_reason(),
        Some(MachineStatusError::InsufficientResources)
    );

    // The NIC was created and still gets cleaned up
    assert!(env.provider.cleanup(&mut machine, &env.data).await.unwrap());
    assert!(env.azure.is_empty());
}

#[tokio::test]
async fn test_create_with_invalid_config_is_terminal() {
    let env = TestEnv::new();
    let spec = provider_spec(cloud_spec_with(json!({ "vmSzie": "Standard_D2s_v3" })), "");
    let mut machine = env.machine("worker-1", "uid-1", spec).await;

    let err = env
        .provider
        .create(&mut machine, &env.data, "")
        .await
        .unwrap_err();

    assert_eq!(
        err.terminal_reason(),
        Some(MachineStatusError::InvalidConfiguration)
    );
    assert!(err.to_string().contains("failed to parse MachineSpec"));
    assert!(machine.finalizers.is_empty());
    assert!(env.azure.writes().is_empty());
}

#[tokio::test]
async fn test_cleanup_resumes_after_failed_step() {
    let env = TestEnv::new();
    let mut machine = env
        .machine("worker-1", "uid-1", provider_spec(cloud_spec(), ""))
        .await;
    env.provider
        .create(&mut machine, &env.data, "")
        .await
        .unwrap();

    env.azure
        .fail_next("delete_nic", AzureError::api(500, "InternalError", "boom"));
    let err = env
        .provider
        .cleanup(&mut machine, &env.data)
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::Api(_)));
    assert!(err.to_string().contains("failed to remove network interfaces"));

    let stored = env.stored("worker-1").await;
    assert!(!stored.has_finalizer(FINALIZER_VM));
    assert!(!stored.has_finalizer(FINALIZER_DISKS));
    assert!(stored.has_finalizer(FINALIZER_NIC));

    env.azure.clear_calls();
    assert!(env.provider.cleanup(&mut machine, &env.data).await.unwrap());
    assert_eq!(env.azure.writes(), vec!["delete_nic worker-1-netiface"]);
    assert!(env.azure.is_empty());
}

#[tokio::test]
async fn test_cleanup_retries_when_secret_is_unavailable() {
    let env = TestEnv::new();
    let with_secret = env.provider_with(secret_resolver());
    let mut machine = env
        .machine("worker-1", "uid-1", provider_spec(cloud_spec_with_secret_ref(), ""))
        .await;
    with_secret
        .create(&mut machine, &env.data, "")
        .await
        .unwrap();
    let finalizers = machine.finalizers.clone();

    // The default provider has no secret source, as during a secret-store outage
    env.azure.clear_calls();
    let err = env
        .provider
        .cleanup(&mut machine, &env.data)
        .await
        .unwrap_err();
    assert!(!err.is_terminal(), "{}", err);
    assert!(matches!(err, CloudError::ConfigVar(_)), "{:?}", err);
    assert!(err.to_string().contains("secret kube-system/azure[clientSecret] not found"));
    assert_eq!(env.stored("worker-1").await.finalizers, finalizers);
    assert!(env.azure.writes().is_empty());

    assert!(with_secret.cleanup(&mut machine, &env.data).await.unwrap());
    assert!(env.azure.is_empty());
}

#[tokio::test]
async fn test_cleanup_tolerates_missing_resources() {
    let env = TestEnv::new();
    let spec = provider_spec(cloud_spec_with(json!({ "assignPublicIP": true })), "");
    let mut machine = env.machine("worker-1", "uid-1", spec).await;
    env.provider
        .create(&mut machine, &env.data, "")
        .await
        .unwrap();

    // Somebody else already tore everything down
    let api: &dyn AzureApi = &env.azure;
    api.delete_vm(RESOURCE_GROUP, "worker-1").await.unwrap();
    api.delete_disk(RESOURCE_GROUP, "worker-1_OsDisk_1")
        .await
        .unwrap();
    api.delete_nic(RESOURCE_GROUP, "worker-1-netiface")
        .await
        .unwrap();
    api.delete_public_ip(RESOURCE_GROUP, "worker-1-netiface-pubip")
        .await
        .unwrap();

    assert!(env.provider.cleanup(&mut machine, &env.data).await.unwrap());
    assert!(machine.finalizers.is_empty());
}

#[tokio::test]
async fn test_cleanup_without_finalizers_touches_nothing() {
    let env = TestEnv::new();
    let mut machine = env
        .machine("worker-1", "uid-1", provider_spec(cloud_spec(), ""))
        .await;

    assert!(env.provider.cleanup(&mut machine, &env.data).await.unwrap());
    assert!(env.azure.calls().is_empty());
}

#[tokio::test]
async fn test_store_failure_stops_create_before_any_resource() {
    let env = TestEnv::new();
    let mut machine = env
        .machine("worker-1", "uid-1", provider_spec(cloud_spec(), ""))
        .await;
    env.store.fail_next_updates(1).await;

    let err = env
        .provider
        .create(&mut machine, &env.data, "")
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::Store(_)));
    assert!(env.azure.writes().is_empty());
}

#[tokio::test]
async fn test_get_unknown_machine() {
    let env = TestEnv::new();
    let machine = env
        .machine("worker-1", "uid-1", provider_spec(cloud_spec(), ""))
        .await;

    let err = env.provider.get(&machine, &env.data).await.unwrap_err();
    assert!(matches!(err, CloudError::InstanceNotFound));
}

#[tokio::test]
async fn test_get_propagates_backend_failures() {
    let env = TestEnv::new();
    let machine = env
        .machine("worker-1", "uid-1", provider_spec(cloud_spec(), ""))
        .await;
    env.azure
        .fail_next("list_all_vms", AzureError::Auth("token expired".to_string()));

    let err = env.provider.get(&machine, &env.data).await.unwrap_err();
    assert!(!err.is_not_found());
    assert!(!err.is_terminal());
}
