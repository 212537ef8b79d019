//! Azure Resource Manager REST client
//!
//! Direct ARM API implementation of [`AzureApi`]. Authenticates with the
//! OAuth client-credentials flow and waits for long-running operations by
//! polling the `Azure-AsyncOperation` or `Location` header of the initial
//! response.

use crate::api::{AzureApi, AzureClientFactory};
use crate::config::Credentials;
use crate::error::{AzureError, Result};
use crate::models::{
    Disk, ErrorResponse, ImageReference, InstanceView, NetworkInterface, Page, PublicIpAddress,
    ResourceSku, Subnet, Tags, VirtualMachine, VirtualNetwork,
};
use crate::naming;
use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
pub const LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";

const NETWORK_API_VERSION: &str = "2023-09-01";
const COMPUTE_API_VERSION: &str = "2024-03-01";
const DISK_API_VERSION: &str = "2023-10-02";
const SKU_API_VERSION: &str = "2021-07-01";

/// Tokens are renewed this long before they expire
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Endpoints and timing of the ARM client
#[derive(Debug, Clone)]
pub struct ArmOptions {
    pub management_endpoint: String,
    pub login_endpoint: String,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

impl Default for ArmOptions {
    fn default() -> Self {
        Self {
            management_endpoint: MANAGEMENT_ENDPOINT.to_string(),
            login_endpoint: LOGIN_ENDPOINT.to_string(),
            request_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(30 * 60),
        }
    }
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct TokenError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

#[derive(Deserialize)]
struct AsyncOperation {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<crate::models::ErrorBody>,
}

enum Poll {
    AsyncOperation(String),
    Location(String),
}

/// ARM client bound to one subscription and service principal
pub struct ArmClient {
    http: reqwest::Client,
    credentials: Credentials,
    options: ArmOptions,
    token: tokio::sync::Mutex<Option<AccessToken>>,
}

impl ArmClient {
    pub fn new(http: reqwest::Client, credentials: Credentials, options: ArmOptions) -> Self {
        Self {
            http,
            credentials,
            options,
            token: tokio::sync::Mutex::new(None),
        }
    }

    /// Bearer token for ARM, fetched again shortly before expiry
    async fn token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.options.login_endpoint, self.credentials.tenant_id
        );
        let scope = format!("{}/.default", self.options.management_endpoint);
        debug!(tenant = %self.credentials.tenant_id, "Requesting ARM access token");

        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body: TokenError = response.json().await.unwrap_or(TokenError {
                error: status.to_string(),
                error_description: String::new(),
            });
            return Err(AzureError::Auth(format!(
                "{} {}",
                body.error, body.error_description
            )));
        }

        let body: TokenResponse = response.json().await?;
        let lifetime = body
            .expires_in
            .as_ref()
            .and_then(|v| v.as_u64().or_else(|| v.as_str()?.parse().ok()))
            .unwrap_or(3600);
        let expires_at =
            Instant::now() + Duration::from_secs(lifetime).saturating_sub(TOKEN_EXPIRY_MARGIN);

        *cached = Some(AccessToken {
            value: body.access_token.clone(),
            expires_at,
        });
        Ok(body.access_token)
    }

    fn subscription_path(&self) -> String {
        format!(
            "{}/subscriptions/{}",
            self.options.management_endpoint, self.credentials.subscription_id
        )
    }

    fn resource_url(&self, resource_group: &str, kind: &str, name: &str) -> String {
        format!(
            "{}{}/providers/{}/{}",
            self.options.management_endpoint,
            naming::resource_group_id(&self.credentials.subscription_id, resource_group),
            kind,
            name
        )
    }

    fn collection_url(&self, resource_group: &str, kind: &str) -> String {
        format!(
            "{}{}/providers/{}",
            self.options.management_endpoint,
            naming::resource_group_id(&self.credentials.subscription_id, resource_group),
            kind
        )
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<Response> {
        let token = self.token().await?;
        debug!(%method, url, "ARM request");

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(token)
            .query(query)
            .timeout(self.options.request_timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(Self::error_from(url, response).await)
    }

    async fn error_from(url: &str, response: Response) -> AzureError {
        let status = response.status();
        let body: ErrorResponse = response.json().await.unwrap_or_default();

        match status {
            StatusCode::NOT_FOUND => AzureError::NotFound(if body.error.message.is_empty() {
                url.to_string()
            } else {
                body.error.message
            }),
            StatusCode::UNAUTHORIZED => AzureError::Auth(body.error.message),
            _ => AzureError::api(status.as_u16(), body.error.code, body.error.message),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, api_version: &str) -> Result<T> {
        let response = self
            .send(Method::GET, url, &[("api-version", api_version)], None)
            .await?;
        Ok(response.json().await?)
    }

    /// Follows `nextLink` until every page is read
    async fn list<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page: Page<T> = self.send(Method::GET, url, query, None).await?.json().await?;

        loop {
            items.append(&mut page.value);
            match page.next_link.take() {
                Some(next) if !next.is_empty() => {
                    page = self.send(Method::GET, &next, &[], None).await?.json().await?;
                }
                _ => break,
            }
        }

        Ok(items)
    }

    /// PUT and wait for the operation, then read back the final resource
    async fn put<T, B>(&self, url: &str, api_version: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: serde::Serialize,
    {
        let body = serde_json::to_value(body)?;
        let response = self
            .send(Method::PUT, url, &[("api-version", api_version)], Some(&body))
            .await?;
        self.wait(response).await?;
        self.get_json(url, api_version).await
    }

    async fn patch_tags(&self, url: &str, api_version: &str, tags: &Tags) -> Result<()> {
        let body = serde_json::json!({ "tags": tags });
        let response = self
            .send(Method::PATCH, url, &[("api-version", api_version)], Some(&body))
            .await?;
        self.wait(response).await
    }

    async fn delete(&self, url: &str, api_version: &str) -> Result<()> {
        match self
            .send(Method::DELETE, url, &[("api-version", api_version)], None)
            .await
        {
            Ok(response) => self.wait(response).await,
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn poll_target(response: &Response) -> Option<Poll> {
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        header("Azure-AsyncOperation")
            .map(Poll::AsyncOperation)
            .or_else(|| header("Location").map(Poll::Location))
    }

    /// Waits for the long-running operation started by `response`, if any
    async fn wait(&self, response: Response) -> Result<()> {
        let Some(target) = Self::poll_target(&response) else {
            return Ok(());
        };

        tokio::time::timeout(self.options.poll_timeout, self.poll(target))
            .await
            .map_err(|_| {
                AzureError::Timeout(format!(
                    "operation did not finish within {:?}",
                    self.options.poll_timeout
                ))
            })?
    }

    async fn poll(&self, target: Poll) -> Result<()> {
        loop {
            tokio::time::sleep(self.options.poll_interval).await;

            match &target {
                Poll::AsyncOperation(url) => {
                    let operation: AsyncOperation =
                        self.send(Method::GET, url, &[], None).await?.json().await?;
                    match operation.status.as_str() {
                        "Succeeded" => return Ok(()),
                        "Failed" | "Canceled" => {
                            let error = operation.error.unwrap_or_default();
                            return Err(AzureError::api(200, error.code, error.message));
                        }
                        status => debug!(status, "Operation still running"),
                    }
                }
                Poll::Location(url) => {
                    let response = self.send(Method::GET, url, &[], None).await?;
                    if response.status() != StatusCode::ACCEPTED {
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[async_trait]
impl AzureApi for ArmClient {
    async fn create_or_update_public_ip(
        &self,
        resource_group: &str,
        name: &str,
        address: &PublicIpAddress,
    ) -> Result<PublicIpAddress> {
        let url = self.resource_url(resource_group, "Microsoft.Network/publicIPAddresses", name);
        self.put(&url, NETWORK_API_VERSION, address).await
    }

    async fn get_public_ip(&self, resource_group: &str, name: &str) -> Result<PublicIpAddress> {
        let url = self.resource_url(resource_group, "Microsoft.Network/publicIPAddresses", name);
        self.get_json(&url, NETWORK_API_VERSION).await
    }

    async fn list_public_ips(&self, resource_group: &str) -> Result<Vec<PublicIpAddress>> {
        let url = self.collection_url(resource_group, "Microsoft.Network/publicIPAddresses");
        self.list(&url, &[("api-version", NETWORK_API_VERSION)]).await
    }

    async fn delete_public_ip(&self, resource_group: &str, name: &str) -> Result<()> {
        let url = self.resource_url(resource_group, "Microsoft.Network/publicIPAddresses", name);
        self.delete(&url, NETWORK_API_VERSION).await
    }

    async fn create_or_update_nic(
        &self,
        resource_group: &str,
        name: &str,
        nic: &NetworkInterface,
    ) -> Result<NetworkInterface> {
        let url = self.resource_url(resource_group, "Microsoft.Network/networkInterfaces", name);
        self.put(&url, NETWORK_API_VERSION, nic).await
    }

    async fn get_nic(&self, resource_group: &str, name: &str) -> Result<NetworkInterface> {
        let url = self.resource_url(resource_group, "Microsoft.Network/networkInterfaces", name);
        self.get_json(&url, NETWORK_API_VERSION).await
    }

    async fn list_nics(&self, resource_group: &str) -> Result<Vec<NetworkInterface>> {
        let url = self.collection_url(resource_group, "Microsoft.Network/networkInterfaces");
        self.list(&url, &[("api-version", NETWORK_API_VERSION)]).await
    }

    async fn delete_nic(&self, resource_group: &str, name: &str) -> Result<()> {
        let url = self.resource_url(resource_group, "Microsoft.Network/networkInterfaces", name);
        self.delete(&url, NETWORK_API_VERSION).await
    }

    async fn create_or_update_vm(
        &self,
        resource_group: &str,
        name: &str,
        vm: &VirtualMachine,
    ) -> Result<VirtualMachine> {
        let url = self.resource_url(resource_group, "Microsoft.Compute/virtualMachines", name);
        self.put(&url, COMPUTE_API_VERSION, vm).await
    }

    async fn get_vm(&self, resource_group: &str, name: &str) -> Result<VirtualMachine> {
        let url = self.resource_url(resource_group, "Microsoft.Compute/virtualMachines", name);
        self.get_json(&url, COMPUTE_API_VERSION).await
    }

    async fn list_all_vms(&self) -> Result<Vec<VirtualMachine>> {
        let url = format!(
            "{}/providers/Microsoft.Compute/virtualMachines",
            self.subscription_path()
        );
        self.list(&url, &[("api-version", COMPUTE_API_VERSION)]).await
    }

    async fn list_vms(&self, resource_group: &str) -> Result<Vec<VirtualMachine>> {
        let url = self.collection_url(resource_group, "Microsoft.Compute/virtualMachines");
        self.list(&url, &[("api-version", COMPUTE_API_VERSION)]).await
    }

    async fn instance_view(&self, resource_group: &str, name: &str) -> Result<InstanceView> {
        let url = format!(
            "{}/instanceView",
            self.resource_url(resource_group, "Microsoft.Compute/virtualMachines", name)
        );
        self.get_json(&url, COMPUTE_API_VERSION).await
    }

    async fn update_vm_tags(&self, resource_group: &str, name: &str, tags: &Tags) -> Result<()> {
        let url = self.resource_url(resource_group, "Microsoft.Compute/virtualMachines", name);
        self.patch_tags(&url, COMPUTE_API_VERSION, tags).await
    }

    async fn delete_vm(&self, resource_group: &str, name: &str) -> Result<()> {
        let url = self.resource_url(resource_group, "Microsoft.Compute/virtualMachines", name);
        self.delete(&url, COMPUTE_API_VERSION).await
    }

    async fn list_disks(&self, resource_group: &str) -> Result<Vec<Disk>> {
        let url = self.collection_url(resource_group, "Microsoft.Compute/disks");
        self.list(&url, &[("api-version", DISK_API_VERSION)]).await
    }

    async fn update_disk_tags(&self, resource_group: &str, name: &str, tags: &Tags) -> Result<()> {
        let url = self.resource_url(resource_group, "Microsoft.Compute/disks", name);
        self.patch_tags(&url, DISK_API_VERSION, tags).await
    }

    async fn delete_disk(&self, resource_group: &str, name: &str) -> Result<()> {
        let url = self.resource_url(resource_group, "Microsoft.Compute/disks", name);
        self.delete(&url, DISK_API_VERSION).await
    }

    async fn get_virtual_network(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<VirtualNetwork> {
        let url = self.resource_url(resource_group, "Microsoft.Network/virtualNetworks", name);
        self.get_json(&url, NETWORK_API_VERSION).await
    }

    async fn get_subnet(&self, resource_group: &str, vnet: &str, name: &str) -> Result<Subnet> {
        let url = format!(
            "{}/subnets/{}",
            self.resource_url(resource_group, "Microsoft.Network/virtualNetworks", vnet),
            name
        );
        self.get_json(&url, NETWORK_API_VERSION).await
    }

    async fn list_vm_skus(&self, location: &str) -> Result<Vec<ResourceSku>> {
        let url = format!("{}/providers/Microsoft.Compute/skus", self.subscription_path());
        let filter = format!("location eq '{}'", location);
        let skus: Vec<ResourceSku> = self
            .list(
                &url,
                &[("api-version", SKU_API_VERSION), ("$filter", filter.as_str())],
            )
            .await?;

        Ok(skus
            .into_iter()
            .filter(|sku| sku.resource_type.as_deref() == Some("virtualMachines"))
            .collect())
    }

    async fn check_image(&self, location: &str, image: &ImageReference) -> Result<()> {
        if let Some(id) = image.id.as_deref().filter(|id| !id.is_empty()) {
            let url = format!("{}{}", self.options.management_endpoint, id);
            let _: serde_json::Value = self.get_json(&url, COMPUTE_API_VERSION).await?;
            return Ok(());
        }

        let field = |value: &Option<String>, name: &str| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AzureError::InvalidConfig(format!("image reference has no {}", name)))
        };
        let publisher = field(&image.publisher, "publisher")?;
        let offer = field(&image.offer, "offer")?;
        let sku = field(&image.sku, "sku")?;
        let version = field(&image.version, "version")?;

        let versions_url = format!(
            "{}/providers/Microsoft.Compute/locations/{}/publishers/{}/artifacttypes/vmimage/offers/{}/skus/{}/versions",
            self.subscription_path(),
            location,
            publisher,
            offer,
            sku
        );

        if version.eq_ignore_ascii_case("latest") {
            let versions: Vec<serde_json::Value> =
                self.get_json(&versions_url, COMPUTE_API_VERSION).await?;
            if versions.is_empty() {
                return Err(AzureError::NotFound(format!(
                    "no versions of image {}:{}:{}",
                    publisher, offer, sku
                )));
            }
            return Ok(());
        }

        let url = format!("{}/{}", versions_url, version);
        let _: serde_json::Value = self.get_json(&url, COMPUTE_API_VERSION).await?;
        Ok(())
    }
}

/// Hands out one [`ArmClient`] per set of credentials, so access tokens are
/// shared between machines of the same subscription
pub struct ArmClientFactory {
    http: reqwest::Client,
    options: ArmOptions,
    clients: Mutex<HashMap<Credentials, Arc<ArmClient>>>,
}

impl ArmClientFactory {
    pub fn new(options: ArmOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            options,
            clients: Mutex::new(HashMap::new()),
        })
    }
}

impl AzureClientFactory for ArmClientFactory {
    fn client(&self, credentials: &Credentials) -> Result<Arc<dyn AzureApi>> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let client = clients
            .entry(credentials.clone())
            .or_insert_with(|| {
                Arc::new(ArmClient::new(
                    self.http.clone(),
                    credentials.clone(),
                    self.options.clone(),
                ))
            })
            .clone();
        Ok(client as Arc<dyn AzureApi>)
    }
}
