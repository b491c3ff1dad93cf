//! Session configuration: credentials, per-cloud host tables and feature flags.
//!
//! A [`ProviderConfig`] is built once (from a TOML file, the environment, or code)
//! and then shared read-only by every request the session issues.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Backstop applied to request contexts built from a config.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(20 * 60);

pub const DEFAULT_MSI_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Admin center (PPAC) application id; it has no URL form.
pub const PPAC_SCOPE: &str = "065d9450-1e87-434e-ac2f-69af271549ed/.default";

pub mod env {
    pub const CLOUD: &str = "POWER_PLATFORM_CLOUD";
    pub const TENANT_ID: &str = "POWER_PLATFORM_TENANT_ID";
    pub const CLIENT_ID: &str = "POWER_PLATFORM_CLIENT_ID";
    pub const CLIENT_SECRET: &str = "POWER_PLATFORM_CLIENT_SECRET";
    pub const USE_CLI: &str = "POWER_PLATFORM_USE_CLI";
    pub const USE_OIDC: &str = "POWER_PLATFORM_USE_OIDC";
    pub const USE_MSI: &str = "POWER_PLATFORM_USE_MSI";
    pub const CLIENT_CERTIFICATE: &str = "POWER_PLATFORM_CLIENT_CERTIFICATE";
    pub const CLIENT_CERTIFICATE_FILE_PATH: &str = "POWER_PLATFORM_CLIENT_CERTIFICATE_FILE_PATH";
    pub const CLIENT_CERTIFICATE_PASSWORD: &str = "POWER_PLATFORM_CLIENT_CERTIFICATE_PASSWORD";
    pub const AZDO_SERVICE_CONNECTION_ID: &str = "POWER_PLATFORM_AZDO_SERVICE_CONNECTION_ID";
    pub const TELEMETRY_OPTOUT: &str = "POWER_PLATFORM_TELEMETRY_OPTOUT";
    pub const ENABLE_CAE: &str = "POWER_PLATFORM_ENABLE_CAE";
    pub const PARTNER_ID: &[&str] = &["POWER_PLATFORM_PARTNER_ID", "ARM_PARTNER_ID"];
    pub const OIDC_REQUEST_URL: &[&str] = &[
        "ARM_OIDC_REQUEST_URL",
        "ACTIONS_ID_TOKEN_REQUEST_URL",
        "SYSTEM_OIDCREQUESTURI",
    ];
    pub const OIDC_REQUEST_TOKEN: &[&str] = &[
        "ARM_OIDC_REQUEST_TOKEN",
        "ACTIONS_ID_TOKEN_REQUEST_TOKEN",
        "SYSTEM_ACCESSTOKEN",
    ];
    pub const OIDC_TOKEN: &str = "ARM_OIDC_TOKEN";
    pub const OIDC_TOKEN_FILE_PATH: &str = "ARM_OIDC_TOKEN_FILE_PATH";
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown cloud '{0}', expected one of public, gcc, gcchigh, dod, china, ex, rx")]
    UnknownCloud(String),
    #[error("invalid boolean '{value}' for {name}")]
    InvalidBool { name: String, value: String },
    #[error("invalid value '{value}' for {name}")]
    InvalidValue { name: String, value: String },
    #[error("failed to locate configuration directory")]
    NoConfigDir,
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudType {
    #[default]
    Public,
    Gcc,
    GccHigh,
    Dod,
    China,
    Ex,
    Rx,
}

impl FromStr for CloudType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(CloudType::Public),
            "gcc" => Ok(CloudType::Gcc),
            "gcchigh" => Ok(CloudType::GccHigh),
            "dod" => Ok(CloudType::Dod),
            "china" => Ok(CloudType::China),
            "ex" => Ok(CloudType::Ex),
            "rx" => Ok(CloudType::Rx),
            _ => Err(ConfigError::UnknownCloud(s.to_string())),
        }
    }
}

impl fmt::Display for CloudType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloudType::Public => "public",
            CloudType::Gcc => "gcc",
            CloudType::GccHigh => "gcchigh",
            CloudType::Dod => "dod",
            CloudType::China => "china",
            CloudType::Ex => "ex",
            CloudType::Rx => "rx",
        };
        f.write_str(name)
    }
}

/// Host and scope table for one sovereign cloud.
///
/// Hosts are bare domains (matched as substrings of request URLs); scopes are
/// complete `/.default` scopes. An empty entry never matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudUrls {
    pub bapi_url: String,
    pub powerapps_url: String,
    pub powerapps_scope: String,
    pub powerplatform_url: String,
    pub powerplatform_scope: String,
    pub licensing_url: String,
    pub powerapps_advisor_url: String,
    pub powerapps_advisor_scope: String,
    pub admin_powerplatform_url: String,
    pub analytics_scope: String,
    /// OAuth authority, always ending in `/`.
    pub authority_host: String,
}

impl CloudUrls {
    pub fn for_cloud(cloud: CloudType) -> Self {
        let (bapi, apps, apps_scope, pp, pp_scope, licensing, advisor, advisor_scope, admin, analytics, authority) =
            match cloud {
                CloudType::Public => (
                    "api.bap.microsoft.com",
                    "api.powerapps.com",
                    "https://service.powerapps.com/.default",
                    "api.powerplatform.com",
                    "https://api.powerplatform.com/.default",
                    "licensing.powerplatform.microsoft.com",
                    "api.advisor.powerapps.com",
                    "https://advisor.powerapps.com/.default",
                    "api.admin.powerplatform.microsoft.com",
                    "https://adminanalytics.powerplatform.microsoft.com/.default",
                    "https://login.microsoftonline.com/",
                ),
                CloudType::Gcc => (
                    "gov.api.bap.microsoft.us",
                    "gov.api.powerapps.us",
                    "https://service.powerapps.us/.default",
                    "api.gov.powerplatform.microsoft.us",
                    "https://api.gov.powerplatform.microsoft.us/.default",
                    "gov.licensing.powerplatform.microsoft.us",
                    "gov.api.advisor.powerapps.us",
                    "https://gov.advisor.powerapps.us/.default",
                    "api.gcc.admin.powerplatform.microsoft.us",
                    "https://gcc.adminanalytics.powerplatform.microsoft.us/.default",
                    "https://login.microsoftonline.com/",
                ),
                CloudType::GccHigh => (
                    "high.api.bap.microsoft.us",
                    "high.api.powerapps.us",
                    "https://high.service.apps.appsplatform.us/.default",
                    "api.appsplatform.us",
                    "https://api.appsplatform.us/.default",
                    "high.licensing.powerplatform.microsoft.us",
                    "high.api.advisor.powerapps.us",
                    "https://high.advisor.powerapps.us/.default",
                    "api.high.admin.powerplatform.microsoft.us",
                    "https://high.adminanalytics.powerplatform.microsoft.us/.default",
                    "https://login.microsoftonline.us/",
                ),
                CloudType::Dod => (
                    "api.bap.appsplatform.us",
                    "api.apps.appsplatform.us",
                    "https://service.apps.appsplatform.us/.default",
                    "api.appsplatform.us",
                    "https://api.appsplatform.us/.default",
                    "licensing.appsplatform.us",
                    "api.advisor.powerapps.us",
                    "https://advisor.powerapps.us/.default",
                    "api.admin.appsplatform.us",
                    "https://adminanalytics.appsplatform.us/.default",
                    "https://login.microsoftonline.us/",
                ),
                CloudType::China => (
                    "api.bap.partner.microsoftonline.cn",
                    "api.powerapps.cn",
                    "https://service.powerapps.cn/.default",
                    "api.powerplatform.partner.microsoftonline.cn",
                    "https://api.powerplatform.partner.microsoftonline.cn/.default",
                    "licensing.partner.microsoftonline.cn",
                    "api.advisor.powerapps.cn",
                    "https://advisor.powerapps.cn/.default",
                    "api.ppac.partner.microsoftonline.cn",
                    "",
                    "https://login.chinacloudapi.cn/",
                ),
                CloudType::Ex => (
                    "api.bap.eaglex.ic.gov",
                    "api.powerapps.eaglex.ic.gov",
                    "https://service.powerapps.eaglex.ic.gov/.default",
                    "api.powerplatform.eaglex.ic.gov",
                    "https://api.powerplatform.eaglex.ic.gov/.default",
                    "licensing.eaglex.ic.gov",
                    "api.advisor.powerapps.eaglex.ic.gov",
                    "https://advisor.powerapps.eaglex.ic.gov/.default",
                    "api.admin.powerplatform.eaglex.ic.gov",
                    "",
                    "https://login.microsoftonline.eaglex.ic.gov/",
                ),
                CloudType::Rx => (
                    "api.bap.microsoft.scloud",
                    "api.powerapps.microsoft.scloud",
                    "https://service.powerapps.microsoft.scloud/.default",
                    "api.powerplatform.microsoft.scloud",
                    "https://api.powerplatform.microsoft.scloud/.default",
                    "licensing.microsoft.scloud",
                    "api.advisor.powerapps.microsoft.scloud",
                    "https://advisor.powerapps.microsoft.scloud/.default",
                    "api.admin.powerplatform.microsoft.scloud",
                    "",
                    "https://login.microsoftonline.microsoft.scloud/",
                ),
            };

        Self {
            bapi_url: bapi.to_string(),
            powerapps_url: apps.to_string(),
            powerapps_scope: apps_scope.to_string(),
            powerplatform_url: pp.to_string(),
            powerplatform_scope: pp_scope.to_string(),
            licensing_url: licensing.to_string(),
            powerapps_advisor_url: advisor.to_string(),
            powerapps_advisor_scope: advisor_scope.to_string(),
            admin_powerplatform_url: admin.to_string(),
            analytics_scope: analytics.to_string(),
            authority_host: authority.to_string(),
        }
    }
}

impl Default for CloudUrls {
    fn default() -> Self {
        Self::for_cloud(CloudType::Public)
    }
}

/// Raw credential fields. Which of them are populated decides the
/// [`CredentialStrategy`](crate::auth::CredentialStrategy) for the session.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,

    pub use_cli: bool,
    pub use_oidc: bool,
    pub use_msi: bool,

    pub client_certificate: String,
    pub client_certificate_file_path: String,
    pub client_certificate_password: String,

    pub oidc_request_url: String,
    pub oidc_request_token: String,
    pub oidc_token: String,
    pub oidc_token_file_path: String,
    pub azdo_service_connection_id: String,

    /// Overrides the instance metadata endpoint; empty means [`DEFAULT_MSI_ENDPOINT`].
    pub msi_endpoint: String,
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(value: &str) -> &'static str {
            if value.is_empty() { "" } else { "[REDACTED]" }
        }

        f.debug_struct("ProviderCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("use_cli", &self.use_cli)
            .field("use_oidc", &self.use_oidc)
            .field("use_msi", &self.use_msi)
            .field("client_certificate", &redact(&self.client_certificate))
            .field("client_certificate_file_path", &self.client_certificate_file_path)
            .field("client_certificate_password", &redact(&self.client_certificate_password))
            .field("oidc_request_url", &self.oidc_request_url)
            .field("oidc_request_token", &redact(&self.oidc_request_token))
            .field("oidc_token", &redact(&self.oidc_token))
            .field("oidc_token_file_path", &self.oidc_token_file_path)
            .field("azdo_service_connection_id", &self.azdo_service_connection_id)
            .field("msi_endpoint", &self.msi_endpoint)
            .finish()
    }
}

impl ProviderCredentials {
    pub fn is_client_secret_provided(&self) -> bool {
        !self.tenant_id.is_empty() && !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    pub fn is_cli_provided(&self) -> bool {
        self.use_cli
    }

    pub fn is_pipeline_provided(&self) -> bool {
        !self.azdo_service_connection_id.is_empty()
    }

    pub fn is_oidc_provided(&self) -> bool {
        self.use_oidc
    }

    pub fn is_client_certificate_provided(&self) -> bool {
        !self.client_certificate.is_empty() || !self.client_certificate_file_path.is_empty()
    }

    pub fn is_user_managed_identity_provided(&self) -> bool {
        self.use_msi && !self.client_id.is_empty()
    }

    pub fn is_system_managed_identity_provided(&self) -> bool {
        self.use_msi
    }

    pub fn msi_endpoint(&self) -> &str {
        if self.msi_endpoint.is_empty() {
            DEFAULT_MSI_ENDPOINT
        } else {
            &self.msi_endpoint
        }
    }
}

/// On-disk shape of the configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    cloud: Option<String>,
    urls: Option<CloudUrls>,
    credentials: ProviderCredentials,
    telemetry_optout: bool,
    enable_cae: bool,
    partner_id: Option<String>,
    operation_timeout_secs: Option<u64>,
}

/// Immutable per-session configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub cloud: CloudType,
    pub urls: CloudUrls,
    pub credentials: ProviderCredentials,
    pub telemetry_optout: bool,
    pub enable_cae: bool,
    pub partner_id: Option<String>,
    pub operation_timeout: Duration,
    test_mode: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(CloudType::Public)
    }
}

impl ProviderConfig {
    pub fn new(cloud: CloudType) -> Self {
        Self {
            cloud,
            urls: CloudUrls::for_cloud(cloud),
            credentials: ProviderCredentials::default(),
            telemetry_optout: false,
            enable_cae: false,
            partner_id: None,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            test_mode: false,
        }
    }

    pub fn with_credentials(mut self, credentials: ProviderCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_urls(mut self, urls: CloudUrls) -> Self {
        self.urls = urls;
        self
    }

    /// Short-circuits token acquisition to a fixed sentinel and suppresses
    /// retry sleeps. Only reachable through this call: neither the config
    /// file nor the environment can turn it on.
    pub fn with_test_mode(mut self) -> Self {
        self.test_mode = true;
        self
    }

    pub fn is_test_mode(&self) -> bool {
        self.test_mode
    }

    pub fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = if cfg!(target_os = "linux") {
            // XDG config directory on Linux
            dirs::config_dir()
                .ok_or(ConfigError::NoConfigDir)?
                .join("powerplatform-client")
        } else {
            dirs::home_dir()
                .ok_or(ConfigError::NoConfigDir)?
                .join(".powerplatform-client")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Loads the config file (when present), then applies `.env` and process
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        debug!("Loading config from: {:?}", config_path);

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
                path: config_path.clone(),
                source,
            })?;
            Self::from_toml_str(&content)?
        } else {
            info!("Config file doesn't exist, using defaults");
            Self::default()
        };

        dotenvy::dotenv().ok();
        config.apply_env_with(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Defaults plus environment overrides, without touching the config file.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        config.apply_env_with(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;

        let cloud = match file.cloud.as_deref() {
            Some(name) => name.parse()?,
            None => CloudType::Public,
        };

        let mut config = Self::new(cloud);
        if let Some(urls) = file.urls {
            config.urls = urls;
        }
        config.credentials = file.credentials;
        config.telemetry_optout = file.telemetry_optout;
        config.enable_cae = file.enable_cae;
        config.partner_id = file.partner_id.filter(|id| !id.is_empty());
        match file.operation_timeout_secs {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    name: "operation_timeout_secs".to_string(),
                    value: "0".to_string(),
                });
            }
            Some(secs) => config.operation_timeout = Duration::from_secs(secs),
            None => {}
        }
        Ok(config)
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    /// Unset and empty variables leave the current value alone.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let get_any = |names: &[&str]| names.iter().find_map(|name| get(name));
        let get_bool = |name: &str| -> Result<Option<bool>, ConfigError> {
            get(name).map(|value| parse_bool(name, &value)).transpose()
        };

        if let Some(cloud) = get(env::CLOUD) {
            self.cloud = cloud.parse()?;
            self.urls = CloudUrls::for_cloud(self.cloud);
        }

        let creds = &mut self.credentials;
        let strings: [(&str, &mut String); 7] = [
            (env::TENANT_ID, &mut creds.tenant_id),
            (env::CLIENT_ID, &mut creds.client_id),
            (env::CLIENT_SECRET, &mut creds.client_secret),
            (env::CLIENT_CERTIFICATE, &mut creds.client_certificate),
            (env::CLIENT_CERTIFICATE_FILE_PATH, &mut creds.client_certificate_file_path),
            (env::CLIENT_CERTIFICATE_PASSWORD, &mut creds.client_certificate_password),
            (env::AZDO_SERVICE_CONNECTION_ID, &mut creds.azdo_service_connection_id),
        ];
        for (name, field) in strings {
            if let Some(value) = get(name) {
                *field = value;
            }
        }

        if let Some(value) = get_any(env::OIDC_REQUEST_URL) {
            creds.oidc_request_url = value;
        }
        if let Some(value) = get_any(env::OIDC_REQUEST_TOKEN) {
            creds.oidc_request_token = value;
        }
        if let Some(value) = get(env::OIDC_TOKEN) {
            creds.oidc_token = value;
        }
        if let Some(value) = get(env::OIDC_TOKEN_FILE_PATH) {
            creds.oidc_token_file_path = value;
        }

        if let Some(flag) = get_bool(env::USE_CLI)? {
            creds.use_cli = flag;
        }
        if let Some(flag) = get_bool(env::USE_OIDC)? {
            creds.use_oidc = flag;
        }
        if let Some(flag) = get_bool(env::USE_MSI)? {
            creds.use_msi = flag;
        }
        if let Some(flag) = get_bool(env::TELEMETRY_OPTOUT)? {
            self.telemetry_optout = flag;
        }
        if let Some(flag) = get_bool(env::ENABLE_CAE)? {
            self.enable_cae = flag;
        }
        if let Some(partner) = get_any(env::PARTNER_ID) {
            self.partner_id = Some(partner);
        }

        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}
