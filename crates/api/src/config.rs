use harmonia_generation::client::{DEFAULT_MELODY_VERSION, DEFAULT_STEM_VERSION};
use harmonia_pipeline::dispatcher::DEFAULT_POOL_SIZE;
use harmonia_storage::S3Config;

/// Default number of arrangements per list page.
const DEFAULT_PER_PAGE: i64 = 20;

/// Default user-info endpoint of the identity provider.
const DEFAULT_USERINFO_URL: &str = "https://id.vk.com/oauth2/user_info";

/// Default remote prediction API base URL.
const DEFAULT_REPLICATE_API_URL: &str = "https://api.replicate.com/v1";

/// Server configuration loaded from environment variables.
///
/// All fields except `DATABASE_URL` and `REPLICATE_API_TOKEN` have defaults
/// suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `5000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for in-flight jobs (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// How long a realtime socket may stay open without a credential
    /// (default: `30`).
    pub ws_auth_timeout_secs: u64,
    /// Identifies this process to Postgres and to the change bridge.
    pub instance_id: String,
    /// Maximum concurrently running generation jobs (default: `5`).
    pub worker_pool_size: usize,
    /// Page size of the arrangement list (default: `20`).
    pub per_page: i64,
    /// Public base URL used for absolute links in responses.
    pub host_url: String,
    pub generation: GenerationSettings,
    pub identity: IdentityConfig,
    pub storage: StorageConfig,
}

/// Remote prediction service settings.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub api_url: String,
    pub api_token: String,
    pub melody_version: String,
    pub stem_version: String,
}

/// Which identity resolver authenticates credentials.
#[derive(Debug, Clone)]
pub enum IdentityConfig {
    /// Exchange the credential at an OAuth user-info endpoint.
    UserInfo { url: String, client_id: String },
    /// Validate the credential as an HS256 JWT.
    Jwt { secret: String },
}

/// Where mixed arrangements are stored.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    S3(S3Config),
    Local { path: String },
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                          |
    /// |-------------------------|----------------------------------|
    /// | `HOST`                  | `0.0.0.0`                        |
    /// | `PORT`                  | `5000`                           |
    /// | `CORS_ORIGINS`          | `http://localhost:5173`          |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                             |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                             |
    /// | `WS_AUTH_TIMEOUT_SECS`  | `30`                             |
    /// | `INSTANCE_ID`           | random UUID                      |
    /// | `WORKER_POOL_SIZE`      | `5`                              |
    /// | `ARRANGEMENTS_PER_PAGE` | `20`                             |
    /// | `HOST_URL`              | `http://localhost:5000`          |
    ///
    /// See [`GenerationSettings::from_env`], [`IdentityConfig::from_env`]
    /// and [`StorageConfig::from_env`] for the remaining variables.
    ///
    /// # Panics
    ///
    /// Panics on malformed numbers or missing required variables.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "5000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let ws_auth_timeout_secs: u64 = std::env::var("WS_AUTH_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("WS_AUTH_TIMEOUT_SECS must be a valid u64");

        let instance_id = std::env::var("INSTANCE_ID")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| format!("harmonia-{}", uuid::Uuid::new_v4().simple()));

        let worker_pool_size: usize = std::env::var("WORKER_POOL_SIZE")
            .unwrap_or_else(|_| DEFAULT_POOL_SIZE.to_string())
            .parse()
            .expect("WORKER_POOL_SIZE must be a valid usize");

        let per_page: i64 = std::env::var("ARRANGEMENTS_PER_PAGE")
            .unwrap_or_else(|_| DEFAULT_PER_PAGE.to_string())
            .parse()
            .expect("ARRANGEMENTS_PER_PAGE must be a valid i64");

        let host_url = std::env::var("HOST_URL")
            .unwrap_or_else(|_| "http://localhost:5000".into())
            .trim_end_matches('/')
            .to_string();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            ws_auth_timeout_secs,
            instance_id,
            worker_pool_size: worker_pool_size.max(1),
            per_page: per_page.max(1),
            host_url,
            generation: GenerationSettings::from_env(),
            identity: IdentityConfig::from_env(),
            storage: StorageConfig::from_env(),
        }
    }
}

impl GenerationSettings {
    /// | Env Var                | Required | Default                        |
    /// |------------------------|----------|--------------------------------|
    /// | `REPLICATE_API_URL`    | no       | `https://api.replicate.com/v1` |
    /// | `REPLICATE_API_TOKEN`  | **yes**  | --                             |
    /// | `MELODY_MODEL_VERSION` | no       | upstream melody model          |
    /// | `STEM_MODEL_VERSION`   | no       | upstream stem model            |
    pub fn from_env() -> Self {
        let api_token = std::env::var("REPLICATE_API_TOKEN")
            .expect("REPLICATE_API_TOKEN must be set in the environment");
        assert!(!api_token.is_empty(), "REPLICATE_API_TOKEN must not be empty");

        Self {
            api_url: std::env::var("REPLICATE_API_URL")
                .unwrap_or_else(|_| DEFAULT_REPLICATE_API_URL.into()),
            api_token,
            melody_version: std::env::var("MELODY_MODEL_VERSION")
                .unwrap_or_else(|_| DEFAULT_MELODY_VERSION.into()),
            stem_version: std::env::var("STEM_MODEL_VERSION")
                .unwrap_or_else(|_| DEFAULT_STEM_VERSION.into()),
        }
    }
}

impl IdentityConfig {
    /// | Env Var                 | Default                                     |
    /// |-------------------------|---------------------------------------------|
    /// | `IDENTITY_PROVIDER`     | `userinfo` (`userinfo` or `jwt`)            |
    /// | `IDENTITY_USERINFO_URL` | `https://id.vk.com/oauth2/user_info`        |
    /// | `IDENTITY_CLIENT_ID`    | empty                                       |
    /// | `JWT_SECRET`            | required when the provider is `jwt`         |
    pub fn from_env() -> Self {
        let provider =
            std::env::var("IDENTITY_PROVIDER").unwrap_or_else(|_| "userinfo".into());
        match provider.trim().to_ascii_lowercase().as_str() {
            "jwt" => {
                let secret = std::env::var("JWT_SECRET")
                    .expect("JWT_SECRET must be set when IDENTITY_PROVIDER=jwt");
                assert!(!secret.is_empty(), "JWT_SECRET must not be empty");
                IdentityConfig::Jwt { secret }
            }
            "userinfo" => IdentityConfig::UserInfo {
                url: std::env::var("IDENTITY_USERINFO_URL")
                    .unwrap_or_else(|_| DEFAULT_USERINFO_URL.into()),
                client_id: std::env::var("IDENTITY_CLIENT_ID").unwrap_or_default(),
            },
            other => panic!("Unknown IDENTITY_PROVIDER '{other}' (expected userinfo or jwt)"),
        }
    }
}

impl StorageConfig {
    /// | Env Var              | Default                  |
    /// |----------------------|--------------------------|
    /// | `STORAGE_BACKEND`    | `s3` (`s3` or `local`)   |
    /// | `S3_BUCKET`          | required for `s3`        |
    /// | `S3_ROOT_DIR`        | `arrangements`           |
    /// | `S3_ENDPOINT_URL`    | none                     |
    /// | `LOCAL_STORAGE_PATH` | `./data/arrangements`    |
    pub fn from_env() -> Self {
        let backend = std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| "s3".into());
        match backend.trim().to_ascii_lowercase().as_str() {
            "local" => StorageConfig::Local {
                path: std::env::var("LOCAL_STORAGE_PATH")
                    .unwrap_or_else(|_| "./data/arrangements".into()),
            },
            "s3" => StorageConfig::S3(S3Config {
                bucket: std::env::var("S3_BUCKET")
                    .expect("S3_BUCKET must be set when STORAGE_BACKEND=s3"),
                root_dir: std::env::var("S3_ROOT_DIR").unwrap_or_else(|_| "arrangements".into()),
                endpoint_url: std::env::var("S3_ENDPOINT_URL")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
            }),
            other => panic!("Unknown STORAGE_BACKEND '{other}' (expected s3 or local)"),
        }
    }
}
