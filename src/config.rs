//! Env-driven configuration for the studio server and the CLI.
//!
//! Values are read from the process environment; `dotenv` is loaded on demand
//! by the binaries. Defaults are provided for convenience during development.
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

const DEFAULT_COMFYUI_URL: &str = "http://127.0.0.1:8188";
const DEFAULT_API_HOST: &str = "127.0.0.1";
const DEFAULT_API_PORT: u16 = 8002;
const DEFAULT_WORKFLOW: &str = "workflows/assetgen_sdxl_api.json";

const ENV_KEYS: &[&str] = &[
    "COMFYUI_URL",
    "PROJECT_ROOT",
    "SPECS_DIR",
    "WORKFLOW_PATH",
    "API_HOST",
    "API_PORT",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub comfyui_url: String,
    pub project_root: PathBuf,
    pub specs_dir: PathBuf,
    pub workflow_path: PathBuf,
    pub api_host: String,
    pub api_port: String,
}

impl Config {
    pub fn dotenv_load() {
        dotenv::dotenv().ok();
    }

    pub fn new() -> Self {
        let project_root =
            PathBuf::from(env::var("PROJECT_ROOT").unwrap_or_else(|_| ".".to_string()));
        let specs_dir = env::var("SPECS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| project_root.join("specs"));
        let workflow_path = env::var("WORKFLOW_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| project_root.join(DEFAULT_WORKFLOW));
        Config {
            comfyui_url: env::var("COMFYUI_URL")
                .unwrap_or_else(|_| DEFAULT_COMFYUI_URL.to_string()),
            project_root,
            specs_dir,
            workflow_path,
            api_host: env::var("API_HOST").unwrap_or_else(|_| DEFAULT_API_HOST.to_string()),
            api_port: env::var("API_PORT").unwrap_or_else(|_| DEFAULT_API_PORT.to_string()),
        }
    }

    /// Socket address for the studio server, falling back to defaults on bad input.
    pub fn socket_address(&self) -> SocketAddr {
        let ip: IpAddr = self.api_host.parse().unwrap_or_else(|_| {
            tracing::warn!(
                "Invalid API_HOST '{}', falling back to {}",
                self.api_host,
                DEFAULT_API_HOST
            );
            IpAddr::from([127, 0, 0, 1])
        });
        let port: u16 = self.api_port.parse().unwrap_or_else(|_| {
            tracing::warn!(
                "Invalid API_PORT '{}', falling back to {}",
                self.api_port,
                DEFAULT_API_PORT
            );
            DEFAULT_API_PORT
        });
        SocketAddr::new(ip, port)
    }

    pub fn log_env_vars() {
        for key in ENV_KEYS {
            let value = env::var(key).unwrap_or_else(|_| "<unset>".to_string());
            tracing::info!("{}: {}", key, value);
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
