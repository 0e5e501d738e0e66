pub mod capture;
pub mod events;
pub mod gateway;
pub mod message;

pub mod settings {
    use serde::{Deserialize, Serialize};

    fn default_interval_secs() -> u64 {
        20
    }

    fn default_history_limit() -> usize {
        50
    }

    fn default_request_timeout_secs() -> u64 {
        45
    }

    fn default_command_timeout_secs() -> u64 {
        60
    }

    #[derive(Debug, Clone, Serialize, Deserialize, Default)]
    pub struct ProviderAuth {
        pub api_key: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ModelProvider {
        pub gemini_model: String, // e.g., "gemini-2.5-flash"
        pub gemini_auth: ProviderAuth,
        #[serde(default = "default_request_timeout_secs")]
        pub request_timeout_secs: u64,
    }

    /// Where screen frames come from while capture is active
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "snake_case")]
    pub enum CaptureSource {
        /// Shell command that writes one encoded image to stdout (e.g. `grim -`)
        Command(String),
        /// Image file that an external tool keeps refreshing
        File(String),
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AppSettings {
        pub model: ModelProvider,
        /// Seconds between proactive analysis ticks
        #[serde(default = "default_interval_secs")]
        pub autonomous_interval_secs: u64,
        #[serde(default = "default_history_limit")]
        pub command_history_limit: usize,
        #[serde(default = "default_command_timeout_secs")]
        pub command_timeout_secs: u64,
        #[serde(default)]
        pub capture_source: Option<CaptureSource>,
    }

    impl Default for AppSettings {
        fn default() -> Self {
            Self {
                model: ModelProvider {
                    gemini_model: "gemini-2.5-flash".into(),
                    gemini_auth: ProviderAuth::default(),
                    request_timeout_secs: default_request_timeout_secs(),
                },
                autonomous_interval_secs: default_interval_secs(),
                command_history_limit: default_history_limit(),
                command_timeout_secs: default_command_timeout_secs(),
                capture_source: None,
            }
        }
    }

}
