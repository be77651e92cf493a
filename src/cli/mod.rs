use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (gemini, openai, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "gemini")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., http://localhost:11434 for Ollama)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider (Gemini, OpenAI)
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gemini-2.0-flash, gpt-4o, llama3.1)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    /// Request timeout in seconds for completion calls.
    #[arg(long, env = "LLM_TIMEOUT_SECS", default_value = "60")]
    pub llm_timeout_secs: u64,

    // --- Data Args ---
    /// Path to the prompt configuration file. Built-in templates are used when unset.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    /// Path to a dataset JSON file (waste types, reports, flood zones, dump sites).
    /// The built-in Monrovia sample is used when unset.
    #[arg(long, env = "DATASET_PATH")]
    pub dataset_path: Option<String>,

    /// Weather forecast fed to flood-risk assessments.
    #[arg(
        long,
        env = "WEATHER_FORECAST",
        default_value = "Increased rainfall expected in Victoria Island."
    )]
    pub weather_forecast: String,

    /// Area assessed for the dashboard flood-risk card and alerts.
    #[arg(long, env = "DASHBOARD_AREA", default_value = "Monrovia")]
    pub dashboard_area: String,

    // --- SMS Args ---
    /// Twilio account SID. SMS sending is simulated unless SID, token and number are all set.
    #[arg(long, env = "TWILIO_ACCOUNT_SID")]
    pub twilio_account_sid: Option<String>,

    #[arg(long, env = "TWILIO_AUTH_TOKEN")]
    pub twilio_auth_token: Option<String>,

    /// Sender phone number in E.164 format.
    #[arg(long, env = "TWILIO_PHONE_NUMBER")]
    pub twilio_phone_number: Option<String>,

    #[arg(long, env = "TWILIO_API_BASE", default_value = "https://api.twilio.com")]
    pub twilio_api_base: String,

    // --- Server Args ---
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Optional API Key required for clients calling /api routes. If set, clients must provide this key.
    #[arg(long, env = "SERVER_API_KEY")]
    pub server_api_key: Option<String>,

    /// Requests per second allowed across all clients.
    #[arg(long, env = "RATE_LIMIT_PER_SECOND", default_value = "10")]
    pub rate_limit_per_second: u32,

    /// Optional path to the TLS certificate file (PEM format) for enabling HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}
