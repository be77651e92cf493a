//! Outbound SMS through Twilio's Messages API. Without credentials the
//! message is logged and reported as sent.

use chrono::Utc;
use log::{ error, info };
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use std::time::Duration;

use crate::cli::Args;
use crate::models::waste::FloodRiskAssessment;

const DEFAULT_API_BASE: &str = "https://api.twilio.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
pub struct SendSmsRequest {
    pub to: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendSmsOutput {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendSmsOutput {
    fn sent(message_id: String) -> Self {
        Self { success: true, message_id: Some(message_id), error: None }
    }

    fn failed(error: String) -> Self {
        Self { success: false, message_id: None, error: Some(error) }
    }
}

#[derive(Debug, Clone)]
pub struct TwilioCredentials {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

impl TwilioCredentials {
    /// All three values must be present and non-blank.
    pub fn from_parts(
        account_sid: Option<&str>,
        auth_token: Option<&str>,
        from_number: Option<&str>
    ) -> Option<Self> {
        let present = |v: Option<&str>| v.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
        Some(Self {
            account_sid: present(account_sid)?,
            auth_token: present(auth_token)?,
            from_number: present(from_number)?,
        })
    }
}

#[derive(Deserialize)]
struct TwilioMessage {
    sid: String,
}

#[derive(Deserialize)]
struct TwilioError {
    message: String,
}

#[derive(Clone)]
pub struct SmsClient {
    http: HttpClient,
    credentials: Option<TwilioCredentials>,
    api_base: String,
}

impl SmsClient {
    pub fn new(credentials: Option<TwilioCredentials>, api_base: Option<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: HttpClient::builder().timeout(REQUEST_TIMEOUT).build()?,
            credentials,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        })
    }

    pub fn from_args(args: &Args) -> Result<Self, reqwest::Error> {
        let credentials = TwilioCredentials::from_parts(
            args.twilio_account_sid.as_deref(),
            args.twilio_auth_token.as_deref(),
            args.twilio_phone_number.as_deref()
        );
        if credentials.is_none() {
            info!("Twilio credentials not configured, SMS sending will be simulated");
        }
        Self::new(credentials, Some(args.twilio_api_base.clone()))
    }

    pub fn is_simulated(&self) -> bool {
        self.credentials.is_none()
    }

    /// Sends one message. Failures are reported in the output, never retried.
    pub async fn send(&self, to: &str, body: &str) -> SendSmsOutput {
        let Some(credentials) = &self.credentials else {
            info!("--- SIMULATING SMS ---");
            info!("To: {}", to);
            info!("Body: {}", body);
            info!("----------------------");
            return SendSmsOutput::sent(format!("simulated_{}", Utc::now().timestamp_millis()));
        };

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base.trim_end_matches('/'),
            credentials.account_sid
        );
        info!("SmsClient::send() → to={} url={}", to, url);

        let result = self.http
            .post(&url)
            .basic_auth(&credentials.account_sid, Some(&credentials.auth_token))
            .form(&[("To", to), ("From", credentials.from_number.as_str()), ("Body", body)])
            .send().await;

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                error!("Error sending SMS: {}", e);
                return SendSmsOutput::failed(e.to_string());
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<TwilioError>(&text)
                .map(|e| e.message)
                .unwrap_or_else(|_| format!("Twilio returned status {}", status));
            error!("Error sending SMS: {} ({})", message, status);
            return SendSmsOutput::failed(message);
        }

        match resp.json::<TwilioMessage>().await {
            Ok(message) => {
                info!("SMS sent successfully with SID: {}", message.sid);
                SendSmsOutput::sent(message.sid)
            }
            Err(e) => {
                error!("Could not read Twilio response: {}", e);
                SendSmsOutput::failed(e.to_string())
            }
        }
    }
}

pub fn flood_alert_body(assessment: &FloodRiskAssessment) -> String {
    format!(
        "Gbala Alert: {} flood risk detected in your area. Reason: {}",
        assessment.risk_level,
        assessment.reasoning
    )
}
