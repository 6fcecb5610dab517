use async_trait::async_trait;
use tracing::{debug, warn};

use shared_config::AppConfig;

use crate::models::{otp_message, ConfirmationDetails, DeliveryReceipt, NotificationError};
use super::NotificationService;

pub struct TwilioSmsNotifier {
    account_sid: String,
    auth_token: String,
    from_number: String,
    base_url: String,
    country_code: String,
    client: reqwest::Client,
}

impl TwilioSmsNotifier {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            account_sid: config.twilio_account_sid.clone(),
            auth_token: config.twilio_auth_token.clone(),
            from_number: config.twilio_from_number.clone(),
            base_url: config.twilio_base_url.trim_end_matches('/').to_string(),
            country_code: config.twilio_country_code.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// Local 10-digit numbers get the configured country prefix.
    pub fn to_e164(&self, phone_number: &str) -> String {
        if phone_number.starts_with('+') {
            phone_number.to_string()
        } else {
            format!("{}{}", self.country_code, phone_number)
        }
    }

    async fn send_sms(&self, to: &str, body: &str) -> Result<(), NotificationError> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );
        let to = self.to_e164(to);

        let response = self.client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to.as_str()), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected { status: status.as_u16(), body });
        }

        debug!("SMS accepted by provider for {}", to);
        Ok(())
    }

    async fn deliver(&self, to: &str, body: &str) -> DeliveryReceipt {
        match self.send_sms(to, body).await {
            Ok(()) => DeliveryReceipt::delivered(),
            Err(e) => {
                warn!("SMS delivery failed: {}", e);
                DeliveryReceipt::failed(e.to_string())
            }
        }
    }
}

#[async_trait]
impl NotificationService for TwilioSmsNotifier {
    async fn send_otp(&self, phone_number: &str, code: &str) -> DeliveryReceipt {
        self.deliver(phone_number, &otp_message(code)).await
    }

    async fn send_confirmation(&self, phone_number: &str, details: &ConfirmationDetails) -> DeliveryReceipt {
        self.deliver(phone_number, &details.message()).await
    }
}
