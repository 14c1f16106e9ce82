//! Firebase Cloud Messaging (HTTP v1) push delivery.

use log::info;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::config::FcmConfig;
use crate::notifications::DispatchError;
use crate::tickets::TicketSummary;

pub struct FcmClient {
    http: Client,
    config: FcmConfig,
}

impl FcmClient {
    pub fn new(config: FcmConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { http, config }
    }

    /// Sends one push message to one device token.
    pub async fn send_push(
        &self,
        token: &str,
        title: &str,
        body: &str,
        ticket: &TicketSummary,
        ticket_url: &str,
    ) -> Result<(), DispatchError> {
        if !self.config.is_configured() {
            info!("FCM not configured, skipping push for {}", ticket.ticket_number);
            return Ok(());
        }

        let url = format!(
            "{}/v1/projects/{}/messages:send",
            self.config.api_base.trim_end_matches('/'),
            self.config.project_id
        );

        let payload = json!({
            "message": {
                "token": token,
                "notification": {
                    "title": title,
                    "body": body,
                },
                "data": {
                    "ticket_id": ticket.id.to_string(),
                    "ticket_url": ticket_url,
                    "status": ticket.status.as_str(),
                    "click_action": "FLUTTER_NOTIFICATION_CLICK",
                },
            }
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.config.access_token)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(DispatchError::Gateway(format!("{status}: {detail}")));
        }

        info!("FCM push sent for {}", ticket.ticket_number);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::enums::{Priority, TicketStatus};
    use uuid::Uuid;

    fn summary() -> TicketSummary {
        TicketSummary {
            id: Uuid::new_v4(),
            ticket_number: "TKT-000007".to_string(),
            title: "Internet down".to_string(),
            description: "Router offline".to_string(),
            location: "gd01".to_string(),
            category: "Internet".to_string(),
            priority: Priority::High,
            status: TicketStatus::Pending,
            assigned_to: Some(Uuid::new_v4()),
        }
    }

    fn config(api_base: String) -> FcmConfig {
        FcmConfig {
            api_base,
            project_id: "test-project".to_string(),
            access_token: "test-token".to_string(),
        }
    }

    #[tokio::test]
    async fn push_succeeds_on_2xx() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/projects/test-project/messages:send")
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_body("{\"name\":\"projects/test-project/messages/1\"}")
            .create_async()
            .await;

        let client = FcmClient::new(config(server.url()));
        let result = client
            .send_push("device-token", "New ticket", "gd01 - Internet", &summary(), "http://x/tickets/1")
            .await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn push_reports_gateway_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/projects/test-project/messages:send")
            .with_status(403)
            .with_body("{\"error\":\"permission denied\"}")
            .create_async()
            .await;

        let client = FcmClient::new(config(server.url()));
        let result = client
            .send_push("device-token", "New ticket", "gd01 - Internet", &summary(), "http://x/tickets/1")
            .await;

        assert!(matches!(result, Err(DispatchError::Gateway(_))));
    }

    #[tokio::test]
    async fn unconfigured_fcm_is_a_quiet_noop() {
        let client = FcmClient::new(FcmConfig {
            api_base: "http://127.0.0.1:1".to_string(),
            project_id: String::new(),
            access_token: String::new(),
        });
        let result = client
            .send_push("device-token", "t", "b", &summary(), "http://x")
            .await;
        assert!(result.is_ok());
    }
}
