//! Twilio WhatsApp gateway delivery.

use log::info;
use reqwest::Client;
use std::time::Duration;

use crate::config::WhatsAppConfig;
use crate::notifications::DispatchError;
use crate::tickets::TicketSummary;

pub struct TwilioClient {
    http: Client,
    config: WhatsAppConfig,
}

/// Message body for a newly assigned ticket.
pub fn assigned_message(ticket: &TicketSummary, ticket_url: &str) -> String {
    format!(
        "New ticket assigned\n\n\
         Number: {}\n\
         Category: {}\n\
         Location: {}\n\
         Priority: {}\n\n\
         Description:\n{}\n\n\
         Details: {}",
        ticket.ticket_number,
        ticket.category,
        ticket.location,
        ticket.priority,
        ticket.description,
        ticket_url
    )
}

impl TwilioClient {
    pub fn new(config: WhatsAppConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { http, config }
    }

    /// Sends one WhatsApp message through Twilio. A disabled or
    /// unconfigured gateway is a quiet no-op.
    pub async fn send_message(&self, to: &str, body: &str) -> Result<(), DispatchError> {
        if !self.config.is_configured() {
            return Ok(());
        }

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        );

        let params = [
            ("From", format!("whatsapp:{}", self.config.from_number)),
            ("To", format!("whatsapp:{to}")),
            ("Body", body.to_string()),
        ];

        let resp = self
            .http
            .post(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&params)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(DispatchError::Gateway(format!("{status}: {detail}")));
        }

        info!("WhatsApp message sent to {to}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::enums::{Priority, TicketStatus};
    use uuid::Uuid;

    fn config(api_base: String, enabled: bool) -> WhatsAppConfig {
        WhatsAppConfig {
            enabled,
            api_base,
            account_sid: "AC123".to_string(),
            auth_token: "secret".to_string(),
            from_number: "+15550001111".to_string(),
        }
    }

    #[test]
    fn assigned_message_carries_the_ticket_facts() {
        let summary = TicketSummary {
            id: Uuid::new_v4(),
            ticket_number: "TKT-000042".to_string(),
            title: "Electrical fault".to_string(),
            description: "Sparks from the socket".to_string(),
            location: "gd01".to_string(),
            category: "Electrical".to_string(),
            priority: Priority::Critical,
            status: TicketStatus::Pending,
            assigned_to: Some(Uuid::new_v4()),
        };
        let body = assigned_message(&summary, "http://srv/tickets/1");
        assert!(body.contains("TKT-000042"));
        assert!(body.contains("Electrical"));
        assert!(body.contains("gd01"));
        assert!(body.contains("CRITICAL"));
        assert!(body.contains("http://srv/tickets/1"));
    }

    #[tokio::test]
    async fn disabled_gateway_is_a_noop() {
        let client = TwilioClient::new(config("http://127.0.0.1:1".to_string(), false));
        assert!(client.send_message("+15550002222", "hello").await.is_ok());
    }

    #[tokio::test]
    async fn message_posts_to_the_account_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/2010-04-01/Accounts/AC123/Messages.json")
            .with_status(201)
            .with_body("{\"sid\":\"SM1\"}")
            .create_async()
            .await;

        let client = TwilioClient::new(config(server.url(), true));
        let result = client.send_message("+15550002222", "hello").await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn gateway_rejection_surfaces_as_dispatch_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/2010-04-01/Accounts/AC123/Messages.json")
            .with_status(401)
            .with_body("{\"message\":\"authenticate\"}")
            .create_async()
            .await;

        let client = TwilioClient::new(config(server.url(), true));
        let result = client.send_message("+15550002222", "hello").await;

        assert!(matches!(result, Err(DispatchError::Gateway(_))));
    }
}
