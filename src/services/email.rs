use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::Config;

/// Outbound mail over SMTP. Constructed only when SMTP settings are present;
/// callers treat a missing service as "email disabled" and log instead.
#[derive(Clone)]
pub struct EmailService {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
    app_base_url: String,
}

impl EmailService {
    pub fn new(config: &Config) -> Option<Self> {
        let host = config.smtp_host.clone()?;
        let username = config.smtp_username.clone()?;
        let password = config.smtp_password.clone()?;
        let from = config
            .smtp_from
            .clone()
            .unwrap_or_else(|| username.clone());
        let port = config.smtp_port.unwrap_or(587);

        let creds = Credentials::new(username, password);
        let builder = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)
        };
        let transport = match builder {
            Ok(b) => b.credentials(creds).port(port).build(),
            Err(e) => {
                tracing::error!("Failed to build SMTP transport: {e}");
                return None;
            }
        };

        Some(Self {
            transport,
            from,
            app_base_url: config.app_base_url.clone(),
        })
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body)?;
        self.transport.send(message).await?;
        Ok(())
    }

    pub async fn send_verification_email(&self, to: &str, token: &str) -> anyhow::Result<()> {
        let link = format!("{}/verify-email?token={token}", self.app_base_url);
        let body = format!(
            "<p>Welcome! Please confirm your email address.</p>\
             <p>Your verification code is <strong>{token}</strong>, \
             or follow <a href=\"{link}\">this link</a>.</p>"
        );
        self.send(to, "Verify your email", body).await
    }

    pub async fn send_password_reset_email(&self, to: &str, code: &str) -> anyhow::Result<()> {
        let body = format!(
            "<p>A password reset was requested for your account.</p>\
             <p>Your reset code is <strong>{code}</strong>. \
             It expires in 15 minutes. If you did not request this, ignore this email.</p>"
        );
        self.send(to, "Password reset code", body).await
    }

    pub async fn send_ticket_created_email(
        &self,
        to: &str,
        ticket_id: i64,
        title: &str,
    ) -> anyhow::Result<()> {
        let body = format!(
            "<p>A new support ticket has been opened.</p>\
             <p>Ticket #{ticket_id}: <strong>{title}</strong></p>\
             <p><a href=\"{}/tickets/{ticket_id}\">View the ticket</a></p>",
            self.app_base_url
        );
        self.send(to, &format!("New ticket #{ticket_id}"), body).await
    }

    pub async fn send_late_ticket_reminder(
        &self,
        to: &str,
        ticket_id: i64,
        title: &str,
        hours_idle: i64,
    ) -> anyhow::Result<()> {
        let body = format!(
            "<p>Ticket #{ticket_id} (<strong>{title}</strong>) has had no activity \
             for {hours_idle} hours.</p>\
             <p><a href=\"{}/tickets/{ticket_id}\">View the ticket</a></p>",
            self.app_base_url
        );
        self.send(to, &format!("Reminder: ticket #{ticket_id} needs attention"), body)
            .await
    }
}
