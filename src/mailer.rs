// src/mailer.rs
use crate::error::DeliveryError;
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::{error, info};
use std::time::Duration;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, html: &str) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

/// Submits mail through an authenticated STARTTLS relay.
pub struct SmtpMailer {
    sender: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> Result<Self, DeliveryError> {
        let sender: Mailbox = settings
            .username
            .parse()
            .map_err(|_| DeliveryError::Address(settings.username.clone()))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .timeout(Some(settings.timeout))
            .build();
        Ok(Self { sender, transport })
    }
}

pub fn build_message(
    sender: &Mailbox,
    recipient: &str,
    subject: &str,
    html: &str,
) -> Result<Message, DeliveryError> {
    let to: Mailbox = recipient
        .parse()
        .map_err(|_| DeliveryError::Address(recipient.to_string()))?;
    Message::builder()
        .from(sender.clone())
        .to(to)
        .subject(subject)
        .multipart(
            MultiPart::mixed().singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(html.to_string()),
            ),
        )
        .map_err(|e| DeliveryError::Build(e.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, recipient: &str, subject: &str, html: &str) -> Result<(), DeliveryError> {
        let message = build_message(&self.sender, recipient, subject, html)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(())
    }
}

/// Sends one digest and reports the outcome without propagating failures.
pub async fn deliver(mailer: &dyn Mailer, recipient: &str, subject: &str, html: &str) -> bool {
    match mailer.send(recipient, subject, html).await {
        Ok(()) => {
            info!("Newsletter sent to {}", recipient);
            true
        }
        Err(e) => {
            error!("Error sending email to {}: {}", recipient, e);
            false
        }
    }
}
