use crate::config::{EmailConfig, NotificationConfig, SmsConfig};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use lokal_common::models::profile::Profile;
use lokal_common::models::voucher::Voucher;
use serde::Serialize;
use std::sync::Arc;

/// Where a notification goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl From<&Profile> for Recipient {
    fn from(profile: &Profile) -> Self {
        Self {
            name: profile.display_name.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
        }
    }
}

/// A human-readable message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

impl Notification {
    /// Message telling a member about a freshly issued voucher
    pub fn voucher_issued(recipient: &Recipient, voucher: &Voucher) -> Self {
        let mut body = format!(
            "Hi {}, you received a {} from Lokal.\n\nYour code: {}\n",
            recipient.name,
            voucher.reason.label(),
            voucher.code
        );
        if let Some(description) = &voucher.description {
            body.push_str(description);
            body.push('\n');
        }
        match voucher.expires_at {
            Some(expires_at) => body.push_str(&format!(
                "Valid until {}. Show the code at the counter to redeem it.",
                expires_at.format("%Y-%m-%d")
            )),
            None => body.push_str("Show the code at the counter to redeem it."),
        }
        Self {
            subject: format!("Your Lokal {}", voucher.reason.label()),
            body,
        }
    }
}

/// A delivery channel for notifications
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Channel name used in logs
    fn channel(&self) -> &'static str;

    /// Deliver the notification. Returns `Ok(false)` when the recipient has
    /// no address for this channel.
    async fn send(&self, recipient: &Recipient, notification: &Notification) -> Result<bool>;
}

/// Email via a JSON HTTP API (`{from, to, subject, text}` with a bearer key)
pub struct EmailSender {
    client: reqwest::Client,
    config: EmailConfig,
}

#[derive(Debug, Serialize)]
struct EmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    text: &'a str,
}

impl EmailSender {
    pub fn new(client: reqwest::Client, config: EmailConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl NotificationSender for EmailSender {
    fn channel(&self) -> &'static str {
        "email"
    }

    async fn send(&self, recipient: &Recipient, notification: &Notification) -> Result<bool> {
        let Some(to) = recipient.email.as_deref() else {
            return Ok(false);
        };
        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&EmailRequest {
                from: &self.config.from,
                to: vec![to],
                subject: &notification.subject,
                text: &notification.body,
            })
            .send()
            .await
            .context("Failed to send email request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Email provider returned {}: {}", status, body);
        }
        Ok(true)
    }
}

/// SMS via a Twilio-compatible messages endpoint
pub struct SmsSender {
    client: reqwest::Client,
    config: SmsConfig,
}

impl SmsSender {
    pub fn new(client: reqwest::Client, config: SmsConfig) -> Self {
        Self { client, config }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

#[async_trait]
impl NotificationSender for SmsSender {
    fn channel(&self) -> &'static str {
        "sms"
    }

    async fn send(&self, recipient: &Recipient, notification: &Notification) -> Result<bool> {
        let Some(to) = recipient.phone.as_deref() else {
            return Ok(false);
        };
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", to),
                ("From", self.config.from.as_str()),
                ("Body", notification.body.as_str()),
            ])
            .send()
            .await
            .context("Failed to send SMS request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("SMS provider returned {}: {}", status, body);
        }
        Ok(true)
    }
}

/// Fans a notification out to every configured channel.
///
/// Delivery is fire-and-forget: each channel runs on its own task, failures
/// are logged and never reported back to the caller.
#[derive(Clone, Default)]
pub struct Notifier {
    senders: Vec<Arc<dyn NotificationSender>>,
}

impl Notifier {
    pub fn new(senders: Vec<Arc<dyn NotificationSender>>) -> Self {
        Self { senders }
    }

    /// Notifier with no channels
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn from_config(config: &NotificationConfig) -> Self {
        let client = reqwest::Client::new();
        let mut senders: Vec<Arc<dyn NotificationSender>> = Vec::new();
        if let Some(email) = &config.email {
            senders.push(Arc::new(EmailSender::new(client.clone(), email.clone())));
        }
        if let Some(sms) = &config.sms {
            senders.push(Arc::new(SmsSender::new(client, sms.clone())));
        }
        Self { senders }
    }

    pub fn channels(&self) -> Vec<&'static str> {
        self.senders.iter().map(|s| s.channel()).collect()
    }

    /// Spawn delivery on every channel and return immediately.
    pub fn notify(&self, recipient: Recipient, notification: Notification) {
        if self.senders.is_empty() {
            return;
        }
        let recipient = Arc::new(recipient);
        let notification = Arc::new(notification);
        for sender in &self.senders {
            let sender = sender.clone();
            let recipient = recipient.clone();
            let notification = notification.clone();
            tokio::spawn(async move {
                deliver(sender.as_ref(), &recipient, &notification).await;
            });
        }
    }
}

async fn deliver(sender: &dyn NotificationSender, recipient: &Recipient, notification: &Notification) {
    match sender.send(recipient, notification).await {
        Ok(true) => tracing::debug!(channel = sender.channel(), "Notification delivered"),
        Ok(false) => tracing::debug!(
            channel = sender.channel(),
            "Recipient has no address for channel, skipped"
        ),
        Err(e) => tracing::warn!(
            channel = sender.channel(),
            "Failed to deliver notification: {:#}",
            e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use lokal_common::models::voucher::VoucherReason;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    struct ChannelSender {
        tx: mpsc::UnboundedSender<(Recipient, Notification)>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationSender for ChannelSender {
        fn channel(&self) -> &'static str {
            "test"
        }

        async fn send(&self, recipient: &Recipient, notification: &Notification) -> Result<bool> {
            self.tx
                .send((recipient.clone(), notification.clone()))
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            if self.fail {
                bail!("provider down");
            }
            Ok(true)
        }
    }

    fn voucher(expires: bool) -> Voucher {
        Voucher {
            code: "LOKAL-BDAY-ABC234".to_string(),
            user_id: Uuid::new_v4(),
            reason: VoucherReason::Birthday,
            description: Some("One drink on the house.".to_string()),
            created_at: Utc::now(),
            expires_at: expires.then(|| Utc.with_ymd_and_hms(2026, 10, 25, 12, 0, 0).unwrap()),
            used: false,
            used_at: None,
            redeemed_by: None,
        }
    }

    fn recipient() -> Recipient {
        Recipient {
            name: "Anna".to_string(),
            email: Some("anna@lokal.cafe".to_string()),
            phone: None,
        }
    }

    #[test]
    fn test_voucher_issued_message() {
        let n = Notification::voucher_issued(&recipient(), &voucher(true));
        assert_eq!(n.subject, "Your Lokal birthday voucher");
        assert!(n.body.starts_with("Hi Anna, you received a birthday voucher"));
        assert!(n.body.contains("LOKAL-BDAY-ABC234"));
        assert!(n.body.contains("One drink on the house."));
        assert!(n.body.contains("Valid until 2026-10-25"));
    }

    #[test]
    fn test_voucher_issued_message_without_expiry() {
        let n = Notification::voucher_issued(&recipient(), &voucher(false));
        assert!(!n.body.contains("Valid until"));
    }

    #[test]
    fn test_from_config_builds_configured_channels() {
        assert!(Notifier::from_config(&NotificationConfig::default())
            .channels()
            .is_empty());
        let config = NotificationConfig {
            email: Some(EmailConfig {
                api_url: "http://localhost/emails".to_string(),
                api_key: "k".to_string(),
                from: "hello@lokal.cafe".to_string(),
            }),
            sms: Some(SmsConfig {
                api_base: "http://localhost/".to_string(),
                account_sid: "AC1".to_string(),
                auth_token: "t".to_string(),
                from: "+100".to_string(),
            }),
        };
        assert_eq!(Notifier::from_config(&config).channels(), vec!["email", "sms"]);
    }

    #[test]
    fn test_sms_url() {
        let sender = SmsSender::new(
            reqwest::Client::new(),
            SmsConfig {
                api_base: "https://api.twilio.com/".to_string(),
                account_sid: "AC42".to_string(),
                auth_token: "t".to_string(),
                from: "+100".to_string(),
            },
        );
        assert_eq!(
            sender.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC42/Messages.json"
        );
    }

    #[tokio::test]
    async fn test_sender_skips_recipient_without_address() {
        let sender = SmsSender::new(
            reqwest::Client::new(),
            SmsConfig {
                api_base: "http://127.0.0.1:1".to_string(),
                account_sid: "AC1".to_string(),
                auth_token: "t".to_string(),
                from: "+100".to_string(),
            },
        );
        let n = Notification::voucher_issued(&recipient(), &voucher(true));
        assert!(!sender.send(&recipient(), &n).await.unwrap());
    }

    #[tokio::test]
    async fn test_notify_delivers_to_every_sender() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = Notifier::new(vec![
            Arc::new(ChannelSender {
                tx: tx.clone(),
                fail: false,
            }),
            Arc::new(ChannelSender { tx, fail: true }),
        ]);
        let n = Notification::voucher_issued(&recipient(), &voucher(true));

        notifier.notify(recipient(), n.clone());

        let (r1, n1) = rx.recv().await.unwrap();
        let (r2, n2) = rx.recv().await.unwrap();
        assert_eq!(r1, recipient());
        assert_eq!(r2, recipient());
        assert_eq!(n1, n);
        assert_eq!(n2, n);
    }

    #[tokio::test]
    async fn test_disabled_notifier_is_noop() {
        let notifier = Notifier::disabled();
        assert!(notifier.channels().is_empty());
        notifier.notify(
            recipient(),
            Notification::voucher_issued(&recipient(), &voucher(false)),
        );
    }
}
