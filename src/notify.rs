use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

/// Fire-and-forget email dispatch. Anything that goes wrong is logged and
/// swallowed; a failed email never fails the request that triggered it.
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl Mailer {
    /// None when SMTP settings are absent; dispatch is then skipped entirely.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SMTP_HOST").ok().filter(|s| !s.is_empty())?;
        let from: Mailbox = std::env::var("SMTP_FROM").ok()?.parse().ok()?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&host).ok()?;
        if let (Ok(user), Ok(pass)) = (std::env::var("SMTP_USER"), std::env::var("SMTP_PASS")) {
            builder = builder.credentials(Credentials::new(user, pass));
        }
        Some(Self {
            transport: builder.build(),
            from,
        })
    }

    pub async fn send(&self, recipient: &str, subject: &str, body: &str) {
        let to: Mailbox = match recipient.parse() {
            Ok(mailbox) => mailbox,
            Err(e) => {
                warn!("invalid recipient address {}: {}", recipient, e);
                return;
            }
        };
        let email = match Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .body(body.to_string())
        {
            Ok(message) => message,
            Err(e) => {
                warn!("could not build email to {}: {}", recipient, e);
                return;
            }
        };
        match self.transport.send(email).await {
            Ok(_) => info!("notification email sent to {}", recipient),
            Err(e) => warn!("email dispatch to {} failed: {}", recipient, e),
        }
    }
}
