//! Email notifications for new leads and career applications.
//!
//! Uses SMTP via lettre for delivery with Askama templates. Every send is
//! best-effort from the caller's point of view: failures are logged and never
//! fail the request that triggered them.

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use cellionyx_core::CtaType;

use crate::config::{EmailConfig, NotificationConfig};
use crate::models::{CareerApplication, Prospect};

#[derive(Template)]
#[template(path = "email/lead_notification.html")]
struct LeadEmailHtml<'a> {
    heading: &'a str,
    name: &'a str,
    email: &'a str,
    phone: Option<&'a str>,
    organization: Option<&'a str>,
    function_role: Option<&'a str>,
    discipline: Option<&'a str>,
    page: &'a str,
    lead_score: u8,
    is_new: bool,
    portal_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/lead_notification.txt")]
struct LeadEmailText<'a> {
    heading: &'a str,
    name: &'a str,
    email: &'a str,
    phone: Option<&'a str>,
    organization: Option<&'a str>,
    function_role: Option<&'a str>,
    discipline: Option<&'a str>,
    page: &'a str,
    lead_score: u8,
    is_new: bool,
    portal_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/career_application.html")]
struct CareerEmailHtml<'a> {
    name: &'a str,
    email: &'a str,
    phone: Option<&'a str>,
    position: &'a str,
    resume_url: Option<&'a str>,
    introduction: &'a str,
    interest: &'a str,
}

#[derive(Template)]
#[template(path = "email/career_application.txt")]
struct CareerEmailText<'a> {
    name: &'a str,
    email: &'a str,
    phone: Option<&'a str>,
    position: &'a str,
    resume_url: Option<&'a str>,
    introduction: &'a str,
    interest: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// A form submission the sales inbox should hear about.
#[derive(Debug, Clone, Copy)]
pub struct LeadNotice<'a> {
    /// The prospect after the submission was stored.
    pub prospect: &'a Prospect,
    /// The CTA of this submission, not the prospect's first one.
    pub cta_type: &'a CtaType,
    pub page: &'a str,
    /// `false` for a returning prospect.
    pub is_new: bool,
}

impl LeadNotice<'_> {
    /// Subject line; demo requests and waitlist signups read differently.
    #[must_use]
    pub fn subject(&self) -> String {
        let name = self.prospect.full_name();
        if self.cta_type.is_demo() {
            let organization = self
                .prospect
                .organization
                .as_deref()
                .unwrap_or("Unknown Organization");
            format!("New Demo Request: {name} from {organization}")
        } else {
            format!("New Waitlist Signup: {name}")
        }
    }

    const fn heading(&self) -> &'static str {
        if self.cta_type.is_demo() {
            "New Demo Request"
        } else {
            "New Waitlist Signup"
        }
    }
}

/// Outbound notification email.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Tell the sales inbox about a form submission.
    async fn send_lead_notification(&self, notice: LeadNotice<'_>) -> Result<(), EmailError>;

    /// Tell the careers inbox about an application.
    async fn send_career_application(
        &self,
        application: &CareerApplication,
    ) -> Result<(), EmailError>;
}

/// Mailer used when SMTP is not configured. Sends nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send_lead_notification(&self, notice: LeadNotice<'_>) -> Result<(), EmailError> {
        tracing::debug!(prospect_id = %notice.prospect.id, "Email not configured, skipping lead notification");
        Ok(())
    }

    async fn send_career_application(
        &self,
        application: &CareerApplication,
    ) -> Result<(), EmailError> {
        tracing::debug!(application_id = %application.id, "Email not configured, skipping application notification");
        Ok(())
    }
}

/// SMTP mailer rendering the notification templates.
#[derive(Clone)]
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    inboxes: NotificationConfig,
    portal_url: String,
}

impl SmtpMailer {
    /// Create a new SMTP mailer from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be set up.
    pub fn new(
        config: &EmailConfig,
        inboxes: NotificationConfig,
        portal_url: String,
    ) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            inboxes,
            portal_url,
        })
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        cc: Option<&str>,
        subject: &str,
        text_body: String,
        html_body: String,
    ) -> Result<(), EmailError> {
        let mut builder = Message::builder()
            .from(parse_mailbox(&self.from_address)?)
            .to(parse_mailbox(to)?)
            .subject(subject);
        if let Some(cc) = cc {
            builder = builder.cc(parse_mailbox(cc)?);
        }

        let email = builder.multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(text_body),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(html_body),
                ),
        )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<lettre::message::Mailbox, EmailError> {
    address
        .parse()
        .map_err(|_| EmailError::InvalidAddress(address.to_owned()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_lead_notification(&self, notice: LeadNotice<'_>) -> Result<(), EmailError> {
        let prospect = notice.prospect;
        let name = prospect.full_name();

        let html = LeadEmailHtml {
            heading: notice.heading(),
            name: &name,
            email: prospect.email.as_str(),
            phone: prospect.phone.as_deref(),
            organization: prospect.organization.as_deref(),
            function_role: prospect.function_role.as_deref(),
            discipline: prospect.discipline.as_deref(),
            page: notice.page,
            lead_score: prospect.lead_score.value(),
            is_new: notice.is_new,
            portal_url: &self.portal_url,
        }
        .render()?;
        let text = LeadEmailText {
            heading: notice.heading(),
            name: &name,
            email: prospect.email.as_str(),
            phone: prospect.phone.as_deref(),
            organization: prospect.organization.as_deref(),
            function_role: prospect.function_role.as_deref(),
            discipline: prospect.discipline.as_deref(),
            page: notice.page,
            lead_score: prospect.lead_score.value(),
            is_new: notice.is_new,
            portal_url: &self.portal_url,
        }
        .render()?;

        self.send_multipart_email(&self.inboxes.sales_inbox, None, &notice.subject(), text, html)
            .await
    }

    async fn send_career_application(
        &self,
        application: &CareerApplication,
    ) -> Result<(), EmailError> {
        let name = application.full_name();
        let html = CareerEmailHtml {
            name: &name,
            email: application.email.as_str(),
            phone: application.phone.as_deref(),
            position: &application.position,
            resume_url: application.resume_url.as_deref(),
            introduction: &application.introduction,
            interest: &application.interest,
        }
        .render()?;
        let text = CareerEmailText {
            name: &name,
            email: application.email.as_str(),
            phone: application.phone.as_deref(),
            position: &application.position,
            resume_url: application.resume_url.as_deref(),
            introduction: &application.introduction,
            interest: &application.interest,
        }
        .render()?;

        let subject = format!("New Career Application: {name} - {}", application.position);
        self.send_multipart_email(
            &self.inboxes.careers_inbox,
            Some(&self.inboxes.sales_inbox),
            &subject,
            text,
            html,
        )
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::prospect::fixtures;

    #[test]
    fn test_subject_demo_and_waitlist() {
        let mut prospect = fixtures::prospect("ada@mercy.org");
        let demo = CtaType::Demo;
        let notice = LeadNotice {
            prospect: &prospect,
            cta_type: &demo,
            page: "home",
            is_new: true,
        };
        assert_eq!(
            notice.subject(),
            "New Demo Request: Ada Byron from Mercy Hospital"
        );

        prospect.organization = None;
        let notice = LeadNotice {
            prospect: &prospect,
            cta_type: &demo,
            page: "home",
            is_new: true,
        };
        assert!(notice.subject().ends_with("from Unknown Organization"));

        let waitlist = CtaType::Waitlist;
        let notice = LeadNotice {
            prospect: &prospect,
            cta_type: &waitlist,
            page: "home",
            is_new: false,
        };
        assert_eq!(notice.subject(), "New Waitlist Signup: Ada Byron");
    }

    #[test]
    fn test_lead_text_flags_returning_prospect() {
        let text = LeadEmailText {
            heading: "New Waitlist Signup",
            name: "Ada Byron",
            email: "ada@mercy.org",
            phone: None,
            organization: Some("Mercy Hospital"),
            function_role: None,
            discipline: Some("Orthopedics"),
            page: "pricing",
            lead_score: 45,
            is_new: false,
            portal_url: "https://crm.cellionyx.com",
        }
        .render()
        .unwrap();

        assert!(text.contains("RETURNING PROSPECT"));
        assert!(text.contains("Organization: Mercy Hospital"));
        assert!(text.contains("Discipline: Orthopedics"));
        assert!(!text.contains("Phone:"));
        assert!(text.contains("https://crm.cellionyx.com"));
    }

    #[test]
    fn test_lead_html_escapes_submitted_values() {
        let html = LeadEmailHtml {
            heading: "New Demo Request",
            name: "<script>x</script>",
            email: "ada@mercy.org",
            phone: None,
            organization: None,
            function_role: None,
            discipline: None,
            page: "home",
            lead_score: 40,
            is_new: true,
            portal_url: "https://crm.cellionyx.com",
        }
        .render()
        .unwrap();

        assert!(!html.contains("<script>"));
        assert!(html.contains("NEW PROSPECT"));
    }

    #[test]
    fn test_career_text() {
        let text = CareerEmailText {
            name: "Grace Hopper",
            email: "grace@navy.mil",
            phone: Some("555-0100"),
            position: "Field Engineer",
            resume_url: None,
            introduction: "Compilers.",
            interest: "Devices.",
        }
        .render()
        .unwrap();
        assert!(text.contains("Position: Field Engineer"));
        assert!(text.contains("Phone: 555-0100"));
        assert!(!text.contains("Resume:"));
    }
}
