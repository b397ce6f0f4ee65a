use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use tracing::info;

use crate::config::SmtpConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Outbound email sink.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_mail(&self, mail: OutgoingMail) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: String,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let creds = Credentials::new(cfg.user.clone(), cfg.password.clone());
        let transport = SmtpTransport::relay(&cfg.host)
            .context("smtp relay")?
            .credentials(creds)
            .timeout(Some(Duration::from_secs(10)))
            .build();
        info!(host = %cfg.host, "smtp mailer initialized");
        Ok(Self {
            transport,
            from: cfg.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_mail(&self, mail: OutgoingMail) -> anyhow::Result<()> {
        let message = Message::builder()
            .from(self.from.parse().context("parse from address")?)
            .to(mail.to.parse().context("parse to address")?)
            .subject(mail.subject.clone())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(mail.text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(mail.html),
                    ),
            )
            .context("build message")?;

        // SmtpTransport is blocking
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .context("join smtp task")?
            .context("smtp send")?;

        info!(to = %mail.to, subject = %mail.subject, "email sent");
        Ok(())
    }
}

/// Used when no SMTP relay is configured.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_mail(&self, mail: OutgoingMail) -> anyhow::Result<()> {
        info!(to = %mail.to, subject = %mail.subject, "smtp not configured; email not sent");
        Ok(())
    }
}

pub fn verification_email(to: &str, code: &str) -> OutgoingMail {
    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; border: 1px solid #e0e0e0; border-radius: 10px; overflow: hidden;">
  <div style="background-color: #007bff; color: white; padding: 20px; text-align: center;">
    <h1 style="margin: 0;">Welcome to PetTaxi!</h1>
    <p style="margin: 5px 0;">Verify your email to activate your account</p>
  </div>
  <div style="padding: 20px; text-align: center;">
    <p style="font-size: 16px;">Your email verification code is:</p>
    <p style="font-size: 28px; font-weight: bold; color: #007bff;">{code}</p>
    <p style="font-size: 14px; color: #6c757d;">This code is valid for 15 minutes. If you didn't sign up, please ignore this email.</p>
  </div>
</div>"#
    );
    let text = format!(
        "Welcome to PetTaxi!\n\nYour email verification code is: {code}\n\nThis code is valid for 15 minutes. If you didn't sign up, please ignore this email."
    );
    OutgoingMail {
        to: to.to_string(),
        subject: "Verify Your Email - PetTaxi".into(),
        html,
        text,
    }
}

pub struct BookingRequestMail<'a> {
    pub owner_email: &'a str,
    pub requester_username: &'a str,
    pub requester_email: &'a str,
    pub dates: &'a [String],
    pub animal: String,
    pub approval_link: String,
}

pub fn booking_request_email(b: BookingRequestMail<'_>) -> OutgoingMail {
    let dates = if b.dates.is_empty() {
        "Custom schedule (contact the user)".to_string()
    } else {
        b.dates.join(", ")
    };
    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; border: 1px solid #e0e0e0; border-radius: 10px; overflow: hidden;">
  <div style="background-color: #007bff; color: white; padding: 20px; text-align: center;">
    <h1 style="margin: 0;">Booking Approval Needed</h1>
    <p style="margin: 5px 0;">A booking request has been made for your post</p>
  </div>
  <div style="padding: 20px;">
    <ul style="list-style: none; padding: 0;">
      <li><strong>User:</strong> {user}</li>
      <li><strong>Email:</strong> {email}</li>
      <li><strong>Dates:</strong> {dates}</li>
      <li><strong>Animal:</strong> {animal}</li>
    </ul>
    <div style="text-align: center; margin: 20px 0;">
      <a href="{link}" style="background-color: #007bff; color: white; text-decoration: none; padding: 10px 20px; border-radius: 5px;">Approve Booking</a>
    </div>
  </div>
</div>"#,
        user = b.requester_username,
        email = b.requester_email,
        dates = dates,
        animal = b.animal,
        link = b.approval_link,
    );
    let text = format!(
        "Booking approval needed\n\nUser: {}\nEmail: {}\nDates: {}\nAnimal: {}\n\nApprove: {}",
        b.requester_username, b.requester_email, dates, b.animal, b.approval_link
    );
    OutgoingMail {
        to: b.owner_email.to_string(),
        subject: "Booking Approval Needed".into(),
        html,
        text,
    }
}
