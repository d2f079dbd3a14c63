use std::future::Future;
use std::sync::Arc;

use super::sendmail::{MailError, render, send_email};
use crate::config::Config;

const VERIFICATION_TEMPLATE: &str = r#"<html><body>
<h2>Welcome, {{name}}</h2>
<p>Please confirm your email address to finish setting up your account.</p>
<p><a href="{{link}}">Verify my email</a></p>
<p>The link expires in 24 hours.</p>
</body></html>"#;

const WELCOME_TEMPLATE: &str = r#"<html><body>
<h2>Your account is ready, {{name}}</h2>
<p>Your email has been verified. You can now save favorites and contact owners.</p>
</body></html>"#;

const RESET_TEMPLATE: &str = r#"<html><body>
<p>Hello {{name}},</p>
<p>We received a request to reset your password.</p>
<p><a href="{{link}}">Choose a new password</a></p>
<p>The link expires in 30 minutes. If you did not ask for this, ignore this email.</p>
</body></html>"#;

const LEAD_TEMPLATE: &str = r#"<html><body>
<p>Hello {{owner}},</p>
<p>You have a new inquiry about <strong>{{property}}</strong>.</p>
<ul>
<li>Name: {{name}}</li>
<li>Email: {{email}}</li>
<li>Phone: {{phone}}</li>
</ul>
<p>{{message}}</p>
</body></html>"#;

/// Runs a mail future in the background. Failures are logged and
/// otherwise ignored; callers never wait on delivery.
pub fn dispatch<F>(kind: &'static str, fut: F)
where
    F: Future<Output = Result<(), MailError>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = fut.await {
            tracing::error!(kind, "Failed to send email: {}", e);
        }
    });
}

async fn deliver(
    env: &Config,
    to_email: &str,
    subject: &str,
    html: String,
) -> Result<(), MailError> {
    match &env.smtp {
        Some(smtp) => send_email(smtp, to_email, subject, html).await,
        None => {
            tracing::debug!(to = to_email, subject, "SMTP not configured, skipping email");
            Ok(())
        }
    }
}

pub async fn send_verification_email(
    env: Arc<Config>,
    to_email: String,
    name: String,
    token: String,
) -> Result<(), MailError> {
    let link = format!("{}/auth/verify?token={}", env.frontend_url, token);
    let html = render(VERIFICATION_TEMPLATE, &[("name", name), ("link", link)]);
    deliver(&env, &to_email, "Verify your email address", html).await
}

pub async fn send_welcome_email(
    env: Arc<Config>,
    to_email: String,
    name: String,
) -> Result<(), MailError> {
    let html = render(WELCOME_TEMPLATE, &[("name", name)]);
    deliver(&env, &to_email, "Welcome aboard", html).await
}

pub async fn send_password_reset_email(
    env: Arc<Config>,
    to_email: String,
    name: String,
    token: String,
) -> Result<(), MailError> {
    let link = format!("{}/auth/reset-password?token={}", env.frontend_url, token);
    let html = render(RESET_TEMPLATE, &[("name", name), ("link", link)]);
    deliver(&env, &to_email, "Reset your password", html).await
}

pub struct LeadNotice {
    pub owner_email: String,
    pub owner_name: String,
    pub property_title: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub message: String,
}

pub async fn send_lead_notification(env: Arc<Config>, notice: LeadNotice) -> Result<(), MailError> {
    let subject = format!("New inquiry: {}", notice.property_title);
    let html = render(
        LEAD_TEMPLATE,
        &[
            ("owner", notice.owner_name),
            ("property", notice.property_title),
            ("name", notice.name),
            ("email", notice.email.unwrap_or_else(|| "-".into())),
            ("phone", notice.phone.unwrap_or_else(|| "-".into())),
            ("message", notice.message),
        ],
    );
    deliver(&env, &notice.owner_email, &subject, html).await
}
