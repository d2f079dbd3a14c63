use lettre::{
    Message, SmtpTransport, Transport,
    message::{SinglePart, header},
    transport::smtp::authentication::Credentials,
};

use crate::config::SmtpConfig;

pub type MailError = Box<dyn std::error::Error + Send + Sync>;

/// Replaces every `{{key}}` placeholder in the template.
pub fn render(template: &str, placeholders: &[(&str, String)]) -> String {
    let mut html = template.to_string();
    for (key, value) in placeholders {
        html = html.replace(&format!("{{{{{}}}}}", key), &ammonia::clean_text(value));
    }
    html
}

/// Sends an HTML email over STARTTLS.
///
/// lettre's SMTP transport is blocking, so the send runs on the blocking
/// pool.
pub async fn send_email(
    smtp: &SmtpConfig,
    to_email: &str,
    subject: &str,
    html: String,
) -> Result<(), MailError> {
    let email = Message::builder()
        .from(smtp.from.parse()?)
        .to(to_email.parse()?)
        .subject(subject)
        .header(header::ContentType::TEXT_HTML)
        .singlepart(
            SinglePart::builder()
                .header(header::ContentType::TEXT_HTML)
                .body(html),
        )?;

    let creds = Credentials::new(smtp.username.clone(), smtp.password.clone());
    let mailer = SmtpTransport::starttls_relay(&smtp.server)?
        .credentials(creds)
        .port(smtp.port)
        .build();

    tokio::task::spawn_blocking(move || mailer.send(&email)).await??;
    tracing::info!(to = to_email, subject, "Email sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_filled_and_escaped() {
        let html = render(
            "<p>Hello {{name}}, see {{link}}</p>",
            &[
                ("name", "<b>Sara</b>".to_string()),
                ("link", "https://example.com/a".to_string()),
            ],
        );
        assert!(html.contains("&lt;b&gt;Sara"));
        assert!(!html.contains("<b>"));
        assert!(!html.contains("{{"));
    }
}
