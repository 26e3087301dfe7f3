//! Account emails for userbase.
//!
//! Bodies are plain text templates with `{placeholder}` fields. When
//! `[mail] html` is set, an HTML alternative is derived from the text.

use url::Url;

use crate::config::Config;
use crate::mailer::OutgoingEmail;
use crate::{Result, UserbaseError};

/// Activation email subject.
pub const ACTIVATION_SUBJECT: &str = "Your signup at {site}";

/// Activation email body.
pub const ACTIVATION_BODY: &str = r#"
Hello {username},

Thank you for signing up at {site}.

To activate your account, follow this link within the next {days} days:

{link}

If you did not sign up, you can ignore this email.

--
{site}
"#;

/// Expiry reminder subject.
pub const ACTIVATION_REMINDER_SUBJECT: &str = "Your account at {site} is about to expire";

/// Expiry reminder body.
pub const ACTIVATION_REMINDER_BODY: &str = r#"
Hello {username},

You signed up at {site} but have not activated your account yet.
The activation link expires on {expires} and the account will then be
removed.

To activate your account, follow this link:

{link}

--
{site}
"#;

/// Subject of the mail sent to a new address.
pub const CONFIRM_EMAIL_NEW_SUBJECT: &str = "Confirm your new email address at {site}";

/// Body of the mail sent to a new address.
pub const CONFIRM_EMAIL_NEW_BODY: &str = r#"
Hello {username},

You asked to change the email address of your account at {site} to
{new_email}.

To confirm this address, follow this link within the next {days} days:

{link}

--
{site}
"#;

/// Subject of the notice sent to the old address.
pub const CONFIRM_EMAIL_OLD_SUBJECT: &str = "Email address change at {site}";

/// Body of the notice sent to the old address.
pub const CONFIRM_EMAIL_OLD_BODY: &str = r#"
Hello {username},

There was a request to change the email address of your account at
{site} to {new_email}. A confirmation link has been sent to that address.

If you did not ask for this, please contact us.

--
{site}
"#;

/// Fill the `{placeholder}` fields of a template.
fn render(template: &str, fields: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in fields {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out.trim().to_string()
}

/// Wrap plain text in minimal HTML, one paragraph per blank-line block.
fn text_to_html(text: &str) -> String {
    let escaped = text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    let paragraphs: Vec<String> = escaped
        .split("\n\n")
        .map(|p| format!("<p>{}</p>", p.trim().replace('\n', "<br>\n")))
        .collect();
    format!("<html><body>\n{}\n</body></html>", paragraphs.join("\n"))
}

/// Absolute link to `path` under the site base URL.
fn site_link(config: &Config, segments: &[&str]) -> Result<String> {
    let mut url = Url::parse(&config.site.base_url())
        .map_err(|e| UserbaseError::Config(format!("invalid site domain: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| UserbaseError::Config("site URL cannot carry a path".to_string()))?
        .pop_if_empty()
        .extend(segments)
        .push("");
    Ok(url.to_string())
}

/// Link that activates `username` with `key`.
pub fn activation_link(config: &Config, username: &str, key: &str) -> Result<String> {
    site_link(config, &["accounts", "activate", username, key])
}

/// Link that confirms the pending email change of `username`.
pub fn confirm_email_link(config: &Config, username: &str, key: &str) -> Result<String> {
    site_link(config, &["accounts", "confirm-email", username, key])
}

fn finish(config: &Config, to: &str, subject: String, body: String) -> OutgoingEmail {
    let email = OutgoingEmail::new(config.mail.from.clone(), to, subject, body);
    if config.mail.html {
        let html = text_to_html(&email.body);
        email.with_html(html)
    } else {
        email
    }
}

/// Build the activation email.
pub fn activation_email(config: &Config, username: &str, to: &str, key: &str) -> Result<OutgoingEmail> {
    let link = activation_link(config, username, key)?;
    let days = config.accounts.activation_days.to_string();
    let fields = [
        ("site", config.site.name.as_str()),
        ("username", username),
        ("days", days.as_str()),
        ("link", link.as_str()),
    ];
    Ok(finish(
        config,
        to,
        render(ACTIVATION_SUBJECT, &fields),
        render(ACTIVATION_BODY, &fields),
    ))
}

/// Build the expiry reminder.
pub fn activation_reminder_email(
    config: &Config,
    username: &str,
    to: &str,
    key: &str,
    expires: chrono::DateTime<chrono::Utc>,
) -> Result<OutgoingEmail> {
    let link = activation_link(config, username, key)?;
    let expires = expires.format("%Y-%m-%d %H:%M UTC").to_string();
    let fields = [
        ("site", config.site.name.as_str()),
        ("username", username),
        ("expires", expires.as_str()),
        ("link", link.as_str()),
    ];
    Ok(finish(
        config,
        to,
        render(ACTIVATION_REMINDER_SUBJECT, &fields),
        render(ACTIVATION_REMINDER_BODY, &fields),
    ))
}

/// Build the confirmation mail for the new address.
pub fn confirm_email_new(
    config: &Config,
    username: &str,
    new_email: &str,
    key: &str,
) -> Result<OutgoingEmail> {
    let link = confirm_email_link(config, username, key)?;
    let days = config.accounts.activation_days.to_string();
    let fields = [
        ("site", config.site.name.as_str()),
        ("username", username),
        ("new_email", new_email),
        ("days", days.as_str()),
        ("link", link.as_str()),
    ];
    Ok(finish(
        config,
        new_email,
        render(CONFIRM_EMAIL_NEW_SUBJECT, &fields),
        render(CONFIRM_EMAIL_NEW_BODY, &fields),
    ))
}

/// Build the notice for the old address.
pub fn confirm_email_old(config: &Config, username: &str, old_email: &str, new_email: &str) -> OutgoingEmail {
    let fields = [
        ("site", config.site.name.as_str()),
        ("username", username),
        ("new_email", new_email),
    ];
    finish(
        config,
        old_email,
        render(CONFIRM_EMAIL_OLD_SUBJECT, &fields),
        render(CONFIRM_EMAIL_OLD_BODY, &fields),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        let mut config = Config::default();
        config.site.name = "Example Community".to_string();
        config.site.domain = "community.example.org".to_string();
        config.mail.from = "noreply@example.org".to_string();
        config
    }

    #[test]
    fn test_render() {
        let out = render("  Hi {name}, {name}! {missing} ", &[("name", "Bob")]);
        assert_eq!(out, "Hi Bob, Bob! {missing}");
    }

    #[test]
    fn test_activation_link() {
        let key = "a".repeat(40);
        let link = activation_link(&config(), "alice", &key).unwrap();
        assert_eq!(
            link,
            format!("https://community.example.org/accounts/activate/alice/{key}/")
        );
    }

    #[test]
    fn test_link_encodes_username() {
        let link = confirm_email_link(&config(), "jörg", "k").unwrap();
        assert!(link.starts_with("https://community.example.org/accounts/confirm-email/j%C3%B6rg/"));
    }

    #[test]
    fn test_activation_email() {
        let key = "a".repeat(40);
        let email = activation_email(&config(), "alice", "alice@example.com", &key).unwrap();
        assert_eq!(email.subject, "Your signup at Example Community");
        assert_eq!(email.from, "noreply@example.org");
        assert_eq!(email.to, vec!["alice@example.com".to_string()]);
        assert!(email.body.starts_with("Hello alice,"));
        assert!(email.body.contains(&key));
        assert!(email.body.contains("within the next 7 days"));
        assert!(email.html.is_none());
    }

    #[test]
    fn test_html_alternative() {
        let mut config = config();
        config.mail.html = true;
        let email = confirm_email_old(&config, "alice", "old@example.com", "new<@>example.com");
        let html = email.html.unwrap();
        assert!(html.starts_with("<html><body>"));
        assert!(html.contains("<p>Hello alice,</p>"));
        assert!(html.contains("new&lt;@&gt;example.com"));
    }

    #[test]
    fn test_confirm_email_new_goes_to_new_address() {
        let email = confirm_email_new(&config(), "alice", "new@example.com", "k").unwrap();
        assert_eq!(email.to, vec!["new@example.com".to_string()]);
        assert!(email.body.contains("new@example.com"));
    }
}
