//! Notification templates
//!
//! Each [`NotificationKind`] maps to a render function in a [`TemplateRegistry`].
//! All templates share one HTML layout; interpolated values are escaped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Something the site wants to tell people about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Sent once to a new newsletter subscriber
    Welcome { name: String },

    /// A new machine was added
    NewMachine {
        name: String,
        os: String,
        difficulty: String,
    },

    /// A new writeup was published
    NewWriteup {
        title: String,
        platform: String,
        category: String,
        difficulty: String,
    },

    /// Someone unlocked a protected CTF writeup; goes to the admin only
    WriteupAccess {
        title: String,
        ctf_name: String,
        accessor_email: String,
        accessor_name: String,
        accessor_ip: String,
        accessed_at: DateTime<Utc>,
    },
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::Welcome { .. } => NotificationKind::Welcome,
            Self::NewMachine { .. } => NotificationKind::NewMachine,
            Self::NewWriteup { .. } => NotificationKind::NewWriteup,
            Self::WriteupAccess { .. } => NotificationKind::WriteupAccess,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Welcome,
    NewMachine,
    NewWriteup,
    WriteupAccess,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Welcome => "welcome",
            Self::NewMachine => "new_machine",
            Self::NewWriteup => "new_writeup",
            Self::WriteupAccess => "writeup_access",
        };
        f.write_str(name)
    }
}

/// Values every template may use
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateContext {
    /// Site base URL without trailing slash
    pub site_url: String,
    /// Brand name shown in headers and footers
    pub site_name: String,
}

impl Default for TemplateContext {
    fn default() -> Self {
        Self {
            site_url: crate::config::DEFAULT_SITE_URL.to_string(),
            site_name: crate::config::DEFAULT_FROM_NAME.to_string(),
        }
    }
}

/// Subject and bodies ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Render function for one kind; `None` if handed a different variant
pub type RenderFn = fn(&Notification, &TemplateContext) -> Option<RenderedEmail>;

/// Templates keyed by notification kind
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    context: TemplateContext,
    templates: HashMap<NotificationKind, RenderFn>,
}

impl TemplateRegistry {
    /// Registry with no templates
    pub fn empty(context: TemplateContext) -> Self {
        Self {
            context,
            templates: HashMap::new(),
        }
    }

    /// Registry with the built-in templates
    pub fn new(context: TemplateContext) -> Self {
        let mut registry = Self::empty(context);
        registry.register(NotificationKind::Welcome, render_welcome);
        registry.register(NotificationKind::NewMachine, render_new_machine);
        registry.register(NotificationKind::NewWriteup, render_new_writeup);
        registry.register(NotificationKind::WriteupAccess, render_writeup_access);
        registry
    }

    /// Add or replace the template for a kind
    pub fn register(&mut self, kind: NotificationKind, render: RenderFn) {
        self.templates.insert(kind, render);
    }

    pub fn render(&self, notification: &Notification) -> Option<RenderedEmail> {
        let render = self.templates.get(&notification.kind())?;
        render(notification, &self.context)
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new(TemplateContext::default())
    }
}

/// Escape text for inclusion in HTML content or attribute values
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Lower-case CSS class for a difficulty badge, letters and digits only
fn difficulty_class(difficulty: &str) -> String {
    difficulty
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Link target and short label for a writeup platform
fn platform_link(site_url: &str, platform: &str) -> (String, String) {
    match platform {
        "HackTheBox" => (format!("{site_url}/machines/htb"), "HTB".to_string()),
        "TryHackMe" => (format!("{site_url}/machines/thm"), "THM".to_string()),
        other => (format!("{site_url}/ctf"), other.to_string()),
    }
}

const STYLES: &str = r#"
      body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }
      .container { max-width: 600px; margin: 0 auto; padding: 20px; }
      .header { background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); color: white; padding: 30px; text-align: center; border-radius: 10px 10px 0 0; }
      .content { background: #f9f9f9; padding: 30px; border-radius: 0 0 10px 10px; }
      .card { background: white; border: 2px solid #667eea; border-radius: 10px; padding: 20px; margin: 20px 0; }
      .difficulty { display: inline-block; padding: 5px 15px; border-radius: 20px; color: white; font-weight: bold; background: #667eea; }
      .easy { background: #4CAF50; }
      .medium { background: #FF9800; }
      .hard { background: #F44336; }
      .insane { background: #9C27B0; }
      .button { display: inline-block; background: #667eea; color: white; padding: 12px 30px; text-decoration: none; border-radius: 5px; margin: 20px 0; }
      .footer { text-align: center; margin-top: 30px; color: #666; font-size: 12px; }
"#;

/// Shared page shell. `heading` and `content` must already be escaped.
fn layout(heading: &str, content: &str, footer: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <style>{STYLES}</style>
  </head>
  <body>
    <div class="container">
      <div class="header">
        <h1>{heading}</h1>
      </div>
      <div class="content">
{content}
      </div>
      <div class="footer">
{footer}
      </div>
    </div>
  </body>
</html>"#
    )
}

fn newsletter_footer(ctx: &TemplateContext) -> String {
    format!(
        "        <p>You're receiving this because you subscribed to our newsletter.</p>\n        <p>&copy; {} | Built in the shadows, compiled with curiosity.</p>",
        escape_html(&ctx.site_name)
    )
}

fn render_welcome(n: &Notification, ctx: &TemplateContext) -> Option<RenderedEmail> {
    let Notification::Welcome { name } = n else {
        return None;
    };
    let site_name = escape_html(&ctx.site_name);
    let site_url = escape_html(&ctx.site_url);

    let content = format!(
        r#"        <h2>Hello {name}!</h2>
        <p>Thank you for subscribing to our newsletter. You're now part of a community of security enthusiasts who like to stay ahead of the curve.</p>
        <p>What you can expect:</p>
        <ul>
          <li>Detailed HTB and THM machine writeups</li>
          <li>CTF challenge breakdowns</li>
          <li>New tools and techniques</li>
        </ul>
        <a href="{site_url}" class="button">Visit {site_name}</a>
        <p>If you have any questions, feel free to reply to this email.</p>"#,
        name = escape_html(name),
    );

    Some(RenderedEmail {
        subject: format!("Welcome to {} Newsletter!", ctx.site_name),
        html: layout(
            &format!("Welcome to {site_name}!"),
            &content,
            &newsletter_footer(ctx),
        ),
        text: format!(
            "Hello {name}!\n\nThank you for subscribing to the {} newsletter.\n\nVisit us at {}",
            ctx.site_name, ctx.site_url
        ),
    })
}

fn render_new_machine(n: &Notification, ctx: &TemplateContext) -> Option<RenderedEmail> {
    let Notification::NewMachine {
        name,
        os,
        difficulty,
    } = n
    else {
        return None;
    };
    let link = format!("{}/machines", ctx.site_url);

    let content = format!(
        r#"        <p>A new machine has been added to our collection!</p>
        <div class="card">
          <h2 style="margin-top: 0; color: #667eea;">{name}</h2>
          <p><strong>OS:</strong> {os}</p>
          <span class="difficulty {class}">{difficulty}</span>
        </div>
        <p>Ready to test your skills? Head over to our machines section and give it a try!</p>
        <a href="{link}" class="button">View All Machines</a>
        <p>Happy hacking!</p>"#,
        name = escape_html(name),
        os = escape_html(os),
        class = difficulty_class(difficulty),
        difficulty = escape_html(difficulty),
        link = escape_html(&link),
    );

    Some(RenderedEmail {
        subject: format!("New {difficulty} Machine: {name}"),
        html: layout("New Machine Alert!", &content, &newsletter_footer(ctx)),
        text: format!(
            "A new machine has been added: {name}\nOS: {os}\nDifficulty: {difficulty}\n\nView all machines: {link}"
        ),
    })
}

fn render_new_writeup(n: &Notification, ctx: &TemplateContext) -> Option<RenderedEmail> {
    let Notification::NewWriteup {
        title,
        platform,
        category,
        difficulty,
    } = n
    else {
        return None;
    };
    let (link, platform_label) = platform_link(&ctx.site_url, platform);

    let content = format!(
        r#"        <p>A new writeup has been published!</p>
        <div class="card">
          <h2 style="margin-top: 0; color: #667eea;">{title}</h2>
          <p><strong>Platform:</strong> {platform}</p>
          <p><strong>Category:</strong> {category}</p>
          <span class="difficulty {class}">{difficulty}</span>
        </div>
        <p>Ready to learn new techniques? Check out the writeup now!</p>
        <a href="{link}" class="button">View Writeups</a>
        <p>Happy learning!</p>"#,
        title = escape_html(title),
        platform = escape_html(&platform_label),
        category = escape_html(category),
        class = difficulty_class(difficulty),
        difficulty = escape_html(difficulty),
        link = escape_html(&link),
    );

    Some(RenderedEmail {
        subject: format!("New {difficulty} Writeup: {title}"),
        html: layout("New Writeup Available!", &content, &newsletter_footer(ctx)),
        text: format!(
            "A new writeup has been published: {title}\nPlatform: {platform_label}\nCategory: {category}\nDifficulty: {difficulty}\n\nRead it here: {link}"
        ),
    })
}

fn render_writeup_access(n: &Notification, ctx: &TemplateContext) -> Option<RenderedEmail> {
    let Notification::WriteupAccess {
        title,
        ctf_name,
        accessor_email,
        accessor_name,
        accessor_ip,
        accessed_at,
    } = n
    else {
        return None;
    };
    let time = accessed_at.to_rfc3339();

    let content = format!(
        r#"        <p><strong>Writeup:</strong> {title}</p>
        <p><strong>CTF:</strong> {ctf}</p>
        <p><strong>Accessed by:</strong> {name} ({email})</p>
        <p><strong>IP:</strong> {ip}</p>
        <p><strong>Time:</strong> {time}</p>"#,
        title = escape_html(title),
        ctf = escape_html(ctf_name),
        name = escape_html(accessor_name),
        email = escape_html(accessor_email),
        ip = escape_html(accessor_ip),
    );
    let footer = format!(
        "        <p>&copy; {} | Access notification</p>",
        escape_html(&ctx.site_name)
    );

    Some(RenderedEmail {
        subject: format!("CTF Writeup Access: {title}"),
        html: layout("CTF Writeup Access", &content, &footer),
        text: format!(
            "Writeup: {title}\nCTF: {ctf_name}\nAccessed by: {accessor_name} ({accessor_email})\nIP: {accessor_ip}\nTime: {time}"
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registry() -> TemplateRegistry {
        TemplateRegistry::new(TemplateContext {
            site_url: "https://lab.example".to_string(),
            site_name: "0xJerry's Lab".to_string(),
        })
    }

    #[test]
    fn test_new_machine_template() {
        let email = registry()
            .render(&Notification::NewMachine {
                name: "Cicada".to_string(),
                os: "Windows".to_string(),
                difficulty: "Easy".to_string(),
            })
            .unwrap();

        assert_eq!(email.subject, "New Easy Machine: Cicada");
        assert!(email.html.contains("<h2 style=\"margin-top: 0; color: #667eea;\">Cicada</h2>"));
        assert!(email.html.contains("<strong>OS:</strong> Windows"));
        assert!(email.html.contains("class=\"difficulty easy\""));
        assert!(email.html.contains("href=\"https://lab.example/machines\""));
        assert!(email.text.contains("Difficulty: Easy"));
    }

    #[test]
    fn test_new_writeup_platform_links() {
        let cases = [
            ("HackTheBox", "https://lab.example/machines/htb", "HTB"),
            ("TryHackMe", "https://lab.example/machines/thm", "THM"),
            ("PicoCTF", "https://lab.example/ctf", "PicoCTF"),
        ];

        for (platform, link, label) in cases {
            let email = registry()
                .render(&Notification::NewWriteup {
                    title: "Buffer Overflow 101".to_string(),
                    platform: platform.to_string(),
                    category: "Pwn".to_string(),
                    difficulty: "Medium".to_string(),
                })
                .unwrap();

            assert_eq!(email.subject, "New Medium Writeup: Buffer Overflow 101");
            assert!(email.html.contains(&format!("href=\"{link}\"")), "{platform}");
            assert!(
                email
                    .html
                    .contains(&format!("<strong>Platform:</strong> {label}")),
                "{platform}"
            );
        }
    }

    #[test]
    fn test_writeup_access_template() {
        let accessed_at = DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let email = registry()
            .render(&Notification::WriteupAccess {
                title: "Heap Feng Shui".to_string(),
                ctf_name: "DEF CON Quals".to_string(),
                accessor_email: "reader@example.com".to_string(),
                accessor_name: "Reader".to_string(),
                accessor_ip: "203.0.113.7".to_string(),
                accessed_at,
            })
            .unwrap();

        assert_eq!(email.subject, "CTF Writeup Access: Heap Feng Shui");
        assert!(email.html.contains("Reader (reader@example.com)"));
        assert!(email.html.contains("203.0.113.7"));
        assert!(email.html.contains("2025-06-01T12:00:00+00:00"));
        assert!(!email.html.contains("subscribed to our newsletter"));
    }

    #[test]
    fn test_welcome_template() {
        let email = registry()
            .render(&Notification::Welcome {
                name: "Ada".to_string(),
            })
            .unwrap();
        assert_eq!(email.subject, "Welcome to 0xJerry's Lab Newsletter!");
        assert!(email.html.contains("Hello Ada!"));
        assert!(email.html.contains("0xJerry&#39;s Lab"));
    }

    #[test]
    fn test_values_are_escaped() {
        let email = registry()
            .render(&Notification::NewMachine {
                name: "<script>alert(1)</script>".to_string(),
                os: "Linux & \"friends\"".to_string(),
                difficulty: "Hard\" onclick=\"x".to_string(),
            })
            .unwrap();

        assert!(!email.html.contains("<script>"));
        assert!(email.html.contains("&lt;script&gt;"));
        assert!(email.html.contains("Linux &amp; &quot;friends&quot;"));
        assert!(email.html.contains("class=\"difficulty hardonclickx\""));
    }

    #[test]
    fn test_registry_override_and_missing_kind() {
        fn plain(n: &Notification, _: &TemplateContext) -> Option<RenderedEmail> {
            let Notification::Welcome { name } = n else {
                return None;
            };
            Some(RenderedEmail {
                subject: "hi".to_string(),
                html: format!("<p>{name}</p>"),
                text: name.clone(),
            })
        }

        let mut registry = TemplateRegistry::empty(TemplateContext::default());
        let welcome = Notification::Welcome {
            name: "Ada".to_string(),
        };
        assert!(registry.render(&welcome).is_none());

        registry.register(NotificationKind::Welcome, plain);
        assert_eq!(registry.render(&welcome).unwrap().subject, "hi");

        // Wrong variant under a kind renders nothing
        registry.register(NotificationKind::NewMachine, plain);
        assert!(registry
            .render(&Notification::NewMachine {
                name: "x".to_string(),
                os: "y".to_string(),
                difficulty: "z".to_string()
            })
            .is_none());
    }

    #[test]
    fn test_notification_kind_round_trip_names() {
        let n = Notification::NewMachine {
            name: "Box".to_string(),
            os: "Linux".to_string(),
            difficulty: "Insane".to_string(),
        };
        assert_eq!(n.kind(), NotificationKind::NewMachine);
        assert_eq!(n.kind().to_string(), "new_machine");

        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "new_machine");
    }
}
