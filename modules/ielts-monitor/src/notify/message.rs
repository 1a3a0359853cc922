use chrono::{DateTime, Local, Utc};

use super::backend::OutgoingMessage;
use ielts_common::ExamDates;

/// The three broadcast kinds. All share the notifier's fan-out contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    DateChanged {
        previous: Option<ExamDates>,
        current: ExamDates,
        page_url: String,
    },
    Error {
        cause: String,
        at: DateTime<Utc>,
    },
    Liveness {
        at: DateTime<Utc>,
    },
}

impl Notification {
    pub fn error(cause: impl Into<String>) -> Self {
        Self::Error {
            cause: cause.into(),
            at: Utc::now(),
        }
    }

    pub fn liveness() -> Self {
        Self::Liveness { at: Utc::now() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::DateChanged { .. } => "date_changed",
            Self::Error { .. } => "error",
            Self::Liveness { .. } => "liveness",
        }
    }

    pub fn render(&self) -> OutgoingMessage {
        match self {
            Self::DateChanged {
                previous,
                current,
                page_url,
            } => {
                let mut text = format!(
                    "🎓 *IELTS Sınav Tarihi Güncellendi!*\n\n\
                     📅 *Yeni Sınav Tarihi:* {}\n\
                     ⏰ *Başvuru Son Tarihi:* {}\n",
                    escape_markdown(&current.exam_date),
                    escape_markdown(&current.application_deadline),
                );
                if let Some(previous) = previous {
                    text.push_str(&format!(
                        "\n🗓 *Önceki Sınav Tarihi:* {}\n\
                         ⌛ *Önceki Başvuru Son Tarihi:* {}\n",
                        escape_markdown(&previous.exam_date),
                        escape_markdown(&previous.application_deadline),
                    ));
                }
                text.push_str(&format!(
                    "\n🔗 [Sınav sayfasını görüntüle]({page_url})\n\n\
                     ⚠️ *Önemli:* Sınavdan en az 21 gün önce gerekli belgeleri yüklemeniz gerekmektedir.\n\n\
                     Bot tarafından otomatik olarak gönderilmiştir. 🤖"
                ));
                OutgoingMessage::markdown(text).without_preview()
            }
            Self::Error { cause, at } => OutgoingMessage::markdown(format!(
                "⚠️ *Bot Hatası*\n\n\
                 Bir hata oluştu: {}\n\n\
                 Bot çalışmaya devam edecek, ancak bu hatayı kontrol etmeniz gerekebilir.\n\n\
                 🕐 Hata zamanı: {}",
                escape_markdown(cause),
                format_local(at),
            )),
            Self::Liveness { at } => OutgoingMessage::markdown(format!(
                "🧪 *Test Mesajı*\n\n\
                 Bot çalışıyor ve mesaj gönderebiliyor!\n\n\
                 🕐 Test zamanı: {}",
                format_local(at),
            )),
        }
    }
}

/// `dd.mm.yyyy HH:MM:SS` in the host's local time zone.
pub fn format_local(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%d.%m.%Y %H:%M:%S").to_string()
}

/// Escape the characters legacy Markdown treats as entity markers.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dates(exam: &str, deadline: &str) -> ExamDates {
        ExamDates::new(exam, deadline)
    }

    #[test]
    fn date_change_lists_new_and_previous_dates() {
        let message = Notification::DateChanged {
            previous: Some(dates("12 Ocak 2025, Pazar", "20 Aralık 2024, Cuma")),
            current: dates("2 Şubat 2025, Pazar", "10 Ocak 2025, Cuma"),
            page_url: "http://prep.bilkent.edu.tr/ielts/".into(),
        }
        .render();

        assert!(message.disable_link_preview);
        assert!(message.text.contains("*Yeni Sınav Tarihi:* 2 Şubat 2025, Pazar"));
        assert!(message.text.contains("*Başvuru Son Tarihi:* 10 Ocak 2025, Cuma"));
        assert!(message.text.contains("*Önceki Sınav Tarihi:* 12 Ocak 2025, Pazar"));
        assert!(message.text.contains("(http://prep.bilkent.edu.tr/ielts/)"));
    }

    #[test]
    fn date_change_without_previous_omits_section() {
        let message = Notification::DateChanged {
            previous: None,
            current: dates("2 Şubat 2025, Pazar", "10 Ocak 2025, Cuma"),
            page_url: "http://example.com".into(),
        }
        .render();
        assert!(!message.text.contains("Önceki"));
    }

    #[test]
    fn error_message_escapes_cause() {
        let message = Notification::error("GET failed: no_route *timeout*").render();
        assert!(!message.disable_link_preview);
        assert!(message.text.contains("Bot Hatası"));
        assert!(message.text.contains(r"no\_route \*timeout\*"));
        assert!(message.text.contains("Hata zamanı:"));
    }

    #[test]
    fn liveness_message() {
        let message = Notification::liveness().render();
        assert!(message.text.contains("Test Mesajı"));
        assert_eq!(Notification::liveness().kind(), "liveness");
    }

    #[test]
    fn escape_leaves_plain_text_alone() {
        assert_eq!(escape_markdown("20 Aralık 2024, Cuma"), "20 Aralık 2024, Cuma");
        assert_eq!(escape_markdown("a_b[c]`d`"), r"a\_b\[c]\`d\`");
    }
}
