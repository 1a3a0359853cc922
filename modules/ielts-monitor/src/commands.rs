//! Subscription commands sent to the bot.
//!
//! Each command is a plain function in [`COMMANDS`]; the listener parses the
//! incoming text, looks the name up, and sends back whatever it returns.

use chrono::Utc;
use tracing::info;

use crate::notify::message::{escape_markdown, format_local};
use crate::notify::OutgoingMessage;
use crate::state::StateStore;
use ielts_common::RecipientId;

pub type Reply = OutgoingMessage;

/// What a command handler may read or mutate.
pub struct CommandContext<'a> {
    pub store: &'a StateStore,
    pub target_url: &'a str,
    pub check_interval_minutes: u64,
}

type Handler = fn(&CommandContext<'_>, RecipientId) -> Reply;

pub const COMMANDS: &[(&str, Handler)] = &[
    ("start", start),
    ("status", status),
    ("subscribe", subscribe),
    ("unsubscribe", unsubscribe),
    ("help", help),
];

/// Extract the lowercased command name from `/name`, `/name@bot` or
/// `/name args`. `None` for anything that is not a command.
pub fn parse_command(text: &str) -> Option<String> {
    let word = text.trim_start().split_whitespace().next()?;
    let name = word.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or_default();
    if name.is_empty() {
        return None;
    }
    Some(name.to_lowercase())
}

/// Run the handler for `text`, if it names a known command.
pub fn dispatch(ctx: &CommandContext<'_>, chat_id: RecipientId, text: &str) -> Option<Reply> {
    let name = parse_command(text)?;
    let (_, handler) = COMMANDS.iter().find(|(command, _)| *command == name)?;
    Some(handler(ctx, chat_id))
}

fn start(ctx: &CommandContext<'_>, chat_id: RecipientId) -> Reply {
    let is_new = ctx.store.add_subscriber(chat_id);
    let count = ctx.store.subscriber_count();
    info!(chat_id, new = is_new, "User interaction");

    let mut text = format!(
        "🎓 *Bilkent IELTS Exam Date Monitor*\n\n\
         Bu bot, Bilkent Üniversitesi IELTS sınav tarihlerini takip eder ve değişiklik olduğunda sizi bilgilendirir.\n\n\
         📅 *Mevcut Özellikler:*\n\
         • Her {} dakikada bir sınav tarihlerini kontrol eder\n\
         • Tarih değişikliklerinde otomatik bildirim gönderir\n\
         • Hem sınav tarihini hem de başvuru son tarihini takip eder\n\n\
         🔧 *Komutlar:*\n\
         /status - Bot durumunu kontrol et\n\
         /unsubscribe - Bildirimleri durdur\n\
         /subscribe - Bildirimleri tekrar başlat\n\
         /help - Bu yardım mesajını göster\n\n",
        ctx.check_interval_minutes
    );
    if is_new {
        text.push_str(&format!(
            "✅ *Başarıyla kayıt oldunuz!*\n📊 Toplam abone sayısı: {count}\n\n"
        ));
    } else {
        text.push_str(&format!(
            "ℹ️ Zaten kayıtlısınız.\n📊 Toplam abone sayısı: {count}\n\n"
        ));
    }
    text.push_str("Bot aktif ve çalışıyor! 🚀");
    Reply::markdown(text)
}

fn status(ctx: &CommandContext<'_>, chat_id: RecipientId) -> Reply {
    let subscribed = if ctx.store.is_subscriber(chat_id) {
        "✅ Siz abonesiniz"
    } else {
        "❌ Siz abone değilsiniz"
    };
    Reply::markdown(format!(
        "📊 *Bot Durumu*\n\n\
         ✅ Bot aktif ve çalışıyor\n\
         🕐 Son kontrol: {}\n\
         🎯 Hedef URL: {}\n\
         ⏰ Kontrol aralığı: {} dakika\n\
         👥 Toplam abone sayısı: {}\n\
         {subscribed}\n\n\
         Bot düzenli olarak sınav tarihlerini kontrol ediyor. Değişiklik olduğunda abone olan kullanıcılara bildirim gönderecek.",
        format_local(&Utc::now()),
        escape_markdown(ctx.target_url),
        ctx.check_interval_minutes,
        ctx.store.subscriber_count(),
    ))
}

fn subscribe(ctx: &CommandContext<'_>, chat_id: RecipientId) -> Reply {
    let is_new = ctx.store.add_subscriber(chat_id);
    let count = ctx.store.subscriber_count();
    if is_new {
        info!(chat_id, "User subscribed");
        Reply::markdown(format!(
            "✅ *Bildirimler aktif edildi*\n\n\
             IELTS sınav tarihi güncellemeleri alacaksınız.\n\n\
             📊 Toplam abone sayısı: {count}"
        ))
    } else {
        Reply::markdown(format!(
            "ℹ️ *Zaten abonesiniz*\n\n\
             IELTS sınav tarihi güncellemeleri almaya devam ediyorsunuz.\n\n\
             📊 Toplam abone sayısı: {count}"
        ))
    }
}

fn unsubscribe(ctx: &CommandContext<'_>, chat_id: RecipientId) -> Reply {
    if ctx.store.remove_subscriber(chat_id) {
        info!(chat_id, "User unsubscribed");
        Reply::markdown(format!(
            "❌ *Bildirimler durduruldu*\n\n\
             Artık IELTS sınav tarihi güncellemeleri almayacaksınız.\n\n\
             📊 Kalan abone sayısı: {}\n\n\
             Bildirimleri tekrar almak için /subscribe komutunu kullanabilirsiniz.",
            ctx.store.subscriber_count()
        ))
    } else {
        Reply::markdown(
            "ℹ️ *Zaten abone değilsiniz*\n\n\
             Bildirimleri almak için /start veya /subscribe komutunu kullanabilirsiniz.",
        )
    }
}

fn help(ctx: &CommandContext<'_>, _chat_id: RecipientId) -> Reply {
    Reply::markdown(format!(
        "❓ *Yardım*\n\n\
         Bu bot Bilkent Üniversitesi IELTS sınav tarihlerini takip eder.\n\n\
         📋 *Nasıl Çalışır:*\n\
         1. Bot her {} dakikada bir web sitesini kontrol eder\n\
         2. Sınav tarihi veya başvuru son tarihi değişirse bildirim gönderir\n\
         3. Bildirimler otomatik olarak tüm kayıtlı kullanıcılara gönderilir\n\n\
         🔧 *Komutlar:*\n\
         /start - Botu başlat ve otomatik olarak abone ol\n\
         /status - Bot durumunu kontrol et\n\
         /subscribe - Bildirimleri aktif et\n\
         /unsubscribe - Bildirimleri durdur\n\
         /help - Bu yardım mesajını göster\n\n\
         📞 *Destek:*\n\
         Sorularınız için bot geliştiricisi ile iletişime geçebilirsiniz.",
        ctx.check_interval_minutes
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(store: &StateStore) -> CommandContext<'_> {
        CommandContext {
            store,
            target_url: "http://prep.bilkent.edu.tr/ielts/",
            check_interval_minutes: 5,
        }
    }

    #[test]
    fn parses_command_forms() {
        assert_eq!(parse_command("/start").as_deref(), Some("start"));
        assert_eq!(parse_command("/Status@ielts_bot").as_deref(), Some("status"));
        assert_eq!(parse_command("  /help me please").as_deref(), Some("help"));
        assert_eq!(parse_command("hello /start"), None);
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command("/@bot"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn start_subscribes_once() {
        let store = StateStore::ephemeral();
        let first = dispatch(&ctx(&store), 7, "/start").unwrap();
        assert!(first.text.contains("Başarıyla kayıt oldunuz"));
        assert!(first.text.contains("Her 5 dakikada"));

        let second = dispatch(&ctx(&store), 7, "/start").unwrap();
        assert!(second.text.contains("Zaten kayıtlısınız"));
        assert_eq!(store.list_subscribers(), vec![7]);
    }

    #[test]
    fn subscribe_does_not_unsubscribe() {
        let store = StateStore::ephemeral();
        let reply = dispatch(&ctx(&store), 1, "/subscribe").unwrap();
        assert!(reply.text.contains("Bildirimler aktif edildi"));
        assert!(store.is_subscriber(1));

        let reply = dispatch(&ctx(&store), 1, "/subscribe").unwrap();
        assert!(reply.text.contains("Zaten abonesiniz"));
        assert!(store.is_subscriber(1));
    }

    #[test]
    fn unsubscribe_removes_and_reports() {
        let store = StateStore::ephemeral();
        store.add_subscriber(1);
        store.add_subscriber(2);

        let reply = dispatch(&ctx(&store), 1, "/unsubscribe").unwrap();
        assert!(reply.text.contains("Bildirimler durduruldu"));
        assert!(reply.text.contains("Kalan abone sayısı: 1"));
        assert!(!store.is_subscriber(1));

        let reply = dispatch(&ctx(&store), 1, "/unsubscribe").unwrap();
        assert!(reply.text.contains("Zaten abone değilsiniz"));
    }

    #[test]
    fn status_reports_membership_without_changing_it() {
        let store = StateStore::ephemeral();
        let reply = dispatch(&ctx(&store), 3, "/status").unwrap();
        assert!(reply.text.contains("Siz abone değilsiniz"));
        assert!(reply.text.contains("Kontrol aralığı: 5 dakika"));
        assert!(reply.text.contains("http://prep.bilkent.edu.tr/ielts/"));
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn status_escapes_target_url() {
        let store = StateStore::ephemeral();
        let ctx = CommandContext {
            store: &store,
            target_url: "https://example.com/ielts_exam_dates/",
            check_interval_minutes: 1,
        };
        let reply = dispatch(&ctx, 3, "/status").unwrap();
        assert!(reply.text.contains(r"https://example.com/ielts\_exam\_dates/"));
    }

    #[test]
    fn unknown_and_plain_text_get_no_reply() {
        let store = StateStore::ephemeral();
        assert!(dispatch(&ctx(&store), 1, "/settings").is_none());
        assert!(dispatch(&ctx(&store), 1, "merhaba").is_none());
        assert!(dispatch(&ctx(&store), 1, "/startx").is_none());
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn help_lists_every_command() {
        let store = StateStore::ephemeral();
        let reply = dispatch(&ctx(&store), 1, "/HELP").unwrap();
        for (name, _) in COMMANDS {
            assert!(reply.text.contains(&format!("/{name}")), "{name}");
        }
    }
}
