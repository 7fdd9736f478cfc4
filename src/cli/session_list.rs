use chrono::{Local, TimeZone};

use crate::cli::context::AppContext;
use crate::core::snapshots::chat_link;

pub fn list_sessions(context: &AppContext) {
    let sessions = context.session_store().get_sessions();
    let chats = context.snapshots().list();

    println!("💾 Saved Chats");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if sessions.is_empty() {
        println!("No chats yet. Start one with 'chatline'.");
        return;
    }

    for session in &sessions {
        let created = session.created_at.with_timezone(&Local);
        println!("  • {}", session.title);
        println!(
            "    {} · {} messages · created {}",
            session.id,
            session.turns.len(),
            created.format("%Y-%m-%d %H:%M")
        );
        if let Some(chat) = chats.iter().find(|chat| chat.id == session.id) {
            let updated = Local
                .timestamp_millis_opt(chat.timestamp)
                .single()
                .map(|time| time.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("    last: {} (updated {updated})", chat.preview);
            println!("    resume: chatline --resume '{}'", chat_link(&chat.id));
        }
    }
}
