mod registry;

pub use registry::{all_commands, CommandInvocation};

use crate::core::controller::{ControllerError, ConversationController};
use crate::core::message::Role;
use crate::core::snapshots::{chat_link, parse_chat_link};

#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    /// Handled; show the text to the user.
    Notice(String),
    ProcessAsMessage(String),
    Quit,
}

pub fn process_input(controller: &mut ConversationController, input: &str) -> CommandResult {
    let trimmed = input.trim();

    let Some(rest) = trimmed.strip_prefix('/') else {
        return CommandResult::ProcessAsMessage(input.to_string());
    };

    let mut parts = rest.splitn(2, ' ');
    let command_name = match parts.next() {
        Some(name) if !name.is_empty() => name,
        _ => return CommandResult::ProcessAsMessage(input.to_string()),
    };
    let args = parts.next().unwrap_or("").trim();

    match registry::find_command(command_name) {
        Some(command) => {
            let invocation = CommandInvocation {
                input: trimmed,
                args,
            };
            (command.handler)(controller, invocation)
        }
        None => CommandResult::Notice(format!(
            "Unknown command /{command_name}. Type /help for a list."
        )),
    }
}

fn notice(text: impl Into<String>) -> CommandResult {
    CommandResult::Notice(text.into())
}

fn usage(invocation: CommandInvocation<'_>, syntax: &str) -> CommandResult {
    notice(format!("Usage: {syntax} (got `{}`)", invocation.input))
}

pub(super) fn handle_help(
    _controller: &mut ConversationController,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    let mut help = String::from("Commands:");
    for command in all_commands() {
        help.push_str(&format!("\n  {:<18} {}", command.usage, command.help));
    }
    help.push_str("\nCtrl+C stops a response in progress, or quits when idle.");
    notice(help)
}

pub(super) fn handle_new(
    controller: &mut ConversationController,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    let session = controller.new_session();
    notice(format!("Started a new chat ({})", session.id))
}

pub(super) fn handle_sessions(
    controller: &mut ConversationController,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    let current = controller.current_session_id().to_string();
    let lines: Vec<String> = controller
        .sessions()
        .iter()
        .map(|session| {
            let marker = if session.id == current { "*" } else { " " };
            format!(
                "{marker} {}  {}  ({} messages, {})",
                session.id,
                session.title,
                session.turns.len(),
                session.created_at.format("%Y-%m-%d %H:%M")
            )
        })
        .collect();
    notice(lines.join("\n"))
}

pub(super) fn handle_switch(
    controller: &mut ConversationController,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    let Some(id) = parse_chat_link(invocation.args) else {
        return usage(invocation, "/switch <id>");
    };
    match controller.switch_session(&id) {
        Ok(()) => notice(format!(
            "Switched to chat {id} ({} messages)",
            controller.transcript().len()
        )),
        Err(err) => notice(err.to_string()),
    }
}

pub(super) fn handle_delete(
    controller: &mut ConversationController,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    if invocation.args.is_empty() {
        return usage(invocation, "/delete <id>");
    }
    let id = invocation.args;
    if !controller.sessions().iter().any(|session| session.id == id) {
        return notice(ControllerError::UnknownSession(id.to_string()).to_string());
    }
    controller.delete_session(id);
    notice(format!(
        "Deleted chat {id}. Current chat: {}",
        controller.current_session_id()
    ))
}

pub(super) fn handle_edit(
    controller: &mut ConversationController,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    let mut parts = invocation.args.splitn(2, ' ');
    let position = parts.next().and_then(|n| n.parse::<usize>().ok());
    let text = parts.next().map(str::trim).unwrap_or_default();
    let (Some(position), false) = (position, text.is_empty()) else {
        return usage(invocation, "/edit <n> <text>");
    };
    let Some(index) = position.checked_sub(1) else {
        return notice(ControllerError::IndexOutOfRange.to_string());
    };

    let result = controller
        .start_edit(index)
        .and_then(|()| controller.update_edit_draft(text))
        .and_then(|()| controller.save_edit());
    match result {
        Ok(_) => notice(format!("Regenerating from message {position}...")),
        Err(err) => {
            let _ = controller.cancel_edit();
            notice(err.to_string())
        }
    }
}

pub(super) fn handle_stop(
    controller: &mut ConversationController,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    match controller.stop() {
        Ok(()) => notice("Stopped."),
        Err(err) => notice(err.to_string()),
    }
}

pub(super) fn handle_link(
    controller: &mut ConversationController,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    notice(format!(
        "Resume with: chatline --resume '{}'",
        chat_link(controller.current_session_id())
    ))
}

pub(super) fn handle_history(
    controller: &mut ConversationController,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    if controller.transcript().is_empty() {
        return notice("No messages yet.");
    }
    let lines: Vec<String> = controller
        .transcript()
        .iter()
        .enumerate()
        .map(|(index, turn)| {
            let who = match turn.role {
                Role::User => "You",
                Role::Assistant => "AI",
                Role::System => "System",
            };
            format!("[{}] {who}: {}", index + 1, turn.content)
        })
        .collect();
    notice(lines.join("\n"))
}

pub(super) fn handle_quit(
    _controller: &mut ConversationController,
    _invocation: CommandInvocation<'_>,
) -> CommandResult {
    CommandResult::Quit
}
