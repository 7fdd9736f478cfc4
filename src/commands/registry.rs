use super::CommandResult;
use crate::core::controller::ConversationController;

pub type CommandHandler = fn(&mut ConversationController, CommandInvocation<'_>) -> CommandResult;

pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
    pub handler: CommandHandler,
}

#[derive(Clone, Copy)]
pub struct CommandInvocation<'a> {
    pub input: &'a str,
    pub args: &'a str,
}

pub fn all_commands() -> &'static [Command] {
    COMMANDS
}

pub fn find_command(name: &str) -> Option<&'static Command> {
    all_commands()
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        usage: "/help",
        help: "Show available commands.",
        handler: super::handle_help,
    },
    Command {
        name: "new",
        usage: "/new",
        help: "Start a new chat.",
        handler: super::handle_new,
    },
    Command {
        name: "sessions",
        usage: "/sessions",
        help: "List saved chats, most recent first.",
        handler: super::handle_sessions,
    },
    Command {
        name: "switch",
        usage: "/switch <id>",
        help: "Open a saved chat.",
        handler: super::handle_switch,
    },
    Command {
        name: "delete",
        usage: "/delete <id>",
        help: "Delete a saved chat.",
        handler: super::handle_delete,
    },
    Command {
        name: "edit",
        usage: "/edit <n> <text>",
        help: "Rewrite your message number n and regenerate from there.",
        handler: super::handle_edit,
    },
    Command {
        name: "stop",
        usage: "/stop",
        help: "Stop the response being generated.",
        handler: super::handle_stop,
    },
    Command {
        name: "link",
        usage: "/link",
        help: "Show the resume link for this chat.",
        handler: super::handle_link,
    },
    Command {
        name: "history",
        usage: "/history",
        help: "Print the current transcript with message numbers.",
        handler: super::handle_history,
    },
    Command {
        name: "quit",
        usage: "/quit",
        help: "Leave the chat.",
        handler: super::handle_quit,
    },
];
