/*!
Command handlers for the CLI

This module provides the handlers invoked by the CLI entrypoint:

- `chat`    : Interactive chat shell over the conversation manager
- `history` : List, search and delete stored conversations

`special_commands` parses the slash commands understood inside the chat
shell.
*/

// Chat command handler
pub mod chat;

// Conversation history commands
pub mod history;

// Slash command parser for the chat shell
pub mod special_commands;
