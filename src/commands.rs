// ABOUTME: Command dispatch: the finite set of operations a front end can invoke.
// ABOUTME: Parses REPL lines into Command values; plain text is sent as a message.

use std::path::PathBuf;

/// An operation on the chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send a user message and stream the reply.
    Send(String),
    /// Toggle the selection of pages given by key or relative path.
    SelectPages(Vec<String>),
    /// List the pages and their selection.
    Pages,
    /// Save the conversation; no path means a timestamped default.
    Save(Option<PathBuf>),
    Load(PathBuf),
    SavePages(PathBuf),
    LoadPages(PathBuf),
    Undo,
    /// Resend the message restored by the last undo.
    Retry,
    NewSession,
    /// Change a setting and save the config file.
    Set { key: String, value: String },
    Help,
    Quit,
    /// A known command used with missing arguments.
    Usage(&'static str),
    Unknown(String),
}

pub const HELP: &str = "\
Commands:
  /pages                 List notebook pages (* = selected)
  /select <page>...      Toggle pages by key or relative path
  /save [file]           Save the conversation
  /load <file>           Load a conversation
  /savepages <file>      Save the page selection
  /loadpages <file>      Load a page selection
  /undo                  Remove the last exchange
  /retry                 Resend the message removed by /undo
  /new                   Start a new conversation
  /set <key> <value>     Change and save a setting (response_limit, model,
                         system_prompt, stream, default_pages)
  /help                  Show this help
  /quit                  Exit
Anything else is sent as a message. Ctrl-C stops a reply.";

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if !line.starts_with('/') {
        return Some(Command::Send(line.to_string()));
    }

    let (name, args) = match line.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (line, ""),
    };

    let command = match name {
        "/quit" | "/exit" | "/q" => Command::Quit,
        "/help" | "/h" | "/?" => Command::Help,
        "/pages" => Command::Pages,
        "/select" => {
            let selectors: Vec<String> = args.split_whitespace().map(str::to_string).collect();
            if selectors.is_empty() {
                Command::Usage("/select <page>...")
            } else {
                Command::SelectPages(selectors)
            }
        }
        "/save" => Command::Save((!args.is_empty()).then(|| PathBuf::from(args))),
        "/load" => path_arg(args).map_or(Command::Usage("/load <file>"), Command::Load),
        "/savepages" => {
            path_arg(args).map_or(Command::Usage("/savepages <file>"), Command::SavePages)
        }
        "/loadpages" => {
            path_arg(args).map_or(Command::Usage("/loadpages <file>"), Command::LoadPages)
        }
        "/undo" => Command::Undo,
        "/retry" => Command::Retry,
        "/new" | "/clear" => Command::NewSession,
        "/set" => match args.split_once(char::is_whitespace) {
            Some((key, value)) => Command::Set {
                key: key.to_string(),
                value: value.trim().to_string(),
            },
            None if !args.is_empty() => Command::Set {
                key: args.to_string(),
                value: String::new(),
            },
            None => Command::Usage("/set <key> <value>"),
        },
        other => Command::Unknown(other.to_string()),
    };
    Some(command)
}

fn path_arg(args: &str) -> Option<PathBuf> {
    (!args.is_empty()).then(|| PathBuf::from(args))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_sent() {
        assert_eq!(
            parse_command("  what is in my notes?  "),
            Some(Command::Send("what is in my notes?".into()))
        );
    }

    #[test]
    fn blank_line_is_ignored() {
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn select_collects_selectors() {
        assert_eq!(
            parse_command("/select Home.txt 1700000000"),
            Some(Command::SelectPages(vec![
                "Home.txt".into(),
                "1700000000".into()
            ]))
        );
        assert_eq!(
            parse_command("/select"),
            Some(Command::Usage("/select <page>..."))
        );
    }

    #[test]
    fn save_path_is_optional() {
        assert_eq!(parse_command("/save"), Some(Command::Save(None)));
        assert_eq!(
            parse_command("/save chats/today.json"),
            Some(Command::Save(Some(PathBuf::from("chats/today.json"))))
        );
    }

    #[test]
    fn load_requires_path() {
        assert_eq!(parse_command("/load"), Some(Command::Usage("/load <file>")));
        assert_eq!(
            parse_command("/load my chat.json"),
            Some(Command::Load(PathBuf::from("my chat.json")))
        );
    }

    #[test]
    fn set_splits_key_from_value() {
        assert_eq!(
            parse_command("/set system_prompt Answer from my notes:"),
            Some(Command::Set {
                key: "system_prompt".into(),
                value: "Answer from my notes:".into()
            })
        );
        assert_eq!(
            parse_command("/set model"),
            Some(Command::Set {
                key: "model".into(),
                value: String::new()
            })
        );
        assert_eq!(
            parse_command("/set"),
            Some(Command::Usage("/set <key> <value>"))
        );
    }

    #[test]
    fn aliases_and_unknown_commands() {
        assert_eq!(parse_command("/q"), Some(Command::Quit));
        assert_eq!(parse_command("/clear"), Some(Command::NewSession));
        assert_eq!(parse_command("/undo"), Some(Command::Undo));
        assert_eq!(
            parse_command("/frobnicate now"),
            Some(Command::Unknown("/frobnicate".into()))
        );
    }
}
