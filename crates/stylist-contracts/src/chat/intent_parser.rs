use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, NO_ARG_COMMANDS, PATH_COMMANDS, RAW_ARG_COMMANDS, STYLE_COMMANDS,
};
use crate::styles::{ColorTheme, Style};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            command_args: BTreeMap::new(),
        }
    }

    fn with_arg(mut self, key: &str, value: Value) -> Self {
        self.command_args.insert(key.to_string(), value);
        self
    }

    /// Shell-split words of a path command, quoting removed.
    pub fn arg_list(&self, key: &str) -> Vec<String> {
        self.command_args
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.command_args
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn split_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts.into_iter().filter(|value| !value.is_empty()).collect(),
        Err(_) => vec![arg.trim().to_string()],
    }
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    let Some(slash_tail) = raw_trimmed.strip_prefix('/') else {
        let mut intent = Intent::new("instruction", text);
        intent.prompt = Some(raw_trimmed.to_string());
        return intent;
    };

    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if command_len == 0 {
        let mut intent = Intent::new("instruction", text);
        intent.prompt = Some(raw_trimmed.to_string());
        return intent;
    }

    let command = slash_tail[..command_len].to_ascii_lowercase();
    let arg = slash_tail[command_len..].trim();

    if let Some(action) = find_action(&command, PATH_COMMANDS) {
        let args = split_path_args(arg);
        return Intent::new(action, text)
            .with_arg("path", Value::String(args.join(" ")))
            .with_arg(
                "args",
                Value::Array(args.into_iter().map(Value::String).collect()),
            );
    }

    if let Some(action) = find_action(&command, STYLE_COMMANDS) {
        let style = Style::parse(arg)
            .map(|style| Value::String(style.slug().to_string()))
            .unwrap_or(Value::Null);
        return Intent::new(action, text)
            .with_arg("style", style)
            .with_arg("arg", Value::String(arg.to_string()));
    }

    if let Some(action) = find_action(&command, RAW_ARG_COMMANDS) {
        if action == "set_theme" {
            let theme = ColorTheme::parse(arg)
                .map(|theme| Value::String(theme.label().to_string()))
                .unwrap_or(Value::Null);
            return Intent::new(action, text)
                .with_arg("theme", theme)
                .with_arg("arg", Value::String(arg.to_string()));
        }
        let mut intent = Intent::new(action, text);
        intent.prompt = Some(arg.to_string());
        return intent;
    }

    if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
        return Intent::new(action, text);
    }

    Intent::new("unknown", text)
        .with_arg("command", Value::String(command))
        .with_arg("arg", Value::String(arg.to_string()))
}
