#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "upload",
        action: "upload",
    },
    CommandSpec {
        command: "download",
        action: "download",
    },
];

pub(crate) const STYLE_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "retry",
        action: "retry",
    },
    CommandSpec {
        command: "open",
        action: "open_edit",
    },
];

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "edit",
        action: "set_instruction",
    },
    CommandSpec {
        command: "theme",
        action: "set_theme",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "clear",
        action: "clear_source",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "apply",
        action: "apply_edit",
    },
    CommandSpec {
        command: "close",
        action: "close_edit",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/upload",
    "/clear",
    "/status",
    "/retry",
    "/open",
    "/edit",
    "/theme",
    "/apply",
    "/download",
    "/close",
    "/help",
    "/quit",
];
