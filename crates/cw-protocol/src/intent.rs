use serde::{Deserialize, Serialize};

/// What the operator wants to do.
///
/// Declaration order matters: the rule-based classifier breaks score ties
/// in favour of the intent declared first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Scan,
    Recon,
    VulnScan,
    Query,
    GenerateShell,
    Tools,
    Help,
    History,
    Exit,
    #[default]
    Unknown,
}

impl Intent {
    /// Every known intent in declaration order (excluding `Unknown`).
    pub const ALL: [Intent; 9] = [
        Intent::Scan,
        Intent::Recon,
        Intent::VulnScan,
        Intent::Query,
        Intent::GenerateShell,
        Intent::Tools,
        Intent::Help,
        Intent::History,
        Intent::Exit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Recon => "recon",
            Self::VulnScan => "vuln_scan",
            Self::Query => "query",
            Self::GenerateShell => "generate_shell",
            Self::Tools => "tools",
            Self::Help => "help",
            Self::History => "history",
            Self::Exit => "exit",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a free-form label (typically from model output) into an intent.
    ///
    /// Case, dashes and spaces are normalized and a handful of aliases are
    /// accepted. Anything unrecognized becomes `Unknown`, so the result is
    /// always a member of the closed set.
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();

        match normalized.as_str() {
            "scan" | "port_scan" | "portscan" | "network_scan" => Self::Scan,
            "recon" | "reconnaissance" | "enumerate" | "enumeration" | "osint" => Self::Recon,
            "vuln_scan" | "vulnscan" | "vulnerability_scan" | "vuln" | "vulnerability" => {
                Self::VulnScan
            }
            "query" | "question" | "ask" => Self::Query,
            "generate_shell" | "shell" | "reverse_shell" | "bind_shell" | "generate" => {
                Self::GenerateShell
            }
            "tools" | "list_tools" | "modules" => Self::Tools,
            "help" | "usage" => Self::Help,
            "history" => Self::History,
            "exit" | "quit" | "bye" => Self::Exit,
            _ => Self::Unknown,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
