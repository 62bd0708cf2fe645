//! Build-time choices for a native host setup.
//!
//! Answers come from flags first; anything left over is asked on the
//! terminal, or filled with its default when running non-interactively.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{BufRead, Write};
use std::str::FromStr;

use tracing::{debug, error};

use crate::app_config::Network;
use crate::error::{Result, SetupError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Counterwallet,
    VendingMachine,
    BlockExplorer,
    CounterpartydOnly,
    BtcPayEscrow,
}

impl Role {
    pub const NAMES: &'static [&'static str] = &[
        "counterwallet",
        "vendingmachine",
        "blockexplorer",
        "counterpartyd_only",
        "btcpayescrow",
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Counterwallet => "counterwallet",
            Role::VendingMachine => "vendingmachine",
            Role::BlockExplorer => "blockexplorer",
            Role::CounterpartydOnly => "counterpartyd_only",
            Role::BtcPayEscrow => "btcpayescrow",
        }
    }

    /// Every role except the bare counterparty server also runs counterblock.
    pub fn runs_counterblock(self) -> bool {
        self != Role::CounterpartydOnly
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "counterwallet" => Ok(Role::Counterwallet),
            "vendingmachine" => Ok(Role::VendingMachine),
            "blockexplorer" => Ok(Role::BlockExplorer),
            "counterpartyd_only" => Ok(Role::CounterpartydOnly),
            "btcpayescrow" => Ok(Role::BtcPayEscrow),
            other => Err(invalid("role", other, Role::NAMES)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Choices {
    OneOf(&'static [&'static str]),
    FreeText,
}

pub struct Question {
    pub name: &'static str,
    pub prompt: &'static str,
    pub choices: Choices,
    pub default: Option<&'static str>,
    /// Whether the question is asked at all, given the answers so far.
    pub applies: fn(&BTreeMap<String, String>) -> bool,
}

fn always(_: &BTreeMap<String, String>) -> bool {
    true
}

fn role_is(answers: &BTreeMap<String, String>, role: Role) -> bool {
    answers.get("role").map(String::as_str) == Some(role.as_str())
}

pub static QUESTIONS: &[Question] = &[
    Question {
        name: "role",
        prompt: "Enter the number for the role you want to build:\n\
                 \t1: counterwallet\n\t2: vendingmachine\n\t3: blockexplorer\n\
                 \t4: counterpartyd_only\n\t5: btcpayescrow\n\
                 Your choice",
        choices: Choices::OneOf(Role::NAMES),
        default: Some("counterwallet"),
        applies: always,
    },
    Question {
        name: "branch",
        prompt: "Build from branch (m)aster or (d)evelop?",
        choices: Choices::OneOf(&["master", "develop"]),
        default: Some("master"),
        applies: always,
    },
    Question {
        name: "run_mode",
        prompt: "Run as (t)estnet node, (m)ainnet node, or (b)oth?",
        choices: Choices::OneOf(&["t", "m", "b"]),
        default: Some("b"),
        applies: always,
    },
    Question {
        name: "blockchain_service",
        prompt: "Use a hosted blockchain service instead of a local backend? (y/n)",
        choices: Choices::OneOf(&["y", "n"]),
        default: Some("n"),
        applies: |a| !role_is(a, Role::CounterpartydOnly),
    },
    Question {
        name: "security_hardening",
        prompt: "Set up security hardening? (y/n)",
        choices: Choices::OneOf(&["y", "n"]),
        default: Some("y"),
        applies: always,
    },
    Question {
        name: "autostart_services",
        prompt: "Autostart services (including on boot)? (y/n)",
        choices: Choices::OneOf(&["y", "n"]),
        default: Some("y"),
        applies: always,
    },
    Question {
        name: "counterpartyd_public",
        prompt: "Enable public counterparty API setup? (y/n)",
        choices: Choices::OneOf(&["y", "n"]),
        default: Some("y"),
        applies: |a| role_is(a, Role::CounterpartydOnly),
    },
    Question {
        name: "counterwallet_support_email",
        prompt: "Email address where support cases should go (blank to disable)",
        choices: Choices::FreeText,
        default: Some(""),
        applies: |a| role_is(a, Role::Counterwallet),
    },
];

/// Validated answers for one setup run. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildAnswers {
    pub role: Role,
    pub branch: String,
    pub run_mode: Network,
    pub blockchain_service: bool,
    pub security_hardening: bool,
    pub autostart_services: bool,
    pub counterpartyd_public: bool,
    pub support_email: Option<String>,
}

impl BuildAnswers {
    fn from_map(map: &BTreeMap<String, String>) -> Result<Self> {
        let get = |name: &str| map.get(name).map(String::as_str);
        let yes = |name: &str| get(name) == Some("y");
        let role: Role = get("role").unwrap_or("counterwallet").parse()?;
        Ok(Self {
            role,
            branch: get("branch").unwrap_or("master").to_string(),
            run_mode: get("run_mode").unwrap_or("b").parse()?,
            blockchain_service: yes("blockchain_service"),
            security_hardening: yes("security_hardening"),
            autostart_services: yes("autostart_services"),
            counterpartyd_public: yes("counterpartyd_public"),
            support_email: get("counterwallet_support_email")
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }
}

fn invalid(question: &str, answer: &str, choices: &[&str]) -> SetupError {
    SetupError::InvalidAnswer {
        question: question.to_string(),
        answer: answer.to_string(),
        expected: choices.join(", "),
    }
}

/// Expand single-letter and numeric shortcuts (`m` → `master`, `2` → the
/// second choice) before validation.
fn normalize(choices: &[&'static str], raw: &str) -> String {
    let raw = raw.trim().to_lowercase();
    if choices.contains(&raw.as_str()) {
        return raw;
    }
    if let Ok(n) = raw.parse::<usize>() {
        if (1..=choices.len()).contains(&n) && choices.iter().all(|c| c.len() > 1) {
            return choices[n - 1].to_string();
        }
    }
    let mut prefixed = choices.iter().filter(|c| c.len() > 1 && c.starts_with(&raw));
    match (raw.len(), prefixed.next(), prefixed.next()) {
        (1, Some(only), None) => only.to_string(),
        _ => raw,
    }
}

#[derive(Debug, Default)]
pub struct QuestionGatherer {
    presupplied: BTreeMap<String, String>,
    interactive: bool,
}

impl QuestionGatherer {
    pub fn new(interactive: bool) -> Self {
        Self {
            presupplied: BTreeMap::new(),
            interactive,
        }
    }

    /// Pre-answer `name`, typically from a command-line flag.
    pub fn supply(mut self, name: &str, answer: impl Into<String>) -> Self {
        self.presupplied.insert(name.to_string(), answer.into());
        self
    }

    pub fn gather<R: BufRead, W: Write>(&self, input: &mut R, output: &mut W) -> Result<BuildAnswers> {
        let mut answers = BTreeMap::new();
        for q in QUESTIONS {
            if !(q.applies)(&answers) {
                continue;
            }
            let answer = match (self.presupplied.get(q.name), q.choices) {
                (Some(raw), Choices::OneOf(choices)) => {
                    let value = normalize(choices, raw);
                    if !choices.contains(&value.as_str()) {
                        return Err(invalid(q.name, raw, choices));
                    }
                    value
                }
                (Some(raw), Choices::FreeText) => raw.trim().to_string(),
                (None, _) if self.interactive => ask(q, input, output)?,
                (None, _) => q
                    .default
                    .map(str::to_string)
                    .ok_or_else(|| SetupError::Unanswered(q.name.to_string()))?,
            };
            debug!("answer {} = {:?}", q.name, answer);
            answers.insert(q.name.to_string(), answer);
        }
        BuildAnswers::from_map(&answers)
    }
}

fn io_err(e: std::io::Error) -> SetupError {
    SetupError::io("<terminal>", e)
}

/// Prompt until a valid answer is given. Empty input takes the default; end
/// of input takes the default or fails when there is none.
pub fn ask<R: BufRead, W: Write>(q: &Question, input: &mut R, output: &mut W) -> Result<String> {
    loop {
        let shown = match q.default {
            Some(d) if !d.is_empty() => write!(output, "{} [{}]: ", q.prompt, d),
            _ => write!(output, "{}: ", q.prompt),
        };
        shown.map_err(io_err)?;
        output.flush().map_err(io_err)?;

        let mut line = String::new();
        let read = input.read_line(&mut line).map_err(io_err)?;
        if read == 0 {
            return q
                .default
                .map(str::to_string)
                .ok_or_else(|| SetupError::Unanswered(q.name.to_string()));
        }
        let raw = line.trim();
        if raw.is_empty() {
            if let Some(d) = q.default {
                return Ok(d.to_string());
            }
            continue;
        }
        match q.choices {
            Choices::FreeText => return Ok(raw.to_string()),
            Choices::OneOf(choices) => {
                let value = normalize(choices, raw);
                if choices.contains(&value.as_str()) {
                    return Ok(value);
                }
                error!("please enter one of: {}", choices.join(", "));
                writeln!(output, "Please enter one of: {}", choices.join(", ")).map_err(io_err)?;
            }
        }
    }
}

/// y/N confirmation; anything but `y`/`yes` declines.
pub fn confirm<R: BufRead, W: Write>(prompt: &str, input: &mut R, output: &mut W) -> Result<bool> {
    write!(output, "{} [y/N]: ", prompt).map_err(io_err)?;
    output.flush().map_err(io_err)?;
    let mut line = String::new();
    input.read_line(&mut line).map_err(io_err)?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}
