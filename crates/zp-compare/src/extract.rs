//! Message extraction.
//!
//! Reduces one raw output block to the part that reflects game behavior.
//! Presentation content is removed in a fixed order:
//!
//! 1. ANSI escape sequences
//! 2. the status bar at the top of the block (kept aside for the status-bar
//!    counter, never compared as behavior)
//! 3. the game banner, present only on the first block of a session
//! 4. an echoed input line and the trailing prompt
//!
//! What remains is split into an optional room description and the action
//! response. Extraction never fails: a block that cannot be parsed is passed
//! through whole as the response.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::transcript::RawOutputBlock;

/// The behaviorally meaningful part of one output block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedMessage {
    /// Action response with banner, status bar and prompt removed.
    pub response: String,
    /// First line of the room description, when one was split off.
    pub room_name: Option<String>,
    /// Room name and description text.
    pub room_description: Option<String>,
    pub is_movement: bool,
    /// Raw status bar line, if the block had one.
    pub status_line: Option<String>,
    pub source: RawOutputBlock,
}

/// Why a block could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum ExtractError {
    #[error("block contains control byte {0:#04x}")]
    ControlByte(u32),
    #[error("malformed status line: {0:?}")]
    MalformedStatusLine(String),
}

/// Lines that only ever appear in the opening banner.
const HEADER_MARKERS: &[&str] = &[
    "ZORK I",
    "ZORK is a registered trademark",
    "The Great Underground Empire",
    "Copyright (c)",
    "Infocom, Inc.",
    "Revision ",
    "Serial number",
];

const DIRECTIONS: &[&str] = &[
    "north", "n", "south", "s", "east", "e", "west", "w",
    "northeast", "ne", "northwest", "nw", "southeast", "se", "southwest", "sw",
    "up", "u", "down", "d", "in", "out",
];

const MOVE_VERBS: &[&str] = &["go", "walk", "run"];

const LOOK_COMMANDS: &[&str] = &["look", "l", "look around"];

/// Words allowed in lowercase inside a room name ("Up a Tree").
const ROOM_NAME_CONNECTORS: &[&str] = &[
    "a", "an", "and", "at", "by", "from", "in", "of", "on", "the", "to", "with",
];

static ANSI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07]*\x07|\x1b[@-Z\\-_]")
        .expect("ANSI pattern is valid")
});

/// "West of House    Score: 0    Moves: 3", or just "Score: 10".
static INFOCOM_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\S.*?\s{2,})?Score:\s*-?\d+(?:\s+(?:Moves|Turns):\s*\d+)?\s*$")
        .expect("status pattern is valid")
});

/// "West of House — 0/3".
static DASH_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\S.*?\s+(?:—|–|--?)\s+-?\d+\s*/\s*\d+\s*$")
        .expect("status pattern is valid")
});

/// True if `command` moves the player: a direction, optionally after
/// "go", "walk" or "run".
pub fn is_movement_command(command: &str) -> bool {
    let command = normalize_command(command);
    let direction = MOVE_VERBS
        .iter()
        .find_map(|verb| {
            command
                .strip_prefix(verb)
                .and_then(|rest| rest.strip_prefix(' '))
        })
        .unwrap_or(command.as_str());
    DIRECTIONS.contains(&direction)
}

fn is_look_command(command: &str) -> bool {
    LOOK_COMMANDS.contains(&normalize_command(command).as_str())
}

fn normalize_command(command: &str) -> String {
    command
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches('.')
        .to_lowercase()
}

/// Extract the action response from `raw`, produced by `command`, treating
/// `raw` as the opening block of a session.
pub fn extract(raw: &RawOutputBlock, command: &str) -> ExtractedMessage {
    extract_at(raw, command, 0)
}

/// Extract the response of the block at `command_index` in its transcript.
///
/// Only block 0 may carry the banner; later blocks keep banner-like lines
/// (the `version` command prints them) as part of the response.
pub fn extract_at(raw: &RawOutputBlock, command: &str, command_index: usize) -> ExtractedMessage {
    match try_extract(raw, command, command_index == 0) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(command, error = %e, "unparseable output block, comparing it whole");
            ExtractedMessage {
                response: raw.text().to_string(),
                room_name: None,
                room_description: None,
                is_movement: false,
                status_line: None,
                source: raw.clone(),
            }
        }
    }
}

fn try_extract(
    raw: &RawOutputBlock,
    command: &str,
    first_block: bool,
) -> Result<ExtractedMessage, ExtractError> {
    let cleaned = ANSI.replace_all(raw.text(), "");
    let cleaned = cleaned.replace("\r\n", "\n").replace('\r', "");
    if let Some(c) = cleaned
        .chars()
        .find(|c| c.is_control() && *c != '\n' && *c != '\t')
    {
        return Err(ExtractError::ControlByte(c as u32));
    }

    let mut lines: Vec<&str> = cleaned.lines().map(str::trim_end).collect();

    let mut status_line = take_status_line(&mut lines)?;
    let had_header = first_block && strip_header(&mut lines);
    if status_line.is_none() && had_header {
        status_line = take_status_line(&mut lines)?;
    }
    strip_echo(&mut lines, command);
    strip_prompt(&mut lines);

    let is_movement = is_movement_command(command);
    let (room_name, room_description, rest) =
        if is_movement || is_look_command(command) || had_header {
            split_room(&lines)
        } else {
            (None, None, lines.as_slice())
        };

    Ok(ExtractedMessage {
        response: join_trimmed(rest),
        room_name,
        room_description,
        is_movement,
        status_line,
        source: raw.clone(),
    })
}

fn first_content_line(lines: &[&str]) -> Option<usize> {
    lines.iter().position(|l| !l.trim().is_empty())
}

fn take_status_line(lines: &mut Vec<&str>) -> Result<Option<String>, ExtractError> {
    let Some(idx) = first_content_line(lines) else {
        return Ok(None);
    };
    let line = lines[idx];
    if INFOCOM_STATUS.is_match(line) || DASH_STATUS.is_match(line) {
        lines.remove(idx);
        return Ok(Some(line.trim().to_string()));
    }
    if line.contains("Score:") && line.contains("Moves:") {
        return Err(ExtractError::MalformedStatusLine(line.trim().to_string()));
    }
    Ok(None)
}

fn strip_header(lines: &mut Vec<&str>) -> bool {
    let mut end = 0;
    for (idx, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if HEADER_MARKERS.iter().any(|m| line.contains(m)) {
            end = idx + 1;
        } else {
            break;
        }
    }
    if end > 0 {
        lines.drain(..end);
        true
    } else {
        false
    }
}

fn strip_echo(lines: &mut Vec<&str>, command: &str) {
    let Some(idx) = first_content_line(lines) else {
        return;
    };
    let Some(echoed) = lines[idx].trim().strip_prefix('>') else {
        return;
    };
    let echoed = echoed.trim();
    if echoed.is_empty() || normalize_command(echoed) == normalize_command(command) {
        lines.remove(idx);
    }
}

fn strip_prompt(lines: &mut Vec<&str>) {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    if lines.last().is_some_and(|l| l.trim() == ">") {
        lines.pop();
    }
}

fn looks_like_room_name(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() || line.len() > 40 || line.contains(':') {
        return false;
    }
    if line.ends_with(['.', '!', '?', ',', ';', '"', '\'', ')']) {
        return false;
    }
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.len() > 6 {
        return false;
    }
    words.iter().enumerate().all(|(i, word)| {
        let starts_upper = word.chars().next().is_some_and(char::is_uppercase);
        starts_upper || (i > 0 && ROOM_NAME_CONNECTORS.contains(word))
    })
}

/// Split a leading room description (name line plus the paragraph under it)
/// from whatever follows.
fn split_room<'a, 'b>(
    lines: &'b [&'a str],
) -> (Option<String>, Option<String>, &'b [&'a str]) {
    let Some(start) = first_content_line(lines) else {
        return (None, None, lines);
    };
    if !looks_like_room_name(lines[start]) {
        return (None, None, lines);
    }
    let end = lines[start..]
        .iter()
        .position(|l| l.trim().is_empty())
        .map_or(lines.len(), |offset| start + offset);
    let name = lines[start].trim().to_string();
    let description = join_trimmed(&lines[start..end]);
    (Some(name), Some(description), &lines[end..])
}

fn join_trimmed(lines: &[&str]) -> String {
    let start = first_content_line(lines).unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(start, |i| i + 1);
    lines[start..end.max(start)]
        .iter()
        .map(|l| l.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}
