//! Typed key input and its xterm/VT byte encoding.
//!
//! Everything here is pure: encoding either produces the exact byte
//! sequence the child expects or fails with an invalid-key error before
//! any byte is written.

use crate::error::{Error, Result};

/// A single input element: literal text, a named special key, or a
/// modified key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyInput {
    Text(String),
    Named(NamedKey),
    Modified(ModifiedKey),
}

/// A named key or single character plus modifier flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifiedKey {
    pub key: KeySpec,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpec {
    Named(NamedKey),
    Char(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedKey {
    Enter,
    Tab,
    Escape,
    Backspace,
    Delete,
    Space,
    Up,
    Down,
    Right,
    Left,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
}

impl NamedKey {
    fn base_sequence(self) -> &'static [u8] {
        match self {
            NamedKey::Enter => b"\r",
            NamedKey::Tab => b"\t",
            NamedKey::Escape => b"\x1b",
            NamedKey::Backspace => b"\x7f",
            NamedKey::Delete => b"\x1b[3~",
            NamedKey::Space => b" ",
            NamedKey::Up => b"\x1b[A",
            NamedKey::Down => b"\x1b[B",
            NamedKey::Right => b"\x1b[C",
            NamedKey::Left => b"\x1b[D",
            NamedKey::Home => b"\x1b[H",
            NamedKey::End => b"\x1b[F",
            NamedKey::PageUp => b"\x1b[5~",
            NamedKey::PageDown => b"\x1b[6~",
            NamedKey::Insert => b"\x1b[2~",
            NamedKey::F1 => b"\x1bOP",
            NamedKey::F2 => b"\x1bOQ",
            NamedKey::F3 => b"\x1bOR",
            NamedKey::F4 => b"\x1bOS",
            NamedKey::F5 => b"\x1b[15~",
            NamedKey::F6 => b"\x1b[17~",
            NamedKey::F7 => b"\x1b[18~",
            NamedKey::F8 => b"\x1b[19~",
            NamedKey::F9 => b"\x1b[20~",
            NamedKey::F10 => b"\x1b[21~",
            NamedKey::F11 => b"\x1b[23~",
            NamedKey::F12 => b"\x1b[24~",
        }
    }

    /// The final letter of the `CSI 1;{mod}{letter}` form, for keys that
    /// have one.
    fn modifier_letter(self) -> Option<char> {
        match self {
            NamedKey::Up => Some('A'),
            NamedKey::Down => Some('B'),
            NamedKey::Right => Some('C'),
            NamedKey::Left => Some('D'),
            NamedKey::Home => Some('H'),
            NamedKey::End => Some('F'),
            _ => None,
        }
    }
}

impl std::fmt::Display for NamedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NamedKey::Enter => "Enter",
            NamedKey::Tab => "Tab",
            NamedKey::Escape => "Escape",
            NamedKey::Backspace => "Backspace",
            NamedKey::Delete => "Delete",
            NamedKey::Space => "Space",
            NamedKey::Up => "Up",
            NamedKey::Down => "Down",
            NamedKey::Right => "Right",
            NamedKey::Left => "Left",
            NamedKey::Home => "Home",
            NamedKey::End => "End",
            NamedKey::PageUp => "PageUp",
            NamedKey::PageDown => "PageDown",
            NamedKey::Insert => "Insert",
            NamedKey::F1 => "F1",
            NamedKey::F2 => "F2",
            NamedKey::F3 => "F3",
            NamedKey::F4 => "F4",
            NamedKey::F5 => "F5",
            NamedKey::F6 => "F6",
            NamedKey::F7 => "F7",
            NamedKey::F8 => "F8",
            NamedKey::F9 => "F9",
            NamedKey::F10 => "F10",
            NamedKey::F11 => "F11",
            NamedKey::F12 => "F12",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for NamedKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "enter" | "return" => Ok(NamedKey::Enter),
            "tab" => Ok(NamedKey::Tab),
            "escape" | "esc" => Ok(NamedKey::Escape),
            "backspace" => Ok(NamedKey::Backspace),
            "delete" => Ok(NamedKey::Delete),
            "space" => Ok(NamedKey::Space),
            "up" => Ok(NamedKey::Up),
            "down" => Ok(NamedKey::Down),
            "right" => Ok(NamedKey::Right),
            "left" => Ok(NamedKey::Left),
            "home" => Ok(NamedKey::Home),
            "end" => Ok(NamedKey::End),
            "pageup" => Ok(NamedKey::PageUp),
            "pagedown" => Ok(NamedKey::PageDown),
            "insert" => Ok(NamedKey::Insert),
            "f1" => Ok(NamedKey::F1),
            "f2" => Ok(NamedKey::F2),
            "f3" => Ok(NamedKey::F3),
            "f4" => Ok(NamedKey::F4),
            "f5" => Ok(NamedKey::F5),
            "f6" => Ok(NamedKey::F6),
            "f7" => Ok(NamedKey::F7),
            "f8" => Ok(NamedKey::F8),
            "f9" => Ok(NamedKey::F9),
            "f10" => Ok(NamedKey::F10),
            "f11" => Ok(NamedKey::F11),
            "f12" => Ok(NamedKey::F12),
            other => Err(Error::InvalidKey(format!("unknown key name: {other}"))),
        }
    }
}

impl KeySpec {
    /// Parse a key field from the API boundary: a single character, or a
    /// named key.
    pub fn parse(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(KeySpec::Char(c)),
            _ => s.parse().map(KeySpec::Named),
        }
    }
}

impl std::fmt::Display for KeySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySpec::Named(k) => write!(f, "{k}"),
            KeySpec::Char(c) => write!(f, "{c}"),
        }
    }
}

/// Encode one key input to the byte sequence the child understands.
pub fn encode_key(input: &KeyInput) -> Result<Vec<u8>> {
    match input {
        KeyInput::Text(text) => Ok(text.as_bytes().to_vec()),
        KeyInput::Named(key) => Ok(key.base_sequence().to_vec()),
        KeyInput::Modified(m) => encode_modified(m),
    }
}

/// Encode a list of key inputs; the result is the concatenation of the
/// individual encodings. Fails before producing anything if any element
/// is invalid.
pub fn encode_keys(inputs: &[KeyInput]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for input in inputs {
        out.extend(encode_key(input)?);
    }
    Ok(out)
}

fn encode_modified(m: &ModifiedKey) -> Result<Vec<u8>> {
    // xterm modifier parameter: 1 + shift + 2*alt + 4*ctrl + 8*meta.
    let mod_code = 1
        + u8::from(m.shift)
        + 2 * u8::from(m.alt)
        + 4 * u8::from(m.ctrl)
        + 8 * u8::from(m.meta);

    match m.key {
        KeySpec::Char(c) => {
            if m.ctrl && !m.alt && !m.meta {
                // Shift is absorbed: Ctrl+Shift+x == Ctrl+x.
                if c.is_ascii_alphabetic() {
                    return Ok(vec![c.to_ascii_lowercase() as u8 - 0x60]);
                }
                return Err(Error::InvalidKey(format!("cannot encode Ctrl+{c}")));
            }
            if m.alt && !m.ctrl && !m.meta {
                let mut out = vec![0x1b];
                out.extend(c.to_string().as_bytes());
                return Ok(out);
            }
            if !m.ctrl && !m.alt && !m.meta {
                // Bare or shift-only: the character already carries its case.
                return Ok(c.to_string().into_bytes());
            }
            Err(Error::InvalidKey(format!(
                "unsupported modifier combination for {c:?}"
            )))
        }
        KeySpec::Named(key) => {
            if key == NamedKey::Tab && mod_code > 1 {
                if m.shift && !m.ctrl && !m.alt && !m.meta {
                    return Ok(b"\x1b[Z".to_vec());
                }
                return Ok(format!("\x1b[1;{mod_code}Z").into_bytes());
            }
            if let Some(letter) = key.modifier_letter() {
                if mod_code > 1 {
                    return Ok(format!("\x1b[1;{mod_code}{letter}").into_bytes());
                }
            }
            if mod_code == 1 {
                return Ok(key.base_sequence().to_vec());
            }
            if m.alt && !m.ctrl && !m.meta && !m.shift {
                let mut out = vec![0x1b];
                out.extend(key.base_sequence());
                return Ok(out);
            }
            Err(Error::InvalidKey(format!(
                "unsupported modifier combination for {key}"
            )))
        }
    }
}

/// Human-readable token recorded in input history, e.g. `<Ctrl+Shift+Up>`.
/// Modifier order is Ctrl, Alt, Shift, Meta.
pub fn history_token(input: &KeyInput) -> String {
    match input {
        KeyInput::Text(text) => text.clone(),
        KeyInput::Named(key) => format!("<{key}>"),
        KeyInput::Modified(m) => {
            let mut parts: Vec<String> = Vec::new();
            if m.ctrl {
                parts.push("Ctrl".to_string());
            }
            if m.alt {
                parts.push("Alt".to_string());
            }
            if m.shift {
                parts.push("Shift".to_string());
            }
            if m.meta {
                parts.push("Meta".to_string());
            }
            parts.push(m.key.to_string());
            format!("<{}>", parts.join("+"))
        }
    }
}
