//! Reading the user's choices and typed text.

use crate::defaults;
use crate::error::{AssistantError, Result};
use crate::turn::state::ModeSelection;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::Mutex;

/// Blocking source of user input.
pub trait InputPrompt: Send + Sync {
    /// Ask for voice, text or exit. End of input means exit.
    fn choose_mode(&self) -> Result<ModeSelection>;

    /// Read one typed question. `None` at end of input.
    fn read_text(&self) -> Result<Option<String>>;

    /// Ask for a missing parameter. `None` when the answer is blank.
    fn ask_for_parameter(&self, name: &str, question: &str) -> Result<Option<String>>;
}

/// Interpret one line typed at the mode prompt.
pub fn parse_mode(line: &str) -> Option<ModeSelection> {
    match line.trim().to_lowercase().as_str() {
        "v" | "voice" => Some(ModeSelection::Voice),
        "t" | "text" => Some(ModeSelection::Text),
        "e" | "exit" => Some(ModeSelection::Exit),
        other if other == defaults::EXIT_COMMAND => Some(ModeSelection::Exit),
        _ => None,
    }
}

struct Io<R, W> {
    reader: R,
    writer: W,
}

/// Line-based prompt over any reader and writer, stdin/stdout by default.
pub struct TerminalPrompt<R = io::BufReader<io::Stdin>, W = io::Stdout> {
    io: Mutex<Io<R, W>>,
}

impl TerminalPrompt {
    pub fn stdio() -> Self {
        Self::new(io::BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new(Io { reader, writer }),
        }
    }

    /// Print `prompt` and read one line, without the newline.
    fn prompt_line(&self, prompt: &str) -> Result<Option<String>> {
        let mut io = self.io.lock().map_err(|e| AssistantError::Input {
            message: format!("prompt lock poisoned: {}", e),
        })?;
        write!(io.writer, "{}", prompt)?;
        io.writer.flush()?;

        let mut line = String::new();
        if io.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn say(&self, message: &str) -> Result<()> {
        let mut io = self.io.lock().map_err(|e| AssistantError::Input {
            message: format!("prompt lock poisoned: {}", e),
        })?;
        writeln!(io.writer, "{}", message)?;
        Ok(())
    }

    #[cfg(test)]
    fn into_writer(self) -> Option<W> {
        self.io.into_inner().ok().map(|io| io.writer)
    }
}

impl<R: BufRead + Send, W: Write + Send> InputPrompt for TerminalPrompt<R, W> {
    fn choose_mode(&self) -> Result<ModeSelection> {
        loop {
            let Some(line) =
                self.prompt_line("\nPress (v) for voice, (t) for text, or (e) to exit, then ENTER: ")?
            else {
                return Ok(ModeSelection::Exit);
            };
            match parse_mode(&line) {
                Some(selection) => return Ok(selection),
                None => self.say("Invalid choice. Please press 'v', 't', or 'e'.")?,
            }
        }
    }

    fn read_text(&self) -> Result<Option<String>> {
        self.prompt_line("\nType your question and press ENTER: ")
    }

    fn ask_for_parameter(&self, _name: &str, question: &str) -> Result<Option<String>> {
        let answer = self.prompt_line(&format!("\n{} ", question))?;
        Ok(answer
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty()))
    }
}

/// Prompt that replays canned answers, for tests.
///
/// Once the mode script runs out it selects exit.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    modes: Mutex<VecDeque<ModeSelection>>,
    texts: Mutex<VecDeque<String>>,
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(self, mode: ModeSelection) -> Self {
        if let Ok(mut modes) = self.modes.lock() {
            modes.push_back(mode);
        }
        self
    }

    /// Queue a text turn: selects text mode and types `text`.
    pub fn with_text_turn(self, text: &str) -> Self {
        let this = self.with_mode(ModeSelection::Text);
        if let Ok(mut texts) = this.texts.lock() {
            texts.push_back(text.to_string());
        }
        this
    }

    pub fn with_voice_turn(self) -> Self {
        self.with_mode(ModeSelection::Voice)
    }

    pub fn with_answer(self, answer: &str) -> Self {
        if let Ok(mut answers) = self.answers.lock() {
            answers.push_back(answer.to_string());
        }
        self
    }

    /// Parameter names asked so far.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl InputPrompt for ScriptedPrompt {
    fn choose_mode(&self) -> Result<ModeSelection> {
        Ok(self
            .modes
            .lock()
            .ok()
            .and_then(|mut m| m.pop_front())
            .unwrap_or(ModeSelection::Exit))
    }

    fn read_text(&self) -> Result<Option<String>> {
        Ok(self.texts.lock().ok().and_then(|mut t| t.pop_front()))
    }

    fn ask_for_parameter(&self, name: &str, _question: &str) -> Result<Option<String>> {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(name.to_string());
        }
        Ok(self
            .answers
            .lock()
            .ok()
            .and_then(|mut a| a.pop_front())
            .filter(|a| !a.trim().is_empty()))
    }
}
