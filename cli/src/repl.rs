//! Interactive chat REPL.

use anyhow::Result;
use colored::Colorize;
use reedline::{DefaultPrompt, DefaultPromptSegment, FileBackedHistory, Reedline, Signal};
use std::io::Write as _;
use tandem_application::HybridChat;
use tandem_domain::{Chunk, TransportMode};
use tokio_util::sync::CancellationToken;

/// Interactive chat over the hybrid transport.
pub struct ChatRepl {
    chat: HybridChat,
    show_banner: bool,
}

impl ChatRepl {
    pub fn new(chat: HybridChat) -> Self {
        Self {
            chat,
            show_banner: true,
        }
    }

    pub fn with_banner(mut self, show: bool) -> Self {
        self.show_banner = show;
        self
    }

    /// Run the REPL until /quit or Ctrl-D.
    pub async fn run(mut self) -> Result<()> {
        let mut editor = Reedline::create();
        if let Some(data_dir) = dirs::data_dir() {
            let path = data_dir.join("tandem").join("history.txt");
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Ok(history) = FileBackedHistory::with_file(200, path) {
                editor = editor.with_history(Box::new(history));
            }
        }
        let prompt = DefaultPrompt::new(
            DefaultPromptSegment::Basic("tandem".to_string()),
            DefaultPromptSegment::Empty,
        );

        if self.show_banner {
            self.print_welcome();
        }

        loop {
            match editor.read_line(&prompt) {
                Ok(Signal::Success(line)) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    if line.starts_with('/') {
                        if self.handle_command(&line).await {
                            break;
                        }
                        continue;
                    }
                    self.process_turn(&line).await;
                }
                Ok(Signal::CtrlC) => {
                    println!("^C");
                    continue;
                }
                Ok(Signal::CtrlD) => {
                    println!("Bye!");
                    break;
                }
                Err(e) => {
                    eprintln!("Error: {e:?}");
                    break;
                }
            }
        }

        self.chat.shutdown().await;
        Ok(())
    }

    fn print_welcome(&self) {
        println!();
        println!("╭─────────────────────────────────────────────╮");
        println!("│              tandem - chat mode             │");
        println!("╰─────────────────────────────────────────────╯");
        println!();
        println!("Transport: {}", self.chat.mode());
        println!("Commands: /local /remote /status /quit   Ctrl-C stops a reply");
        println!();
    }

    /// Returns true when the REPL should exit.
    async fn handle_command(&mut self, line: &str) -> bool {
        match line {
            "/quit" | "/exit" => return true,
            "/local" => self.switch(TransportMode::Local).await,
            "/remote" => self.switch(TransportMode::Remote).await,
            "/status" => {
                println!(
                    "mode: {}  chat: {}  messages: {}",
                    self.chat.mode(),
                    self.chat.chat_id(),
                    self.chat.visible().len()
                );
            }
            other => println!("Unknown command: {other}"),
        }
        false
    }

    async fn switch(&mut self, mode: TransportMode) {
        match self.chat.set_mode(mode).await {
            Ok(selected) if selected == mode => println!("Switched to {selected} transport."),
            Ok(selected) => println!("{mode} is unavailable; staying on {selected}."),
            Err(e) => println!("{} {}", "cannot switch:".red(), e),
        }
    }

    async fn process_turn(&mut self, line: &str) {
        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        print!("{} ", "assistant:".blue().bold());
        let _ = std::io::stdout().flush();

        let result = self
            .chat
            .ask_streaming(line, cancel, |chunk| {
                if let Chunk::TextDelta { delta, .. } = chunk {
                    print!("{delta}");
                    let _ = std::io::stdout().flush();
                }
            })
            .await;
        watcher.abort();
        println!();

        match result {
            Ok(outcome) => {
                if let Some(error) = &outcome.error {
                    println!("{} {}", "generation failed:".red(), error);
                } else if outcome.cancelled {
                    println!("{}", "[stopped]".yellow());
                }
            }
            Err(e) => println!("{} {}", "error:".red(), e),
        }
    }
}
