//! `zema chat`: Interactive or single-message chat mode.

use anyhow::anyhow;
use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use zema_agent::{InferenceClient, PromptPreset, ResponseParser};
use zema_config::AppConfig;
use zema_core::Error;
use zema_core::message::TurnContext;
use zema_providers::OllamaProvider;

pub struct ChatOptions {
    pub message: Option<String>,
    pub stream: bool,
    pub vision: Option<String>,
    pub preset: Option<String>,
    pub model: Option<String>,
}

/// A line typed in interactive mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Say(String),
    History,
    Clear,
    Model(Option<String>),
    Help,
    Exit,
    Unknown(String),
    Empty,
}

impl ChatInput {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ChatInput::Empty;
        }
        if matches!(line, "exit" | "quit") {
            return ChatInput::Exit;
        }
        let Some(command) = line.strip_prefix('/') else {
            return ChatInput::Say(line.to_string());
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        match name {
            "history" => ChatInput::History,
            "clear" => ChatInput::Clear,
            "model" => ChatInput::Model((!arg.is_empty()).then(|| arg.to_string())),
            "help" => ChatInput::Help,
            "exit" | "quit" => ChatInput::Exit,
            other => ChatInput::Unknown(other.to_string()),
        }
    }
}

pub async fn run(config: AppConfig, options: ChatOptions) -> anyhow::Result<()> {
    if !config.llm.is_loopback() {
        warn!(base_url = %config.llm.base_url, "Inference service is not on this machine");
    }

    let provider = Arc::new(OllamaProvider::from_config(&config.llm));
    let mut client = InferenceClient::new(provider, &config.llm, &config.history);

    if let Some(name) = &options.preset {
        let preset = PromptPreset::from_name(name)
            .ok_or_else(|| anyhow!("Unknown preset '{name}' (expected main, vision, tools or ethiopian)"))?;
        client = client.with_system_prompt(preset.text());
    }
    if let Some(model) = options.model {
        client.set_model(model);
    }

    let context = options.vision.map(TurnContext::with_vision);

    if let Some(message) = options.message {
        // Single message mode
        let answer = respond(&client, &message, context.as_ref(), options.stream).await?;
        print_tool_calls(&answer);
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  Zema — Interactive Mode");
    println!();
    println!("  Service:  {}", config.llm.base_url);
    println!("  Model:    {}", client.model());
    if let Some(preset) = &options.preset {
        println!("  Preset:   {preset}");
    }
    println!();
    println!("  Type your message and press Enter. /help lists commands.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    while let Some(line) = lines.next_line().await? {
        match ChatInput::parse(&line) {
            ChatInput::Empty => {}
            ChatInput::Exit => break,
            ChatInput::Help => {
                println!("  /history        show recent turns");
                println!("  /clear          forget the conversation");
                println!("  /model <name>   switch model");
                println!("  /exit           quit");
            }
            ChatInput::History => {
                let turns = client.context_window().await;
                if turns.is_empty() {
                    println!("  (no history)");
                }
                for turn in turns {
                    println!("  [{}] You > {}", turn.timestamp.format("%H:%M:%S"), turn.user_input);
                    println!("             Zema > {}", turn.assistant_response);
                }
            }
            ChatInput::Clear => {
                client.clear_history().await;
                println!("  History cleared.");
            }
            ChatInput::Model(Some(name)) => {
                client.set_model(name);
                println!("  Now using {}.", client.model());
            }
            ChatInput::Model(None) => println!("  Model: {}", client.model()),
            ChatInput::Unknown(name) => println!("  Unknown command /{name}. Try /help."),
            ChatInput::Say(text) => {
                match respond(&client, &text, context.as_ref(), options.stream).await {
                    Ok(answer) => print_tool_calls(&answer),
                    Err(e) => report(&e),
                }
                println!();
            }
        }
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

/// Send one message and print the answer; returns the full text.
async fn respond(
    client: &InferenceClient,
    input: &str,
    context: Option<&TurnContext>,
    stream: bool,
) -> anyhow::Result<String> {
    if !stream {
        let answer = client.generate(input, context).await?;
        println!("{answer}");
        return Ok(answer);
    }

    let mut fragments = client.generate_stream(input, context).await?;
    let mut answer = String::new();
    let mut stdout = std::io::stdout();
    while let Some(fragment) = fragments.next().await {
        let fragment = fragment?;
        print!("{fragment}");
        stdout.flush()?;
        answer.push_str(&fragment);
    }
    println!();
    Ok(answer)
}

fn print_tool_calls(answer: &str) {
    for call in ResponseParser::new().parse_tool_calls(answer) {
        let params = serde_json::to_string(&call.parameters).unwrap_or_default();
        eprintln!("  [tool] {}.{} {params}", call.tool, call.action);
    }
}

fn report(error: &anyhow::Error) {
    match error.downcast_ref::<Error>() {
        Some(e) if e.is_unavailable() => {
            eprintln!("  [Unavailable] The assistant cannot be reached: {e}");
            eprintln!("  Is the model server running? (ollama serve)");
        }
        _ => eprintln!("  [Error] {error:#}"),
    }
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}
