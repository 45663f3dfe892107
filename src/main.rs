// Module declarations
mod agent;
mod bridges;
mod cli;
mod companion;
mod config;
mod error;
mod gemini;
mod memory;
mod oauth;
mod playback;
mod speech;
mod tool_defs;
mod tool_exec;
mod tools;
mod transcribe;
mod types;
mod util;

// Everything is re-exported at the crate root so modules refer to each
// other through `crate::Name`.
#[allow(unused_imports)]
pub(crate) use agent::*;
#[allow(unused_imports)]
pub(crate) use bridges::*;
#[allow(unused_imports)]
pub(crate) use cli::*;
#[allow(unused_imports)]
pub(crate) use companion::*;
#[allow(unused_imports)]
pub(crate) use config::*;
#[allow(unused_imports)]
pub(crate) use error::*;
#[allow(unused_imports)]
pub(crate) use gemini::*;
#[allow(unused_imports)]
pub(crate) use memory::*;
#[allow(unused_imports)]
pub(crate) use oauth::*;
#[allow(unused_imports)]
pub(crate) use playback::*;
#[allow(unused_imports)]
pub(crate) use speech::*;
#[allow(unused_imports)]
pub(crate) use tool_defs::*;
#[allow(unused_imports)]
pub(crate) use tool_exec::*;
#[allow(unused_imports)]
pub(crate) use tools::*;
#[allow(unused_imports)]
pub(crate) use transcribe::*;
#[allow(unused_imports)]
pub(crate) use types::*;
#[allow(unused_imports)]
pub(crate) use util::*;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Prints the search notice to the terminal instead of a channel.
struct TerminalObserver;

impl ToolObserver for TerminalObserver {
    fn on_tool_start(&mut self, tool: &str, _input: &str) {
        if tool == "WebSearch" {
            println!("{SEARCH_ANNOUNCEMENT}");
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();
    let config = AkariConfig::load()?;

    match cli.command {
        Command::Bot => {
            run_discord_bot(config)?;
            Ok(())
        }

        Command::Chat { message } => {
            let mut companion = build_companion(&config)?;
            let reply = companion.respond(&message.join(" "), &mut TerminalObserver)?;
            println!("💬 あかり: {reply}");
            Ok(())
        }

        Command::Tools => {
            for (name, description) in TOOL_SPECS {
                let summary = description.lines().next().unwrap_or_default();
                println!("{name}\t{summary}");
            }
            Ok(())
        }

        Command::Tool { name, input } => {
            if !is_known_tool(&name) {
                eprintln!("Unknown tool: {name}");
                std::process::exit(2);
            }
            let ctx = ToolContext::new(config);
            println!("{}", ctx.run(&name, &input.join(" ")));
            Ok(())
        }

        Command::Say { speed, text } => {
            let synth = CommandSynthesizer {
                command: config.tts_command.clone(),
            };
            synth.synthesize(&text.join(" "), speed)?;
            println!("{}", config.output_wav.display());
            Ok(())
        }

        Command::Transcribe {
            device,
            stdin,
            list_devices,
        } => {
            let options = TranscribeOptions {
                device,
                stdin,
                list_devices,
            };
            if let Err(err) = run_transcriber(&config, &options) {
                println!("ERROR: {err}");
                return Err(err.into());
            }
            Ok(())
        }

        Command::Oauth { account } => {
            let Some(account) = GoogleAccount::parse(&account) else {
                let names: Vec<&str> = GoogleAccount::ALL.iter().map(|a| a.name()).collect();
                eprintln!("Unknown account: {account} (expected one of {})", names.join(", "));
                std::process::exit(2);
            };
            access_token(account, &config.credentials_dir)?;
            println!(
                "✅ {} authorized ({})",
                account.name(),
                token_path(account, &config.credentials_dir).display()
            );
            Ok(())
        }
    }
}
