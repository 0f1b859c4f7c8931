use std::io::BufRead;

use tokio::sync::mpsc;

use vitaly_chat::{
    ChatEngine, EngineFeeds, EngineSettings, Message, MessagePhase, Sender, SubmitOutcome,
};

/// Console driver: one line in, one revealed reply out.
///
/// Renders the timeline after every mutation feed event; an empty line or
/// end of input exits after tearing the engine down.
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let settings_path = EngineSettings::default_config_path();
    let settings = EngineSettings::load_or_default(&settings_path);

    let (engine, feeds) = match ChatEngine::new(settings) {
        Ok(built) => built,
        Err(error) => {
            tracing::error!("could not start the engine: {error}");
            std::process::exit(1);
        }
    };

    let render = tokio::spawn(render_loop(engine.clone(), feeds));

    let mut lines = spawn_stdin_reader();
    while let Some(line) = lines.recv().await {
        let input = line.trim();
        if input.is_empty() {
            break;
        }
        if engine.submit(input).await == SubmitOutcome::RejectedTurnInFlight {
            println!("(still replying, hold on)");
        }
    }

    engine.tear_down().await;
    render.abort();
}

/// Reads stdin on its own thread; the runtime only sees complete lines.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (line_tx, line_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });
    line_rx
}

async fn render_loop(engine: ChatEngine, mut feeds: EngineFeeds) {
    loop {
        tokio::select! {
            event = feeds.timeline_events.recv() => {
                if event.is_none() {
                    return;
                }
                render_timeline(&engine.snapshot().await);
            }
            command = feeds.scroll_commands.recv() => {
                if command.is_none() {
                    return;
                }
                // A real view would scroll here; the console just notes it.
                tracing::debug!("scroll to newest requested");
            }
        }
    }
}

fn render_timeline(messages: &[Message]) {
    print!("\x1b[2J\x1b[H");
    for message in messages {
        let speaker = match message.sender {
            Sender::User => "you",
            Sender::Agent => "vitaly",
        };
        match message.phase {
            MessagePhase::Typing => println!("{speaker}: ..."),
            _ => println!("{speaker}: {}", message.text),
        }
    }
    println!();
}
